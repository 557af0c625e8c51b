//! Whole-job drivers: every process of a job run inside this program.

use std::path::Path;
use std::thread;

use crossbeam_channel::unbounded;
use tracing::info;

use crate::builder::MapBuilder;
use crate::config::MapConfig;
use crate::error::RankMapError;
use crate::group::{agree, ProcessGroup, ThreadGroup};
use crate::linearize::Linearizer;
use crate::table::GlobalCoordinateTable;
use crate::topology::Topology;
use crate::validate::slot_words;

/// What one process of the job does from start to shutdown.
pub fn run_process<G, T>(
    group: &G,
    config: &MapConfig,
    topology: &T,
    linearizer: &dyn Linearizer,
    output: Option<&Path>,
) -> Result<GlobalCoordinateTable, RankMapError>
where
    G: ProcessGroup + ?Sized,
    T: Topology + ?Sized,
{
    let table = MapBuilder::new(config, linearizer).build(group, topology)?;
    if let Some(path) = output {
        publish(group, &table, path)?;
    }
    group.barrier()?;
    if group.is_root() {
        info!("[rankmap] finished: {} rank ids mapped", table.len());
    }
    Ok(table)
}

/// Rank 0 writes the table; everyone learns whether that worked.
pub fn publish<G>(
    group: &G,
    table: &GlobalCoordinateTable,
    path: &Path,
) -> Result<(), RankMapError>
where
    G: ProcessGroup + ?Sized,
{
    let written = if group.is_root() {
        info!("[rankmap] rank map file: {}", path.display());
        table.save(path)
    } else {
        Ok(())
    };
    agree(group, "writing the output file", written)
}

/// Run an `np`-process job with one thread per process.
pub fn run_threaded<T>(
    np: usize,
    config: &MapConfig,
    topology: &T,
    linearizer: &dyn Linearizer,
    output: Option<&Path>,
) -> Result<GlobalCoordinateTable, RankMapError>
where
    T: Topology + ?Sized,
{
    launch(np, config, topology, linearizer, output, |rank| {
        thread::Builder::new().name(format!("rank-{}", rank))
    })
}

/// Start one thread per rank, each built by `thread_for`.
///
/// No rank enters a collective until every thread is running. If a thread
/// cannot be started, the ones already running are released without doing
/// any work and the start failure is returned.
fn launch<T, B>(
    np: usize,
    config: &MapConfig,
    topology: &T,
    linearizer: &dyn Linearizer,
    output: Option<&Path>,
    thread_for: B,
) -> Result<GlobalCoordinateTable, RankMapError>
where
    T: Topology + ?Sized,
    B: Fn(usize) -> thread::Builder,
{
    if np == 0 {
        return Err(RankMapError::Config("a job needs at least one process".to_string()));
    }
    thread::scope(|s| {
        let (start, gate) = unbounded::<()>();
        let mut handles = Vec::with_capacity(np);
        let mut not_started = None;
        for group in ThreadGroup::spawn_group(np) {
            let rank = group.rank();
            let gate = gate.clone();
            let spawned = thread_for(rank).spawn_scoped(s, move || {
                gate.recv().map_err(|_| {
                    RankMapError::Runtime(format!("rank {} released before the job started", rank))
                })?;
                run_process(&group, config, topology, linearizer, output)
            });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    not_started = Some(RankMapError::Runtime(format!(
                        "cannot start the thread of rank {}: {}",
                        rank, e
                    )));
                    break;
                }
            }
        }

        // `gate` is still alive here, so these sends cannot fail
        if not_started.is_none() {
            for _ in 0..np {
                start.send(()).map_err(|e| {
                    RankMapError::Runtime(format!("cannot start the job: {}", e))
                })?;
            }
        }
        drop(start);

        let results: Vec<Result<GlobalCoordinateTable, RankMapError>> = handles
            .into_iter()
            .map(|h| {
                h.join().unwrap_or_else(|_| {
                    Err(RankMapError::Runtime("a process thread panicked".to_string()))
                })
            })
            .collect();
        match not_started {
            Some(e) => Err(e),
            None => first_cause(results),
        }
    })
}

/// Run the same pipeline for every rank in turn on the calling thread. Each
/// placement is added straight into the reduced buffer.
pub fn simulate<T>(
    np: usize,
    config: &MapConfig,
    topology: &T,
    linearizer: &dyn Linearizer,
) -> Result<GlobalCoordinateTable, RankMapError>
where
    T: Topology + ?Sized,
{
    config.check_process_count(np)?;
    let builder = MapBuilder::new(config, linearizer);
    let physical = builder.discover(topology)?;
    let plan = builder.plan(&physical)?;

    let mut reduced = vec![0i64; slot_words(physical.dimension()) * np];
    for rank in 0..np {
        let coords = topology.coords(rank)?;
        let placement = plan.place(rank, &coords)?;
        plan.scatter(&placement, &mut reduced);
    }
    GlobalCoordinateTable::from_reduced(&reduced, &physical, np)
}

/// All processes agree on success; on failure prefer the error of the
/// process that actually failed over the `PeerFailure` echoes.
fn first_cause(
    results: Vec<Result<GlobalCoordinateTable, RankMapError>>,
) -> Result<GlobalCoordinateTable, RankMapError> {
    let mut echo = None;
    let mut table = None;
    for result in results {
        match result {
            Ok(t) => {
                if table.is_none() {
                    table = Some(t);
                }
            }
            Err(RankMapError::PeerFailure { step }) => {
                echo.get_or_insert(RankMapError::PeerFailure { step });
            }
            Err(e) => return Err(e),
        }
    }
    match (echo, table) {
        (Some(e), _) => Err(e),
        (None, Some(t)) => Ok(t),
        (None, None) => Err(RankMapError::Runtime("job produced no result".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linearize::Lexical;
    use crate::shape::{GroupShape, LatticeShape, PhysicalShape};
    use crate::topology::GridTopology;

    fn small() -> (MapConfig, GridTopology) {
        let lattice = LatticeShape::new([2, 2, 2, 2]);
        let config = MapConfig::general(lattice, GroupShape::new([1, 1, 2, 1]), 2).unwrap();
        let topology = GridTopology::new(PhysicalShape::from_slice(&[2, 2, 2]), 2).unwrap();
        (config, topology)
    }

    #[test]
    fn test_threaded_matches_simulation() {
        let (config, topology) = small();
        let threaded = run_threaded(16, &config, &topology, &Lexical, None).unwrap();
        let simulated = simulate(16, &config, &topology, &Lexical).unwrap();
        assert_eq!(threaded, simulated);
        assert_eq!(threaded.len(), 16);
    }

    #[test]
    fn test_threaded_mismatch_reports_config_error() {
        let (config, topology) = small();
        let err = run_threaded(4, &config, &topology, &Lexical, None).unwrap_err();
        assert!(matches!(err, RankMapError::Config(_)));
    }

    #[test]
    fn test_thread_start_failure_ends_the_job() {
        let (config, topology) = small();
        // no address space can hold this stack, so rank 5 never starts
        let err = launch(16, &config, &topology, &Lexical, None, |rank| {
            let builder = thread::Builder::new();
            if rank == 5 {
                builder.stack_size(1 << 60)
            } else {
                builder
            }
        })
        .unwrap_err();
        match err {
            RankMapError::Runtime(message) => assert!(message.contains("rank 5"), "{}", message),
            other => panic!("expected a runtime error, got {:?}", other),
        }
    }

    #[test]
    fn test_simulation_scales_to_large_jobs() {
        let config = MapConfig::simple(LatticeShape::new([64, 4, 16, 16]), None, 4).unwrap();
        let topology = GridTopology::new(PhysicalShape::from_slice(&[64, 16, 16]), 4).unwrap();
        let table = simulate(65536, &config, &topology, &Lexical).unwrap();
        assert_eq!(table.len(), 65536);
        let per_node = table.ranks_per_node();
        assert_eq!(per_node.len(), 16384);
        assert!(per_node.values().all(|&n| n == 4));
    }

    #[test]
    fn test_first_cause_prefers_real_error() {
        let results = vec![
            Err(RankMapError::PeerFailure { step: "x".to_string() }),
            Err(RankMapError::Internal("boom".to_string())),
        ];
        assert!(matches!(first_cause(results), Err(RankMapError::Internal(_))));
    }
}
