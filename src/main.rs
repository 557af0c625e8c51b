use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use rankmap::config::{JobFile, LinearizerKind, MapConfig, RANK_MAP_FILE};
use rankmap::job::{run_threaded, simulate};
use rankmap::topology::GridTopology;
use rankmap::{GroupShape, LatticeShape, PhysicalShape, RankMapError, DEFAULT_GROUP_SIZE};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "rankmap")]
#[command(
    about = "Generate the rank map of a 4-dim process lattice on a 3-dim node topology",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    exec: ExecOptions,
}

#[derive(Subcommand)]
enum Commands {
    /// One lattice direction lives entirely inside a node
    ///
    /// ex. `rankmap simple 8 4 4 4 4 --topology 8,4,4`: 8x4x4x4 lattice,
    /// 4th direction is the inner-node direction.
    Simple {
        #[arg(value_parser = positive)]
        p1: usize,
        #[arg(value_parser = positive)]
        p2: usize,
        #[arg(value_parser = positive)]
        p3: usize,
        #[arg(value_parser = positive)]
        p4: usize,
        /// Inner-node direction [1-4]; defaults to the first direction whose
        /// size equals the group size
        #[arg(value_parser = clap::value_parser!(u8).range(1..=4))]
        dir: Option<u8>,
        #[command(flatten)]
        shape: ShapeOptions,
    },
    /// The intra-node processes form their own 4-dim sub-lattice
    ///
    /// ex. `rankmap general 8 4 4 1 1 2 2 1 --topology 8,2,2`: 8x4x4x1
    /// lattice, 1x2x2x1 intra-node lattice.
    General {
        #[arg(value_parser = positive)]
        p1: usize,
        #[arg(value_parser = positive)]
        p2: usize,
        #[arg(value_parser = positive)]
        p3: usize,
        #[arg(value_parser = positive)]
        p4: usize,
        #[arg(value_parser = positive)]
        q1: usize,
        #[arg(value_parser = positive)]
        q2: usize,
        #[arg(value_parser = positive)]
        q3: usize,
        #[arg(value_parser = positive)]
        q4: usize,
        #[command(flatten)]
        shape: ShapeOptions,
    },
    /// Read the job description from a JSON file
    Job {
        file: PathBuf,
        /// Overrides the output path of the job file
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct ShapeOptions {
    /// Physical node topology, e.g. 8,4,4
    #[arg(long, value_delimiter = ',', required = true, value_parser = positive)]
    topology: Vec<usize>,
    /// Processes per node
    #[arg(long, default_value_t = DEFAULT_GROUP_SIZE, value_parser = positive)]
    group_size: usize,
    #[arg(long, env = "RANKMAP_OUTPUT", default_value = RANK_MAP_FILE)]
    output: PathBuf,
    #[arg(long, value_enum, default_value_t = LinearizerKind::Lexical)]
    rankmap: LinearizerKind,
}

#[derive(Args)]
struct ExecOptions {
    /// Number of processes in the job; defaults to the lattice volume
    #[arg(long, global = true)]
    np: Option<usize>,
    /// Compute every process in turn on one thread instead of one thread per process
    #[arg(long, global = true)]
    sequential: bool,
}

struct Request {
    config: MapConfig,
    topology: Vec<usize>,
    group_size: usize,
    output: PathBuf,
    rankmap: LinearizerKind,
}

fn positive(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be a positive integer".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(format!("not a positive integer: {}", e)),
    }
}

fn request(command: Commands) -> Result<Request, RankMapError> {
    match command {
        Commands::Simple {
            p1,
            p2,
            p3,
            p4,
            dir,
            shape,
        } => Ok(Request {
            config: MapConfig::simple(
                LatticeShape::new([p1, p2, p3, p4]),
                dir.map(|d| usize::from(d) - 1),
                shape.group_size,
            )?,
            topology: shape.topology,
            group_size: shape.group_size,
            output: shape.output,
            rankmap: shape.rankmap,
        }),
        Commands::General {
            p1,
            p2,
            p3,
            p4,
            q1,
            q2,
            q3,
            q4,
            shape,
        } => Ok(Request {
            config: MapConfig::general(
                LatticeShape::new([p1, p2, p3, p4]),
                GroupShape::new([q1, q2, q3, q4]),
                shape.group_size,
            )?,
            topology: shape.topology,
            group_size: shape.group_size,
            output: shape.output,
            rankmap: shape.rankmap,
        }),
        Commands::Job { file, output } => {
            let job = JobFile::load(&file)?;
            Ok(Request {
                config: job.map_config()?,
                topology: job.topology.clone(),
                group_size: job.group_size,
                output: output
                    .or(job.output)
                    .unwrap_or_else(|| PathBuf::from(RANK_MAP_FILE)),
                rankmap: job.rankmap,
            })
        }
    }
}

fn run(cli: Cli) -> Result<(), RankMapError> {
    let req = request(cli.command)?;
    let np = cli.exec.np.unwrap_or(req.config.process_count());
    let topology = GridTopology::new(PhysicalShape::from_slice(&req.topology), req.group_size)?;
    let linearizer = req.rankmap.build();

    info!(
        "[rankmap] lattice {} / intra-node {} on {} processes",
        req.config.lattice(),
        req.config.group(),
        np
    );

    if cli.exec.sequential {
        let table = simulate(np, &req.config, &topology, linearizer.as_ref())?;
        info!("[rankmap] rank map file: {}", req.output.display());
        table.save(&req.output)?;
        info!("[rankmap] finished: {} rank ids mapped", table.len());
    } else {
        run_threaded(np, &req.config, &topology, linearizer.as_ref(), Some(&req.output))?;
    }
    Ok(())
}

fn main() {
    rankmap::init_tracing("rankmap");
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("[rankmap] {}", e);
        std::process::exit(1);
    }
}
