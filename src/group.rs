//! Process-group runtime: the collectives the mapping pipeline needs.
//!
//! `SoloGroup` is a one-process job. `ThreadGroup` runs every process of a
//! job as a thread of the current program; rank 0 doubles as the reduction
//! root and the handles talk over crossbeam channels.

use crossbeam_channel::{unbounded, Receiver, Sender};
use fixedbitset::FixedBitSet;
use tracing::debug;

use crate::error::RankMapError;

/// Collectives used by the pipeline. Every process must call them in the
/// same order.
pub trait ProcessGroup {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Element-wise sum of `buf` across all processes, in place. Every process
    /// receives the same result.
    fn all_reduce_sum(&self, buf: &mut [i64]) -> Result<(), RankMapError>;

    fn barrier(&self) -> Result<(), RankMapError> {
        self.all_reduce_sum(&mut [])
    }

    fn is_root(&self) -> bool {
        self.rank() == 0
    }
}

/// Turn a local outcome into a group decision.
///
/// Every process contributes a failure flag; if any process failed, every
/// process gets an error back (its own, or [`RankMapError::PeerFailure`]).
/// This keeps healthy processes from blocking on a collective that a failed
/// peer will never reach.
pub fn agree<T, G>(
    group: &G,
    step: &str,
    local: Result<T, RankMapError>,
) -> Result<T, RankMapError>
where
    G: ProcessGroup + ?Sized,
{
    let mut flag = [i64::from(local.is_err())];
    let reduced = group.all_reduce_sum(&mut flag);
    match (local, reduced) {
        (Err(e), _) => Err(e),
        (Ok(_), Err(e)) => Err(e),
        (Ok(value), Ok(())) => {
            if flag[0] > 0 {
                debug!(
                    "[rankmap][group] rank {}: {} peer(s) failed at {}",
                    group.rank(),
                    flag[0],
                    step
                );
                Err(RankMapError::PeerFailure { step: step.to_string() })
            } else {
                Ok(value)
            }
        }
    }
}

/// A job with a single process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoloGroup;

impl ProcessGroup for SoloGroup {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_reduce_sum(&self, _buf: &mut [i64]) -> Result<(), RankMapError> {
        Ok(())
    }
}

struct RootLinks {
    inbox: Receiver<(usize, Vec<i64>)>,
    replies: Vec<Sender<Vec<i64>>>,
}

/// One process's handle in an in-process job.
pub struct ThreadGroup {
    rank: usize,
    size: usize,
    to_root: Sender<(usize, Vec<i64>)>,
    from_root: Receiver<Vec<i64>>,
    root: Option<RootLinks>,
}

impl ThreadGroup {
    /// Build the handles of an `n`-process job, indexed by rank. Each handle
    /// is meant to be moved into its own thread.
    pub fn spawn_group(n: usize) -> Vec<ThreadGroup> {
        let (to_root, inbox) = unbounded();
        let (replies, receivers): (Vec<_>, Vec<_>) = (0..n).map(|_| unbounded()).unzip();
        let mut root = Some(RootLinks { inbox, replies });
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, from_root)| ThreadGroup {
                rank,
                size: n,
                to_root: to_root.clone(),
                from_root,
                root: if rank == 0 { root.take() } else { None },
            })
            .collect()
    }

    fn reduce_as_root(&self, links: &RootLinks, buf: &mut [i64]) -> Result<(), RankMapError> {
        let mut seen = FixedBitSet::with_capacity(self.size);
        seen.insert(self.rank);
        for _ in 1..self.size {
            let (rank, data) = links.inbox.recv().map_err(|e| {
                RankMapError::Runtime(format!("reduction root lost its peers: {}", e))
            })?;
            if data.len() != buf.len() {
                return Err(RankMapError::Runtime(format!(
                    "rank {} contributed {} words, expected {}",
                    rank,
                    data.len(),
                    buf.len()
                )));
            }
            if rank >= self.size || seen.put(rank) {
                return Err(RankMapError::Runtime(format!(
                    "unexpected contribution from rank {}",
                    rank
                )));
            }
            for (acc, v) in buf.iter_mut().zip(&data) {
                *acc += v;
            }
        }
        for reply in links.replies.iter().skip(1) {
            reply.send(buf.to_vec()).map_err(|e| {
                RankMapError::Runtime(format!("cannot broadcast reduction result: {}", e))
            })?;
        }
        Ok(())
    }
}

impl ProcessGroup for ThreadGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_reduce_sum(&self, buf: &mut [i64]) -> Result<(), RankMapError> {
        if let Some(links) = &self.root {
            return self.reduce_as_root(links, buf);
        }
        self.to_root.send((self.rank, buf.to_vec())).map_err(|e| {
            RankMapError::Runtime(format!("rank {} cannot reach the root: {}", self.rank, e))
        })?;
        let result = self.from_root.recv().map_err(|e| {
            RankMapError::Runtime(format!("rank {} lost the root: {}", self.rank, e))
        })?;
        if result.len() != buf.len() {
            return Err(RankMapError::Runtime(format!(
                "reduction result has {} words, expected {}",
                result.len(),
                buf.len()
            )));
        }
        buf.copy_from_slice(&result);
        Ok(())
    }
}
