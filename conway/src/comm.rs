// comm.rs - Message fabric connecting the ranks of one run
//
// Ranks share no memory. Each pair of ranks that talks gets its own FIFO
// channel, so messages of step s always arrive before those of step s+1.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::trace;

use crate::error::{LifeError, Result};
use crate::grid::Grid;
use crate::halo::{HaloExchanger, HaloRow, RingLink};
use crate::partition::{Partition, bottom_neighbor, top_neighbor};

/// One rank's view of the fabric.
pub struct Endpoint {
    rank: usize,
    workers: usize,
    pub(crate) halo: HaloExchanger,
    pub(crate) gather: Gather,
}

impl Endpoint {
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

/// Builds the endpoints for `workers` ranks, indexed by rank.
pub fn world(workers: usize, timeout: Duration) -> Vec<Endpoint> {
    debug_assert!(workers > 0);
    if workers == 1 {
        return vec![Endpoint {
            rank: 0,
            workers,
            halo: HaloExchanger::loopback(timeout),
            gather: Gather {
                rank: 0,
                timeout,
                outboxes: vec![None],
                inboxes: vec![None],
            },
        }];
    }

    // North inbox of r holds rows from top(r); south inbox from bottom(r).
    let (north_tx, north_rx): (Vec<_>, Vec<_>) = (0..workers).map(|_| mpsc::unbounded_channel::<HaloRow>()).unzip();
    let (south_tx, south_rx): (Vec<_>, Vec<_>) = (0..workers).map(|_| mpsc::unbounded_channel::<HaloRow>()).unzip();

    let mut outboxes: Vec<Vec<Option<UnboundedSender<Block>>>> =
        (0..workers).map(|_| (0..workers).map(|_| None).collect()).collect();
    let mut inboxes: Vec<Vec<Option<UnboundedReceiver<Block>>>> =
        (0..workers).map(|_| (0..workers).map(|_| None).collect()).collect();
    for src in 0..workers {
        for dst in (0..workers).filter(|&dst| dst != src) {
            let (tx, rx) = mpsc::unbounded_channel();
            outboxes[src][dst] = Some(tx);
            inboxes[dst][src] = Some(rx);
        }
    }

    north_rx
        .into_iter()
        .zip(south_rx)
        .zip(outboxes.into_iter().zip(inboxes))
        .enumerate()
        .map(|(rank, ((from_north, from_south), (outboxes, inboxes)))| {
            let top = top_neighbor(rank, workers);
            let bottom = bottom_neighbor(rank, workers);
            let link = RingLink {
                to_north: south_tx[top].clone(),
                to_south: north_tx[bottom].clone(),
                from_north,
                from_south,
            };
            Endpoint {
                rank,
                workers,
                halo: HaloExchanger::ring(rank, top, bottom, timeout, link),
                gather: Gather {
                    rank,
                    timeout,
                    outboxes,
                    inboxes,
                },
            }
        })
        .collect()
}

/// A rank's freshly computed rows, shared by every receiving peer.
#[derive(Debug)]
pub(crate) struct Block {
    step: u64,
    from: usize,
    cells: Arc<[u8]>,
}

/// All-to-all exchange of computed row blocks.
pub(crate) struct Gather {
    rank: usize,
    timeout: Duration,
    /// Indexed by destination rank; `None` at our own rank.
    outboxes: Vec<Option<UnboundedSender<Block>>>,
    /// Indexed by source rank; `None` at our own rank.
    inboxes: Vec<Option<UnboundedReceiver<Block>>>,
}

impl Gather {
    /// Sends our block of `buf` to every peer and fills the rest of `buf`
    /// with theirs, so every rank ends the step with the whole grid.
    pub(crate) async fn allgather(&mut self, step: u64, partition: &Partition, buf: &mut Grid) -> Result<()> {
        let rank = self.rank;
        if partition.workers() == 1 {
            return Ok(());
        }

        let block: Arc<[u8]> = Arc::from(buf.rows(partition.range(rank)));
        for (peer, outbox) in self.outboxes.iter().enumerate() {
            let Some(outbox) = outbox else { continue };
            let message = Block {
                step,
                from: rank,
                cells: Arc::clone(&block),
            };
            outbox.send(message).map_err(|_| {
                LifeError::comm(rank, format!("rank {peer} hung up before the gather of step {step}"))
            })?;
        }

        for (peer, inbox) in self.inboxes.iter_mut().enumerate() {
            let Some(inbox) = inbox else { continue };
            let timeout = self.timeout;
            let block = tokio::time::timeout(timeout, inbox.recv())
                .await
                .map_err(|_| {
                    LifeError::comm(rank, format!("no block from rank {peer} within {timeout:?} (step {step})"))
                })?
                .ok_or_else(|| {
                    LifeError::comm(rank, format!("rank {peer} hung up before sending its block of step {step}"))
                })?;

            let range = partition.range(peer);
            if block.step != step || block.from != peer {
                return Err(LifeError::comm(
                    rank,
                    format!(
                        "expected block of step {step} from rank {peer}, got step {} from rank {}",
                        block.step, block.from
                    ),
                ));
            }
            if block.cells.len() != range.len() * partition.side() {
                return Err(LifeError::comm(
                    rank,
                    format!("block from rank {peer} has {} cells, expected {}", block.cells.len(), range.len() * partition.side()),
                ));
            }
            buf.rows_mut(range).copy_from_slice(&block.cells);
        }
        trace!(rank, step, "gather complete");
        Ok(())
    }
}
