// halo.rs - Ghost-row exchange between row-adjacent ranks
//
// Every step a rank sends its first row to the rank above it and its last
// row to the rank below it, and receives the matching rows back:
//
//   rank r-1   ...  last row  ──────┐
//                                   ▼ north ghost of r
//   rank r     first row ... last row
//                                   ▲ south ghost of r
//   rank r+1   first row ... ───────┘
//
// The ring wraps, so rank 0's top neighbour is the last rank.

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::trace;

use crate::error::{LifeError, Result};
use crate::grid::alloc_cells;

/// Side of the receiving rank a ghost row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    North,
    South,
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::North => f.write_str("north"),
            Edge::South => f.write_str("south"),
        }
    }
}

/// A boundary row in flight, tagged with the step it was taken from.
#[derive(Debug)]
pub(crate) struct HaloRow {
    pub step: u64,
    pub from: usize,
    pub cells: Vec<u8>,
}

/// Copies of the neighbours' boundary rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GhostRows {
    /// Last row of the top neighbour, i.e. the row above this rank's first row.
    pub north: Vec<u8>,
    /// First row of the bottom neighbour, i.e. the row below this rank's last row.
    pub south: Vec<u8>,
}

impl GhostRows {
    pub fn new(side: usize) -> Result<Self> {
        Ok(Self {
            north: alloc_cells(side, "north ghost row")?,
            south: alloc_cells(side, "south ghost row")?,
        })
    }
}

/// Channel ends connecting a rank to both ring neighbours.
pub(crate) struct RingLink {
    /// Into the top neighbour's south inbox.
    pub to_north: UnboundedSender<HaloRow>,
    /// Into the bottom neighbour's north inbox.
    pub to_south: UnboundedSender<HaloRow>,
    pub from_north: UnboundedReceiver<HaloRow>,
    pub from_south: UnboundedReceiver<HaloRow>,
}

pub struct HaloExchanger {
    rank: usize,
    top: usize,
    bottom: usize,
    timeout: Duration,
    /// `None` for a single rank, which is its own neighbour on both sides.
    link: Option<RingLink>,
}

impl HaloExchanger {
    pub(crate) fn loopback(timeout: Duration) -> Self {
        Self {
            rank: 0,
            top: 0,
            bottom: 0,
            timeout,
            link: None,
        }
    }

    pub(crate) fn ring(rank: usize, top: usize, bottom: usize, timeout: Duration, link: RingLink) -> Self {
        Self {
            rank,
            top,
            bottom,
            timeout,
            link: Some(link),
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn top(&self) -> usize {
        self.top
    }

    pub fn bottom(&self) -> usize {
        self.bottom
    }

    /// Posts both sends and both receives without blocking.
    ///
    /// The ghost buffers stay mutably borrowed by the returned request set,
    /// so nothing can read them until [`PendingExchange::wait`] hands them back.
    pub fn start<'a>(
        &'a mut self,
        step: u64,
        first_row: &'a [u8],
        last_row: &'a [u8],
        ghosts: &'a mut GhostRows,
    ) -> PendingExchange<'a> {
        let (rank, top, bottom, timeout) = (self.rank, self.top, self.bottom, self.timeout);

        let Some(link) = self.link.as_mut() else {
            return PendingExchange {
                rank,
                step,
                timeout,
                north_send: SendRequest::Loopback,
                south_send: SendRequest::Loopback,
                north_recv: RecvRequest::Loopback(last_row),
                south_recv: RecvRequest::Loopback(first_row),
                ghosts,
            };
        };

        let north_send = post(&link.to_north, top, HaloRow {
            step,
            from: rank,
            cells: first_row.to_vec(),
        });
        let south_send = post(&link.to_south, bottom, HaloRow {
            step,
            from: rank,
            cells: last_row.to_vec(),
        });
        trace!(rank, step, top, bottom, "halo rows posted");

        PendingExchange {
            rank,
            step,
            timeout,
            north_send,
            south_send,
            north_recv: RecvRequest::Remote {
                from: top,
                inbox: &mut link.from_north,
            },
            south_recv: RecvRequest::Remote {
                from: bottom,
                inbox: &mut link.from_south,
            },
            ghosts,
        }
    }
}

fn post(outbox: &UnboundedSender<HaloRow>, to: usize, row: HaloRow) -> SendRequest {
    match outbox.send(row) {
        Ok(()) => SendRequest::Posted,
        Err(_) => SendRequest::Failed { to },
    }
}

#[derive(Debug)]
enum SendRequest {
    Loopback,
    Posted,
    Failed { to: usize },
}

impl SendRequest {
    fn complete(self, rank: usize, step: u64, edge: Edge) -> Result<()> {
        match self {
            SendRequest::Loopback | SendRequest::Posted => Ok(()),
            SendRequest::Failed { to } => Err(LifeError::comm(
                rank,
                format!("rank {to} hung up before receiving the {edge} halo row of step {step}"),
            )),
        }
    }
}

enum RecvRequest<'a> {
    /// Single rank: the ghost is one of our own rows.
    Loopback(&'a [u8]),
    Remote {
        from: usize,
        inbox: &'a mut UnboundedReceiver<HaloRow>,
    },
}

impl RecvRequest<'_> {
    async fn complete(self, rank: usize, step: u64, timeout: Duration, edge: Edge, dst: &mut [u8]) -> Result<()> {
        let (from, inbox) = match self {
            RecvRequest::Loopback(row) => {
                dst.copy_from_slice(row);
                return Ok(());
            }
            RecvRequest::Remote { from, inbox } => (from, inbox),
        };

        let row = tokio::time::timeout(timeout, inbox.recv())
            .await
            .map_err(|_| {
                LifeError::comm(
                    rank,
                    format!("no {edge} ghost row from rank {from} within {timeout:?} (step {step})"),
                )
            })?
            .ok_or_else(|| {
                LifeError::comm(
                    rank,
                    format!("rank {from} hung up before sending the {edge} ghost row of step {step}"),
                )
            })?;

        if row.step != step || row.from != from {
            return Err(LifeError::comm(
                rank,
                format!(
                    "expected {edge} ghost row of step {step} from rank {from}, got step {} from rank {}",
                    row.step, row.from
                ),
            ));
        }
        if row.cells.len() != dst.len() {
            return Err(LifeError::comm(
                rank,
                format!("{edge} ghost row has {} cells, expected {}", row.cells.len(), dst.len()),
            ));
        }
        dst.copy_from_slice(&row.cells);
        Ok(())
    }
}

/// The four outstanding operations of one exchange.
pub struct PendingExchange<'a> {
    rank: usize,
    step: u64,
    timeout: Duration,
    north_send: SendRequest,
    south_send: SendRequest,
    north_recv: RecvRequest<'a>,
    south_recv: RecvRequest<'a>,
    ghosts: &'a mut GhostRows,
}

impl<'a> PendingExchange<'a> {
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Blocks until both sends and both receives have completed.
    pub async fn wait(self) -> Result<&'a GhostRows> {
        let PendingExchange {
            rank,
            step,
            timeout,
            north_send,
            south_send,
            north_recv,
            south_recv,
            ghosts,
        } = self;

        north_send.complete(rank, step, Edge::North)?;
        south_send.complete(rank, step, Edge::South)?;

        let north = &mut ghosts.north;
        let south = &mut ghosts.south;
        tokio::try_join!(
            north_recv.complete(rank, step, timeout, Edge::North, north),
            south_recv.complete(rank, step, timeout, Edge::South, south),
        )?;
        trace!(rank, step, "halo exchange complete");

        Ok(ghosts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::world;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn first_row(rank: usize) -> Vec<u8> {
        vec![(rank * 10 + 1) as u8; 4]
    }

    fn last_row(rank: usize) -> Vec<u8> {
        vec![(rank * 10 + 2) as u8; 4]
    }

    async fn exchange_all(workers: usize) -> Vec<GhostRows> {
        let mut endpoints = world(workers, TIMEOUT);
        let firsts: Vec<_> = (0..workers).map(first_row).collect();
        let lasts: Vec<_> = (0..workers).map(last_row).collect();
        let mut ghosts: Vec<_> = (0..workers).map(|_| GhostRows::new(4).unwrap()).collect();

        let mut pending = Vec::with_capacity(workers);
        for (rank, (endpoint, g)) in endpoints.iter_mut().zip(ghosts.iter_mut()).enumerate() {
            pending.push(endpoint.halo.start(0, &firsts[rank], &lasts[rank], g));
        }
        for exchange in pending {
            exchange.wait().await.unwrap();
        }
        ghosts
    }

    #[tokio::test]
    async fn single_rank_is_its_own_neighbour() {
        let ghosts = exchange_all(1).await;
        assert_eq!(ghosts[0].north, last_row(0));
        assert_eq!(ghosts[0].south, first_row(0));
    }

    #[tokio::test]
    async fn ghosts_come_from_ring_neighbours() {
        for workers in [2, 3, 5] {
            let ghosts = exchange_all(workers).await;
            for (rank, g) in ghosts.iter().enumerate() {
                let top = (rank + workers - 1) % workers;
                let bottom = (rank + 1) % workers;
                assert_eq!(g.north, last_row(top), "rank {rank} of {workers}");
                assert_eq!(g.south, first_row(bottom), "rank {rank} of {workers}");
            }
        }
    }

    #[tokio::test]
    async fn consecutive_steps_stay_in_order() {
        let mut endpoints = world(2, TIMEOUT);
        let (a, b) = endpoints.split_at_mut(1);
        let (a, b) = (&mut a[0], &mut b[0]);
        let mut ghosts_a = GhostRows::new(2).unwrap();
        let mut ghosts_b = GhostRows::new(2).unwrap();

        // Rank 1 runs two steps ahead before rank 0 collects anything.
        for step in 0..2u8 {
            let row = [step, step];
            b.halo.start(step as u64, &row, &row, &mut ghosts_b);
        }
        for step in 0..2u8 {
            let row = [9, 9];
            let ghosts = a.halo.start(step as u64, &row, &row, &mut ghosts_a).wait().await.unwrap();
            assert_eq!(ghosts.north, vec![step, step]);
            assert_eq!(ghosts.south, vec![step, step]);
        }
    }

    #[tokio::test]
    async fn silent_neighbour_times_out() {
        let mut endpoints = world(2, Duration::from_millis(50));
        let mut ghosts = GhostRows::new(3).unwrap();
        let row = [1, 0, 1];
        let err = endpoints[0].halo.start(0, &row, &row, &mut ghosts).wait().await.unwrap_err();
        assert!(matches!(err, LifeError::Communication { rank: 0, .. }), "{err}");
    }

    #[tokio::test]
    async fn departed_neighbour_is_a_communication_failure() {
        let mut endpoints = world(2, TIMEOUT);
        drop(endpoints.pop());
        let mut ghosts = GhostRows::new(3).unwrap();
        let row = [0, 1, 0];
        let err = endpoints[0].halo.start(0, &row, &row, &mut ghosts).wait().await.unwrap_err();
        assert!(matches!(err, LifeError::Communication { .. }), "{err}");
    }

    #[tokio::test]
    async fn stale_step_is_rejected() {
        let mut endpoints = world(2, TIMEOUT);
        let mut ghosts = GhostRows::new(2).unwrap();
        let row = [1, 1];
        endpoints[1].halo.start(7, &row, &row, &mut ghosts);
        let mut ghosts = GhostRows::new(2).unwrap();
        let err = endpoints[0].halo.start(0, &row, &row, &mut ghosts).wait().await.unwrap_err();
        assert!(err.to_string().contains("step 0"), "{err}");
    }
}
