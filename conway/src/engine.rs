// engine.rs - One rank's generation step under the ordered and static strategies

use std::sync::Arc;

use rayon::ThreadPool;
use rayon::prelude::*;
use tracing::trace;

use crate::comm::Endpoint;
use crate::config::Strategy;
use crate::error::{LifeError, Result};
use crate::grid::Grid;
use crate::halo::GhostRows;
use crate::partition::{Partition, RowRange};
use crate::rule;

/// Where a rank is within the current generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Exchanging,
    /// Ordered only: rows that need no ghost data, while the exchange is in flight.
    ComputingInterior,
    /// Ordered only: first and last owned rows, after the exchange completed.
    ComputingBoundary,
    /// Static only: the whole range in one pass.
    Computing,
    Committed,
}

impl Phase {
    /// The only legal successor of `self` under `strategy`.
    pub fn next(self, strategy: Strategy) -> Phase {
        match (self, strategy) {
            (Phase::Idle, _) => Phase::Exchanging,
            (Phase::Exchanging, Strategy::Ordered) => Phase::ComputingInterior,
            (Phase::Exchanging, Strategy::Static) => Phase::Computing,
            (Phase::ComputingInterior, _) => Phase::ComputingBoundary,
            (Phase::ComputingBoundary | Phase::Computing, _) => Phase::Committed,
            (Phase::Committed, _) => Phase::Idle,
        }
    }
}

fn advance(phase: &mut Phase, strategy: Strategy, to: Phase) {
    debug_assert_eq!(phase.next(strategy), to, "illegal transition from {phase:?}");
    trace!(from = ?*phase, ?to, "phase");
    *phase = to;
}

/// A rank: its private copy of the grid, scratch buffer, ghost rows and channels.
pub struct Worker {
    rank: usize,
    strategy: Strategy,
    partition: Arc<Partition>,
    range: RowRange,
    endpoint: Endpoint,
    pool: Arc<ThreadPool>,
    current: Grid,
    next: Grid,
    ghosts: GhostRows,
    phase: Phase,
    generation: u64,
}

impl Worker {
    pub fn new(
        endpoint: Endpoint,
        partition: Arc<Partition>,
        strategy: Strategy,
        pool: Arc<ThreadPool>,
        grid: Grid,
    ) -> Result<Self> {
        let rank = endpoint.rank();
        if endpoint.workers() != partition.workers() || grid.side() != partition.side() {
            return Err(LifeError::config(format!(
                "rank {rank}: endpoint for {} workers and {}x{} grid do not match a partition of {} rows into {}",
                endpoint.workers(),
                grid.side(),
                grid.side(),
                partition.side(),
                partition.workers()
            )));
        }
        let side = grid.side();
        Ok(Self {
            rank,
            strategy,
            range: partition.range(rank),
            partition,
            endpoint,
            pool,
            next: Grid::new(side)?,
            ghosts: GhostRows::new(side)?,
            current: grid,
            phase: Phase::Idle,
            generation: 0,
        })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn range(&self) -> RowRange {
        self.range
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Generations completed so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The committed grid, identical on every rank between steps.
    pub fn grid(&self) -> &Grid {
        &self.current
    }

    pub fn into_grid(self) -> Grid {
        self.current
    }

    /// Advances the whole grid by one generation.
    pub async fn step(&mut self) -> Result<()> {
        match self.strategy {
            Strategy::Ordered => self.compute_ordered().await?,
            Strategy::Static => self.compute_static().await?,
        }
        self.commit().await
    }

    async fn compute_ordered(&mut self) -> Result<()> {
        let (step, own, strategy) = (self.generation, self.range, self.strategy);
        let Self {
            current,
            next,
            ghosts,
            endpoint,
            pool,
            phase,
            ..
        } = self;
        let current: &Grid = current;

        advance(phase, strategy, Phase::Exchanging);
        let pending = endpoint.halo.start(step, current.row(own.start), current.row(own.last()), ghosts);

        advance(phase, strategy, Phase::ComputingInterior);
        if let Some(interior) = own.interior() {
            pool.install(|| evolve_interior(current, interior, next));
        }

        let ghosts = pending.wait().await?;
        advance(phase, strategy, Phase::ComputingBoundary);
        pool.install(|| evolve_boundary(current, own, ghosts, next));
        Ok(())
    }

    async fn compute_static(&mut self) -> Result<()> {
        let (step, own, strategy) = (self.generation, self.range, self.strategy);
        let Self {
            current,
            next,
            ghosts,
            endpoint,
            pool,
            phase,
            ..
        } = self;
        let current: &Grid = current;

        advance(phase, strategy, Phase::Exchanging);
        let ghosts = endpoint
            .halo
            .start(step, current.row(own.start), current.row(own.last()), ghosts)
            .wait()
            .await?;

        advance(phase, strategy, Phase::Computing);
        pool.install(|| evolve_range(current, own, ghosts, next));
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        advance(&mut self.phase, self.strategy, Phase::Committed);
        self.endpoint
            .gather
            .allgather(self.generation, &self.partition, &mut self.next)
            .await?;
        std::mem::swap(&mut self.current, &mut self.next);
        self.generation += 1;
        advance(&mut self.phase, self.strategy, Phase::Idle);
        Ok(())
    }
}

/// Rows strictly inside the owned range: both vertical neighbours are owned too.
fn evolve_interior(current: &Grid, rows: RowRange, next: &mut Grid) {
    let side = current.side();
    next.rows_mut(rows)
        .par_chunks_mut(side)
        .enumerate()
        .for_each(|(offset, out)| {
            let row = rows.start + offset;
            rule::evolve_row(current.row(row - 1), current.row(row), current.row(row + 1), out);
        });
}

/// First and last owned rows, which read the ghost rows.
fn evolve_boundary(current: &Grid, own: RowRange, ghosts: &GhostRows, next: &mut Grid) {
    let side = current.side();
    let block = next.rows_mut(own);
    let (head, rest) = block.split_at_mut(side);
    if rest.is_empty() {
        let (above, below) = vertical_neighbors(current, own, ghosts, own.start);
        rule::evolve_row(above, current.row(own.start), below, head);
        return;
    }

    let tail_start = rest.len() - side;
    let tail = &mut rest[tail_start..];
    rayon::join(
        || {
            let (above, below) = vertical_neighbors(current, own, ghosts, own.start);
            rule::evolve_row(above, current.row(own.start), below, head);
        },
        || {
            let (above, below) = vertical_neighbors(current, own, ghosts, own.last());
            rule::evolve_row(above, current.row(own.last()), below, tail);
        },
    );
}

/// The whole owned range from one snapshot.
fn evolve_range(current: &Grid, own: RowRange, ghosts: &GhostRows, next: &mut Grid) {
    let side = current.side();
    next.rows_mut(own)
        .par_chunks_mut(side)
        .enumerate()
        .for_each(|(offset, out)| {
            let row = own.start + offset;
            let (above, below) = vertical_neighbors(current, own, ghosts, row);
            rule::evolve_row(above, current.row(row), below, out);
        });
}

/// Rows above and below `row`, substituting ghost rows at the range edges.
fn vertical_neighbors<'a>(current: &'a Grid, own: RowRange, ghosts: &'a GhostRows, row: usize) -> (&'a [u8], &'a [u8]) {
    let above = if row == own.start { &ghosts.north[..] } else { current.row(row - 1) };
    let below = if row == own.last() { &ghosts.south[..] } else { current.row(row + 1) };
    (above, below)
}
