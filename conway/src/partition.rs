// partition.rs - Row ranges owned by each rank

use crate::error::{LifeError, Result};

/// Half-open row interval `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowRange {
    pub start: usize,
    pub end: usize,
}

impl RowRange {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Last owned row.
    pub fn last(&self) -> usize {
        self.end - 1
    }

    pub fn contains(&self, row: usize) -> bool {
        (self.start..self.end).contains(&row)
    }

    /// Rows whose vertical neighbours all lie inside the range, so they can
    /// be evaluated without ghost rows. `None` for ranges under three rows.
    pub fn interior(&self) -> Option<RowRange> {
        (self.len() > 2).then(|| RowRange::new(self.start + 1, self.end - 1))
    }
}

/// Contiguous split of `[0, side)` into one range per rank.
///
/// The first `side % workers` ranks own one extra row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    side: usize,
    ranges: Vec<RowRange>,
}

impl Partition {
    pub fn new(side: usize, workers: usize) -> Result<Self> {
        if side == 0 {
            return Err(LifeError::config("grid size must be positive"));
        }
        if workers == 0 {
            return Err(LifeError::config("at least one worker is required"));
        }
        if workers > side {
            return Err(LifeError::config(format!(
                "{workers} workers for a {side}x{side} grid would leave a worker without rows"
            )));
        }

        let chunk = side / workers;
        let remainder = side % workers;
        let mut ranges = Vec::with_capacity(workers);
        let mut start = 0;
        for rank in 0..workers {
            let len = chunk + usize::from(rank < remainder);
            ranges.push(RowRange::new(start, start + len));
            start += len;
        }
        debug_assert_eq!(start, side);

        Ok(Self { side, ranges })
    }

    pub fn side(&self) -> usize {
        self.side
    }

    pub fn workers(&self) -> usize {
        self.ranges.len()
    }

    /// Rows owned by `rank`. Panics if `rank >= workers()`.
    pub fn range(&self, rank: usize) -> RowRange {
        self.ranges[rank]
    }

    pub fn ranges(&self) -> &[RowRange] {
        &self.ranges
    }

    /// Rank owning `row` (taken modulo `side`).
    pub fn owner_of(&self, row: usize) -> usize {
        let row = row % self.side;
        self.ranges.partition_point(|r| r.end <= row)
    }

    /// Rank holding the rows just above `rank`'s first row.
    pub fn top_neighbor(&self, rank: usize) -> usize {
        top_neighbor(rank, self.workers())
    }

    /// Rank holding the rows just below `rank`'s last row.
    pub fn bottom_neighbor(&self, rank: usize) -> usize {
        bottom_neighbor(rank, self.workers())
    }
}

pub(crate) fn top_neighbor(rank: usize, workers: usize) -> usize {
    (rank + workers - 1) % workers
}

pub(crate) fn bottom_neighbor(rank: usize, workers: usize) -> usize {
    (rank + 1) % workers
}
