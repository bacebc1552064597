// history.rs - Fingerprints of recent generations, for spotting still lifes and oscillators

use crate::grid::Grid;

/// How many past generations are remembered.
pub const HISTORY_LEN: usize = 10;

/// A generation that repeats an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cycle {
    /// Generation at which the repeat was seen.
    pub generation: u64,
    /// Distance back to the matching generation; 1 for a still life.
    pub period: u64,
}

#[derive(Debug, Default)]
pub struct CycleDetector {
    history: [(u64, u64); HISTORY_LEN],
    count: usize,
    found: Option<Cycle>,
}

impl CycleDetector {
    /// Records `grid` as `generation`. Returns the cycle the first time one shows up.
    pub fn observe(&mut self, generation: u64, grid: &Grid) -> Option<Cycle> {
        if self.found.is_some() {
            return None;
        }
        let hash = grid.fingerprint();
        let remembered = &self.history[..self.count.min(HISTORY_LEN)];
        if let Some(&(seen, _)) = remembered.iter().find(|&&(_, h)| h == hash) {
            let cycle = Cycle {
                generation,
                period: generation - seen,
            };
            self.found = Some(cycle);
            return Some(cycle);
        }
        self.history[self.count % HISTORY_LEN] = (generation, hash);
        self.count += 1;
        None
    }

    /// First cycle seen so far, if any.
    pub fn cycle(&self) -> Option<Cycle> {
        self.found
    }
}
