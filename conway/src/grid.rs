// grid.rs - Square toroidal grid for Conway's Game of Life

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use rand::Rng;

use crate::error::{LifeError, Result};
use crate::partition::RowRange;

pub const DEAD: u8 = 0;
pub const ALIVE: u8 = 1;

/// Fraction of live cells in a freshly initialised playground.
pub const DEFAULT_DENSITY: f64 = 0.3;

/// Allocates `len` dead cells, reporting failure instead of aborting.
pub(crate) fn alloc_cells(len: usize, what: &'static str) -> Result<Vec<u8>> {
    let mut cells = Vec::new();
    cells
        .try_reserve_exact(len)
        .map_err(|_| LifeError::Allocation { what, bytes: len })?;
    cells.resize(len, DEAD);
    Ok(cells)
}

/// A `side x side` matrix of 0/1 cells, stored row-major.
///
/// Every index wraps modulo `side` on both axes: the last row is adjacent
/// to the first and the last column to the first. There is no edge.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Grid {
    side: usize,
    cells: Vec<u8>,
}

impl Grid {
    /// An all-dead grid.
    pub fn new(side: usize) -> Result<Self> {
        if side == 0 {
            return Err(LifeError::config("grid size must be positive"));
        }
        let len = side
            .checked_mul(side)
            .ok_or(LifeError::Allocation { what: "grid", bytes: usize::MAX })?;
        Ok(Self {
            side,
            cells: alloc_cells(len, "grid")?,
        })
    }

    /// Wraps an existing row-major buffer. Every value must be 0 or 1.
    pub fn from_cells(side: usize, cells: Vec<u8>) -> Result<Self> {
        if side == 0 || side.checked_mul(side) != Some(cells.len()) {
            return Err(LifeError::config(format!(
                "{} cells cannot form a {side}x{side} grid",
                cells.len()
            )));
        }
        if let Some(bad) = cells.iter().find(|&&c| c > ALIVE) {
            return Err(LifeError::config(format!("cell value {bad} is not 0 or 1")));
        }
        Ok(Self { side, cells })
    }

    /// Caller guarantees `cells.len() == side * side` and 0/1 values.
    pub(crate) fn from_raw(side: usize, cells: Vec<u8>) -> Self {
        debug_assert_eq!(cells.len(), side * side);
        Self { side, cells }
    }

    /// Random playground where each cell is alive with probability `density`.
    pub fn random<R: Rng + ?Sized>(side: usize, density: f64, rng: &mut R) -> Result<Self> {
        if !(0.0..=1.0).contains(&density) {
            return Err(LifeError::config(format!(
                "density {density} is outside [0, 1]"
            )));
        }
        let mut grid = Self::new(side)?;
        for cell in grid.cells.iter_mut() {
            *cell = if rng.gen_bool(density) { ALIVE } else { DEAD };
        }
        Ok(grid)
    }

    /// Deep copy that reports allocation failure.
    pub fn try_clone(&self) -> Result<Self> {
        let mut cells = alloc_cells(self.cells.len(), "grid copy")?;
        cells.copy_from_slice(&self.cells);
        Ok(Self::from_raw(self.side, cells))
    }

    pub fn side(&self) -> usize {
        self.side
    }

    /// Cell at (`row`, `col`), both taken modulo `side`.
    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.cells[(row % self.side) * self.side + col % self.side]
    }

    /// Cell at a signed offset position, wrapped onto the torus.
    pub fn wrapped(&self, row: isize, col: isize) -> u8 {
        let side = self.side as isize;
        self.get(row.rem_euclid(side) as usize, col.rem_euclid(side) as usize)
    }

    pub fn is_alive(&self, row: usize, col: usize) -> bool {
        self.get(row, col) == ALIVE
    }

    pub fn set(&mut self, row: usize, col: usize, alive: bool) {
        let idx = (row % self.side) * self.side + col % self.side;
        self.cells[idx] = if alive { ALIVE } else { DEAD };
    }

    pub fn toggle(&mut self, row: usize, col: usize) {
        let alive = self.is_alive(row, col);
        self.set(row, col, !alive);
    }

    /// One full row, `row` taken modulo `side`.
    pub fn row(&self, row: usize) -> &[u8] {
        let start = (row % self.side) * self.side;
        &self.cells[start..start + self.side]
    }

    pub(crate) fn row_mut(&mut self, row: usize) -> &mut [u8] {
        let start = (row % self.side) * self.side;
        &mut self.cells[start..start + self.side]
    }

    /// The contiguous block of rows `range.start..range.end`.
    pub fn rows(&self, range: RowRange) -> &[u8] {
        &self.cells[range.start * self.side..range.end * self.side]
    }

    pub(crate) fn rows_mut(&mut self, range: RowRange) -> &mut [u8] {
        &mut self.cells[range.start * self.side..range.end * self.side]
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    /// Number of live cells.
    pub fn population(&self) -> usize {
        self.cells.iter().filter(|&&c| c == ALIVE).count()
    }

    pub fn clear(&mut self) {
        self.cells.fill(DEAD);
    }

    /// Hash of the whole board, used to spot repeated generations.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Grid {}x{}", self.side, self.side)?;
        for row in self.cells.chunks(self.side) {
            let line: String = row
                .iter()
                .map(|&c| if c == ALIVE { '#' } else { '.' })
                .collect();
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn zero_side_is_rejected() {
        assert!(matches!(Grid::new(0), Err(LifeError::Configuration(_))));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn oversized_grid_is_an_allocation_error() {
        assert!(matches!(Grid::new(1 << 33), Err(LifeError::Allocation { what: "grid", .. })));
        assert!(matches!(Grid::new(1 << 31), Err(LifeError::Allocation { .. })));
    }

    #[test]
    fn indices_wrap_on_both_axes() {
        let mut grid = Grid::new(4).unwrap();
        grid.set(0, 0, true);
        assert!(grid.is_alive(4, 4));
        assert_eq!(grid.wrapped(-4, 0), ALIVE);
        assert_eq!(grid.wrapped(0, -4), ALIVE);
        assert_eq!(grid.wrapped(-1, -1), DEAD);

        grid.set(3, 3, true);
        assert_eq!(grid.wrapped(-1, -1), ALIVE);
        assert_eq!(grid.row(7)[3], ALIVE);
    }

    #[test]
    fn from_cells_checks_shape_and_values() {
        assert!(Grid::from_cells(2, vec![0, 1, 1, 0]).is_ok());
        assert!(Grid::from_cells(2, vec![0, 1, 1]).is_err());
        assert!(Grid::from_cells(2, vec![0, 1, 2, 0]).is_err());
    }

    #[test]
    fn random_is_reproducible_for_a_seed() {
        let a = Grid::random(32, DEFAULT_DENSITY, &mut StdRng::seed_from_u64(7)).unwrap();
        let b = Grid::random(32, DEFAULT_DENSITY, &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a, b);
        assert!(a.population() > 0 && a.population() < 32 * 32);
    }

    #[test]
    fn random_rejects_bad_density() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(Grid::random(4, 1.5, &mut rng).is_err());
    }

    #[test]
    fn fingerprint_follows_content() {
        let mut grid = Grid::new(5).unwrap();
        let empty = grid.fingerprint();
        grid.toggle(2, 2);
        assert_ne!(grid.fingerprint(), empty);
        grid.toggle(2, 2);
        assert_eq!(grid.fingerprint(), empty);
    }
}
