// rule.rs - Conway's transition rule on the torus

use crate::error::Result;
use crate::grid::{ALIVE, DEAD, Grid};

/// Next state of a cell given how many of its 8 neighbours are alive.
pub fn next_state(cell: u8, live_neighbors: u8) -> u8 {
    match (cell == ALIVE, live_neighbors) {
        (true, 2) | (true, 3) => ALIVE,  // Survival
        (false, 3)            => ALIVE,  // Birth
        _                     => DEAD,   // Death or stays dead
    }
}

/// Live cells among the 8 toroidal neighbours of (`row`, `col`).
pub fn live_neighbors(grid: &Grid, row: usize, col: usize) -> u8 {
    let (row, col) = (row as isize, col as isize);
    let mut count = 0;
    for dr in -1..=1 {
        for dc in -1..=1 {
            if dr == 0 && dc == 0 {
                continue;
            }
            count += grid.wrapped(row + dr, col + dc);
        }
    }
    count
}

/// Neighbour count for column `col` of `current`, given the rows directly
/// above and below it. Columns wrap.
#[inline]
pub fn row_neighbors(above: &[u8], current: &[u8], below: &[u8], col: usize) -> u8 {
    let side = current.len();
    let west = (col + side - 1) % side;
    let east = (col + 1) % side;
    above[west] + above[col] + above[east]
        + current[west] + current[east]
        + below[west] + below[col] + below[east]
}

/// Writes the next generation of `current` into `out`.
pub fn evolve_row(above: &[u8], current: &[u8], below: &[u8], out: &mut [u8]) {
    debug_assert!(above.len() == current.len() && below.len() == current.len());
    debug_assert_eq!(out.len(), current.len());
    for (col, next) in out.iter_mut().enumerate() {
        *next = next_state(current[col], row_neighbors(above, current, below, col));
    }
}

/// Serial reference step: the whole grid from one snapshot, no partitioning.
pub fn evolve(grid: &Grid) -> Result<Grid> {
    let side = grid.side();
    let mut next = Grid::new(side)?;
    for row in 0..side {
        let above = grid.row(row + side - 1);
        let below = grid.row(row + 1);
        evolve_row(above, grid.row(row), below, next.row_mut(row));
    }
    Ok(next)
}
