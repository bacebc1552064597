// pgm.rs - Binary PGM (P5) snapshots of a playground
//
// Header, all ASCII and whitespace separated, with `#` comment lines allowed:
//   P5 <width> <height> <maxval>
// followed by exactly one whitespace byte and width*height pixels, one byte
// each when maxval < 256 and two big-endian bytes otherwise.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::debug;

use crate::error::{LifeError, Result, SnapshotError};
use crate::grid::{ALIVE, DEAD, Grid};

pub const MAGIC: &str = "P5";
pub const DEFAULT_MAXVAL: u16 = 255;

/// Writes `grid` as a square P5 image: live cells at `maxval`, dead at 0.
pub fn encode<W: Write>(grid: &Grid, maxval: u16, mut out: W) -> std::io::Result<()> {
    let maxval = maxval.max(1);
    let side = grid.side();
    write!(out, "{MAGIC}\n# generated by conway\n{side} {side}\n{maxval}\n")?;

    if maxval > 255 {
        let live = maxval.to_be_bytes();
        for &cell in grid.cells() {
            out.write_all(if cell == ALIVE { &live } else { &[0, 0] })?;
        }
    } else {
        let pixels: Vec<u8> = grid
            .cells()
            .iter()
            .map(|&cell| if cell == ALIVE { maxval as u8 } else { 0 })
            .collect();
        out.write_all(&pixels)?;
    }
    out.flush()
}

/// Reads a square P5 image; pixels brighter than half of maxval are alive.
pub fn decode<R: BufRead>(mut input: R) -> std::result::Result<Grid, SnapshotError> {
    let magic = read_token(&mut input, "magic number")?;
    if magic != MAGIC {
        return Err(SnapshotError::BadMagic(magic));
    }
    let width = read_number(&mut input, "width")?;
    let height = read_number(&mut input, "height")?;
    let maxval = read_number(&mut input, "maxval")?;

    if width == 0 || height == 0 {
        return Err(SnapshotError::BadHeader(format!("empty {width}x{height} image")));
    }
    if width != height {
        return Err(SnapshotError::NotSquare { width, height });
    }
    if !(1..=65535).contains(&maxval) {
        return Err(SnapshotError::BadHeader(format!("maxval {maxval} outside 1..=65535")));
    }

    let depth = if maxval > 255 { 2 } else { 1 };
    let cells = width
        .checked_mul(height)
        .ok_or(SnapshotError::OutOfMemory { bytes: usize::MAX })?;
    let expected = cells
        .checked_mul(depth)
        .ok_or(SnapshotError::OutOfMemory { bytes: usize::MAX })?;

    let mut pixels = Vec::new();
    pixels
        .try_reserve_exact(expected)
        .map_err(|_| SnapshotError::OutOfMemory { bytes: expected })?;
    input.take(expected as u64).read_to_end(&mut pixels)?;
    if pixels.len() != expected {
        return Err(SnapshotError::Truncated {
            expected,
            found: pixels.len(),
        });
    }

    let threshold = maxval / 2;
    let cells: Vec<u8> = if depth == 1 {
        pixels
            .iter()
            .map(|&p| if usize::from(p) > threshold { ALIVE } else { DEAD })
            .collect()
    } else {
        pixels
            .chunks_exact(2)
            .map(|p| {
                let value = usize::from(u16::from_be_bytes([p[0], p[1]]));
                if value > threshold { ALIVE } else { DEAD }
            })
            .collect()
    };
    Ok(Grid::from_raw(width, cells))
}

/// Saves `grid` to `path` with the default maxval.
pub fn save(grid: &Grid, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let wrap = |source: std::io::Error| LifeError::Snapshot {
        path: path.to_path_buf(),
        source: source.into(),
    };
    let file = File::create(path).map_err(wrap)?;
    encode(grid, DEFAULT_MAXVAL, BufWriter::new(file)).map_err(wrap)?;
    debug!(path = %path.display(), side = grid.side(), "snapshot written");
    Ok(())
}

/// Loads a playground from `path`.
pub fn load(path: impl AsRef<Path>) -> Result<Grid> {
    let path = path.as_ref();
    let wrap = |source: SnapshotError| LifeError::Snapshot {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(|e| wrap(e.into()))?;
    let grid = decode(BufReader::new(file)).map_err(wrap)?;
    debug!(path = %path.display(), side = grid.side(), "snapshot loaded");
    Ok(grid)
}

fn read_byte<R: BufRead>(input: &mut R) -> std::io::Result<Option<u8>> {
    let byte = input.fill_buf()?.first().copied();
    if byte.is_some() {
        input.consume(1);
    }
    Ok(byte)
}

/// Next whitespace-terminated token; consumes exactly one trailing whitespace byte.
fn read_token<R: BufRead>(input: &mut R, what: &str) -> std::result::Result<String, SnapshotError> {
    let mut token = String::new();
    loop {
        match read_byte(input)? {
            None if token.is_empty() => {
                return Err(SnapshotError::BadHeader(format!("missing {what}")));
            }
            None => return Ok(token),
            Some(b'#') if token.is_empty() => {
                let mut comment = Vec::new();
                input.read_until(b'\n', &mut comment)?;
            }
            Some(b) if b.is_ascii_whitespace() => {
                if !token.is_empty() {
                    return Ok(token);
                }
            }
            Some(b) => token.push(char::from(b)),
        }
    }
}

fn read_number<R: BufRead>(input: &mut R, what: &str) -> std::result::Result<usize, SnapshotError> {
    let token = read_token(input, what)?;
    token
        .parse()
        .map_err(|_| SnapshotError::BadHeader(format!("{what} {token:?} is not a number")))
}
