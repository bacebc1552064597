// bench_log.rs - One semicolon separated line per completed run

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::config::Strategy;
use crate::error::Result;

pub const HEADER: &str = "file;program;mode;size;steps;workers;threads;time_taken;info";

#[derive(Debug, Clone, PartialEq)]
pub struct BenchRecord {
    /// Name of the initial playground.
    pub file: String,
    pub program: String,
    pub strategy: Strategy,
    pub size: usize,
    pub steps: u64,
    pub workers: usize,
    pub threads: usize,
    pub elapsed: Duration,
    pub info: Option<String>,
}

impl fmt::Display for BenchRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Separators inside free text would shift the columns.
        let info = self.info.as_deref().unwrap_or("").replace([';', '\n'], " ");
        write!(
            f,
            "{};{};{};{};{};{};{};{:.6};{}",
            self.file,
            self.program,
            self.strategy,
            self.size,
            self.steps,
            self.workers,
            self.threads,
            self.elapsed.as_secs_f64(),
            info
        )
    }
}

/// Appends `record` to the log at `path`, writing the header into a new or empty file.
pub fn append(path: impl AsRef<Path>, record: &BenchRecord) -> Result<()> {
    let path = path.as_ref();
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if file.metadata()?.len() == 0 {
        writeln!(file, "{HEADER}")?;
    }
    writeln!(file, "{record}")?;
    debug!(path = %path.display(), "benchmark record appended");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(info: Option<&str>) -> BenchRecord {
        BenchRecord {
            file: "board".into(),
            program: "conway_coro".into(),
            strategy: Strategy::Static,
            size: 100,
            steps: 50,
            workers: 4,
            threads: 8,
            elapsed: Duration::from_millis(1500),
            info: info.map(str::to_owned),
        }
    }

    #[test]
    fn line_format() {
        assert_eq!(record(None).to_string(), "board;conway_coro;static;100;50;4;8;1.500000;");
        assert_eq!(record(Some("a;b")).to_string(), "board;conway_coro;static;100;50;4;8;1.500000;a b");
    }

    #[test]
    fn header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.csv");
        append(&path, &record(None)).unwrap();
        append(&path, &record(Some("second"))).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER);
        assert!(lines[2].ends_with(";second"));
        assert_eq!(lines[1].split(';').count(), HEADER.split(';').count());
    }
}
