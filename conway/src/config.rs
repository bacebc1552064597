// config.rs - Run configuration: strategy selector, rank and thread counts

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{LifeError, Result};
use crate::partition::Partition;

/// How long a rank waits for a halo row or gather block before giving up.
pub const DEFAULT_COMM_TIMEOUT: Duration = Duration::from_secs(30);

/// Scheduling of communication against computation within one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Strategy {
    /// Interior rows are computed while the ghost rows are in flight.
    #[default]
    Ordered,
    /// Ghost rows are awaited first, then the whole range is computed in one pass.
    Static,
}

impl Strategy {
    pub const ALL: [Strategy; 2] = [Strategy::Ordered, Strategy::Static];

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Ordered => "ordered",
            Strategy::Static => "static",
        }
    }

    /// Numeric selector used by the benchmark log (`-e 0` / `-e 1`).
    pub fn code(self) -> u8 {
        match self {
            Strategy::Ordered => 0,
            Strategy::Static => 1,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = LifeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ordered" | "0" => Ok(Strategy::Ordered),
            "static" | "1" => Ok(Strategy::Static),
            other => Err(LifeError::config(format!(
                "unknown evolution strategy '{other}', expected 'ordered' or 'static'"
            ))),
        }
    }
}

/// Everything the cluster needs besides the grid itself.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Number of ranks the rows are split across.
    pub workers: usize,
    /// Rayon threads shared by all ranks; 0 lets rayon decide.
    pub threads: usize,
    pub strategy: Strategy,
    pub comm_timeout: Duration,
    /// Fingerprint every generation on rank 0 and report the first repeat.
    pub detect_cycles: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            threads: 0,
            strategy: Strategy::default(),
            comm_timeout: DEFAULT_COMM_TIMEOUT,
            detect_cycles: false,
        }
    }
}

impl EngineConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_comm_timeout(mut self, timeout: Duration) -> Self {
        self.comm_timeout = timeout;
        self
    }

    pub fn with_cycle_detection(mut self, detect: bool) -> Self {
        self.detect_cycles = detect;
        self
    }

    /// Checks the configuration against a grid side and returns its partition.
    pub fn partition(&self, side: usize) -> Result<Partition> {
        if self.comm_timeout.is_zero() {
            return Err(LifeError::config("communication timeout must be positive"));
        }
        Partition::new(side, self.workers)
    }
}
