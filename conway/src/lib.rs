//! Conway's Game of Life on a torus, split row-wise across ranks.
//!
//! Each rank is a tokio task holding its own copy of the grid. Every
//! generation a rank swaps boundary rows with its two ring neighbours
//! ([`halo`]), evolves its rows on a shared rayon pool ([`engine`]) and then
//! gathers everyone else's rows so all ranks start the next generation with
//! the full grid ([`comm`]).
//!
//! ```no_run
//! use conway::{Cluster, EngineConfig, Strategy, patterns};
//!
//! # async fn demo() -> conway::Result<()> {
//! let grid = patterns::centered(patterns::find("pulsar").unwrap(), 32)?;
//! let cluster = Cluster::new(EngineConfig::default().with_workers(4).with_strategy(Strategy::Ordered))?;
//! let report = cluster.run(grid, 30, 0, |_| Ok(())).await?;
//! println!("{} cells alive", report.grid.population());
//! # Ok(())
//! # }
//! ```

pub mod bench_log;
pub mod cluster;
pub mod comm;
pub mod config;
pub mod engine;
pub mod error;
pub mod grid;
pub mod halo;
pub mod history;
pub mod partition;
pub mod patterns;
pub mod pgm;
pub mod rule;

pub use cluster::{Cluster, RunReport, Snapshot};
pub use config::{EngineConfig, Strategy};
pub use error::{LifeError, Result, SnapshotError};
pub use grid::Grid;
pub use partition::{Partition, RowRange};
