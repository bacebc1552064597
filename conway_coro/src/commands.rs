// commands.rs - `init` and `run`: file plumbing around the evolution engine

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::Args;
use conway::bench_log::{self, BenchRecord};
use conway::grid::DEFAULT_DENSITY;
use conway::{Cluster, EngineConfig, Grid, LifeError, Result, RunReport, Strategy, patterns, pgm};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};

pub const DEFAULT_OUT_DIR: &str = "out.nosync";
pub const DEFAULT_LOG: &str = "logs.csv";
pub const PROGRAM: &str = "conway_coro";

#[derive(Args, Debug, Clone)]
pub struct InitArgs {
    /// Side length of the square playground
    #[arg(short = 'k', long = "size")]
    pub size: usize,

    /// Playground name, saved as <OUT_DIR>/<FILE>.pgm
    #[arg(short, long)]
    pub file: String,

    /// Seed for the random fill (fresh entropy when omitted)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Probability that a cell starts alive
    #[arg(long, default_value_t = DEFAULT_DENSITY)]
    pub density: f64,

    /// Centre a named pattern on an empty playground instead of random cells
    #[arg(long)]
    pub pattern: Option<String>,

    /// Directory holding playgrounds and snapshots
    #[arg(long, default_value = DEFAULT_OUT_DIR)]
    pub out_dir: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Playground name, read from <OUT_DIR>/<FILE>.pgm
    #[arg(short, long)]
    pub file: String,

    /// Number of generations
    #[arg(short = 'n', long)]
    pub steps: u64,

    /// Evolution strategy: `ordered` or `static`, case-insensitive;
    /// the numeric codes `0` (ordered) and `1` (static) are also accepted
    #[arg(short = 'e', long, default_value = "ordered")]
    pub evolution: String,

    /// Save a snapshot every N generations; 0 saves only the final state
    #[arg(short = 's', long, default_value_t = 0)]
    pub save_every: u64,

    /// Number of ranks the rows are split across
    #[arg(short, long, default_value_t = 1)]
    pub workers: usize,

    /// Compute threads shared by all ranks (0 = one per core)
    #[arg(long, default_value_t = 0)]
    pub threads: usize,

    /// Seconds a rank waits for a neighbour before the run fails
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Report when the playground starts repeating (hashes every generation)
    #[arg(long)]
    pub detect_cycles: bool,

    /// Free-form note stored with the benchmark record
    #[arg(short = 't', long)]
    pub info: Option<String>,

    /// Directory holding playgrounds and snapshots
    #[arg(long, default_value = DEFAULT_OUT_DIR)]
    pub out_dir: PathBuf,

    /// Benchmark log to append to
    #[arg(long, default_value = DEFAULT_LOG)]
    pub log: PathBuf,
}

#[derive(Debug)]
pub struct RunSummary {
    pub report: RunReport,
    /// Snapshots written during the run.
    pub snapshots: Vec<PathBuf>,
    /// Wall time including loading and saving.
    pub elapsed: Duration,
}

pub fn playground_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.pgm"))
}

pub fn snapshot_path(dir: &Path, name: &str, generation: u64) -> PathBuf {
    dir.join(format!("{name}_{generation:05}.pgm"))
}

pub fn final_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}_final.pgm"))
}

/// Creates a new playground file.
pub fn init(args: &InitArgs) -> Result<PathBuf> {
    let grid = match &args.pattern {
        Some(name) => {
            let pattern = patterns::find(name)
                .ok_or_else(|| LifeError::config(format!("unknown pattern '{name}'")))?;
            patterns::centered(pattern, args.size)?
        }
        None => {
            let mut rng = match args.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            Grid::random(args.size, args.density, &mut rng)?
        }
    };

    std::fs::create_dir_all(&args.out_dir)?;
    let path = playground_path(&args.out_dir, &args.file);
    pgm::save(&grid, &path)?;
    info!(path = %path.display(), side = grid.side(), population = grid.population(), "playground initialised");
    Ok(path)
}

/// Evolves a saved playground and records the run in the benchmark log.
pub async fn run(args: &RunArgs) -> Result<RunSummary> {
    let started = Instant::now();
    let strategy: Strategy = args.evolution.parse()?;
    if args.steps == 0 {
        return Err(LifeError::config("the number of steps must be positive"));
    }
    let config = EngineConfig::default()
        .with_workers(args.workers)
        .with_threads(args.threads)
        .with_strategy(strategy)
        .with_comm_timeout(Duration::from_secs(args.timeout_secs))
        .with_cycle_detection(args.detect_cycles);
    let cluster = Cluster::new(config)?;

    let grid = pgm::load(playground_path(&args.out_dir, &args.file))?;
    let side = grid.side();

    let mut snapshots = Vec::new();
    let report = cluster
        .run(grid, args.steps, args.save_every, |snapshot| {
            let path = snapshot_path(&args.out_dir, &args.file, snapshot.generation);
            pgm::save(&snapshot.grid, &path)?;
            snapshots.push(path);
            Ok(())
        })
        .await?;

    if args.save_every == 0 {
        let path = final_path(&args.out_dir, &args.file);
        pgm::save(&report.grid, &path)?;
        snapshots.push(path);
    }
    let elapsed = started.elapsed();

    let record = BenchRecord {
        file: args.file.clone(),
        program: PROGRAM.to_owned(),
        strategy,
        size: side,
        steps: args.steps,
        workers: args.workers,
        threads: cluster.threads(),
        elapsed,
        info: args.info.clone(),
    };
    bench_log::append(&args.log, &record)?;
    debug!(log = %args.log.display(), "run recorded");

    Ok(RunSummary {
        report,
        snapshots,
        elapsed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use conway::SnapshotError;

    fn init_args(dir: &Path, file: &str, size: usize) -> InitArgs {
        InitArgs {
            size,
            file: file.to_owned(),
            seed: Some(99),
            density: DEFAULT_DENSITY,
            pattern: None,
            out_dir: dir.to_path_buf(),
        }
    }

    fn run_args(dir: &Path, file: &str, steps: u64, save_every: u64) -> RunArgs {
        RunArgs {
            file: file.to_owned(),
            steps,
            evolution: "static".to_owned(),
            save_every,
            workers: 3,
            threads: 2,
            timeout_secs: 5,
            detect_cycles: false,
            info: Some("test".to_owned()),
            out_dir: dir.to_path_buf(),
            log: dir.join(DEFAULT_LOG),
        }
    }

    #[tokio::test]
    async fn init_then_run_with_periodic_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let path = init(&init_args(dir.path(), "board", 12)).unwrap();
        assert_eq!(pgm::load(&path).unwrap().side(), 12);

        let summary = run(&run_args(dir.path(), "board", 5, 2)).await.unwrap();
        assert_eq!(summary.report.generations, 5);
        assert_eq!(
            summary.snapshots,
            vec![snapshot_path(dir.path(), "board", 2), snapshot_path(dir.path(), "board", 4)]
        );
        for snapshot in &summary.snapshots {
            assert!(snapshot.exists());
        }
        assert!(!final_path(dir.path(), "board").exists());

        let log = std::fs::read_to_string(dir.path().join(DEFAULT_LOG)).unwrap();
        assert_eq!(log.lines().count(), 2);
        assert!(log.lines().nth(1).unwrap().starts_with("board;conway_coro;static;12;5;3;2;"));
    }

    #[tokio::test]
    async fn zero_save_step_writes_only_the_final_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = init_args(dir.path(), "osc", 6);
        args.pattern = Some("blinker".to_owned());
        init(&args).unwrap();

        let summary = run(&run_args(dir.path(), "osc", 2, 0)).await.unwrap();
        assert_eq!(summary.snapshots, vec![final_path(dir.path(), "osc")]);
        let start = pgm::load(playground_path(dir.path(), "osc")).unwrap();
        assert_eq!(pgm::load(final_path(dir.path(), "osc")).unwrap(), start);
    }

    #[tokio::test]
    async fn cycle_detection_follows_the_flag() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = init_args(dir.path(), "osc", 6);
        args.pattern = Some("blinker".to_owned());
        init(&args).unwrap();

        let mut args = run_args(dir.path(), "osc", 4, 0);
        assert_eq!(run(&args).await.unwrap().report.cycle, None);
        args.detect_cycles = true;
        let cycle = run(&args).await.unwrap().report.cycle.unwrap();
        assert_eq!((cycle.generation, cycle.period), (2, 2));
    }

    #[tokio::test]
    async fn numeric_strategy_codes_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        init(&init_args(dir.path(), "board", 8)).unwrap();
        let mut args = run_args(dir.path(), "board", 1, 0);
        args.evolution = "0".to_owned();
        run(&args).await.unwrap();
        args.evolution = "1".to_owned();
        run(&args).await.unwrap();
        let log = std::fs::read_to_string(dir.path().join(DEFAULT_LOG)).unwrap();
        assert!(log.contains(";ordered;") && log.contains(";static;"), "{log}");
    }

    #[tokio::test]
    async fn unknown_strategy_fails_before_any_work() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = run_args(dir.path(), "missing", 3, 0);
        args.evolution = "chessboard".to_owned();
        let err = run(&args).await.unwrap_err();
        assert!(matches!(err, LifeError::Configuration(_)), "{err}");
        assert!(!dir.path().join(DEFAULT_LOG).exists());
    }

    #[tokio::test]
    async fn zero_steps_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(&run_args(dir.path(), "missing", 0, 0)).await.unwrap_err();
        assert!(matches!(err, LifeError::Configuration(_)), "{err}");
    }

    #[tokio::test]
    async fn missing_playground_is_a_snapshot_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(&run_args(dir.path(), "missing", 3, 0)).await.unwrap_err();
        assert!(matches!(err, LifeError::Snapshot { source: SnapshotError::Io(_), .. }), "{err}");
    }

    #[tokio::test]
    async fn more_workers_than_rows_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        init(&init_args(dir.path(), "tiny", 2)).unwrap();
        let err = run(&run_args(dir.path(), "tiny", 1, 0)).await.unwrap_err();
        assert!(matches!(err, LifeError::Configuration(_)), "{err}");
    }

    #[test]
    fn unknown_pattern_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = init_args(dir.path(), "x", 10);
        args.pattern = Some("spaceship".to_owned());
        assert!(matches!(init(&args), Err(LifeError::Configuration(_))));
    }

    #[test]
    fn snapshot_names_are_zero_padded() {
        let dir = Path::new("out");
        assert_eq!(snapshot_path(dir, "b", 42), Path::new("out/b_00042.pgm"));
        assert_eq!(final_path(dir, "b"), Path::new("out/b_final.pgm"));
    }
}
