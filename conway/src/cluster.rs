// cluster.rs - Spawns one coroutine per rank and drives them through a run

use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::ThreadPool;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::comm;
use crate::config::EngineConfig;
use crate::engine::Worker;
use crate::error::{LifeError, Result};
use crate::grid::Grid;
use crate::history::{Cycle, CycleDetector};

/// The committed grid after `generation` steps.
#[derive(Debug)]
pub struct Snapshot {
    pub generation: u64,
    pub grid: Grid,
}

#[derive(Debug)]
pub struct RunReport {
    pub grid: Grid,
    pub generations: u64,
    /// First repeated generation rank 0 noticed, if cycle detection is on.
    pub cycle: Option<Cycle>,
    pub elapsed: Duration,
}

/// Rank 0's share of the result.
struct RankReport {
    grid: Grid,
    generations: u64,
    cycle: Option<Cycle>,
}

pub struct Cluster {
    config: EngineConfig,
    pool: Arc<ThreadPool>,
}

impl Cluster {
    pub fn new(config: EngineConfig) -> Result<Self> {
        if config.workers == 0 {
            return Err(LifeError::config("at least one worker is required"));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .thread_name(|i| format!("conway-{i}"))
            .build()
            .map_err(|e| LifeError::config(format!("cannot start the thread pool: {e}")))?;
        Ok(Self {
            config,
            pool: Arc::new(pool),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Threads actually running in the pool.
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Advances `grid` by one generation.
    pub async fn step(&self, grid: Grid) -> Result<Grid> {
        Ok(self.run(grid, 1, 0, |_| Ok(())).await?.grid)
    }

    /// Runs `steps` generations.
    ///
    /// When `snapshot_every > 0`, `on_snapshot` receives the grid after every
    /// multiple of that many generations. It runs on the calling task; rank 0
    /// queues snapshots without waiting for it, so a slow consumer never holds
    /// up the halo exchange. The first error from any rank, or from
    /// `on_snapshot`, aborts every rank and is returned.
    pub async fn run<F>(&self, grid: Grid, steps: u64, snapshot_every: u64, mut on_snapshot: F) -> Result<RunReport>
    where
        F: FnMut(Snapshot) -> Result<()>,
    {
        let started = Instant::now();
        let partition = Arc::new(self.config.partition(grid.side())?);
        info!(
            side = grid.side(),
            workers = partition.workers(),
            threads = self.threads(),
            strategy = %self.config.strategy,
            steps,
            "starting run"
        );

        let (snapshot_tx, mut snapshot_rx) = mpsc::unbounded_channel();
        let mut ranks = JoinSet::new();
        for endpoint in comm::world(partition.workers(), self.config.comm_timeout) {
            let rank = endpoint.rank();
            let worker = Worker::new(
                endpoint,
                Arc::clone(&partition),
                self.config.strategy,
                Arc::clone(&self.pool),
                grid.try_clone()?,
            )?;
            debug!(rank, rows = ?worker.range(), "rank ready");
            let snapshots = (rank == 0).then(|| snapshot_tx.clone());
            ranks.spawn(drive(worker, steps, snapshot_every, self.config.detect_cycles, snapshots));
        }
        drop(snapshot_tx);
        drop(grid);

        // Ends once rank 0 finishes or fails and drops its sender.
        while let Some(snapshot) = snapshot_rx.recv().await {
            if let Err(err) = on_snapshot(snapshot) {
                ranks.abort_all();
                return Err(err);
            }
        }

        let mut report = None;
        while let Some(joined) = ranks.join_next().await {
            match joined {
                Ok(Ok(Some(rank_report))) => report = Some(rank_report),
                Ok(Ok(None)) => {}
                Ok(Err(err)) => {
                    error!(%err, "rank failed, aborting run");
                    ranks.abort_all();
                    return Err(err);
                }
                Err(join) if join.is_cancelled() => {}
                Err(join) => {
                    error!(%join, "rank panicked, aborting run");
                    ranks.abort_all();
                    return Err(LifeError::comm(0, format!("a rank terminated abnormally: {join}")));
                }
            }
        }

        let RankReport {
            grid,
            generations,
            cycle,
        } = report.ok_or_else(|| LifeError::comm(0, "rank 0 finished without a result"))?;
        let elapsed = started.elapsed();
        info!(generations, population = grid.population(), ?elapsed, "run complete");
        Ok(RunReport {
            grid,
            generations,
            cycle,
            elapsed,
        })
    }
}

/// A rank's whole life: `steps` generations, plus reporting on rank 0.
async fn drive(
    mut worker: Worker,
    steps: u64,
    snapshot_every: u64,
    detect_cycles: bool,
    snapshots: Option<mpsc::UnboundedSender<Snapshot>>,
) -> Result<Option<RankReport>> {
    let rank = worker.rank();
    let mut cycles = (rank == 0 && detect_cycles).then(CycleDetector::default);
    if let Some(detector) = cycles.as_mut() {
        detector.observe(0, worker.grid());
    }

    for _ in 0..steps {
        if let Err(err) = worker.step().await {
            error!(rank, generation = worker.generation(), %err, "step failed");
            return Err(err);
        }
        let generation = worker.generation();

        if let Some(detector) = cycles.as_mut() {
            if let Some(cycle) = detector.observe(generation, worker.grid()) {
                info!(generation, period = cycle.period, "playground entered a cycle");
            }
        }
        if let Some(tx) = &snapshots {
            if snapshot_every > 0 && generation % snapshot_every == 0 {
                let snapshot = Snapshot {
                    generation,
                    grid: worker.grid().try_clone()?,
                };
                tx.send(snapshot)
                    .map_err(|_| LifeError::comm(rank, "snapshot consumer went away"))?;
                debug!(generation, "snapshot queued");
            }
        }
    }

    if rank != 0 {
        return Ok(None);
    }
    Ok(Some(RankReport {
        cycle: cycles.and_then(|detector| detector.cycle()),
        generations: worker.generation(),
        grid: worker.into_grid(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Strategy;
    use crate::patterns::{centered, find};
    use crate::rule;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn cluster(workers: usize, strategy: Strategy) -> Cluster {
        Cluster::new(
            EngineConfig::default()
                .with_workers(workers)
                .with_threads(2)
                .with_strategy(strategy),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn every_worker_count_matches_the_reference() {
        let grid = Grid::random(9, 0.4, &mut StdRng::seed_from_u64(11)).unwrap();
        let expected = (0..3).fold(grid.clone(), |g, _| rule::evolve(&g).unwrap());
        for workers in 1..=9 {
            for strategy in Strategy::ALL {
                let report = cluster(workers, strategy).run(grid.clone(), 3, 0, |_| Ok(())).await.unwrap();
                assert_eq!(report.grid, expected, "{workers} workers, {strategy}");
                assert_eq!(report.generations, 3);
            }
        }
    }

    #[tokio::test]
    async fn too_many_workers_is_a_configuration_error() {
        let err = cluster(6, Strategy::Ordered).step(Grid::new(5).unwrap()).await.unwrap_err();
        assert!(matches!(err, LifeError::Configuration(_)), "{err}");
    }

    #[tokio::test]
    async fn snapshots_arrive_at_multiples_of_the_save_step() {
        let grid = centered(find("glider").unwrap(), 10).unwrap();
        let mut seen = Vec::new();
        let report = cluster(3, Strategy::Static)
            .run(grid, 10, 3, |snapshot| {
                seen.push((snapshot.generation, snapshot.grid.population()));
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(seen, vec![(3, 5), (6, 5), (9, 5)]);
        assert_eq!(report.generations, 10);
    }

    #[tokio::test]
    async fn failing_snapshot_consumer_aborts_the_run() {
        let grid = centered(find("blinker").unwrap(), 6).unwrap();
        let err = cluster(2, Strategy::Ordered)
            .run(grid, 8, 2, |_| Err(LifeError::config("disk full")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("disk full"));
    }

    #[tokio::test]
    async fn cycles_are_only_tracked_on_request() {
        let grid = centered(find("blinker").unwrap(), 6).unwrap();
        let report = cluster(3, Strategy::Ordered).run(grid.clone(), 4, 0, |_| Ok(())).await.unwrap();
        assert_eq!(report.grid, grid);
        assert_eq!(report.cycle, None);
    }

    #[tokio::test]
    async fn blinker_cycle_is_reported() {
        let grid = centered(find("blinker").unwrap(), 6).unwrap();
        let config = EngineConfig::default()
            .with_workers(3)
            .with_threads(2)
            .with_cycle_detection(true);
        let report = Cluster::new(config).unwrap().run(grid.clone(), 4, 0, |_| Ok(())).await.unwrap();
        assert_eq!(report.grid, grid);
        assert_eq!(report.cycle, Some(Cycle { generation: 2, period: 2 }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn slow_snapshot_consumer_does_not_starve_the_ranks() {
        let grid = Grid::random(12, 0.3, &mut StdRng::seed_from_u64(3)).unwrap();
        let expected = (0..4).fold(grid.clone(), |g, _| rule::evolve(&g).unwrap());
        let config = EngineConfig::default()
            .with_workers(4)
            .with_threads(2)
            .with_comm_timeout(Duration::from_millis(200));
        let mut seen = Vec::new();
        let report = Cluster::new(config)
            .unwrap()
            .run(grid, 4, 1, |snapshot| {
                std::thread::sleep(Duration::from_millis(300));
                seen.push(snapshot.generation);
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(seen, vec![1, 2, 3, 4]);
        assert_eq!(report.grid, expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn a_failing_rank_ends_the_whole_run() {
        let grid = Grid::random(600, 0.3, &mut StdRng::seed_from_u64(8)).unwrap();
        let config = EngineConfig::default()
            .with_workers(3)
            .with_threads(2)
            .with_strategy(Strategy::Static)
            .with_comm_timeout(Duration::from_micros(1));
        let cluster = Cluster::new(config).unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(10), cluster.run(grid, 5, 0, |_| Ok(())))
            .await
            .expect("run did not terminate");
        let err = outcome.unwrap_err();
        assert!(matches!(err, LifeError::Communication { .. }), "{err}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn runs_on_a_multi_threaded_runtime() {
        let grid = Grid::random(40, 0.3, &mut StdRng::seed_from_u64(5)).unwrap();
        let expected = (0..5).fold(grid.clone(), |g, _| rule::evolve(&g).unwrap());
        for strategy in Strategy::ALL {
            let report = cluster(7, strategy).run(grid.clone(), 5, 0, |_| Ok(())).await.unwrap();
            assert_eq!(report.grid, expected);
        }
    }
}
