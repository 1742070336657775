use super::builder::{BuildOutcome, MoleculeBuilder, MoleculeReport};
use super::collaborators::{
    AnalyzerFactory, FsTrajectoryLocator, StructureAnalyzerFactory, TrajectoryLocator,
};
use super::config::BuildConfig;
use super::error::PipelineError;
use super::progress::{Progress, ProgressReporter};
use super::schedule::BatchScheduler;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{error, info, instrument};

/// Per-molecule outcomes of one executed batch, in list order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub index: usize,
    pub molecules: Vec<MoleculeReport>,
}

impl BatchReport {
    pub fn count(&self, outcome: BuildOutcome) -> usize {
        self.molecules
            .iter()
            .filter(|m| m.outcome == outcome)
            .count()
    }
}

/// Executes whole batches. Implementations decide where the work runs.
pub trait BatchWorker: Sync {
    fn submit(&self, batch_index: usize) -> Result<BatchReport, PipelineError>;
}

/// Runs batches in the calling thread against its own scheduler, configuration and
/// collaborators.
pub struct InProcessWorker<L, F> {
    scheduler: BatchScheduler,
    config: BuildConfig,
    locator: L,
    analyzers: F,
}

impl<L, F> InProcessWorker<L, F>
where
    L: TrajectoryLocator,
    F: AnalyzerFactory,
{
    pub fn new(scheduler: BatchScheduler, config: BuildConfig, locator: L, analyzers: F) -> Self {
        Self {
            scheduler,
            config,
            locator,
            analyzers,
        }
    }

    pub fn scheduler(&self) -> &BatchScheduler {
        &self.scheduler
    }

    /// Builds every molecule of batch `batch_index`, one after another.
    #[instrument(skip_all, name = "batch", fields(index = batch_index))]
    pub fn run_batch(&self, batch_index: usize) -> Result<BatchReport, PipelineError> {
        let identifiers = self.scheduler.process(batch_index)?;
        info!(
            molecules = identifiers.len(),
            "Processing batch {} of {}.",
            batch_index,
            self.scheduler.num_batches()
        );

        let builder = MoleculeBuilder::new(&self.config, &self.locator, &self.analyzers);
        let molecules = identifiers
            .iter()
            .map(|identifier| builder.build(identifier))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(BatchReport {
            index: batch_index,
            molecules,
        })
    }
}

impl InProcessWorker<FsTrajectoryLocator, StructureAnalyzerFactory> {
    /// A worker backed by the filesystem locator and the PDB/DCD analyzer.
    pub fn with_builtin_collaborators(
        scheduler: BatchScheduler,
        config: BuildConfig,
    ) -> Result<Self, PipelineError> {
        let locator = FsTrajectoryLocator::new(
            &config.trajectory_dir,
            config.trajectories.position_suffix.clone(),
        );
        let analyzers = StructureAnalyzerFactory::new(config.filter, config.analysis_threads)?;
        Ok(Self::new(scheduler, config, locator, analyzers))
    }
}

impl<L, F> BatchWorker for InProcessWorker<L, F>
where
    L: TrajectoryLocator,
    F: AnalyzerFactory,
{
    fn submit(&self, batch_index: usize) -> Result<BatchReport, PipelineError> {
        self.run_batch(batch_index)
    }
}

/// Dispatches batches to a [`BatchWorker`] from a fixed number of pool threads.
///
/// Each pool thread submits one batch at a time. The first systemic error stops
/// further submissions; batches already in flight are allowed to finish, then that
/// error is returned.
pub struct ParallelDriver {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl ParallelDriver {
    pub fn new(workers: usize) -> Result<Self, PipelineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("mdforge-batch-{}", i))
            .build()
            .map_err(|e| PipelineError::Worker(format!("Failed to create worker pool: {}", e)))?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `batches` and returns their reports in the order given.
    #[instrument(skip_all, name = "parallel_driver", fields(batches = batches.len(), workers = self.workers))]
    pub fn run<W: BatchWorker>(
        &self,
        batches: &[usize],
        worker: &W,
        reporter: &ProgressReporter,
    ) -> Result<Vec<BatchReport>, PipelineError> {
        let total = batches.len() as u64;
        reporter.report(Progress::RunStart {
            total_batches: total,
        });

        let aborted = AtomicBool::new(false);
        let completed = AtomicU64::new(0);
        let first_error: Mutex<Option<PipelineError>> = Mutex::new(None);

        let results: Vec<Option<BatchReport>> = self.pool.install(|| {
            batches
                .par_iter()
                .with_max_len(1)
                .map(|&index| {
                    if aborted.load(Ordering::SeqCst) {
                        return None;
                    }
                    reporter.report(Progress::BatchStart { index });
                    match worker.submit(index) {
                        Ok(report) => {
                            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                            reporter.report(Progress::BatchFinish {
                                index,
                                completed: done,
                                total,
                            });
                            Some(report)
                        }
                        Err(e) => {
                            error!(batch = index, "Batch failed: {}", e);
                            aborted.store(true, Ordering::SeqCst);
                            let mut slot = first_error.lock().unwrap_or_else(PoisonError::into_inner);
                            if slot.is_none() {
                                *slot = Some(e);
                            }
                            None
                        }
                    }
                })
                .collect()
        });

        if let Some(e) = first_error
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
        {
            return Err(e);
        }

        reporter.report(Progress::RunFinish);
        Ok(results.into_iter().flatten().collect())
    }
}
