use crate::engine::config::{BuildConfig, RunConfig, ScheduleConfig};
use crate::engine::driver::{BatchReport, BatchWorker, InProcessWorker, ParallelDriver};
use crate::engine::error::PipelineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::report::{RunSummary, write_ledger_to_path};
use crate::engine::schedule::{BatchScheduler, IdentifierList, ScheduleError};
use crate::engine::writer::{scratch_leftovers, write_file_atomically};
use std::fs;
use std::path::PathBuf;
use tracing::{info, instrument, warn};

pub const RUN_CONFIG_FILE: &str = "run-config.toml";
pub const REPORT_FILE: &str = "build-report.csv";

/// The batches a run will execute.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    scheduler: BatchScheduler,
    batches: Vec<usize>,
}

impl BuildPlan {
    pub fn scheduler(&self) -> &BatchScheduler {
        &self.scheduler
    }

    pub fn batches(&self) -> &[usize] {
        &self.batches
    }

    /// Identifiers covered by the planned batches.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.batches.iter().flat_map(|&index| {
            self.scheduler
                .process(index)
                .unwrap_or_default()
                .iter()
                .map(String::as_str)
        })
    }

    /// Identifiers covered by the planned batches that have no archive yet.
    pub fn pending(&self, config: &BuildConfig) -> usize {
        self.identifiers()
            .filter(|id| !config.output_path(id).exists())
            .count()
    }
}

#[derive(Debug, Clone)]
pub struct BuildResult {
    pub reports: Vec<BatchReport>,
    pub summary: RunSummary,
}

/// Partitions `identifiers` according to the run window of `schedule`.
pub fn plan(
    identifiers: IdentifierList,
    schedule: &ScheduleConfig,
) -> Result<BuildPlan, PipelineError> {
    if identifiers.is_empty() {
        return Err(ScheduleError::EmptyIdentifierList.into());
    }

    let scheduler = BatchScheduler::from_config(identifiers, schedule)?;
    let batches = scheduler.batches();

    info!(
        identifiers = scheduler.identifiers().len(),
        batch_size = scheduler.batch_size(),
        available_batches = scheduler.available_batches(),
        num_batches = scheduler.num_batches(),
        "Partitioned identifier list."
    );
    match (batches.first(), batches.last()) {
        (Some(first), Some(last)) => info!("Running batches {} to {}.", first, last),
        _ => warn!("The run window selects no batches."),
    }

    Ok(BuildPlan { scheduler, batches })
}

/// Creates the archive directory and records the run configuration inside it.
///
/// Scratch files that killed writers left behind are reported, not removed: another
/// run may still be writing them.
pub fn prepare(run: &RunConfig, reporter: &ProgressReporter) -> Result<PathBuf, PipelineError> {
    let dir = &run.build.archive_dir;
    fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;

    let leftovers = scratch_leftovers(dir);
    if !leftovers.is_empty() {
        warn!(
            count = leftovers.len(),
            dir = %dir.display(),
            "Found scratch files from interrupted writers."
        );
        reporter.report(Progress::Message(format!(
            "{} scratch file(s) from interrupted runs remain in {}",
            leftovers.len(),
            dir.display()
        )));
    }

    let snapshot_path = dir.join(RUN_CONFIG_FILE);
    let text = run.to_toml_string()?;
    write_file_atomically(&snapshot_path, text.as_bytes())?;
    info!(path = %snapshot_path.display(), "Recorded run configuration.");
    Ok(snapshot_path)
}

/// Executes `plan` on `workers` parallel slots backed by `worker`.
#[instrument(skip_all, name = "build_workflow")]
pub fn run<W: BatchWorker>(
    plan: &BuildPlan,
    workers: usize,
    worker: &W,
    reporter: &ProgressReporter,
) -> Result<BuildResult, PipelineError> {
    reporter.report(Progress::PhaseStart { name: "Building" });
    let driver = ParallelDriver::new(workers)?;
    let reports = driver.run(plan.batches(), worker, reporter)?;
    reporter.report(Progress::PhaseFinish);

    let summary = RunSummary::from_reports(&reports);
    info!("Build finished: {}", summary);
    Ok(BuildResult { reports, summary })
}

/// Writes the per-molecule outcome ledger into the archive directory.
pub fn write_report(config: &BuildConfig, result: &BuildResult) -> Result<PathBuf, PipelineError> {
    let path = config.archive_dir.join(REPORT_FILE);
    write_ledger_to_path(&path, &result.reports)?;
    Ok(path)
}

/// Plans, prepares and runs a build with in-process workers and the built-in
/// collaborators.
pub fn run_in_process(
    config: &RunConfig,
    identifiers: IdentifierList,
    reporter: &ProgressReporter,
) -> Result<BuildResult, PipelineError> {
    // === Phase 0: Planning ===
    reporter.report(Progress::PhaseStart { name: "Planning" });
    let plan = plan(identifiers, &config.schedule)?;
    prepare(config, reporter)?;
    let worker = InProcessWorker::with_builtin_collaborators(
        plan.scheduler().clone(),
        config.build.clone(),
    )?;
    reporter.report(Progress::PhaseFinish);

    // === Phase 1: Parallel build ===
    let result = run(&plan, config.schedule.workers, &worker, reporter)?;

    // === Phase 2: Outcome report ===
    write_report(&config.build, &result)?;
    Ok(result)
}
