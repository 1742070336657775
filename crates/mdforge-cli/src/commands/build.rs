use crate::cli::BuildArgs;
use crate::config::{self, AppConfig};
use crate::error::{CliError, Result};
use crate::pool::{ChildLogging, ProcessPool, WorkerLauncher, WorkerSnapshot};
use crate::utils::progress::CliProgressHandler;
use mdforge::engine::config::{Isolation, RunConfig};
use mdforge::engine::driver::InProcessWorker;
use mdforge::engine::progress::{Progress, ProgressReporter};
use mdforge::engine::schedule::IdentifierList;
use mdforge::workflows::build::{self as workflow, BuildPlan, BuildResult};
use std::path::Path;
use tracing::info;

pub fn load_identifiers(path: &Path) -> Result<IdentifierList> {
    info!("Loading identifier list from {:?}", path);
    IdentifierList::read_from_path(path).map_err(|e| CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    })
}

pub fn run(args: BuildArgs, logging: ChildLogging) -> Result<()> {
    info!("Merging configuration from defaults, file and CLI arguments...");
    let AppConfig {
        identifiers_path,
        run,
    } = config::build_config(&args)?;
    let identifiers = load_identifiers(&identifiers_path)?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    // === Phase 0: Planning ===
    reporter.report(Progress::PhaseStart { name: "Planning" });
    let plan = workflow::plan(identifiers, &run.schedule)?;
    let snapshot_path = workflow::prepare(&run, &reporter)?;
    reporter.report(Progress::PhaseFinish);
    info!("Run configuration recorded at {:?}", snapshot_path);

    println!(
        "Building {} batch(es) of up to {} molecule(s) with {} {} worker(s)...",
        plan.batches().len(),
        run.schedule.batch_size,
        run.schedule.workers,
        run.schedule.isolation
    );

    // === Phase 1: Parallel build ===
    let result = match run.schedule.isolation {
        Isolation::Thread => {
            let worker = InProcessWorker::with_builtin_collaborators(
                plan.scheduler().clone(),
                run.build.clone(),
            )?;
            workflow::run(&plan, run.schedule.workers, &worker, &reporter)?
        }
        Isolation::Process => run_in_children(&plan, &run, logging, &reporter)?,
    };

    // === Phase 2: Outcome report ===
    let report_path = workflow::write_report(&run.build, &result)?;
    print_summary(&result, &report_path);
    Ok(())
}

fn run_in_children(
    plan: &BuildPlan,
    run: &RunConfig,
    logging: ChildLogging,
    reporter: &ProgressReporter,
) -> Result<BuildResult> {
    let launcher = WorkerLauncher::current_exe()?;
    let snapshot = WorkerSnapshot::new(plan.scheduler(), &run.schedule, &run.build);
    let pool = ProcessPool::spawn(&launcher, &snapshot, run.schedule.workers, logging)?;
    let result = workflow::run(plan, run.schedule.workers, &pool, reporter)?;
    drop(pool);
    Ok(result)
}

fn print_summary(result: &BuildResult, report_path: &Path) {
    println!("✓ {}", result.summary);
    println!("  Outcome report written to: {}", report_path.display());
}
