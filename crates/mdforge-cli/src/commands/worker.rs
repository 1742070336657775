use crate::cli::WorkerArgs;
use crate::error::Result;
use crate::pool::{self, WorkerSnapshot};
use mdforge::engine::driver::InProcessWorker;
use std::io;
use tracing::{debug, info};

/// Serves batch requests from the parent process until its end of the pipe closes.
pub fn run(args: WorkerArgs) -> Result<()> {
    let snapshot = WorkerSnapshot::read_from_path(&args.snapshot)?;
    let scheduler = snapshot.scheduler()?;
    debug!(
        batches = scheduler.num_batches(),
        identifiers = scheduler.identifiers().len(),
        "Worker rebuilt the batch assignment."
    );
    let worker = InProcessWorker::with_builtin_collaborators(scheduler, snapshot.build)?;

    let stdin = io::stdin().lock();
    let stdout = io::stdout().lock();
    let served = pool::serve(&worker, stdin, stdout)?;
    info!(pid = std::process::id(), "Worker served {} batch(es).", served);
    Ok(())
}
