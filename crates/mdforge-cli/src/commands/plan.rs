use super::build::load_identifiers;
use crate::cli::BuildArgs;
use crate::config;
use crate::error::Result;
use mdforge::engine::config::BuildConfig;
use mdforge::engine::writer::scratch_leftovers;
use mdforge::workflows::build::{self as workflow, BuildPlan};
use std::fmt::Write;
use tracing::info;

pub fn run(args: BuildArgs) -> Result<()> {
    let app = config::build_config(&args)?;
    let identifiers = load_identifiers(&app.identifiers_path)?;
    let plan = workflow::plan(identifiers, &app.run.schedule)?;

    info!("Counting identifiers that already have an archive...");
    print!("{}", describe(&plan, &app.run.build));
    Ok(())
}

/// A human-readable account of the run window. Touches nothing on disk.
pub fn describe(plan: &BuildPlan, build: &BuildConfig) -> String {
    let scheduler = plan.scheduler();
    let in_window = plan.identifiers().count();
    let pending = plan.pending(build);

    let mut out = String::new();
    let _ = writeln!(out, "Identifiers:        {}", scheduler.identifiers().len());
    let _ = writeln!(out, "Batch size:         {}", scheduler.batch_size());
    let _ = writeln!(out, "Available batches:  {}", scheduler.available_batches());
    match (plan.batches().first(), plan.batches().last()) {
        (Some(first), Some(last)) => {
            let _ = writeln!(
                out,
                "Batch window:       {} to {} ({} batch(es))",
                first,
                last,
                plan.batches().len()
            );
        }
        _ => {
            let _ = writeln!(out, "Batch window:       empty");
        }
    }
    let _ = writeln!(out, "In window:          {}", in_window);
    let _ = writeln!(out, "Already built:      {}", in_window - pending);
    let _ = writeln!(out, "Pending:            {}", pending);
    let leftovers = scratch_leftovers(&build.archive_dir);
    if !leftovers.is_empty() {
        let _ = writeln!(out, "Stale scratch files: {}", leftovers.len());
        for path in leftovers {
            let _ = writeln!(out, "  {}", path.display());
        }
    }
    out
}
