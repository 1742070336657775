use super::builder::BuildOutcome;
use super::driver::BatchReport;
use super::error::PipelineError;
use super::writer::write_file_atomically;
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::path::Path;

#[derive(Serialize)]
struct LedgerRow<'a> {
    batch: usize,
    identifier: &'a str,
    outcome: BuildOutcome,
    replicas_written: usize,
    replicas_skipped: usize,
}

/// Writes one CSV row per molecule: `batch, identifier, outcome, replicas_written,
/// replicas_skipped`.
pub fn write_ledger<W: Write>(writer: W, reports: &[BatchReport]) -> Result<(), csv::Error> {
    let mut csv = csv::Writer::from_writer(writer);
    for report in reports {
        for molecule in &report.molecules {
            csv.serialize(LedgerRow {
                batch: report.index,
                identifier: &molecule.identifier,
                outcome: molecule.outcome,
                replicas_written: molecule.replicas_written,
                replicas_skipped: molecule.replicas_skipped,
            })?;
        }
    }
    csv.flush()?;
    Ok(())
}

pub fn write_ledger_to_path(path: &Path, reports: &[BatchReport]) -> Result<(), PipelineError> {
    let mut buffer = Vec::new();
    write_ledger(&mut buffer, reports)?;
    write_file_atomically(path, &buffer)
}

/// Outcome counts over a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub batches: usize,
    pub written: usize,
    pub skipped_exists: usize,
    pub skipped_missing_input: usize,
    pub skipped_no_usable_replica: usize,
}

impl RunSummary {
    pub fn from_reports(reports: &[BatchReport]) -> Self {
        let mut summary = Self {
            batches: reports.len(),
            ..Self::default()
        };
        for molecule in reports.iter().flat_map(|r| &r.molecules) {
            *summary.slot(molecule.outcome) += 1;
        }
        summary
    }

    fn slot(&mut self, outcome: BuildOutcome) -> &mut usize {
        match outcome {
            BuildOutcome::Written => &mut self.written,
            BuildOutcome::SkippedExists => &mut self.skipped_exists,
            BuildOutcome::SkippedMissingInput => &mut self.skipped_missing_input,
            BuildOutcome::SkippedNoUsableReplica => &mut self.skipped_no_usable_replica,
        }
    }

    pub fn count(&self, outcome: BuildOutcome) -> usize {
        match outcome {
            BuildOutcome::Written => self.written,
            BuildOutcome::SkippedExists => self.skipped_exists,
            BuildOutcome::SkippedMissingInput => self.skipped_missing_input,
            BuildOutcome::SkippedNoUsableReplica => self.skipped_no_usable_replica,
        }
    }

    pub fn molecules(&self) -> usize {
        BuildOutcome::ALL.iter().map(|&o| self.count(o)).sum()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} molecules in {} batches: {} written, {} already built, {} missing input, {} without usable replica",
            self.molecules(),
            self.batches,
            self.written,
            self.skipped_exists,
            self.skipped_missing_input,
            self.skipped_no_usable_replica
        )
    }
}
