use super::config::ConfigError;
use super::schedule::ScheduleError;
use crate::core::archive::ArchiveError;
use crate::core::io::dcd::DcdError;
use crate::core::io::pdb::PdbError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A condition that aborts the whole run. Crosses batch boundaries.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Scheduling error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("I/O error on '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write archive '{path}': {source}", path = path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: ArchiveError,
    },

    #[error("Failed to write report: {0}")]
    Report(#[from] csv::Error),

    #[error("Failed to serialize run configuration: {0}")]
    Snapshot(#[from] toml::ser::Error),

    #[error("Worker failure: {0}")]
    Worker(String),
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Trajectory discovery failed for one replica. Always recoverable.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Trajectory directory not found: {}", path.display())]
    MissingDirectory { path: PathBuf },

    #[error("No trajectory files ending with '{suffix}' in {}", path.display())]
    NoTrajectories { path: PathBuf, suffix: String },

    #[error("Inconsistent trajectory files in {}: {reason}", path.display())]
    Inconsistent { path: PathBuf, reason: String },

    #[error("Cannot list trajectory directory {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The analysis collaborator could not produce data. Recoverable at replica scope, or
/// at molecule scope when the structure itself is unusable.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Unusable structure {}: {source}", path.display())]
    Structure {
        path: PathBuf,
        #[source]
        source: PdbError,
    },

    #[error("Unreadable trajectory {}: {source}", path.display())]
    Trajectory {
        path: PathBuf,
        #[source]
        source: DcdError,
    },

    #[error(
        "Trajectory {} holds {found} atoms, but the structure has {expected} ({selected} selected)",
        path.display()
    )]
    AtomCountMismatch {
        path: PathBuf,
        expected: usize,
        selected: usize,
        found: usize,
    },

    #[error("Filter '{filter}' selects no atoms of {}", path.display())]
    EmptySelection { path: PathBuf, filter: String },

    #[error("Failed to assemble quantity '{name}': {source}")]
    Quantity {
        name: &'static str,
        #[source]
        source: ArchiveError,
    },

    #[error("Analysis failed: {0}")]
    Failed(String),
}
