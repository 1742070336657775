//! Seams between the pipeline and the scientific code it drives.
//!
//! The builder only ever talks to a [`TrajectoryLocator`] (where are the trajectory
//! files of one replica?) and to [`MoleculeAnalyzer`]s produced by an
//! [`AnalyzerFactory`] (what quantities describe this molecule and its replicas?).
//! [`FsTrajectoryLocator`] and [`StructureAnalyzerFactory`] are the built-in
//! implementations for PDB structures and DCD trajectories.

mod analyzer;
mod locator;

pub use analyzer::{StructureAnalyzer, StructureAnalyzerFactory};
pub use locator::FsTrajectoryLocator;

use super::config::{QuantitySelection, TrajectoryNaming};
use super::error::{AnalysisError, DiscoveryError};
use crate::core::archive::{AttrValue, Dataset, Group};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Dataset holding per-frame atom positions. A replica without it is not archived.
pub const COORDS: &str = "coords";
/// Dataset holding per-frame atom forces. A replica without it is not archived.
pub const FORCES: &str = "forces";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrajectoryKind {
    Positions,
    Forces,
}

pub trait TrajectoryLocator: Send + Sync {
    /// Ordered trajectory files of replica `replica` of `identifier` at `temperature`.
    fn trajectory_files(
        &self,
        identifier: &str,
        temperature: u32,
        replica: usize,
    ) -> Result<Vec<PathBuf>, DiscoveryError>;
}

/// Per-molecule analysis state.
///
/// Molecule-level quantities come from [`compute_properties`](Self::compute_properties)
/// and stay valid for the analyzer's lifetime. Replica-level quantities come from
/// [`traj_analysis`](Self::traj_analysis) and are discarded by
/// [`reset_replica`](Self::reset_replica).
pub trait MoleculeAnalyzer {
    /// Computes molecule-level quantities. Calling it again is a no-op.
    fn compute_properties(&mut self) -> Result<(), AnalysisError>;

    fn has_properties(&self) -> bool;

    fn reset_replica(&mut self);

    fn traj_analysis(&mut self, kind: TrajectoryKind, files: &[PathBuf])
    -> Result<(), AnalysisError>;

    fn attribute(&self, name: &str) -> Option<&AttrValue>;

    fn dataset(&self, name: &str) -> Option<&Dataset>;

    fn has_replica_observables(&self) -> bool {
        self.dataset(COORDS).is_some() && self.dataset(FORCES).is_some()
    }

    /// Copies the selected quantities into `group` and returns how many were written.
    /// Names the analyzer cannot provide are skipped with a warning.
    fn write_to_group(&self, group: &mut Group, selection: &QuantitySelection) -> usize {
        let mut written = 0;
        for name in &selection.attrs {
            match self.attribute(name) {
                Some(value) => {
                    group.set_attr(name, value.clone());
                    written += 1;
                }
                None => warn!(quantity = %name, "Attribute not available, skipping."),
            }
        }
        for name in &selection.datasets {
            match self.dataset(name) {
                Some(dataset) => {
                    group.set_dataset(name, dataset.clone());
                    written += 1;
                }
                None => warn!(quantity = %name, "Dataset not available, skipping."),
            }
        }
        written
    }
}

pub trait AnalyzerFactory: Send + Sync {
    type Analyzer: MoleculeAnalyzer;

    fn open(&self, structure: &Path) -> Result<Self::Analyzer, AnalysisError>;
}

/// Force files that accompany `position_files`, in the same order.
///
/// The trailing `position_suffix` of each file name is replaced by `force_suffix`. A
/// name without the position suffix gets the force suffix appended instead, so a
/// position file is never mistaken for its own companion.
pub fn companion_files(position_files: &[PathBuf], naming: &TrajectoryNaming) -> Vec<PathBuf> {
    position_files
        .iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let companion = match name.strip_suffix(&naming.position_suffix) {
                Some(stem) => format!("{}{}", stem, naming.force_suffix),
                None => format!("{}{}", name, naming.force_suffix),
            };
            path.with_file_name(companion)
        })
        .collect()
}
