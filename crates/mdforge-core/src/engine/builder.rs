use super::collaborators::{
    AnalyzerFactory, MoleculeAnalyzer, TrajectoryKind, TrajectoryLocator, companion_files,
};
use super::config::BuildConfig;
use super::error::PipelineError;
use super::writer::ScratchArchive;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildOutcome {
    /// An archive was published with at least one replica.
    Written,
    /// An archive already existed; nothing was read or written.
    SkippedExists,
    /// The structure file is missing or unusable.
    SkippedMissingInput,
    /// An archive was published, but every replica was skipped.
    SkippedNoUsableReplica,
}

impl BuildOutcome {
    pub const ALL: [BuildOutcome; 4] = [
        BuildOutcome::Written,
        BuildOutcome::SkippedExists,
        BuildOutcome::SkippedMissingInput,
        BuildOutcome::SkippedNoUsableReplica,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildOutcome::Written => "written",
            BuildOutcome::SkippedExists => "skipped-exists",
            BuildOutcome::SkippedMissingInput => "skipped-missing-input",
            BuildOutcome::SkippedNoUsableReplica => "skipped-no-usable-replica",
        }
    }
}

impl fmt::Display for BuildOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoleculeReport {
    pub identifier: String,
    pub outcome: BuildOutcome,
    pub replicas_written: usize,
    pub replicas_skipped: usize,
}

impl MoleculeReport {
    fn skipped(identifier: &str, outcome: BuildOutcome) -> Self {
        Self {
            identifier: identifier.to_string(),
            outcome,
            replicas_written: 0,
            replicas_skipped: 0,
        }
    }
}

pub fn temperature_group_name(temperature: u32) -> String {
    format!("sims{}K", temperature)
}

/// Builds the archive of one molecule from its structure and trajectories.
///
/// Failures of discovery or analysis are contained: they are logged and the affected
/// replica is left out. Only failures to create or publish the archive itself are
/// returned as errors.
pub struct MoleculeBuilder<'a, L, F> {
    config: &'a BuildConfig,
    locator: &'a L,
    analyzers: &'a F,
}

impl<'a, L, F> MoleculeBuilder<'a, L, F>
where
    L: TrajectoryLocator,
    F: AnalyzerFactory,
{
    pub fn new(config: &'a BuildConfig, locator: &'a L, analyzers: &'a F) -> Self {
        Self {
            config,
            locator,
            analyzers,
        }
    }

    pub fn build(&self, identifier: &str) -> Result<MoleculeReport, PipelineError> {
        let output_path = self.config.output_path(identifier);
        if output_path.exists() {
            info!(identifier, path = %output_path.display(), "Archive exists, skipping.");
            return Ok(MoleculeReport::skipped(
                identifier,
                BuildOutcome::SkippedExists,
            ));
        }

        let structure_path = self.config.structure_path(identifier);
        if !structure_path.is_file() {
            warn!(
                identifier,
                path = %structure_path.display(),
                "Structure file not found, skipping."
            );
            return Ok(MoleculeReport::skipped(
                identifier,
                BuildOutcome::SkippedMissingInput,
            ));
        }

        let mut analyzer = match self.analyzers.open(&structure_path) {
            Ok(analyzer) => analyzer,
            Err(e) => {
                error!(identifier, "Structure is unusable, skipping: {}", e);
                return Ok(MoleculeReport::skipped(
                    identifier,
                    BuildOutcome::SkippedMissingInput,
                ));
            }
        };

        let mut scratch =
            ScratchArchive::create(&self.config.archive_dir, &self.config.output.layout)?;
        scratch.root_mut().group_mut(identifier);

        let mut replicas_written = 0;
        let mut replicas_skipped = 0;

        for &temperature in &self.config.temperatures {
            let temperature_group = temperature_group_name(temperature);
            for replica in 0..self.config.num_replicas {
                let replica_group = scratch
                    .root_mut()
                    .group_mut(identifier)
                    .group_mut(&temperature_group)
                    .group_mut(&replica.to_string());

                if Self::build_replica(
                    self.locator,
                    self.config,
                    &mut analyzer,
                    identifier,
                    temperature,
                    replica,
                ) {
                    let count =
                        analyzer.write_to_group(replica_group, &self.config.replica_selection);
                    debug!(
                        identifier,
                        temperature,
                        replica,
                        quantities = count,
                        "Replica written."
                    );
                    replicas_written += 1;
                } else {
                    replicas_skipped += 1;
                }
            }
        }

        if !analyzer.has_properties() {
            if let Err(e) = analyzer.compute_properties() {
                error!(identifier, "Molecule properties could not be computed: {}", e);
            }
        }
        analyzer.write_to_group(
            scratch.root_mut().group_mut(identifier),
            &self.config.molecule_selection,
        );

        scratch.publish(&output_path)?;

        let outcome = if replicas_written > 0 {
            BuildOutcome::Written
        } else {
            warn!(identifier, "No usable replica; archive holds molecule data only.");
            BuildOutcome::SkippedNoUsableReplica
        };
        info!(
            identifier,
            replicas_written,
            replicas_skipped,
            path = %output_path.display(),
            "Archive published."
        );

        Ok(MoleculeReport {
            identifier: identifier.to_string(),
            outcome,
            replicas_written,
            replicas_skipped,
        })
    }

    /// Runs discovery and analysis for one replica. Returns whether the analyzer now
    /// holds the replica's observables.
    fn build_replica(
        locator: &L,
        config: &BuildConfig,
        analyzer: &mut F::Analyzer,
        identifier: &str,
        temperature: u32,
        replica: usize,
    ) -> bool {
        let files = match locator.trajectory_files(identifier, temperature, replica) {
            Ok(files) => files,
            Err(e) => {
                error!(
                    identifier,
                    temperature, replica, "Trajectory discovery failed: {}", e
                );
                return false;
            }
        };

        if let Err(e) = analyzer.compute_properties() {
            error!(identifier, "Molecule properties could not be computed: {}", e);
        }
        analyzer.reset_replica();

        let force_files = companion_files(&files, &config.trajectories);
        let analysed = analyzer
            .traj_analysis(TrajectoryKind::Positions, &files)
            .and_then(|()| analyzer.traj_analysis(TrajectoryKind::Forces, &force_files));
        if let Err(e) = analysed {
            error!(
                identifier,
                temperature, replica, "Trajectory analysis failed: {}", e
            );
            return false;
        }

        if !analyzer.has_replica_observables() {
            error!(
                identifier,
                temperature, replica, "Coordinates or forces not found, skipping replica."
            );
            return false;
        }
        true
    }
}
