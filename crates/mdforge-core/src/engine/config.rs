use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for '{parameter}': {reason}")]
    InvalidValue {
        parameter: &'static str,
        reason: String,
    },
}

/// How batch workers are isolated from each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Isolation {
    /// One persistent child process per worker.
    #[default]
    Process,
    /// One pool thread per worker inside the driving process.
    Thread,
}

impl FromStr for Isolation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "process" => Ok(Isolation::Process),
            "thread" => Ok(Isolation::Thread),
            other => Err(ConfigError::InvalidValue {
                parameter: "isolation",
                reason: format!("expected 'process' or 'thread', got '{}'", other),
            }),
        }
    }
}

impl fmt::Display for Isolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Isolation::Process => write!(f, "process"),
            Isolation::Thread => write!(f, "thread"),
        }
    }
}

/// Which atoms of a structure make up the archived molecule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MoleculeFilter {
    All,
    #[default]
    Protein,
    ProteinHeavy,
}

impl FromStr for MoleculeFilter {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(MoleculeFilter::All),
            "protein" => Ok(MoleculeFilter::Protein),
            "protein-heavy" => Ok(MoleculeFilter::ProteinHeavy),
            other => Err(ConfigError::InvalidValue {
                parameter: "filter",
                reason: format!(
                    "expected 'all', 'protein' or 'protein-heavy', got '{}'",
                    other
                ),
            }),
        }
    }
}

impl fmt::Display for MoleculeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoleculeFilter::All => write!(f, "all"),
            MoleculeFilter::Protein => write!(f, "protein"),
            MoleculeFilter::ProteinHeavy => write!(f, "protein-heavy"),
        }
    }
}

/// Names of the attributes and datasets copied from the analyzer into a group.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct QuantitySelection {
    #[serde(default)]
    pub attrs: Vec<String>,
    #[serde(default)]
    pub datasets: Vec<String>,
}

impl QuantitySelection {
    pub fn new<A, D>(attrs: A, datasets: D) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        Self {
            attrs: attrs.into_iter().map(Into::into).collect(),
            datasets: datasets.into_iter().map(Into::into).collect(),
        }
    }

    pub fn molecule_default() -> Self {
        Self::new(
            ["numProteinAtoms", "numResidues", "numChains", "sequence"],
            ["z", "element", "resname", "resid", "chain", "pdbCoords"],
        )
    }

    pub fn replica_default() -> Self {
        Self::new(
            ["numFrames"],
            ["coords", "forces", "box", "gyrationRadius", "rmsd", "rmsf"],
        )
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty() && self.datasets.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputNaming {
    pub prefix: String,
    pub extension: String,
    pub layout: String,
}

impl Default for OutputNaming {
    fn default() -> Self {
        Self {
            prefix: "mdforge_dataset".to_string(),
            extension: "json.zst".to_string(),
            layout: "mdforge-protein-only".to_string(),
        }
    }
}

/// File name conventions of the trajectory tree. A force file is named after its
/// position file with `position_suffix` replaced by `force_suffix`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TrajectoryNaming {
    pub position_suffix: String,
    pub force_suffix: String,
}

impl Default for TrajectoryNaming {
    fn default() -> Self {
        Self {
            position_suffix: ".traj.dcd".to_string(),
            force_suffix: ".force.dcd".to_string(),
        }
    }
}

/// Read-only configuration shared by every molecule build of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildConfig {
    pub structure_dir: PathBuf,
    pub trajectory_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub temperatures: Vec<u32>,
    pub num_replicas: usize,
    pub filter: MoleculeFilter,
    pub analysis_threads: usize,
    pub output: OutputNaming,
    pub trajectories: TrajectoryNaming,
    pub molecule_selection: QuantitySelection,
    pub replica_selection: QuantitySelection,
}

impl BuildConfig {
    /// `<archive_dir>/<prefix>_<identifier>.<extension>`
    pub fn output_path(&self, identifier: &str) -> PathBuf {
        self.archive_dir.join(format!(
            "{}_{}.{}",
            self.output.prefix, identifier, self.output.extension
        ))
    }

    /// `<structure_dir>/<identifier>.pdb`
    pub fn structure_path(&self, identifier: &str) -> PathBuf {
        self.structure_dir.join(format!("{}.pdb", identifier))
    }
}

#[derive(Default)]
pub struct BuildConfigBuilder {
    structure_dir: Option<PathBuf>,
    trajectory_dir: Option<PathBuf>,
    archive_dir: Option<PathBuf>,
    temperatures: Option<Vec<u32>>,
    num_replicas: Option<usize>,
    filter: Option<MoleculeFilter>,
    analysis_threads: Option<usize>,
    output: Option<OutputNaming>,
    trajectories: Option<TrajectoryNaming>,
    molecule_selection: Option<QuantitySelection>,
    replica_selection: Option<QuantitySelection>,
}

impl BuildConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn structure_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.structure_dir = Some(path.into());
        self
    }
    pub fn trajectory_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.trajectory_dir = Some(path.into());
        self
    }
    pub fn archive_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.archive_dir = Some(path.into());
        self
    }
    pub fn temperatures(mut self, temperatures: Vec<u32>) -> Self {
        self.temperatures = Some(temperatures);
        self
    }
    pub fn num_replicas(mut self, n: usize) -> Self {
        self.num_replicas = Some(n);
        self
    }
    pub fn filter(mut self, filter: MoleculeFilter) -> Self {
        self.filter = Some(filter);
        self
    }
    pub fn analysis_threads(mut self, n: usize) -> Self {
        self.analysis_threads = Some(n);
        self
    }
    pub fn output(mut self, output: OutputNaming) -> Self {
        self.output = Some(output);
        self
    }
    pub fn trajectories(mut self, naming: TrajectoryNaming) -> Self {
        self.trajectories = Some(naming);
        self
    }
    pub fn molecule_selection(mut self, selection: QuantitySelection) -> Self {
        self.molecule_selection = Some(selection);
        self
    }
    pub fn replica_selection(mut self, selection: QuantitySelection) -> Self {
        self.replica_selection = Some(selection);
        self
    }

    pub fn build(self) -> Result<BuildConfig, ConfigError> {
        let temperatures = self
            .temperatures
            .ok_or(ConfigError::MissingParameter("temperatures"))?;
        if temperatures.is_empty() {
            return Err(ConfigError::InvalidValue {
                parameter: "temperatures",
                reason: "at least one temperature is required".to_string(),
            });
        }

        let num_replicas = self
            .num_replicas
            .ok_or(ConfigError::MissingParameter("num_replicas"))?;
        if num_replicas == 0 {
            return Err(ConfigError::InvalidValue {
                parameter: "num_replicas",
                reason: "must be at least 1".to_string(),
            });
        }

        let analysis_threads = self.analysis_threads.unwrap_or(1);
        if analysis_threads == 0 {
            return Err(ConfigError::InvalidValue {
                parameter: "analysis_threads",
                reason: "must be at least 1".to_string(),
            });
        }

        let output = self.output.unwrap_or_default();
        if output.prefix.is_empty() || output.extension.is_empty() {
            return Err(ConfigError::InvalidValue {
                parameter: "output",
                reason: "prefix and extension must not be empty".to_string(),
            });
        }

        let trajectories = self.trajectories.unwrap_or_default();
        if trajectories.position_suffix.is_empty()
            || trajectories.position_suffix == trajectories.force_suffix
        {
            return Err(ConfigError::InvalidValue {
                parameter: "trajectories",
                reason: "position suffix must be non-empty and differ from the force suffix"
                    .to_string(),
            });
        }

        Ok(BuildConfig {
            structure_dir: self
                .structure_dir
                .ok_or(ConfigError::MissingParameter("structure_dir"))?,
            trajectory_dir: self
                .trajectory_dir
                .ok_or(ConfigError::MissingParameter("trajectory_dir"))?,
            archive_dir: self
                .archive_dir
                .ok_or(ConfigError::MissingParameter("archive_dir"))?,
            temperatures,
            num_replicas,
            filter: self.filter.unwrap_or_default(),
            analysis_threads,
            output,
            trajectories,
            molecule_selection: self
                .molecule_selection
                .unwrap_or_else(QuantitySelection::molecule_default),
            replica_selection: self
                .replica_selection
                .unwrap_or_else(QuantitySelection::replica_default),
        })
    }
}

/// The run window and worker pool. `start_batch`/`to_run_batches` select a contiguous
/// slice of the batch partition, see [`crate::engine::schedule::plan_num_batches`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScheduleConfig {
    pub batch_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_batch: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_run_batches: Option<usize>,
    pub workers: usize,
    #[serde(default)]
    pub isolation: Isolation,
}

impl ScheduleConfig {
    pub fn new(batch_size: usize, workers: usize) -> Result<Self, ConfigError> {
        let config = Self {
            batch_size,
            start_batch: None,
            to_run_batches: None,
            workers,
            isolation: Isolation::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_window(mut self, start_batch: Option<usize>, to_run_batches: Option<usize>) -> Self {
        self.start_batch = start_batch;
        self.to_run_batches = to_run_batches;
        self
    }

    pub fn with_isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                parameter: "batch_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.workers == 0 {
            return Err(ConfigError::InvalidValue {
                parameter: "workers",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Everything needed to reproduce a run, minus the identifier list contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifiers: Option<PathBuf>,
    pub schedule: ScheduleConfig,
    pub build: BuildConfig,
}

impl RunConfig {
    pub fn new(schedule: ScheduleConfig, build: BuildConfig) -> Self {
        Self {
            identifiers: None,
            schedule,
            build,
        }
    }

    pub fn with_identifiers(mut self, path: &Path) -> Self {
        self.identifiers = Some(path.to_path_buf());
        self
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_builder() -> BuildConfigBuilder {
        BuildConfigBuilder::new()
            .structure_dir("/data/pdb")
            .trajectory_dir("/data/traj")
            .archive_dir("/data/out")
            .temperatures(vec![320, 450])
            .num_replicas(3)
    }

    #[test]
    fn builder_fills_defaults_for_optional_parameters() {
        let config = minimal_builder().build().unwrap();
        assert_eq!(config.filter, MoleculeFilter::Protein);
        assert_eq!(config.analysis_threads, 1);
        assert_eq!(config.output, OutputNaming::default());
        assert_eq!(config.trajectories, TrajectoryNaming::default());
        assert_eq!(config.molecule_selection, QuantitySelection::molecule_default());
        assert_eq!(config.replica_selection, QuantitySelection::replica_default());
    }

    #[test]
    fn builder_reports_first_missing_parameter() {
        let result = BuildConfigBuilder::new()
            .temperatures(vec![300])
            .num_replicas(1)
            .build();
        assert_eq!(result, Err(ConfigError::MissingParameter("structure_dir")));

        let result = BuildConfigBuilder::new().build();
        assert_eq!(result, Err(ConfigError::MissingParameter("temperatures")));
    }

    #[test]
    fn builder_rejects_degenerate_values() {
        assert!(matches!(
            minimal_builder().temperatures(vec![]).build(),
            Err(ConfigError::InvalidValue { parameter: "temperatures", .. })
        ));
        assert!(matches!(
            minimal_builder().num_replicas(0).build(),
            Err(ConfigError::InvalidValue { parameter: "num_replicas", .. })
        ));
        assert!(matches!(
            minimal_builder().analysis_threads(0).build(),
            Err(ConfigError::InvalidValue { parameter: "analysis_threads", .. })
        ));
        let same_suffix = TrajectoryNaming {
            position_suffix: ".dcd".to_string(),
            force_suffix: ".dcd".to_string(),
        };
        assert!(matches!(
            minimal_builder().trajectories(same_suffix).build(),
            Err(ConfigError::InvalidValue { parameter: "trajectories", .. })
        ));
    }

    #[test]
    fn output_and_structure_paths_follow_naming_convention() {
        let config = minimal_builder().build().unwrap();
        assert_eq!(
            config.output_path("1abcA00"),
            PathBuf::from("/data/out/mdforge_dataset_1abcA00.json.zst")
        );
        assert_eq!(
            config.structure_path("1abcA00"),
            PathBuf::from("/data/pdb/1abcA00.pdb")
        );
    }

    #[test]
    fn schedule_config_rejects_zero_batch_size_and_workers() {
        assert!(matches!(
            ScheduleConfig::new(0, 1),
            Err(ConfigError::InvalidValue { parameter: "batch_size", .. })
        ));
        assert!(matches!(
            ScheduleConfig::new(10, 0),
            Err(ConfigError::InvalidValue { parameter: "workers", .. })
        ));
    }

    #[test]
    fn enums_parse_case_insensitively() {
        assert_eq!("Thread".parse::<Isolation>().unwrap(), Isolation::Thread);
        assert_eq!(
            "PROTEIN-HEAVY".parse::<MoleculeFilter>().unwrap(),
            MoleculeFilter::ProteinHeavy
        );
        assert!("fork".parse::<Isolation>().is_err());
        assert!("water".parse::<MoleculeFilter>().is_err());
    }

    #[test]
    fn run_config_survives_toml_snapshot() {
        let schedule = ScheduleConfig::new(4, 2)
            .unwrap()
            .with_window(Some(1), None)
            .with_isolation(Isolation::Thread);
        let run = RunConfig::new(schedule, minimal_builder().build().unwrap())
            .with_identifiers(Path::new("/data/ids.txt"));

        let text = run.to_toml_string().unwrap();
        assert!(text.contains("batch-size = 4"));
        assert!(text.contains("isolation = \"thread\""));
        assert!(!text.contains("to-run-batches"));

        let parsed = RunConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, run);
    }
}
