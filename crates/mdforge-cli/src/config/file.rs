use crate::error::{CliError, Result};
use mdforge::engine::config::{Isolation, MoleculeFilter};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FilePathsConfig {
    pub structure_dir: Option<PathBuf>,
    pub trajectory_dir: Option<PathBuf>,
    pub archive_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileScheduleConfig {
    pub batch_size: Option<usize>,
    pub start_batch: Option<usize>,
    pub to_run_batches: Option<usize>,
    pub workers: Option<usize>,
    pub isolation: Option<Isolation>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileBuildConfig {
    pub temperatures: Option<Vec<u32>>,
    pub replicas: Option<usize>,
    pub filter: Option<MoleculeFilter>,
    pub analysis_threads: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileOutputConfig {
    pub prefix: Option<String>,
    pub extension: Option<String>,
    pub layout: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileTrajectoriesConfig {
    pub position_suffix: Option<String>,
    pub force_suffix: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct FileQuantitySelection {
    pub attrs: Option<Vec<String>>,
    pub datasets: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FileSelectionConfig {
    pub molecule: Option<FileQuantitySelection>,
    pub replica: Option<FileQuantitySelection>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub paths: Option<FilePathsConfig>,
    pub schedule: Option<FileScheduleConfig>,
    pub build: Option<FileBuildConfig>,
    pub output: Option<FileOutputConfig>,
    pub trajectories: Option<FileTrajectoriesConfig>,
    pub selection: Option<FileSelectionConfig>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
