use super::defaults::DefaultsConfig;
use super::file::{FileConfig, FileQuantitySelection};
use super::models::AppConfig;
use crate::cli::BuildArgs;
use crate::error::{CliError, Result};
use mdforge::engine::config::{
    BuildConfigBuilder, OutputNaming, QuantitySelection, RunConfig, ScheduleConfig,
    TrajectoryNaming,
};
use std::fmt::Display;
use std::str::FromStr;
use tracing::debug;

/// Resolves the final run configuration. Precedence, highest first: command-line flags,
/// `-S` overrides, the configuration file, built-in defaults.
pub fn build_config(args: &BuildArgs) -> Result<AppConfig> {
    let defaults = DefaultsConfig::default();

    let file_config = if let Some(config_path) = &args.config {
        FileConfig::from_file(config_path)?
    } else {
        FileConfig::default()
    };

    let mut file_config = apply_set_values(file_config, &args.set_values)?;

    let paths_file = file_config.paths.take().unwrap_or_default();
    let schedule_file = file_config.schedule.take().unwrap_or_default();
    let build_file = file_config.build.take().unwrap_or_default();
    let output_file = file_config.output.take().unwrap_or_default();
    let trajectories_file = file_config.trajectories.take().unwrap_or_default();
    let selection_file = file_config.selection.take().unwrap_or_default();

    let isolation = match &args.isolation {
        Some(value) => parse_enum(value)?,
        None => schedule_file.isolation.unwrap_or(defaults.isolation),
    };
    let filter = match &args.filter {
        Some(value) => parse_enum(value)?,
        None => build_file.filter.unwrap_or(defaults.filter),
    };

    let schedule = ScheduleConfig::new(
        args.batch_size
            .or(schedule_file.batch_size)
            .unwrap_or(defaults.batch_size),
        args.workers
            .or(schedule_file.workers)
            .unwrap_or(defaults.workers),
    )
    .map_err(|e| CliError::Config(e.to_string()))?
    .with_window(
        args.start_batch.or(schedule_file.start_batch),
        args.to_run_batches.or(schedule_file.to_run_batches),
    )
    .with_isolation(isolation);

    let mut builder = BuildConfigBuilder::new()
        .temperatures(
            args.temperatures
                .clone()
                .or(build_file.temperatures)
                .unwrap_or(defaults.temperatures),
        )
        .num_replicas(
            args.replicas
                .or(build_file.replicas)
                .unwrap_or(defaults.replicas),
        )
        .filter(filter)
        .analysis_threads(
            args.analysis_threads
                .or(build_file.analysis_threads)
                .unwrap_or(defaults.analysis_threads),
        )
        .output(OutputNaming {
            prefix: output_file.prefix.unwrap_or(defaults.prefix),
            extension: output_file.extension.unwrap_or(defaults.extension),
            layout: output_file.layout.unwrap_or(defaults.layout),
        })
        .trajectories(TrajectoryNaming {
            position_suffix: trajectories_file
                .position_suffix
                .unwrap_or(defaults.position_suffix),
            force_suffix: trajectories_file
                .force_suffix
                .unwrap_or(defaults.force_suffix),
        })
        .molecule_selection(merge_selection(
            selection_file.molecule,
            defaults.molecule_selection,
        ))
        .replica_selection(merge_selection(
            selection_file.replica,
            defaults.replica_selection,
        ));

    if let Some(dir) = args.structure_dir.clone().or(paths_file.structure_dir) {
        builder = builder.structure_dir(dir);
    }
    if let Some(dir) = args.trajectory_dir.clone().or(paths_file.trajectory_dir) {
        builder = builder.trajectory_dir(dir);
    }
    if let Some(dir) = args.archive_dir.clone().or(paths_file.archive_dir) {
        builder = builder.archive_dir(dir);
    }

    let build = builder
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;

    let run = RunConfig::new(schedule, build).with_identifiers(&args.identifiers);
    debug!("Resolved run configuration: {:?}", run);

    Ok(AppConfig {
        identifiers_path: args.identifiers.clone(),
        run,
    })
}

fn merge_selection(
    file_val: Option<FileQuantitySelection>,
    default: QuantitySelection,
) -> QuantitySelection {
    let file_val = file_val.unwrap_or_default();
    QuantitySelection {
        attrs: file_val.attrs.unwrap_or(default.attrs),
        datasets: file_val.datasets.unwrap_or(default.datasets),
    }
}

fn parse_enum<T>(value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse()
        .map_err(|e: T::Err| CliError::Argument(e.to_string()))
}

fn parse_set_value<T: FromStr>(key: &str, value: &str, kind: &str) -> Result<T> {
    value.parse().map_err(|_| {
        CliError::Config(format!("Invalid {} value for {}: {}", kind, key, value))
    })
}

fn parse_list<T: FromStr>(key: &str, value: &str, kind: &str) -> Result<Vec<T>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| parse_set_value(key, item, kind))
        .collect()
}

fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    if set_values.is_empty() {
        return Ok(config);
    }

    for kv_pair in set_values {
        let Some((key, value_str)) = kv_pair.split_once('=') else {
            return Err(CliError::Config(format!(
                "Invalid --set format: '{}'. Expected KEY=VALUE.",
                kv_pair
            )));
        };
        let key = key.trim();
        let value_str = value_str.trim();

        match key {
            "paths.structure-dir" => {
                config.paths.get_or_insert_with(Default::default).structure_dir =
                    Some(value_str.into());
            }
            "paths.trajectory-dir" => {
                config.paths.get_or_insert_with(Default::default).trajectory_dir =
                    Some(value_str.into());
            }
            "paths.archive-dir" => {
                config.paths.get_or_insert_with(Default::default).archive_dir =
                    Some(value_str.into());
            }
            "schedule.batch-size" => {
                config.schedule.get_or_insert_with(Default::default).batch_size =
                    Some(parse_set_value(key, value_str, "integer")?);
            }
            "schedule.start-batch" => {
                config.schedule.get_or_insert_with(Default::default).start_batch =
                    Some(parse_set_value(key, value_str, "integer")?);
            }
            "schedule.to-run-batches" => {
                config
                    .schedule
                    .get_or_insert_with(Default::default)
                    .to_run_batches = Some(parse_set_value(key, value_str, "integer")?);
            }
            "schedule.workers" => {
                config.schedule.get_or_insert_with(Default::default).workers =
                    Some(parse_set_value(key, value_str, "integer")?);
            }
            "schedule.isolation" => {
                config.schedule.get_or_insert_with(Default::default).isolation =
                    Some(parse_set_value(key, value_str, "isolation")?);
            }
            "build.temperatures" => {
                config.build.get_or_insert_with(Default::default).temperatures =
                    Some(parse_list(key, value_str, "integer")?);
            }
            "build.replicas" => {
                config.build.get_or_insert_with(Default::default).replicas =
                    Some(parse_set_value(key, value_str, "integer")?);
            }
            "build.filter" => {
                config.build.get_or_insert_with(Default::default).filter =
                    Some(parse_set_value(key, value_str, "filter")?);
            }
            "build.analysis-threads" => {
                config
                    .build
                    .get_or_insert_with(Default::default)
                    .analysis_threads = Some(parse_set_value(key, value_str, "integer")?);
            }
            "output.prefix" => {
                config.output.get_or_insert_with(Default::default).prefix =
                    Some(value_str.to_string());
            }
            "output.extension" => {
                config.output.get_or_insert_with(Default::default).extension =
                    Some(value_str.to_string());
            }
            "output.layout" => {
                config.output.get_or_insert_with(Default::default).layout =
                    Some(value_str.to_string());
            }
            "trajectories.position-suffix" => {
                config
                    .trajectories
                    .get_or_insert_with(Default::default)
                    .position_suffix = Some(value_str.to_string());
            }
            "trajectories.force-suffix" => {
                config
                    .trajectories
                    .get_or_insert_with(Default::default)
                    .force_suffix = Some(value_str.to_string());
            }
            _ => {
                return Err(CliError::Config(format!(
                    "Unsupported configuration key for --set: '{}'",
                    key
                )));
            }
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use mdforge::engine::config::{Isolation, MoleculeFilter};
    use once_cell::sync::Lazy;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::{TempDir, tempdir};

    static TEST_DIR: Lazy<TempDir> = Lazy::new(|| tempdir().expect("Failed to create temp dir"));

    fn write_config_file(name: &str, content: &str) -> PathBuf {
        let file_path = TEST_DIR.path().join(name);
        fs::write(&file_path, content).unwrap();
        file_path
    }

    fn build_args(config_path: Option<&Path>, extra: &[&str]) -> BuildArgs {
        let mut args = vec!["mdforge", "build", "-l", "ids.txt"];
        let config = config_path.map(|p| p.to_str().unwrap().to_string());
        if let Some(config) = &config {
            args.extend_from_slice(&["-c", config.as_str()]);
        }
        args.extend_from_slice(extra);
        match Cli::parse_from(args).command {
            Commands::Build(build_args) => build_args,
            _ => panic!("Expected 'build' subcommand"),
        }
    }

    const PATHS: &str = r#"
        [paths]
        structure-dir = "/data/pdb"
        trajectory-dir = "/data/traj"
        archive-dir = "/data/out"
    "#;

    #[test]
    fn file_values_are_merged_with_defaults() {
        let config_path = write_config_file("defaults.toml", PATHS);
        let app = build_config(&build_args(Some(&config_path), &[])).unwrap();
        let run = app.run;

        assert_eq!(app.identifiers_path, PathBuf::from("ids.txt"));
        assert_eq!(run.identifiers, Some(PathBuf::from("ids.txt")));
        assert_eq!(run.schedule.batch_size, 10);
        assert_eq!(run.schedule.workers, 1);
        assert_eq!(run.schedule.isolation, Isolation::Process);
        assert_eq!(run.schedule.start_batch, None);
        assert_eq!(run.build.structure_dir, PathBuf::from("/data/pdb"));
        assert_eq!(run.build.temperatures, vec![320, 348, 379, 413, 450]);
        assert_eq!(run.build.num_replicas, 5);
        assert_eq!(run.build.filter, MoleculeFilter::Protein);
        assert_eq!(run.build.output.layout, "mdforge-protein-only");
        assert_eq!(run.build.trajectories.force_suffix, ".force.dcd");
        assert_eq!(
            run.build.replica_selection,
            QuantitySelection::replica_default()
        );
    }

    #[test]
    fn cli_args_override_set_values_which_override_file_values() {
        let content = format!(
            "{}\n[schedule]\nbatch-size = 50\nworkers = 2\n\n[build]\nreplicas = 3\n",
            PATHS
        );
        let config_path = write_config_file("override.toml", &content);
        let args = build_args(
            Some(&config_path),
            &[
                "-b",
                "7",
                "-S",
                "schedule.batch-size=20",
                "-S",
                "schedule.workers=4",
                "--isolation",
                "thread",
            ],
        );
        let run = build_config(&args).unwrap().run;

        assert_eq!(run.schedule.batch_size, 7);
        assert_eq!(run.schedule.workers, 4);
        assert_eq!(run.schedule.isolation, Isolation::Thread);
        assert_eq!(run.build.num_replicas, 3);
    }

    #[test]
    fn set_values_cover_lists_and_enums() {
        let args = build_args(
            None,
            &[
                "--structure-dir",
                "/s",
                "--trajectory-dir",
                "/t",
                "-o",
                "/o",
                "-S",
                "build.temperatures=300, 310",
                "-S",
                "build.filter=protein-heavy",
                "-S",
                "schedule.start-batch=2",
                "-S",
                "output.prefix=ds",
            ],
        );
        let run = build_config(&args).unwrap().run;

        assert_eq!(run.build.temperatures, vec![300, 310]);
        assert_eq!(run.build.filter, MoleculeFilter::ProteinHeavy);
        assert_eq!(run.schedule.start_batch, Some(2));
        assert_eq!(run.build.output_path("1abc"), PathBuf::from("/o/ds_1abc.json.zst"));
    }

    #[test]
    fn file_selection_replaces_only_named_lists() {
        let content = format!(
            "{}\n[selection.molecule]\nattrs = [\"sequence\"]\n",
            PATHS
        );
        let config_path = write_config_file("selection.toml", &content);
        let run = build_config(&build_args(Some(&config_path), &[]))
            .unwrap()
            .run;

        assert_eq!(run.build.molecule_selection.attrs, vec!["sequence".to_string()]);
        assert_eq!(
            run.build.molecule_selection.datasets,
            QuantitySelection::molecule_default().datasets
        );
    }

    #[test]
    fn malformed_and_unknown_set_values_are_rejected() {
        for set in ["schedule.batch-size", "schedule.batch-size=ten", "nope.key=1", "build.filter=ligand"] {
            let args = build_args(None, &["-o", "/o", "-S", set]);
            let result = build_config(&args);
            assert!(matches!(result, Err(CliError::Config(_))), "{}", set);
        }
    }

    #[test]
    fn invalid_enum_flag_is_an_argument_error() {
        let content = PATHS.to_string();
        let config_path = write_config_file("enum.toml", &content);
        let args = build_args(Some(&config_path), &["--filter", "ligand"]);
        assert!(matches!(build_config(&args), Err(CliError::Argument(_))));
    }

    #[test]
    fn missing_directory_returns_config_error() {
        let args = build_args(None, &["--structure-dir", "/s", "-o", "/o"]);
        let result = build_config(&args);
        assert!(matches!(result, Err(CliError::Config(msg)) if msg.contains("trajectory_dir")));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config_path = write_config_file("zero.toml", PATHS);
        let args = build_args(Some(&config_path), &["-b", "0"]);
        assert!(matches!(build_config(&args), Err(CliError::Config(_))));
    }
}
