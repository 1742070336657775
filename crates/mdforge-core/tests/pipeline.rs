use mdforge::core::archive::{ArchiveFile, AttrValue, Dataset};
use mdforge::core::io::dcd::{DcdFrame, DcdTrajectory};
use mdforge::engine::builder::{BuildOutcome, MoleculeBuilder};
use mdforge::engine::collaborators::{
    AnalyzerFactory, FsTrajectoryLocator, MoleculeAnalyzer, StructureAnalyzer,
    StructureAnalyzerFactory, TrajectoryKind,
};
use mdforge::engine::config::{BuildConfigBuilder, RunConfig, ScheduleConfig};
use mdforge::engine::driver::InProcessWorker;
use mdforge::engine::error::{AnalysisError, PipelineError};
use mdforge::engine::progress::ProgressReporter;
use mdforge::engine::schedule::IdentifierList;
use mdforge::workflows::build;
use std::fs;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const TEMPERATURES: [u32; 2] = [320, 450];
const REPLICAS: usize = 2;

fn atom_line(
    serial: usize,
    name: &str,
    resname: &str,
    resseq: isize,
    pos: [f64; 3],
    element: &str,
) -> String {
    format!(
        "ATOM  {:>5} {:<4} {:>3} A{:>4}    {:>8.3}{:>8.3}{:>8.3}  1.00  0.00          {:>2}\n",
        serial, name, resname, resseq, pos[0], pos[1], pos[2], element
    )
}

fn base_positions() -> Vec<[f32; 3]> {
    vec![[0.0, 0.0, 0.0], [1.5, 0.0, 0.0], [2.0, 1.4, 0.0], [3.5, 1.4, 0.5]]
}

fn write_trajectory(path: &Path, frames: usize, offset: f32) {
    let trajectory = DcdTrajectory {
        num_atoms: 4,
        timestep: 0.002,
        frames: (0..frames)
            .map(|f| DcdFrame {
                unit_cell: Some([50.0, 90.0, 50.0, 90.0, 90.0, 50.0]),
                positions: base_positions()
                    .into_iter()
                    .map(|p| [p[0] + offset * f as f32, p[1], p[2] - 0.1 * f as f32])
                    .collect(),
            })
            .collect(),
    };
    trajectory.write_to_path(path).unwrap();
}

struct Fixture {
    _root: TempDir,
    run: RunConfig,
}

impl Fixture {
    fn new(batch_size: usize, workers: usize) -> Self {
        let root = TempDir::new().unwrap();
        let build = BuildConfigBuilder::new()
            .structure_dir(root.path().join("pdb"))
            .trajectory_dir(root.path().join("traj"))
            .archive_dir(root.path().join("archive"))
            .temperatures(TEMPERATURES.to_vec())
            .num_replicas(REPLICAS)
            .build()
            .unwrap();
        fs::create_dir_all(&build.structure_dir).unwrap();
        let schedule = ScheduleConfig::new(batch_size, workers).unwrap();
        Self {
            _root: root,
            run: RunConfig::new(schedule, build),
        }
    }

    fn add_structure(&self, identifier: &str) {
        let pos = base_positions();
        let p = |i: usize| pos[i].map(f64::from);
        let text = [
            atom_line(1, "N", "MET", 1, p(0), "N"),
            atom_line(2, "CA", "MET", 1, p(1), "C"),
            atom_line(3, "N", "LYS", 2, p(2), "N"),
            atom_line(4, "CA", "LYS", 2, p(3), "C"),
        ]
        .concat();
        fs::write(self.run.build.structure_path(identifier), text).unwrap();
    }

    fn replica_dir(&self, identifier: &str, temperature: u32, replica: usize) -> PathBuf {
        self.run
            .build
            .trajectory_dir
            .join(identifier)
            .join(format!("{}_{}_{}", identifier, temperature, replica))
    }

    fn add_replica(&self, identifier: &str, temperature: u32, replica: usize) {
        let dir = self.replica_dir(identifier, temperature, replica);
        fs::create_dir_all(&dir).unwrap();
        write_trajectory(&dir.join("0.traj.dcd"), 3, 0.2);
        write_trajectory(&dir.join("1.traj.dcd"), 2, 0.3);
        write_trajectory(&dir.join("0.force.dcd"), 3, 1.0);
        write_trajectory(&dir.join("1.force.dcd"), 2, 1.0);
    }

    fn add_complete_molecule(&self, identifier: &str) {
        self.add_structure(identifier);
        for temperature in TEMPERATURES {
            for replica in 0..REPLICAS {
                self.add_replica(identifier, temperature, replica);
            }
        }
    }

    fn archive(&self, identifier: &str) -> ArchiveFile {
        ArchiveFile::read_from_path(self.run.build.output_path(identifier)).unwrap()
    }

    fn archive_entries(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&self.run.build.archive_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn build(&self, identifiers: &[&str]) -> build::BuildResult {
        build::run_in_process(
            &self.run,
            IdentifierList::new(identifiers.iter().copied()),
            &ProgressReporter::new(),
        )
        .unwrap()
    }
}

#[test]
fn complete_molecule_archive_holds_every_replica() {
    let fixture = Fixture::new(2, 2);
    fixture.add_complete_molecule("1abcA00");

    let result = fixture.build(&["1abcA00"]);
    assert_eq!(result.summary.written, 1);

    let archive = fixture.archive("1abcA00");
    assert_eq!(archive.layout(), Some("mdforge-protein-only"));
    let molecule = archive.root.group("1abcA00").unwrap();
    assert_eq!(molecule.attr("numResidues"), Some(&AttrValue::Int(2)));
    assert_eq!(
        molecule.attr("sequence"),
        Some(&AttrValue::Text("MK".to_string()))
    );

    for temperature in TEMPERATURES {
        for replica in 0..REPLICAS {
            let path = format!("1abcA00/sims{}K/{}", temperature, replica);
            let group = archive.root.path(&path).unwrap();
            assert_eq!(group.attr("numFrames"), Some(&AttrValue::Int(5)), "{path}");
            let coords: &Dataset = group.dataset("coords").unwrap();
            assert_eq!(coords.shape(), &[5, 4, 3]);
            assert_eq!(group.dataset("forces").unwrap().shape(), &[5, 4, 3]);
            assert_eq!(group.dataset("box").unwrap().shape(), &[5, 3]);
            assert_eq!(group.dataset("rmsf").unwrap().shape(), &[4]);
        }
    }
}

#[test]
fn second_run_skips_everything_and_rebuild_is_byte_identical() {
    let fixture = Fixture::new(1, 2);
    fixture.add_complete_molecule("1abcA00");
    fixture.add_complete_molecule("2xyzB01");
    let ids = ["1abcA00", "2xyzB01"];

    fixture.build(&ids);
    let path = fixture.run.build.output_path("1abcA00");
    let first_bytes = fs::read(&path).unwrap();

    let second = fixture.build(&ids);
    assert_eq!(second.summary.skipped_exists, 2);
    assert_eq!(second.summary.written, 0);
    assert_eq!(fs::read(&path).unwrap(), first_bytes);

    fs::remove_file(&path).unwrap();
    let third = fixture.build(&ids);
    assert_eq!(third.summary.written, 1);
    assert_eq!(third.summary.skipped_exists, 1);
    assert_eq!(fs::read(&path).unwrap(), first_bytes);
}

#[test]
fn partial_replicas_are_written_and_missing_ones_left_empty() {
    let fixture = Fixture::new(5, 1);
    fixture.add_structure("1abcA00");
    fixture.add_replica("1abcA00", 320, 0);
    fixture.add_replica("1abcA00", 450, 1);

    let result = fixture.build(&["1abcA00"]);
    let report = &result.reports[0].molecules[0];
    assert_eq!(report.outcome, BuildOutcome::Written);
    assert_eq!((report.replicas_written, report.replicas_skipped), (2, 2));

    let archive = fixture.archive("1abcA00");
    assert!(archive.root.path("1abcA00/sims320K/0").unwrap().dataset("coords").is_some());
    assert!(archive.root.path("1abcA00/sims320K/1").unwrap().is_empty());
    assert!(archive.root.path("1abcA00/sims450K/0").unwrap().is_empty());
    assert!(archive.root.path("1abcA00/sims450K/1").unwrap().dataset("coords").is_some());
}

#[test]
fn replica_with_non_finite_coordinates_is_skipped_and_archive_stays_readable() {
    let fixture = Fixture::new(5, 1);
    fixture.add_complete_molecule("1abcA00");

    let dir = fixture.replica_dir("1abcA00", 320, 0);
    let mut blown_up = DcdTrajectory::read_from_path(dir.join("1.traj.dcd")).unwrap();
    blown_up.frames[1].positions[2] = [f32::NAN, f32::INFINITY, 0.0];
    blown_up.write_to_path(dir.join("1.traj.dcd")).unwrap();

    let result = fixture.build(&["1abcA00"]);
    let report = &result.reports[0].molecules[0];
    assert_eq!(report.outcome, BuildOutcome::Written);
    assert_eq!((report.replicas_written, report.replicas_skipped), (3, 1));

    let archive = fixture.archive("1abcA00");
    assert!(archive.root.path("1abcA00/sims320K/0").unwrap().is_empty());
    assert!(archive.root.path("1abcA00/sims320K/1").unwrap().dataset("coords").is_some());

    let rerun = fixture.build(&["1abcA00"]);
    assert_eq!(rerun.summary.skipped_exists, 1);
}

#[test]
fn molecule_without_trajectories_keeps_molecule_attributes() {
    let fixture = Fixture::new(5, 1);
    fixture.add_structure("1abcA00");

    let result = fixture.build(&["1abcA00"]);
    assert_eq!(result.summary.skipped_no_usable_replica, 1);

    let archive = fixture.archive("1abcA00");
    let molecule = archive.root.group("1abcA00").unwrap();
    assert_eq!(molecule.attr("numProteinAtoms"), Some(&AttrValue::Int(4)));
    assert!(archive.root.path("1abcA00/sims450K/1").unwrap().is_empty());
}

#[test]
fn missing_structures_are_skipped_and_reported() {
    let fixture = Fixture::new(2, 2);
    fixture.add_complete_molecule("1abcA00");

    let result = fixture.build(&["1abcA00", "ghost1", "ghost2"]);
    assert_eq!(result.summary.written, 1);
    assert_eq!(result.summary.skipped_missing_input, 2);
    assert_eq!(
        fixture.archive_entries(),
        vec![
            build::REPORT_FILE.to_string(),
            "mdforge_dataset_1abcA00.json.zst".to_string(),
            build::RUN_CONFIG_FILE.to_string(),
        ]
    );
}

#[test]
fn vanished_archive_directory_aborts_the_run() {
    let fixture = Fixture::new(1, 1);
    fixture.add_complete_molecule("1abcA00");

    let ids = IdentifierList::new(["1abcA00"]);
    let plan = build::plan(ids, &fixture.run.schedule).unwrap();
    let worker = InProcessWorker::with_builtin_collaborators(
        plan.scheduler().clone(),
        fixture.run.build.clone(),
    )
    .unwrap();

    // The archive directory is never prepared, so the first scratch file cannot be created.
    let result = build::run(&plan, 1, &worker, &ProgressReporter::new());
    assert!(matches!(result, Err(PipelineError::Io { .. })));
}

/// Delegates to the built-in analyzer, but panics in the middle of trajectory analysis.
struct Crashing(StructureAnalyzerFactory);
struct CrashingAnalyzer(StructureAnalyzer);

impl AnalyzerFactory for Crashing {
    type Analyzer = CrashingAnalyzer;

    fn open(&self, structure: &Path) -> Result<CrashingAnalyzer, AnalysisError> {
        self.0.open(structure).map(CrashingAnalyzer)
    }
}

impl MoleculeAnalyzer for CrashingAnalyzer {
    fn compute_properties(&mut self) -> Result<(), AnalysisError> {
        self.0.compute_properties()
    }
    fn has_properties(&self) -> bool {
        self.0.has_properties()
    }
    fn reset_replica(&mut self) {
        self.0.reset_replica()
    }
    fn traj_analysis(
        &mut self,
        kind: TrajectoryKind,
        files: &[PathBuf],
    ) -> Result<(), AnalysisError> {
        if kind == TrajectoryKind::Forces {
            panic!("simulated crash during force analysis");
        }
        self.0.traj_analysis(kind, files)
    }
    fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.0.attribute(name)
    }
    fn dataset(&self, name: &str) -> Option<&Dataset> {
        self.0.dataset(name)
    }
}

#[test]
fn interrupted_build_leaves_no_artifact_behind() {
    let fixture = Fixture::new(1, 1);
    fixture.add_complete_molecule("1abcA00");
    fs::create_dir_all(&fixture.run.build.archive_dir).unwrap();

    let config = &fixture.run.build;
    let locator = FsTrajectoryLocator::new(&config.trajectory_dir, ".traj.dcd");
    let analyzers = Crashing(StructureAnalyzerFactory::new(config.filter, 1).unwrap());

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        MoleculeBuilder::new(config, &locator, &analyzers).build("1abcA00")
    }));
    assert!(outcome.is_err());
    assert!(fixture.archive_entries().is_empty());

    // A later run starts from scratch and completes the molecule.
    let result = fixture.build(&["1abcA00"]);
    assert_eq!(result.summary.written, 1);
}
