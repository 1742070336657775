use mdforge::core::archive::{ArchiveFile, AttrValue};
use mdforge::core::io::dcd::{DcdFrame, DcdTrajectory};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn atom_line(serial: usize, name: &str, resname: &str, resseq: isize, pos: [f32; 3]) -> String {
    format!(
        "ATOM  {:>5} {:<4} {:>3} A{:>4}    {:>8.3}{:>8.3}{:>8.3}  1.00  0.00          {:>2}\n",
        serial,
        name,
        resname,
        resseq,
        pos[0],
        pos[1],
        pos[2],
        &name[..1]
    )
}

const POSITIONS: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.5, 0.0, 0.0], [2.0, 1.4, 0.0]];

struct Workspace {
    root: TempDir,
}

impl Workspace {
    fn new(identifiers: &[&str]) -> Self {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("pdb")).unwrap();
        fs::write(root.path().join("ids.txt"), identifiers.join("\n")).unwrap();
        Self { root }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    fn add_molecule(&self, identifier: &str) {
        let text = [
            atom_line(1, "N", "GLY", 1, POSITIONS[0]),
            atom_line(2, "CA", "GLY", 1, POSITIONS[1]),
            atom_line(3, "N", "ALA", 2, POSITIONS[2]),
        ]
        .concat();
        fs::write(self.path("pdb").join(format!("{}.pdb", identifier)), text).unwrap();

        let dir = self
            .path("traj")
            .join(identifier)
            .join(format!("{}_320_0", identifier));
        fs::create_dir_all(&dir).unwrap();
        for name in ["0.traj.dcd", "0.force.dcd"] {
            write_trajectory(&dir.join(name));
        }
    }

    fn mdforge(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_mdforge"))
            .current_dir(self.root.path())
            .args(args)
            .output()
            .unwrap()
    }

    fn build_args<'a>(&'a self, extra: &[&'a str]) -> Vec<String> {
        let mut args: Vec<String> = [
            "build",
            "-l",
            "ids.txt",
            "--structure-dir",
            "pdb",
            "--trajectory-dir",
            "traj",
            "-o",
            "archive",
            "-t",
            "320",
            "-r",
            "1",
            "-b",
            "1",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.extend(extra.iter().map(|s| s.to_string()));
        args
    }

    fn run_build(&self, extra: &[&str]) -> Output {
        let args = self.build_args(extra);
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.mdforge(&refs)
    }
}

fn write_trajectory(path: &Path) {
    DcdTrajectory {
        num_atoms: 3,
        timestep: 0.002,
        frames: (0..4)
            .map(|f| DcdFrame {
                unit_cell: None,
                positions: POSITIONS
                    .iter()
                    .map(|p| [p[0] + 0.1 * f as f32, p[1], p[2]])
                    .collect(),
            })
            .collect(),
    }
    .write_to_path(path)
    .unwrap();
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn build_in_child_processes_writes_archives_and_report() {
    let ws = Workspace::new(&["mol1", "mol2", "ghost"]);
    ws.add_molecule("mol1");
    ws.add_molecule("mol2");

    let output = ws.run_build(&["-w", "2", "--isolation", "process"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let text = stdout(&output);
    assert!(text.contains("3 molecules in 3 batches: 2 written"));
    assert!(text.contains("✅ Command completed successfully."));

    let archive =
        ArchiveFile::read_from_path(ws.path("archive").join("mdforge_dataset_mol1.json.zst"))
            .unwrap();
    let molecule = archive.root.path("mol1").unwrap();
    assert_eq!(molecule.attr("sequence"), Some(&AttrValue::Text("GA".into())));
    let replica = archive.root.path("mol1/sims320K/0").unwrap();
    assert_eq!(replica.dataset("coords").unwrap().shape(), &[4, 3, 3]);
    assert_eq!(replica.dataset("forces").unwrap().shape(), &[4, 3, 3]);

    let report = fs::read_to_string(ws.path("archive").join("build-report.csv")).unwrap();
    assert!(report.contains("ghost,skipped-missing-input"));
    assert!(ws.path("archive").join("run-config.toml").exists());
}

#[test]
fn second_build_skips_everything_in_thread_mode() {
    let ws = Workspace::new(&["mol1"]);
    ws.add_molecule("mol1");

    assert!(ws.run_build(&["--isolation", "thread"]).status.success());
    let first = fs::read(ws.path("archive").join("mdforge_dataset_mol1.json.zst")).unwrap();

    let output = ws.run_build(&["--isolation", "thread"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("0 written, 1 already built"));
    let second = fs::read(ws.path("archive").join("mdforge_dataset_mol1.json.zst")).unwrap();
    assert_eq!(first, second);
}

#[test]
fn plan_reports_pending_work_without_writing() {
    let ws = Workspace::new(&["a", "b", "c"]);
    let mut args = ws.build_args(&["--start-batch", "1"]);
    args[0] = "plan".to_string();
    let refs: Vec<&str> = args.iter().map(String::as_str).collect();
    let output = ws.mdforge(&refs);

    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Batch window:       1 to 2 (2 batch(es))"));
    assert!(text.contains("Pending:            2"));
    assert!(!ws.path("archive").exists());
}

#[test]
fn inspect_prints_the_archive_tree() {
    let ws = Workspace::new(&["mol1"]);
    ws.add_molecule("mol1");
    assert!(ws.run_build(&["--isolation", "thread"]).status.success());

    let output = ws.mdforge(&["inspect", "archive/mdforge_dataset_mol1.json.zst"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("layout: mdforge-protein-only"));
    assert!(text.contains("/mol1/sims320K/0/"));
    assert!(text.contains("coords float32 [4, 3, 3]"));
}

#[test]
fn configuration_errors_exit_with_status_one() {
    let ws = Workspace::new(&["mol1"]);
    let output = ws.mdforge(&["build", "-l", "ids.txt", "-o", "archive"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("❌ Error:"));
}
