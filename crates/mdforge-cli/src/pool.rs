//! Child-process batch workers.
//!
//! The parent writes a [`WorkerSnapshot`] once and starts one `mdforge worker` child per
//! slot. Each child rebuilds the batch assignment from the snapshot, then serves
//! requests over its standard streams: the parent writes one batch index per line to
//! the child's stdin and reads one JSON-encoded [`WorkerResponse`] per line from its
//! stdout. Child logs go to the inherited stderr.

use crate::error::{CliError, Result};
use mdforge::engine::config::{BuildConfig, ScheduleConfig};
use mdforge::engine::driver::{BatchReport, BatchWorker};
use mdforge::engine::error::PipelineError;
use mdforge::engine::schedule::{BatchScheduler, IdentifierList};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Condvar, Mutex, PoisonError};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Everything a child needs to reproduce the parent's batch assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WorkerSnapshot {
    pub identifiers: Vec<String>,
    pub schedule: ScheduleConfig,
    pub build: BuildConfig,
}

impl WorkerSnapshot {
    pub fn new(scheduler: &BatchScheduler, schedule: &ScheduleConfig, build: &BuildConfig) -> Self {
        Self {
            identifiers: scheduler.identifiers().as_slice().to_vec(),
            schedule: schedule.clone(),
            build: build.clone(),
        }
    }

    pub fn scheduler(&self) -> std::result::Result<BatchScheduler, PipelineError> {
        let identifiers = IdentifierList::new(self.identifiers.iter().cloned());
        Ok(BatchScheduler::from_config(identifiers, &self.schedule)?)
    }

    pub fn read_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    fn write_temporary(&self) -> std::result::Result<NamedTempFile, PipelineError> {
        let text = toml::to_string(self)?;
        let mut file = tempfile::Builder::new()
            .prefix(".mdforge-worker-")
            .suffix(".toml")
            .tempfile()
            .map_err(|e| PipelineError::io(std::env::temp_dir(), e))?;
        file.write_all(text.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| PipelineError::io(file.path().to_path_buf(), e))?;
        Ok(file)
    }
}

/// One line of a child's stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum WorkerResponse {
    Completed { report: BatchReport },
    Failed { message: String },
}

/// Answers every batch index read from `input` with one response line on `output`,
/// until `input` is closed. Returns the number of batches served.
pub fn serve<W: BatchWorker>(worker: &W, input: impl BufRead, mut output: impl Write) -> Result<usize> {
    let mut served = 0;
    for line in input.lines() {
        let line = line?;
        let request = line.trim();
        if request.is_empty() {
            continue;
        }
        let batch_index: usize = request
            .parse()
            .map_err(|_| CliError::Argument(format!("Invalid batch request: '{}'", request)))?;

        let response = match worker.submit(batch_index) {
            Ok(report) => WorkerResponse::Completed { report },
            Err(e) => WorkerResponse::Failed {
                message: e.to_string(),
            },
        };
        serde_json::to_writer(&mut output, &response).map_err(|e| CliError::Other(e.into()))?;
        output.write_all(b"\n")?;
        output.flush()?;
        served += 1;
    }
    Ok(served)
}

/// Verbosity flags forwarded to every child.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChildLogging {
    pub verbose: u8,
    pub quiet: bool,
}

impl ChildLogging {
    fn args(&self) -> Vec<String> {
        if self.quiet {
            vec!["-q".to_string()]
        } else if self.verbose > 0 {
            vec![format!("-{}", "v".repeat(self.verbose as usize))]
        } else {
            Vec::new()
        }
    }
}

/// The program started for each worker and the arguments placed before the
/// `worker` subcommand.
#[derive(Debug, Clone)]
pub struct WorkerLauncher {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl WorkerLauncher {
    /// Re-executes the running binary.
    pub fn current_exe() -> io::Result<Self> {
        Ok(Self {
            program: std::env::current_exe()?,
            args: Vec::new(),
        })
    }
}

enum Reply {
    Report(BatchReport),
    Failed(String),
}

struct WorkerProcess {
    slot: usize,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl WorkerProcess {
    fn spawn(slot: usize, command: &mut Command) -> io::Result<Self> {
        let mut child = command.spawn()?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(io::Error::other("worker streams are not piped"));
        };
        debug!(slot, pid = child.id(), "Started worker process.");
        Ok(Self {
            slot,
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
        })
    }

    /// `Err` means the process can no longer be used.
    fn request(&mut self, batch_index: usize) -> std::result::Result<Reply, PipelineError> {
        let slot = self.slot;
        let broken = |reason: String| {
            PipelineError::Worker(format!(
                "worker {} lost while processing batch {}: {}",
                slot, batch_index, reason
            ))
        };

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| broken("input already closed".to_string()))?;
        writeln!(stdin, "{}", batch_index)
            .and_then(|()| stdin.flush())
            .map_err(|e| broken(e.to_string()))?;

        let mut line = String::new();
        let read = self
            .stdout
            .read_line(&mut line)
            .map_err(|e| broken(e.to_string()))?;
        if read == 0 {
            return Err(broken("process exited".to_string()));
        }

        match serde_json::from_str(line.trim_end()) {
            Ok(WorkerResponse::Completed { report }) if report.index == batch_index => {
                Ok(Reply::Report(report))
            }
            Ok(WorkerResponse::Completed { report }) => Err(broken(format!(
                "answered for batch {} instead",
                report.index
            ))),
            Ok(WorkerResponse::Failed { message }) => Ok(Reply::Failed(message)),
            Err(e) => Err(broken(format!("unreadable response: {}", e))),
        }
    }

    fn shutdown(mut self) {
        drop(self.stdin.take());
        match self.child.wait() {
            Ok(status) if status.success() => debug!(slot = self.slot, "Worker process exited."),
            Ok(status) => warn!(slot = self.slot, "Worker process exited with {}.", status),
            Err(e) => warn!(slot = self.slot, "Failed to wait for worker process: {}", e),
        }
    }

    fn kill(mut self) {
        drop(self.stdin.take());
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

struct PoolState {
    idle: Vec<WorkerProcess>,
    live: usize,
}

/// A fixed set of persistent child processes. Each submitted batch is handed to an idle
/// child; callers block while all children are busy.
pub struct ProcessPool {
    state: Mutex<PoolState>,
    available: Condvar,
    _snapshot: NamedTempFile,
}

impl ProcessPool {
    pub fn spawn(
        launcher: &WorkerLauncher,
        snapshot: &WorkerSnapshot,
        size: usize,
        logging: ChildLogging,
    ) -> std::result::Result<Self, PipelineError> {
        let snapshot_file = snapshot.write_temporary()?;
        let threads = snapshot.build.analysis_threads.to_string();

        let pool = Self {
            state: Mutex::new(PoolState {
                idle: Vec::with_capacity(size),
                live: 0,
            }),
            available: Condvar::new(),
            _snapshot: snapshot_file,
        };

        for slot in 0..size {
            let mut command = Command::new(&launcher.program);
            command
                .args(&launcher.args)
                .args(logging.args())
                .arg("worker")
                .arg("--snapshot")
                .arg(pool._snapshot.path())
                .env("OMP_NUM_THREADS", &threads)
                .env("RAYON_NUM_THREADS", &threads)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit());
            let process = WorkerProcess::spawn(slot, &mut command)
                .map_err(|e| PipelineError::io(&launcher.program, e))?;
            pool.checkin_new(process);
        }

        info!(workers = size, threads = %threads, "Started worker processes.");
        Ok(pool)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn checkin_new(&self, process: WorkerProcess) {
        let mut state = self.lock();
        state.live += 1;
        state.idle.push(process);
    }

    fn checkout(&self) -> std::result::Result<WorkerProcess, PipelineError> {
        let mut state = self.lock();
        loop {
            if let Some(process) = state.idle.pop() {
                return Ok(process);
            }
            if state.live == 0 {
                return Err(PipelineError::Worker(
                    "no worker process is left".to_string(),
                ));
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn checkin(&self, process: WorkerProcess) {
        self.lock().idle.push(process);
        self.available.notify_one();
    }

    fn retire(&self, process: WorkerProcess) {
        process.kill();
        self.lock().live -= 1;
        self.available.notify_all();
    }

    pub fn live_workers(&self) -> usize {
        self.lock().live
    }
}

impl BatchWorker for ProcessPool {
    fn submit(&self, batch_index: usize) -> std::result::Result<BatchReport, PipelineError> {
        let mut process = self.checkout()?;
        debug!(batch = batch_index, slot = process.slot, "Dispatching batch.");
        match process.request(batch_index) {
            Ok(Reply::Report(report)) => {
                self.checkin(process);
                Ok(report)
            }
            Ok(Reply::Failed(message)) => {
                let slot = process.slot;
                self.checkin(process);
                Err(PipelineError::Worker(format!(
                    "batch {} failed in worker {}: {}",
                    batch_index, slot, message
                )))
            }
            Err(e) => {
                self.retire(process);
                Err(e)
            }
        }
    }
}

impl Drop for ProcessPool {
    fn drop(&mut self) {
        let idle = std::mem::take(&mut self.lock().idle);
        for process in idle {
            process.shutdown();
        }
    }
}
