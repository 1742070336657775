use super::TrajectoryLocator;
use crate::engine::error::DiscoveryError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Finds trajectory chunks in a `<root>/<id>/<id>_<T>_<replica>/` directory tree.
///
/// Chunk files end with the position suffix and carry their sequence number as the
/// last run of digits before it (`0.traj.dcd`, `run-1.traj.dcd`, ...). They are
/// returned in chunk order, and the numbering must be gap-free.
#[derive(Debug, Clone)]
pub struct FsTrajectoryLocator {
    root: PathBuf,
    position_suffix: String,
}

impl FsTrajectoryLocator {
    pub fn new(root: impl Into<PathBuf>, position_suffix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            position_suffix: position_suffix.into(),
        }
    }

    pub fn replica_dir(&self, identifier: &str, temperature: u32, replica: usize) -> PathBuf {
        self.root
            .join(identifier)
            .join(format!("{}_{}_{}", identifier, temperature, replica))
    }
}

fn chunk_number(stem: &str) -> Option<u64> {
    let digits_end = stem.rfind(|c: char| c.is_ascii_digit())? + 1;
    let digits_start = stem[..digits_end]
        .rfind(|c: char| !c.is_ascii_digit())
        .map_or(0, |i| i + 1);
    stem[digits_start..digits_end].parse().ok()
}

fn list_dir(dir: &Path) -> Result<fs::ReadDir, DiscoveryError> {
    fs::read_dir(dir).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => DiscoveryError::MissingDirectory {
            path: dir.to_path_buf(),
        },
        _ => DiscoveryError::Io {
            path: dir.to_path_buf(),
            source,
        },
    })
}

impl TrajectoryLocator for FsTrajectoryLocator {
    fn trajectory_files(
        &self,
        identifier: &str,
        temperature: u32,
        replica: usize,
    ) -> Result<Vec<PathBuf>, DiscoveryError> {
        let dir = self.replica_dir(identifier, temperature, replica);
        if !dir.is_dir() {
            return Err(DiscoveryError::MissingDirectory { path: dir });
        }

        let mut chunks: Vec<(Option<u64>, String, PathBuf)> = Vec::new();
        for entry in list_dir(&dir)? {
            let entry = entry.map_err(|source| DiscoveryError::Io {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(stem) = name.strip_suffix(&self.position_suffix) else {
                continue;
            };
            chunks.push((chunk_number(stem), name.clone(), path));
        }

        if chunks.is_empty() {
            return Err(DiscoveryError::NoTrajectories {
                path: dir,
                suffix: self.position_suffix.clone(),
            });
        }

        let numbered = chunks.iter().filter(|(n, _, _)| n.is_some()).count();
        if numbered != 0 && numbered != chunks.len() {
            return Err(DiscoveryError::Inconsistent {
                path: dir,
                reason: "mix of numbered and unnumbered chunk files".to_string(),
            });
        }

        chunks.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        if numbered > 1 {
            for pair in chunks.windows(2) {
                if let (Some(prev), Some(next)) = (pair[0].0, pair[1].0) {
                    if next == prev {
                        return Err(DiscoveryError::Inconsistent {
                            path: dir,
                            reason: format!("chunk {} appears more than once", prev),
                        });
                    }
                    if next != prev + 1 {
                        return Err(DiscoveryError::Inconsistent {
                            path: dir,
                            reason: format!("chunks {} to {} are missing", prev + 1, next - 1),
                        });
                    }
                }
            }
        }

        trace!(dir = %dir.display(), count = chunks.len(), "Discovered trajectory chunks.");
        Ok(chunks.into_iter().map(|(_, _, path)| path).collect())
    }
}
