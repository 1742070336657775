use super::error::PipelineError;
use crate::core::archive::{ArchiveFile, Group};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

const SCRATCH_PREFIX: &str = ".mdforge-";
const SCRATCH_SUFFIX: &str = ".partial";

/// An archive under construction, backed by a hidden temporary file in the directory
/// it will be published to.
///
/// Nothing appears at the final path until [`ScratchArchive::publish`] succeeds. A
/// scratch archive that is dropped unpublished removes its temporary file.
pub struct ScratchArchive {
    file: NamedTempFile,
    archive: ArchiveFile,
}

impl ScratchArchive {
    pub fn create(dir: &Path, layout: &str) -> Result<Self, PipelineError> {
        let file = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .suffix(SCRATCH_SUFFIX)
            .tempfile_in(dir)
            .map_err(|e| PipelineError::io(dir, e))?;
        debug!(path = %file.path().display(), "Created scratch archive.");
        Ok(Self {
            file,
            archive: ArchiveFile::new(layout),
        })
    }

    pub fn root_mut(&mut self) -> &mut Group {
        &mut self.archive.root
    }

    pub fn scratch_path(&self) -> &Path {
        self.file.path()
    }

    /// Encodes the archive, flushes it to stable storage and atomically renames it to
    /// `final_path`. An existing file at `final_path` is replaced.
    pub fn publish(mut self, final_path: &Path) -> Result<(), PipelineError> {
        let scratch_path = self.file.path().to_path_buf();
        {
            let mut writer = BufWriter::new(self.file.as_file_mut());
            self.archive
                .write_to(&mut writer)
                .map_err(|source| PipelineError::Archive {
                    path: scratch_path.clone(),
                    source,
                })?;
            writer
                .flush()
                .map_err(|e| PipelineError::io(&scratch_path, e))?;
        }
        self.file
            .as_file()
            .sync_all()
            .map_err(|e| PipelineError::io(&scratch_path, e))?;

        make_shareable(&self.file).map_err(|e| PipelineError::io(&scratch_path, e))?;

        self.file
            .persist(final_path)
            .map_err(|e| PipelineError::io(final_path, e.error))?;
        debug!(path = %final_path.display(), "Published archive.");
        Ok(())
    }
}

// Temp files are created owner-only; published files are meant to be shared.
#[cfg(unix)]
fn make_shareable(file: &NamedTempFile) -> std::io::Result<()> {
    use std::fs::Permissions;
    use std::os::unix::fs::PermissionsExt;
    file.as_file().set_permissions(Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn make_shareable(_file: &NamedTempFile) -> std::io::Result<()> {
    Ok(())
}

/// Replaces `path` with `contents` through a temporary sibling file and a rename.
pub fn write_file_atomically(path: &Path, contents: &[u8]) -> Result<(), PipelineError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = tempfile::Builder::new()
        .prefix(SCRATCH_PREFIX)
        .suffix(SCRATCH_SUFFIX)
        .tempfile_in(dir)
        .map_err(|e| PipelineError::io(dir, e))?;
    file.write_all(contents)
        .and_then(|()| file.as_file().sync_all())
        .and_then(|()| make_shareable(&file))
        .map_err(|e| PipelineError::io(file.path().to_path_buf(), e))?;
    file.persist(path)
        .map_err(|e| PipelineError::io(path, e.error))?;
    Ok(())
}

/// Scratch files left in `dir` by writers that were killed before publishing or
/// cleaning up. A missing or unreadable directory has none.
pub fn scratch_leftovers(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut found: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.starts_with(SCRATCH_PREFIX) && name.ends_with(SCRATCH_SUFFIX)
        })
        .map(|entry| entry.path())
        .collect();
    found.sort();
    found
}
