//! Plain files under the cassette library directory

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{sanitize, Persister};
use crate::{Result, VcrError};

/// Stores each cassette as a file named after its sanitized key
#[derive(Debug, Clone)]
pub struct FileSystem {
    storage_location: PathBuf,
}

impl FileSystem {
    /// Persist under `storage_location`
    #[must_use]
    pub fn new(storage_location: impl Into<PathBuf>) -> Self {
        Self {
            storage_location: storage_location.into(),
        }
    }

    /// Root directory for cassette files
    pub fn storage_location(&self) -> &Path {
        &self.storage_location
    }
}

impl Persister for FileSystem {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        read_file(&self.storage_location.join(sanitize(key)))
    }

    fn write(&self, key: &str, content: &[u8]) -> Result<()> {
        write_file(&self.storage_location.join(sanitize(key)), content)
    }

    fn absolute_path_to_file(&self, key: &str) -> Option<PathBuf> {
        Some(self.storage_location.join(sanitize(key)))
    }
}

/// Read a whole file; a missing file is `None`
pub(super) fn read_file(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(VcrError::read_failed(path, e)),
    }
}

/// Write a whole file, creating missing parent directories
pub(super) fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(directory) = path.parent() {
        fs::create_dir_all(directory).map_err(|e| VcrError::write_failed(directory, e))?;
    }
    fs::write(path, content).map_err(|e| VcrError::write_failed(path, e))?;

    debug!("Wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}
