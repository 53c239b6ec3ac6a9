//! Gzip-compressed cassette files

use std::io::{Read, Write};
use std::path::PathBuf;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::file_system::{read_file, write_file};
use super::Persister;
use crate::{Result, VcrError};

/// Suffix appended to the wrapped persister's file name
pub const COMPRESSED_SUFFIX: &str = "gz";

/// Default gzip level (0-9)
pub const DEFAULT_GZIP_LEVEL: u32 = 6;

/// Wraps a file-backed persister, storing gzip data at `<path>.gz`
///
/// Path resolution (and so key sanitization) is left to the wrapped
/// persister; only the bytes on disk change.
#[derive(Debug, Clone)]
pub struct Compressed<P> {
    inner: P,
    level: u32,
}

impl<P: Persister> Compressed<P> {
    /// Wrap `inner` with the default compression level
    pub fn new(inner: P) -> Self {
        Self::with_level(inner, DEFAULT_GZIP_LEVEL)
    }

    /// Wrap `inner` with an explicit level, clamped to 0-9
    pub fn with_level(inner: P, level: u32) -> Self {
        Self {
            inner,
            level: level.clamp(0, 9),
        }
    }

    fn storage_path(&self, key: &str) -> Result<PathBuf> {
        self.absolute_path_to_file(key).ok_or_else(|| {
            VcrError::Configuration(format!(
                "The compressed persister needs a file-backed persister to resolve {key:?}"
            ))
        })
    }
}

impl<P: Persister> Persister for Compressed<P> {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.storage_path(key)?;
        let Some(compressed) = read_file(&path)? else {
            return Ok(None);
        };

        let mut content = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut content)
            .map_err(|e| VcrError::read_failed(&path, e))?;
        Ok(Some(content))
    }

    fn write(&self, key: &str, content: &[u8]) -> Result<()> {
        let path = self.storage_path(key)?;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(self.level));
        encoder
            .write_all(content)
            .map_err(|e| VcrError::write_failed(&path, e))?;
        let compressed = encoder
            .finish()
            .map_err(|e| VcrError::write_failed(&path, e))?;

        write_file(&path, &compressed)
    }

    fn absolute_path_to_file(&self, key: &str) -> Option<PathBuf> {
        self.inner.absolute_path_to_file(key).map(|path| {
            let mut path = path.into_os_string();
            path.push(".");
            path.push(COMPRESSED_SUFFIX);
            PathBuf::from(path)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persister::{FileSystem, InMemory};
    use tempfile::TempDir;

    #[test]
    fn test_round_trip_through_gzip() {
        let dir = TempDir::new().unwrap();
        let persister = Compressed::new(FileSystem::new(dir.path()));
        let content = "http_interactions: []\n".repeat(100);

        persister.write("nested/my cassette.yml", content.as_bytes()).unwrap();

        let path = dir.path().join("nested/my_cassette.yml.gz");
        let on_disk = std::fs::read(&path).unwrap();
        assert_eq!(&on_disk[..2], &[0x1f, 0x8b]);
        assert!(on_disk.len() < content.len());

        let read = persister.read("nested/my cassette.yml").unwrap().unwrap();
        assert_eq!(read, content.as_bytes());
    }

    #[test]
    fn test_missing_key_reads_none() {
        let dir = TempDir::new().unwrap();
        let persister = Compressed::new(FileSystem::new(dir.path()));
        assert_eq!(persister.read("absent.yml").unwrap(), None);
    }

    #[test]
    fn test_sanitization_matches_wrapped_persister() {
        let dir = TempDir::new().unwrap();
        let plain = FileSystem::new(dir.path());
        let compressed = Compressed::new(plain.clone());

        let plain_path = plain.absolute_path_to_file("a 1/b.json").unwrap();
        let gz_path = compressed.absolute_path_to_file("a 1/b.json").unwrap();
        assert_eq!(
            gz_path.to_string_lossy(),
            format!("{}.gz", plain_path.to_string_lossy())
        );
    }

    #[test]
    fn test_corrupt_data_is_persistence_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("bad.yml.gz"), b"not gzip").unwrap();
        let persister = Compressed::new(FileSystem::new(dir.path()));

        assert!(matches!(
            persister.read("bad.yml").err().unwrap(),
            VcrError::Persistence { .. }
        ));
    }

    #[test]
    fn test_requires_file_backed_inner() {
        let persister = Compressed::new(InMemory::new());
        assert!(matches!(
            persister.write("a.yml", b"x").err().unwrap(),
            VcrError::Configuration(_)
        ));
    }
}
