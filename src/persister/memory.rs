//! In-process cassette storage

use std::path::PathBuf;

use dashmap::DashMap;

use super::{sanitize, Persister};
use crate::Result;

/// Keeps cassette content in memory, keyed like the file persister
#[derive(Debug, Default)]
pub struct InMemory {
    entries: DashMap<String, Vec<u8>>,
}

impl InMemory {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored cassettes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Persister for InMemory {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(&sanitize(key)).map(|entry| entry.value().clone()))
    }

    fn write(&self, key: &str, content: &[u8]) -> Result<()> {
        self.entries.insert(sanitize(key), content.to_vec());
        Ok(())
    }

    fn absolute_path_to_file(&self, _key: &str) -> Option<PathBuf> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write() {
        let persister = InMemory::new();
        assert!(persister.is_empty());
        assert_eq!(persister.read("a b.yml").unwrap(), None);

        persister.write("a b.yml", b"x").unwrap();
        assert_eq!(persister.read("a_b.yml").unwrap(), Some(b"x".to_vec()));
        assert_eq!(persister.len(), 1);
    }
}
