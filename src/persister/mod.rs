//! Cassette storage backends

mod compressed;
mod file_system;
mod memory;

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use regex::Regex;

use crate::{Result, VcrError};

pub use compressed::{Compressed, COMPRESSED_SUFFIX};
pub use file_system::FileSystem;
pub use memory::InMemory;

/// Persister used when a cassette does not name one
pub const DEFAULT_PERSISTER: &str = "file_system";

/// Stores raw cassette bytes under a logical key
pub trait Persister: Send + Sync {
    /// Read the content stored under `key`; `None` when nothing is stored
    ///
    /// # Errors
    ///
    /// Returns a persistence error if existing content cannot be read
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `content` under `key`, replacing what was there
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the content cannot be written
    fn write(&self, key: &str, content: &[u8]) -> Result<()>;

    /// Location of the file backing `key`, if this persister uses files
    fn absolute_path_to_file(&self, key: &str) -> Option<PathBuf>;
}

/// Turn a logical cassette key into a safe relative path
///
/// A trailing `.ext` is kept verbatim; in the rest, every run of characters
/// other than word characters, `-` and `/` becomes a single `_`. Leading
/// slashes are dropped so the result stays under the storage root.
#[must_use]
pub fn sanitize(key: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let unsafe_chars = UNSAFE.get_or_init(|| Regex::new(r"[^\w\-/]+").expect("valid regex"));

    let mut parts: Vec<&str> = key.split('.').collect();
    while parts.len() > 1 && parts.last().is_some_and(|p| p.is_empty()) {
        parts.pop();
    }

    let extension = match parts.last() {
        Some(last) if parts.len() > 1 && !last.contains('/') => {
            let extension = format!(".{last}");
            parts.pop();
            extension
        }
        _ => String::new(),
    };

    let joined = parts.join(".");
    let stem = unsafe_chars.replace_all(&joined, "_");
    format!("{}{extension}", stem.trim_start_matches('/'))
}

/// Registry of persisters by name
pub struct PersisterRegistry {
    persisters: DashMap<String, Arc<dyn Persister>>,
}

impl PersisterRegistry {
    /// Create a registry rooted at `cassette_library_dir`
    ///
    /// Registers `file_system`, `compressed_file_system` and `in_memory`.
    #[must_use]
    pub fn new(cassette_library_dir: &Path) -> Self {
        let registry = Self {
            persisters: DashMap::new(),
        };
        registry.register("file_system", FileSystem::new(cassette_library_dir));
        registry.register(
            "compressed_file_system",
            Compressed::new(FileSystem::new(cassette_library_dir)),
        );
        registry.register("in_memory", InMemory::new());
        registry
    }

    /// Register (or replace) a persister
    pub fn register(&self, name: impl Into<String>, persister: impl Persister + 'static) {
        self.persisters.insert(name.into(), Arc::new(persister));
    }

    /// Look up a persister
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `name` is not registered
    pub fn get(&self, name: &str) -> Result<Arc<dyn Persister>> {
        self.persisters
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                VcrError::Configuration(format!("The requested persister ({name:?}) is not registered"))
            })
    }
}
