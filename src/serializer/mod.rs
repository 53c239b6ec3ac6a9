//! Cassette serializers: interaction documents to and from text

mod json;
mod yaml;

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::interaction::HttpInteraction;
use crate::{Result, VcrError};

pub use json::JsonSerializer;
pub use yaml::YamlSerializer;

/// Serializer used when a cassette does not name one
pub const DEFAULT_SERIALIZER: &str = "yaml";

/// Errors raised by a serializer
#[derive(Debug, Error)]
pub enum FormatError {
    /// The document could not be rendered
    #[error("failed to serialize cassette: {0}")]
    Serialize(Box<dyn std::error::Error + Send + Sync>),

    /// The text is not a valid cassette document
    #[error("failed to deserialize cassette: {0}")]
    Deserialize(Box<dyn std::error::Error + Send + Sync>),
}

/// Everything persisted for one cassette
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CassetteDocument {
    /// Interactions in recorded order
    pub http_interactions: Vec<HttpInteraction>,
    /// Informational tool/version string; not interpreted when read back
    #[serde(default)]
    pub recorded_with: String,
}

impl CassetteDocument {
    /// Wrap interactions, stamping the crate name and version
    #[must_use]
    pub fn new(http_interactions: Vec<HttpInteraction>) -> Self {
        Self {
            http_interactions,
            recorded_with: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Converts a [`CassetteDocument`] to and from its persisted text
pub trait Serializer: Send + Sync {
    /// Extension of files written with this serializer, without the dot
    fn file_extension(&self) -> &str;

    /// Render a document
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be represented
    fn serialize(&self, document: &CassetteDocument) -> std::result::Result<String, FormatError>;

    /// Parse a document
    ///
    /// # Errors
    ///
    /// Returns an error if `text` is not a valid cassette
    fn deserialize(&self, text: &str) -> std::result::Result<CassetteDocument, FormatError>;
}

/// Registry of serializers by name
pub struct SerializerRegistry {
    serializers: DashMap<String, Arc<dyn Serializer>>,
}

impl SerializerRegistry {
    /// Create a registry with `yaml` and `json` registered
    #[must_use]
    pub fn new() -> Self {
        let registry = Self {
            serializers: DashMap::new(),
        };
        registry.register("yaml", YamlSerializer);
        registry.register("json", JsonSerializer);
        registry
    }

    /// Register (or replace) a serializer
    pub fn register(&self, name: impl Into<String>, serializer: impl Serializer + 'static) {
        self.serializers.insert(name.into(), Arc::new(serializer));
    }

    /// Look up a serializer
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `name` is not registered
    pub fn get(&self, name: &str) -> Result<Arc<dyn Serializer>> {
        self.serializers
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                VcrError::Configuration(format!("The requested serializer ({name:?}) is not registered"))
            })
    }
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
