//! Error types for cassette-vcr

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for cassette-vcr operations
pub type Result<T> = std::result::Result<T, VcrError>;

/// Errors that can occur while inserting, using or ejecting cassettes
#[derive(Debug, Error)]
pub enum VcrError {
    /// Unknown matcher/serializer/persister name or an invalid option
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A cassette with the same name is already on the stack
    #[error(
        "There is already a cassette with the same name ({name}). \
         You cannot nest multiple cassettes with the same name."
    )]
    NamingConflict {
        /// Name of the conflicting cassette
        name: String,
    },

    /// Cassette insertion attempted while recording is turned off
    #[error(
        "VCR is turned off. You must turn it on before you can insert a cassette, \
         or turn it off with `ignore_cassettes` to ignore insertions."
    )]
    TurnedOff,

    /// An operation requires that no cassette is inserted
    #[error(
        "A cassette is currently in use ({0}). You must eject it before you can turn VCR off."
    )]
    CassetteInUse(String),

    /// A cassette template references a variable that was not supplied
    #[error(
        "The template in the {cassette} cassette file references undefined variable {variable}. \
         Pass it to the cassette using template_variables: {example}."
    )]
    MissingTemplateVariable {
        /// Cassette being rendered
        cassette: String,
        /// The undefined variable
        variable: String,
        /// Variable mapping that would satisfy the template
        example: String,
    },

    /// Cassette content could not be parsed
    #[error("The cassette {cassette} contains invalid content: {reason}. Please check it for syntax errors.")]
    InvalidCassetteFormat {
        /// Cassette file or name
        cassette: String,
        /// Parser message
        reason: String,
    },

    /// Storage read/write failure
    #[error("Failed to {action} cassette file {}: {source}", path.display())]
    Persistence {
        /// "read" or "write"
        action: &'static str,
        /// File involved
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// A serializer could not render the cassette
    #[error(transparent)]
    Format(#[from] crate::serializer::FormatError),

    /// Recorded interactions were left unplayed on eject
    #[error("There are unused HTTP interactions left in the cassette:\n{0}")]
    UnusedInteractions(String),
}

impl VcrError {
    /// Build a persistence error for a failed read
    pub(crate) fn read_failed(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Persistence {
            action: "read",
            path: path.into(),
            source,
        }
    }

    /// Build a persistence error for a failed write
    pub(crate) fn write_failed(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Persistence {
            action: "write",
            path: path.into(),
            source,
        }
    }
}
