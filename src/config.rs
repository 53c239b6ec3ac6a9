//! Configuration types for cassette-vcr

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::matchers::MatcherRef;
use crate::persister::DEFAULT_PERSISTER;
use crate::serializer::DEFAULT_SERIALIZER;
use crate::template::TemplateVariables;
use crate::{Result, VcrError};

/// How a cassette treats recorded and new interactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordMode {
    /// Never replay; record every request
    All,
    /// Replay only; never record
    None,
    /// Replay what is recorded and record what is not
    NewEpisodes,
    /// Record only while the cassette file is empty, replay afterwards
    #[default]
    Once,
}

impl RecordMode {
    /// Name used in configuration files
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::None => "none",
            Self::NewEpisodes => "new_episodes",
            Self::Once => "once",
        }
    }
}

impl fmt::Display for RecordMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordMode {
    type Err = VcrError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(Self::All),
            "none" => Ok(Self::None),
            "new_episodes" => Ok(Self::NewEpisodes),
            "once" => Ok(Self::Once),
            other => Err(VcrError::Configuration(format!(
                "{other:?} is not a valid cassette record mode. \
                 Valid modes are: all, none, new_episodes, once"
            ))),
        }
    }
}

/// Options controlling one cassette
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CassetteOptions {
    /// Record mode
    pub record: RecordMode,
    /// Matchers a recorded request must satisfy, in order
    pub match_requests_on: Vec<MatcherRef>,
    /// Template rendering of the cassette content
    pub template_variables: TemplateVariables,
    /// Replay used interactions again once the unused ones run out
    pub allow_playback_repeats: bool,
    /// Allow ejecting with interactions never played back
    pub allow_unused_http_interactions: bool,
    /// Do not fall back to enclosing cassettes
    pub exclusive: bool,
    /// Serializer name
    pub serialize_with: String,
    /// Persister name
    pub persist_with: String,
    /// Re-record when the oldest interaction is older than this many seconds
    pub re_record_interval: Option<u64>,
    /// When writing, drop old interactions outside `re_record_interval`
    pub clean_outdated_http_interactions: bool,
    /// Fix `Content-Length` headers of played-back responses
    pub update_content_length_header: bool,
    /// Write new interactions even if the run using the cassette failed
    pub record_on_error: bool,
    /// When writing, drop old interactions that were never played back
    pub drop_unused_requests: bool,
    /// Tags selecting tagged hooks
    pub tags: Vec<String>,
}

impl Default for CassetteOptions {
    fn default() -> Self {
        Self {
            record: RecordMode::default(),
            match_requests_on: MatcherRef::defaults(),
            template_variables: TemplateVariables::default(),
            allow_playback_repeats: false,
            allow_unused_http_interactions: true,
            exclusive: false,
            serialize_with: DEFAULT_SERIALIZER.to_string(),
            persist_with: DEFAULT_PERSISTER.to_string(),
            re_record_interval: None,
            clean_outdated_http_interactions: false,
            update_content_length_header: false,
            record_on_error: true,
            drop_unused_requests: false,
            tags: Vec::new(),
        }
    }
}

impl CassetteOptions {
    /// Set the record mode
    #[must_use]
    pub fn with_record(mut self, record: RecordMode) -> Self {
        self.record = record;
        self
    }

    /// Set the matchers
    #[must_use]
    pub fn with_matchers<I, M>(mut self, matchers: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<MatcherRef>,
    {
        self.match_requests_on = matchers.into_iter().map(Into::into).collect();
        self
    }

    /// Set the template variables
    #[must_use]
    pub fn with_template_variables(mut self, variables: TemplateVariables) -> Self {
        self.template_variables = variables;
        self
    }

    /// Set the serializer by name
    #[must_use]
    pub fn with_serializer(mut self, name: impl Into<String>) -> Self {
        self.serialize_with = name.into();
        self
    }

    /// Set the persister by name
    #[must_use]
    pub fn with_persister(mut self, name: impl Into<String>) -> Self {
        self.persist_with = name.into();
        self
    }

    /// Add a tag
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Check option combinations
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty serializer or persister
    /// name, a zero re-record interval, or outdated-interaction cleaning
    /// without an interval
    pub fn validate(&self) -> Result<()> {
        if self.serialize_with.is_empty() {
            return Err(VcrError::Configuration("serialize_with cannot be empty".to_string()));
        }

        if self.persist_with.is_empty() {
            return Err(VcrError::Configuration("persist_with cannot be empty".to_string()));
        }

        if self.re_record_interval == Some(0) {
            return Err(VcrError::Configuration("re_record_interval must be > 0".to_string()));
        }

        if self.clean_outdated_http_interactions && self.re_record_interval.is_none() {
            return Err(VcrError::Configuration(
                "clean_outdated_http_interactions requires re_record_interval".to_string(),
            ));
        }

        Ok(())
    }
}

/// Engine-wide configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory of file-backed cassettes
    pub cassette_library_dir: PathBuf,
    /// Options used by cassettes inserted without explicit ones
    #[serde(default)]
    pub default_cassette_options: CassetteOptions,
    /// Let real requests through when no cassette is inserted
    #[serde(default)]
    pub allow_http_connections_when_no_cassette: bool,
    /// Hosts whose requests bypass cassettes
    #[serde(default)]
    pub ignore_hosts: Vec<String>,
    /// Whether requests to the local machine bypass cassettes
    #[serde(default)]
    pub ignore_localhost: bool,
}

impl Config {
    /// Configuration with defaults, storing cassettes under `cassette_library_dir`
    pub fn new(cassette_library_dir: impl Into<PathBuf>) -> Self {
        Self {
            cassette_library_dir: cassette_library_dir.into(),
            default_cassette_options: CassetteOptions::default(),
            allow_http_connections_when_no_cassette: false,
            ignore_hosts: Vec::new(),
            ignore_localhost: false,
        }
    }

    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, parsed or validated
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| VcrError::Configuration(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| VcrError::Configuration(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// The library directory may not exist yet; it is created on first write.
    ///
    /// # Errors
    ///
    /// Returns error if the directory path is empty or names a file, or the
    /// default cassette options are invalid
    pub fn validate(&self) -> Result<()> {
        if self.cassette_library_dir.as_os_str().is_empty() {
            return Err(VcrError::Configuration(
                "cassette_library_dir cannot be empty".to_string(),
            ));
        }

        if self.cassette_library_dir.exists() && !self.cassette_library_dir.is_dir() {
            return Err(VcrError::Configuration(format!(
                "cassette_library_dir is not a directory: {}",
                self.cassette_library_dir.display()
            )));
        }

        for (i, host) in self.ignore_hosts.iter().enumerate() {
            if host.trim().is_empty() {
                return Err(VcrError::Configuration(format!(
                    "ignore_hosts[{i}] cannot be empty"
                )));
            }
        }

        self.default_cassette_options.validate()
    }
}
