//! Cassettes: a named, persisted set of HTTP interactions
//!
//! A cassette is loaded when inserted, serves recorded responses through its
//! [`HttpInteractionList`], collects newly recorded interactions while
//! active, and writes the merged set back when ejected.

pub mod interaction_list;

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::{CassetteOptions, RecordMode};
use crate::hooks::{HookType, Hooks};
use crate::ignorer::RequestIgnorer;
use crate::interaction::{HttpInteraction, Request, Response};
use crate::matchers::{RequestMatcherRegistry, ResolvedMatcher};
use crate::persister::{Persister, PersisterRegistry};
use crate::serializer::{CassetteDocument, Serializer, SerializerRegistry};
use crate::template::CassetteContentReader;
use crate::{Result, VcrError};

pub use interaction_list::{HttpInteractionList, ParentList};

/// What hooks get to know about the cassette they run for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CassetteInfo {
    /// Cassette name
    pub name: String,
    /// Effective record mode
    pub record_mode: RecordMode,
    /// Cassette tags
    pub tags: Vec<String>,
}

/// Options for ejecting a cassette
#[derive(Debug, Clone, Copy, Default)]
pub struct EjectOptions {
    /// Do not fail when interactions were left unplayed
    pub skip_no_unused_interactions_assertion: bool,
}

/// Shared engine pieces a cassette is built from
pub(crate) struct CassetteContext<'a> {
    pub matchers: &'a RequestMatcherRegistry,
    pub serializers: &'a SerializerRegistry,
    pub persisters: &'a PersisterRegistry,
    pub hooks: &'a Arc<Hooks>,
    pub ignorer: &'a RequestIgnorer,
}

/// A cassette inserted into a [`Vcr`](crate::vcr::Vcr)
pub struct Cassette {
    name: String,
    options: CassetteOptions,
    record_mode: RecordMode,
    storage_key: String,
    log_prefix: String,
    serializer: Arc<dyn Serializer>,
    persister: Arc<dyn Persister>,
    matchers: Vec<ResolvedMatcher>,
    hooks: Arc<Hooks>,
    originally_had_interactions: bool,
    originally_recorded_at: Option<DateTime<Utc>>,
    previously_recorded: Vec<Arc<HttpInteraction>>,
    http_interactions: Arc<HttpInteractionList>,
    new_recorded: Mutex<Vec<HttpInteraction>>,
    run_failed: AtomicBool,
    ejected: AtomicBool,
}

impl Cassette {
    /// Load the cassette `name` and chain its list to `parent`
    pub(crate) fn new(
        name: &str,
        options: CassetteOptions,
        context: &CassetteContext<'_>,
        parent: ParentList,
    ) -> Result<Self> {
        options.validate()?;
        let serializer = context.serializers.get(&options.serialize_with)?;
        let persister = context.persisters.get(&options.persist_with)?;
        let matchers = context.matchers.resolve(&options.match_requests_on)?;

        let storage_key = format!("{name}.{}", serializer.file_extension());
        let log_prefix = format!("[Cassette: '{name}']");

        let raw = CassetteContentReader::new(persister.as_ref(), name)
            .read(&storage_key, &options.template_variables)?;
        let had_content = raw.as_deref().is_some_and(|text| !text.trim().is_empty());

        let mut loaded = match raw {
            Some(text) if had_content => {
                serializer
                    .deserialize(&text)
                    .map_err(|e| VcrError::InvalidCassetteFormat {
                        cassette: describe_location(persister.as_ref(), &storage_key),
                        reason: e.to_string(),
                    })?
                    .http_interactions
            }
            _ => Vec::new(),
        };

        let originally_had_interactions = !loaded.is_empty();
        let originally_recorded_at = loaded.iter().map(|i| i.recorded_at).min();
        let record_mode = effective_record_mode(&options, originally_recorded_at, &log_prefix);

        let info = CassetteInfo {
            name: name.to_string(),
            record_mode,
            tags: options.tags.clone(),
        };
        context
            .hooks
            .invoke(HookType::BeforePlayback, &mut loaded, &info);
        loaded.retain(|interaction| !context.ignorer.ignore(&interaction.request));
        if options.update_content_length_header {
            for interaction in &mut loaded {
                interaction.response.update_content_length_header();
            }
        }

        let previously_recorded: Vec<Arc<HttpInteraction>> = loaded.into_iter().map(Arc::new).collect();
        let playback = if record_mode == RecordMode::All {
            Vec::new()
        } else {
            previously_recorded.clone()
        };
        let parent = if options.exclusive { ParentList::Null } else { parent };

        let http_interactions = Arc::new(HttpInteractionList::new(
            playback,
            matchers.clone(),
            options.allow_playback_repeats,
            parent,
            log_prefix.clone(),
        ));

        info!(
            "{} Inserted with record mode {}: {} recorded interactions",
            log_prefix,
            record_mode,
            previously_recorded.len()
        );

        Ok(Self {
            name: name.to_string(),
            options,
            record_mode,
            storage_key,
            log_prefix,
            serializer,
            persister,
            matchers,
            hooks: Arc::clone(context.hooks),
            originally_had_interactions,
            originally_recorded_at,
            previously_recorded,
            http_interactions,
            new_recorded: Mutex::new(Vec::new()),
            run_failed: AtomicBool::new(false),
            ejected: AtomicBool::new(false),
        })
    }

    /// Cassette name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Options the cassette was inserted with
    pub fn options(&self) -> &CassetteOptions {
        &self.options
    }

    /// Effective record mode (`all` when a re-record is due)
    pub fn record_mode(&self) -> RecordMode {
        self.record_mode
    }

    /// Cassette tags
    pub fn tags(&self) -> &[String] {
        &self.options.tags
    }

    /// Name, mode and tags, as handed to hooks
    pub fn info(&self) -> CassetteInfo {
        CassetteInfo {
            name: self.name.clone(),
            record_mode: self.record_mode,
            tags: self.options.tags.clone(),
        }
    }

    /// Whether new interactions are being recorded
    pub fn recording(&self) -> bool {
        match self.record_mode {
            RecordMode::None => false,
            RecordMode::Once => !self.originally_had_interactions,
            RecordMode::All | RecordMode::NewEpisodes => true,
        }
    }

    /// Whether the cassette file held interactions when inserted
    pub fn originally_had_interactions(&self) -> bool {
        self.originally_had_interactions
    }

    /// Oldest `recorded_at` of the loaded interactions
    pub fn originally_recorded_at(&self) -> Option<DateTime<Utc>> {
        self.originally_recorded_at
    }

    /// Backing file, for file-based persisters
    pub fn file(&self) -> Option<PathBuf> {
        self.persister.absolute_path_to_file(&self.storage_key)
    }

    /// The matching engine serving this cassette
    pub fn http_interactions(&self) -> &Arc<HttpInteractionList> {
        &self.http_interactions
    }

    /// Interactions loaded from storage, after playback hooks
    pub fn previously_recorded_interactions(&self) -> &[Arc<HttpInteraction>] {
        &self.previously_recorded
    }

    /// Recorded response for `request`
    pub fn response_for(&self, request: &Request) -> Option<Response> {
        self.http_interactions.response_for(request)
    }

    /// Add a newly made interaction; returns false when not recording
    pub fn record_http_interaction(&self, interaction: HttpInteraction) -> bool {
        if !self.recording() {
            debug!(
                "{} Not recording {} (record mode {})",
                self.log_prefix,
                interaction.request.summary(),
                self.record_mode
            );
            return false;
        }

        debug!(
            "{} Recorded HTTP interaction {} => {}",
            self.log_prefix,
            interaction.request.summary(),
            interaction.response.summary()
        );
        self.lock_new_recorded().push(interaction);
        true
    }

    /// Interactions recorded since insertion
    pub fn new_recorded_interactions(&self) -> Vec<HttpInteraction> {
        self.lock_new_recorded().clone()
    }

    /// Mark the run using this cassette as failed
    pub fn mark_run_failed(&self) {
        self.run_failed.store(true, Ordering::SeqCst);
    }

    /// Whether the run using this cassette failed
    pub fn run_failed(&self) -> bool {
        self.run_failed.load(Ordering::SeqCst)
    }

    /// Whether the cassette has been ejected
    pub fn is_ejected(&self) -> bool {
        self.ejected.load(Ordering::SeqCst)
    }

    /// Write new interactions and check for unused ones
    ///
    /// Only the first call does anything.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails, or [`VcrError::UnusedInteractions`]
    /// when `allow_unused_http_interactions` is off and interactions were
    /// left unplayed
    pub fn eject(&self, options: EjectOptions) -> Result<()> {
        if self.ejected.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if self.run_failed() && !self.options.record_on_error {
            warn!(
                "{} Run failed; not writing new interactions (record_on_error is off)",
                self.log_prefix
            );
        } else {
            self.write_recorded_interactions()?;
        }

        if !options.skip_no_unused_interactions_assertion
            && !self.options.allow_unused_http_interactions
            && !self.run_failed()
        {
            self.http_interactions.assert_no_unused_interactions()?;
        }

        info!("{} Ejected", self.log_prefix);
        Ok(())
    }

    fn write_recorded_interactions(&self) -> Result<()> {
        let new_interactions = self.new_recorded_interactions();
        if new_interactions.is_empty() {
            return Ok(());
        }

        let mut interactions = self.merged_interactions(new_interactions);
        self.hooks
            .invoke(HookType::BeforeRecord, &mut interactions, &self.info());
        if interactions.is_empty() {
            debug!("{} Every interaction was ignored; nothing to write", self.log_prefix);
            return Ok(());
        }

        let count = interactions.len();
        let text = self.serializer.serialize(&CassetteDocument::new(interactions))?;
        self.persister.write(&self.storage_key, text.as_bytes())?;

        info!(
            "{} Wrote {} interactions to {}",
            self.log_prefix,
            count,
            describe_location(self.persister.as_ref(), &self.storage_key)
        );
        Ok(())
    }

    /// Old interactions worth keeping followed by the new ones
    fn merged_interactions(&self, new_interactions: Vec<HttpInteraction>) -> Vec<HttpInteraction> {
        let mut old = self.previously_recorded.clone();

        if self.options.drop_unused_requests {
            let used = self.http_interactions.used_interactions();
            old.retain(|interaction| used.iter().any(|u| Arc::ptr_eq(u, interaction)));
        }

        if self.record_mode == RecordMode::All {
            let replacements = HttpInteractionList::new(
                new_interactions.iter().cloned().map(Arc::new).collect(),
                self.matchers.clone(),
                false,
                ParentList::Null,
                self.log_prefix.clone(),
            );
            old.retain(|interaction| replacements.interaction_for(&interaction.request).is_none());
        }

        if self.options.clean_outdated_http_interactions {
            if let Some(interval) = self.options.re_record_interval {
                let now = Utc::now();
                old.retain(|interaction| !is_older_than(interaction.recorded_at, interval, now));
            }
        }

        old.iter()
            .map(|interaction| HttpInteraction::clone(interaction))
            .chain(new_interactions)
            .collect()
    }

    fn lock_new_recorded(&self) -> MutexGuard<'_, Vec<HttpInteraction>> {
        self.new_recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Cassette {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cassette")
            .field("name", &self.name)
            .field("record_mode", &self.record_mode)
            .field("storage_key", &self.storage_key)
            .field("ejected", &self.is_ejected())
            .finish_non_exhaustive()
    }
}

fn effective_record_mode(
    options: &CassetteOptions,
    originally_recorded_at: Option<DateTime<Utc>>,
    log_prefix: &str,
) -> RecordMode {
    match (options.re_record_interval, originally_recorded_at) {
        (Some(interval), Some(recorded_at)) if is_older_than(recorded_at, interval, Utc::now()) => {
            info!(
                "{} Re-recording: interactions from {} are older than {}s",
                log_prefix, recorded_at, interval
            );
            RecordMode::All
        }
        _ => options.record,
    }
}

fn is_older_than(recorded_at: DateTime<Utc>, interval_secs: u64, now: DateTime<Utc>) -> bool {
    u64::try_from((now - recorded_at).num_seconds()).map_or(false, |age| age > interval_secs)
}

fn describe_location(persister: &dyn Persister, storage_key: &str) -> String {
    persister
        .absolute_path_to_file(storage_key)
        .map_or_else(|| storage_key.to_string(), |path| path.display().to_string())
}
