//! The cassette stack and the API HTTP adapters talk to

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::{debug, info, warn};

use crate::cassette::{Cassette, CassetteContext, CassetteInfo, EjectOptions, ParentList};
use crate::config::{CassetteOptions, Config};
use crate::hooks::{HookType, Hooks};
use crate::ignorer::RequestIgnorer;
use crate::interaction::{HookAwareInteraction, HttpInteraction, Request, Response};
use crate::matchers::RequestMatcherRegistry;
use crate::persister::PersisterRegistry;
use crate::serializer::SerializerRegistry;
use crate::{Result, VcrError};

type UriNormalizer = dyn Fn(&str) -> String + Send + Sync;

/// Record/replay engine: configuration, registries and the cassette stack
///
/// Cassettes nest; the most recently inserted one is current, and its
/// interaction list falls back to the lists of the cassettes below it.
pub struct Vcr {
    config: Config,
    request_matchers: RequestMatcherRegistry,
    serializers: SerializerRegistry,
    persisters: PersisterRegistry,
    hooks: Arc<Hooks>,
    ignorer: RequestIgnorer,
    cassettes: Mutex<Vec<Arc<Cassette>>>,
    turned_off: AtomicBool,
    ignore_cassettes: AtomicBool,
    uri_normalizer: RwLock<Option<Arc<UriNormalizer>>>,
}

impl Vcr {
    /// Create an engine from `config`
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is invalid
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let ignorer = RequestIgnorer::new();
        ignorer.ignore_hosts(&config.ignore_hosts);
        if config.ignore_localhost {
            ignorer.ignore_localhost();
        }

        info!(
            "Cassette library: {}",
            config.cassette_library_dir.display()
        );

        Ok(Self {
            request_matchers: RequestMatcherRegistry::new(),
            serializers: SerializerRegistry::new(),
            persisters: PersisterRegistry::new(&config.cassette_library_dir),
            hooks: Arc::new(Hooks::new()),
            ignorer,
            cassettes: Mutex::new(Vec::new()),
            turned_off: AtomicBool::new(false),
            ignore_cassettes: AtomicBool::new(false),
            uri_normalizer: RwLock::new(None),
            config,
        })
    }

    /// Create an engine from a TOML configuration file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be loaded or is invalid
    pub fn from_config_file(path: &Path) -> Result<Self> {
        Self::new(Config::from_file(path)?)
    }

    /// Engine configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Options to start from when inserting a cassette
    pub fn default_cassette_options(&self) -> CassetteOptions {
        self.config.default_cassette_options.clone()
    }

    /// Named request matchers
    pub fn request_matchers(&self) -> &RequestMatcherRegistry {
        &self.request_matchers
    }

    /// Named serializers
    pub fn serializers(&self) -> &SerializerRegistry {
        &self.serializers
    }

    /// Named persisters
    pub fn persisters(&self) -> &PersisterRegistry {
        &self.persisters
    }

    /// Requests that bypass cassettes
    pub fn ignorer(&self) -> &RequestIgnorer {
        &self.ignorer
    }

    /// Register a hook run on interactions before they are written
    pub fn before_record<F>(&self, tag: Option<&str>, hook: F)
    where
        F: Fn(&mut HookAwareInteraction<'_>, &CassetteInfo) + Send + Sync + 'static,
    {
        self.hooks.register(HookType::BeforeRecord, tag, hook);
    }

    /// Register a hook run on interactions right after they are loaded
    pub fn before_playback<F>(&self, tag: Option<&str>, hook: F)
    where
        F: Fn(&mut HookAwareInteraction<'_>, &CassetteInfo) + Send + Sync + 'static,
    {
        self.hooks.register(HookType::BeforePlayback, tag, hook);
    }

    /// Keep the text returned by `secret` out of cassette files
    ///
    /// It is written as `placeholder` and restored on playback.
    pub fn filter_sensitive_data<F>(&self, placeholder: &str, tag: Option<&str>, secret: F)
    where
        F: Fn(&HttpInteraction) -> String + Send + Sync + 'static,
    {
        self.hooks.filter_sensitive_data(placeholder, tag, secret);
    }

    /// Canonicalize request URIs before they are matched or recorded
    pub fn set_uri_normalizer<F>(&self, normalizer: F)
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        *self
            .uri_normalizer
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(normalizer));
    }

    /// Push a cassette onto the stack
    ///
    /// Returns `Ok(None)` when turned off with `ignore_cassettes`.
    ///
    /// # Errors
    ///
    /// Returns [`VcrError::TurnedOff`] when turned off, a
    /// [`VcrError::NamingConflict`] if a cassette with this name is already
    /// inserted, or any error from loading the cassette
    pub fn insert_cassette(&self, name: &str, options: CassetteOptions) -> Result<Option<Arc<Cassette>>> {
        let context = CassetteContext {
            matchers: &self.request_matchers,
            serializers: &self.serializers,
            persisters: &self.persisters,
            hooks: &self.hooks,
            ignorer: &self.ignorer,
        };

        loop {
            let top = {
                let stack = self.lock_stack();
                if !self.insertable(&stack, name)? {
                    return Ok(None);
                }
                stack.last().cloned()
            };

            // Loading runs playback hooks, which may call back into the engine
            let parent = top.as_ref().map_or(ParentList::Null, |cassette| {
                ParentList::List(Arc::clone(cassette.http_interactions()))
            });
            let cassette = Arc::new(Cassette::new(name, options.clone(), &context, parent)?);

            let mut stack = self.lock_stack();
            if !self.insertable(&stack, name)? {
                return Ok(None);
            }
            let unchanged = match (stack.last(), &top) {
                (Some(current), Some(top)) => Arc::ptr_eq(current, top),
                (None, None) => true,
                _ => false,
            };
            if !unchanged {
                debug!("Cassette stack changed while loading '{}', reloading", name);
                continue;
            }
            stack.push(Arc::clone(&cassette));

            debug!("Cassette stack depth: {}", stack.len());
            return Ok(Some(cassette));
        }
    }

    /// `Ok(false)` when the insertion is silently skipped
    ///
    /// Called with the stack locked, so `turn_off` cannot race it.
    fn insertable(&self, stack: &[Arc<Cassette>], name: &str) -> Result<bool> {
        if self.turned_off.load(Ordering::SeqCst) {
            if self.ignore_cassettes.load(Ordering::SeqCst) {
                info!("Ignoring insertion of cassette '{}': VCR is turned off", name);
                return Ok(false);
            }
            return Err(VcrError::TurnedOff);
        }
        if stack.iter().any(|cassette| cassette.name() == name) {
            return Err(VcrError::NamingConflict {
                name: name.to_string(),
            });
        }
        Ok(true)
    }

    /// Pop the current cassette and eject it
    ///
    /// The cassette leaves the stack even when ejecting fails.
    ///
    /// # Errors
    ///
    /// Returns any error from [`Cassette::eject`]
    pub fn eject_cassette(&self, options: EjectOptions) -> Result<Option<Arc<Cassette>>> {
        let Some(cassette) = self.lock_stack().pop() else {
            return Ok(None);
        };
        cassette.eject(options)?;
        Ok(Some(cassette))
    }

    /// The innermost inserted cassette
    pub fn current_cassette(&self) -> Option<Arc<Cassette>> {
        self.lock_stack().last().cloned()
    }

    /// Inserted cassettes, outermost first
    pub fn cassettes(&self) -> Vec<Arc<Cassette>> {
        self.lock_stack().clone()
    }

    /// Insert a cassette, run `f`, and eject it again
    ///
    /// When `f` fails the cassette is marked as failed before ejecting, and
    /// `f`'s error wins over an eject error.
    ///
    /// # Errors
    ///
    /// Returns the error from inserting, from `f`, or from ejecting
    pub fn use_cassette<T, E, F>(&self, name: &str, options: CassetteOptions, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(Option<&Arc<Cassette>>) -> std::result::Result<T, E>,
        E: From<VcrError>,
    {
        let cassette = self.insert_cassette(name, options)?;
        let outcome = f(cassette.as_ref());

        let ejected = match &cassette {
            Some(cassette) => {
                if outcome.is_err() {
                    cassette.mark_run_failed();
                }
                self.eject_cassette(EjectOptions::default()).map(|_| ())
            }
            None => Ok(()),
        };

        match outcome {
            Ok(value) => {
                ejected?;
                Ok(value)
            }
            Err(e) => {
                if let Err(eject_error) = ejected {
                    warn!("Failed to eject cassette '{}': {}", name, eject_error);
                }
                Err(e)
            }
        }
    }

    /// Recorded response for `request` from the current cassette
    pub fn response_for(&self, request: &Request) -> Option<Response> {
        let request = self.normalize(request.clone());
        if self.ignorer.ignore(&request) {
            debug!("Ignoring request {}", request.summary());
            return None;
        }
        self.current_cassette()?.response_for(&request)
    }

    /// Hand a real interaction to the current cassette
    ///
    /// Returns whether it was recorded.
    pub fn record_http_interaction(&self, mut interaction: HttpInteraction) -> bool {
        interaction.request = self.normalize(interaction.request);
        if self.ignorer.ignore(&interaction.request) {
            debug!("Not recording ignored request {}", interaction.request.summary());
            return false;
        }
        match self.current_cassette() {
            Some(cassette) => cassette.record_http_interaction(interaction),
            None => false,
        }
    }

    /// Unused interactions left in the current cassette
    pub fn http_interactions_remaining_unused_count(&self) -> usize {
        self.current_cassette().map_or(0, |cassette| {
            cassette.http_interactions().remaining_unused_interaction_count()
        })
    }

    /// Whether a request without a recorded response may hit the network
    pub fn real_http_connections_allowed(&self) -> bool {
        match self.current_cassette() {
            Some(cassette) => cassette.recording(),
            None => self.turned_off() || self.config.allow_http_connections_when_no_cassette,
        }
    }

    /// Whether `request` bypasses cassettes
    pub fn should_ignore(&self, request: &Request) -> bool {
        self.ignorer.ignore(&self.normalize(request.clone()))
    }

    /// Stop using cassettes
    ///
    /// With `ignore_cassettes`, later insertions are silently skipped
    /// instead of failing.
    ///
    /// # Errors
    ///
    /// Returns [`VcrError::CassetteInUse`] if a cassette is inserted
    pub fn turn_off(&self, ignore_cassettes: bool) -> Result<()> {
        let stack = self.lock_stack();
        if let Some(cassette) = stack.last() {
            return Err(VcrError::CassetteInUse(cassette.name().to_string()));
        }

        self.ignore_cassettes.store(ignore_cassettes, Ordering::SeqCst);
        self.turned_off.store(true, Ordering::SeqCst);
        info!("VCR turned off (ignore_cassettes: {})", ignore_cassettes);
        Ok(())
    }

    /// Resume using cassettes
    pub fn turn_on(&self) {
        self.turned_off.store(false, Ordering::SeqCst);
        self.ignore_cassettes.store(false, Ordering::SeqCst);
        info!("VCR turned on");
    }

    /// Whether cassettes are in use
    pub fn turned_on(&self) -> bool {
        !self.turned_off()
    }

    fn turned_off(&self) -> bool {
        self.turned_off.load(Ordering::SeqCst)
    }

    fn normalize(&self, mut request: Request) -> Request {
        let normalizer = self
            .uri_normalizer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(normalizer) = normalizer {
            request.uri = normalizer(&request.uri);
        }
        request
    }

    fn lock_stack(&self) -> MutexGuard<'_, Vec<Arc<Cassette>>> {
        self.cassettes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
