//! `before_record` / `before_playback` hooks

use std::sync::{Arc, PoisonError, RwLock};

use crate::cassette::CassetteInfo;
use crate::interaction::{HookAwareInteraction, HttpInteraction};

/// Hook callback: may mutate the interaction or mark it ignored
pub type HookFn = dyn Fn(&mut HookAwareInteraction<'_>, &CassetteInfo) + Send + Sync;

/// When a hook runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookType {
    /// On interactions about to be written to a cassette
    BeforeRecord,
    /// On interactions just loaded from a cassette
    BeforePlayback,
}

struct TaggedHook {
    tag: Option<String>,
    hook: Arc<HookFn>,
}

/// Registered hooks, run in registration order
#[derive(Default)]
pub struct Hooks {
    before_record: RwLock<Vec<TaggedHook>>,
    before_playback: RwLock<Vec<TaggedHook>>,
}

impl Hooks {
    /// Create an empty hook set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a hook; with a tag, it only runs for cassettes carrying that tag
    pub fn register<F>(&self, kind: HookType, tag: Option<&str>, hook: F)
    where
        F: Fn(&mut HookAwareInteraction<'_>, &CassetteInfo) + Send + Sync + 'static,
    {
        self.slot(kind)
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(TaggedHook {
                tag: tag.map(str::to_string),
                hook: Arc::new(hook),
            });
    }

    /// Replace a secret with `placeholder` when recording, and back on playback
    ///
    /// `secret` is evaluated per interaction.
    pub fn filter_sensitive_data<F>(&self, placeholder: &str, tag: Option<&str>, secret: F)
    where
        F: Fn(&HttpInteraction) -> String + Send + Sync + 'static,
    {
        let secret = Arc::new(secret);

        let record_secret = Arc::clone(&secret);
        let record_placeholder = placeholder.to_string();
        self.register(HookType::BeforeRecord, tag, move |interaction, _| {
            let text = record_secret(interaction);
            interaction.filter(&text, &record_placeholder);
        });

        let playback_placeholder = placeholder.to_string();
        self.register(HookType::BeforePlayback, tag, move |interaction, _| {
            let text = secret(interaction);
            interaction.filter(&playback_placeholder, &text);
        });
    }

    /// Run matching hooks over `interactions`, dropping any a hook ignored
    pub fn invoke(&self, kind: HookType, interactions: &mut Vec<HttpInteraction>, cassette: &CassetteInfo) {
        let hooks: Vec<Arc<HookFn>> = self
            .slot(kind)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|h| h.tag.as_ref().map_or(true, |tag| cassette.tags.contains(tag)))
            .map(|h| Arc::clone(&h.hook))
            .collect();
        if hooks.is_empty() {
            return;
        }

        interactions.retain_mut(|interaction| {
            let mut aware = HookAwareInteraction::new(interaction);
            for hook in &hooks {
                hook(&mut aware, cassette);
            }
            !aware.is_ignored()
        });
    }

    fn slot(&self, kind: HookType) -> &RwLock<Vec<TaggedHook>> {
        match kind {
            HookType::BeforeRecord => &self.before_record,
            HookType::BeforePlayback => &self.before_playback,
        }
    }
}
