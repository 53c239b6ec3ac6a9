//! Matching engine: hands out recorded responses for incoming requests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::interaction::{HttpInteraction, Request, Response};
use crate::matchers::ResolvedMatcher;
use crate::{Result, VcrError};

/// Where a list looks when it has nothing for a request
#[derive(Debug, Clone, Default)]
pub enum ParentList {
    /// No fallback: nothing matches, nothing remains
    #[default]
    Null,
    /// The list of the enclosing cassette
    List(Arc<HttpInteractionList>),
}

impl ParentList {
    fn interaction_for(&self, request: &Request) -> Option<Arc<HttpInteraction>> {
        match self {
            Self::Null => None,
            Self::List(list) => list.interaction_for(request),
        }
    }

    fn has_interaction_matching(&self, request: &Request) -> bool {
        match self {
            Self::Null => false,
            Self::List(list) => list.has_interaction_matching(request),
        }
    }

    fn has_used_interaction_matching(&self, request: &Request) -> bool {
        match self {
            Self::Null => false,
            Self::List(list) => list.has_used_interaction_matching(request),
        }
    }

    /// Unused count of the parent list itself (0 for `Null`)
    pub fn remaining_unused_interaction_count(&self) -> usize {
        match self {
            Self::Null => 0,
            Self::List(list) => list.remaining_unused_interaction_count(),
        }
    }
}

#[derive(Debug, Default)]
struct ListState {
    unused: Vec<Arc<HttpInteraction>>,
    /// Most recently used first
    used: VecDeque<Arc<HttpInteraction>>,
}

/// Recorded interactions of one cassette, split into unused and used
///
/// Interactions only ever move from unused to used. The unused scan, the
/// move and the repeat scan happen under a single lock, so one recorded
/// interaction is handed out at most once (unless repeats are allowed).
/// Matchers run while that lock is held and must not call back into the
/// same list.
#[derive(Debug)]
pub struct HttpInteractionList {
    state: Mutex<ListState>,
    matchers: Vec<ResolvedMatcher>,
    allow_playback_repeats: bool,
    parent: ParentList,
    log_prefix: String,
}

impl HttpInteractionList {
    /// Build a list over `interactions`, all initially unused
    pub fn new(
        interactions: Vec<Arc<HttpInteraction>>,
        matchers: Vec<ResolvedMatcher>,
        allow_playback_repeats: bool,
        parent: ParentList,
        log_prefix: impl Into<String>,
    ) -> Self {
        Self {
            state: Mutex::new(ListState {
                unused: interactions,
                used: VecDeque::new(),
            }),
            matchers,
            allow_playback_repeats,
            parent,
            log_prefix: log_prefix.into(),
        }
    }

    /// Response recorded for `request`, if this list or a parent has one
    pub fn response_for(&self, request: &Request) -> Option<Response> {
        self.interaction_for(request)
            .map(|interaction| interaction.response.clone())
    }

    /// Like [`response_for`](Self::response_for), returning the whole interaction
    pub fn interaction_for(&self, request: &Request) -> Option<Arc<HttpInteraction>> {
        {
            let mut state = self.lock();

            if let Some(index) = state
                .unused
                .iter()
                .position(|interaction| self.matches(request, interaction))
            {
                let interaction = state.unused.remove(index);
                state.used.push_front(Arc::clone(&interaction));
                debug!(
                    "{} Found matching interaction for {} at index {}: {}",
                    self.log_prefix,
                    request.summary(),
                    index,
                    interaction.response.summary()
                );
                return Some(interaction);
            }

            if self.allow_playback_repeats {
                if let Some(interaction) = state
                    .used
                    .iter()
                    .find(|interaction| self.matches(request, interaction))
                {
                    debug!(
                        "{} Repeating previously used interaction for {}: {}",
                        self.log_prefix,
                        request.summary(),
                        interaction.response.summary()
                    );
                    return Some(Arc::clone(interaction));
                }
            }
        }

        self.parent.interaction_for(request)
    }

    /// Whether a call to `response_for` would currently find something
    pub fn has_interaction_matching(&self, request: &Request) -> bool {
        let local = {
            let state = self.lock();
            state.unused.iter().any(|i| self.matches(request, i))
                || (self.allow_playback_repeats && state.used.iter().any(|i| self.matches(request, i)))
        };
        local || self.parent.has_interaction_matching(request)
    }

    /// Whether a matching interaction has already been played back
    pub fn has_used_interaction_matching(&self, request: &Request) -> bool {
        let local = self.lock().used.iter().any(|i| self.matches(request, i));
        local || self.parent.has_used_interaction_matching(request)
    }

    /// Number of interactions in this list not yet played back
    pub fn remaining_unused_interaction_count(&self) -> usize {
        self.lock().unused.len()
    }

    /// Snapshot of the interactions not yet played back, in recorded order
    pub fn unused_interactions(&self) -> Vec<Arc<HttpInteraction>> {
        self.lock().unused.clone()
    }

    /// Snapshot of the played-back interactions, most recent first
    pub fn used_interactions(&self) -> Vec<Arc<HttpInteraction>> {
        self.lock().used.iter().cloned().collect()
    }

    /// The list consulted on a local miss
    pub fn parent(&self) -> &ParentList {
        &self.parent
    }

    /// Fail if any interaction of this list was never played back
    ///
    /// # Errors
    ///
    /// Returns [`VcrError::UnusedInteractions`] describing each leftover
    pub fn assert_no_unused_interactions(&self) -> Result<()> {
        let state = self.lock();
        if state.unused.is_empty() {
            return Ok(());
        }

        let description: Vec<String> = state
            .unused
            .iter()
            .map(|i| format!("  - {} => {}", i.request.summary(), i.response.summary()))
            .collect();
        Err(VcrError::UnusedInteractions(description.join("\n")))
    }

    fn matches(&self, request: &Request, interaction: &HttpInteraction) -> bool {
        self.matchers.iter().all(|matcher| {
            let matched = matcher.matches(request, &interaction.request);
            trace!(
                "{} {} {} matcher {} against {}",
                self.log_prefix,
                request.summary(),
                if matched { "matched" } else { "did not match" },
                matcher.name(),
                interaction.request.summary()
            );
            matched
        })
    }

    fn lock(&self) -> MutexGuard<'_, ListState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
