//! Requests that bypass cassettes entirely

use std::sync::{Arc, PoisonError, RwLock};

use dashmap::DashSet;

use crate::interaction::Request;

/// Host names treated as the local machine
pub const LOCALHOST_ALIASES: [&str; 3] = ["localhost", "127.0.0.1", "0.0.0.0"];

type IgnorePredicate = dyn Fn(&Request) -> bool + Send + Sync;

/// Decides which requests are never recorded or played back
#[derive(Default)]
pub struct RequestIgnorer {
    hosts: DashSet<String>,
    predicates: RwLock<Vec<Arc<IgnorePredicate>>>,
}

impl RequestIgnorer {
    /// Ignore nothing
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ignore requests to these hosts (case-insensitive)
    pub fn ignore_hosts<I, S>(&self, hosts: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for host in hosts {
            self.hosts.insert(host.as_ref().to_ascii_lowercase());
        }
    }

    /// Stop ignoring these hosts
    pub fn unignore_hosts<I, S>(&self, hosts: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for host in hosts {
            self.hosts.remove(&host.as_ref().to_ascii_lowercase());
        }
    }

    /// Ignore requests to the local machine
    pub fn ignore_localhost(&self) {
        self.ignore_hosts(LOCALHOST_ALIASES);
    }

    /// Ignore requests for which `predicate` returns true
    pub fn ignore_request<F>(&self, predicate: F)
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.predicates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(predicate));
    }

    /// Whether `request` should bypass cassettes
    pub fn ignore(&self, request: &Request) -> bool {
        let host_ignored = request
            .parsed_uri()
            .and_then(|uri| uri.host().map(str::to_ascii_lowercase))
            .is_some_and(|host| self.hosts.contains(&host));

        host_ignored
            || self
                .predicates
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .any(|predicate| predicate(request))
    }
}
