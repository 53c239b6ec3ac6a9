//! Named request matchers deciding when two requests are "the same"

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

use crate::interaction::Request;
use crate::{Result, VcrError};

/// Matchers used when a cassette does not name any
pub const DEFAULT_MATCHERS: [&str; 2] = ["method", "uri"];

/// Compares an incoming request against a recorded one
pub trait RequestMatcher: Send + Sync {
    /// Whether `incoming` should be served by the interaction recorded for `recorded`
    fn matches(&self, incoming: &Request, recorded: &Request) -> bool;
}

impl<F> RequestMatcher for F
where
    F: Fn(&Request, &Request) -> bool + Send + Sync,
{
    fn matches(&self, incoming: &Request, recorded: &Request) -> bool {
        self(incoming, recorded)
    }
}

/// A matcher named in cassette options: registered name or inline comparator
#[derive(Clone)]
pub enum MatcherRef {
    /// Look the matcher up in the registry
    Named(String),
    /// Use this comparator directly
    Custom(Arc<dyn RequestMatcher>),
}

impl MatcherRef {
    /// Wrap an inline comparator
    pub fn custom(matcher: impl RequestMatcher + 'static) -> Self {
        Self::Custom(Arc::new(matcher))
    }

    /// Name used in log lines
    pub fn label(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Custom(_) => "custom",
        }
    }

    /// The built-in `method` + `uri` pair
    pub fn defaults() -> Vec<Self> {
        DEFAULT_MATCHERS.iter().map(|name| Self::from(*name)).collect()
    }
}

impl From<&str> for MatcherRef {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl fmt::Debug for MatcherRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{name:?}"),
            Self::Custom(_) => f.write_str("<custom>"),
        }
    }
}

impl Serialize for MatcherRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Named(name) => serializer.serialize_str(name),
            Self::Custom(_) => Err(serde::ser::Error::custom(
                "inline request matchers cannot be serialized",
            )),
        }
    }
}

impl<'de> Deserialize<'de> for MatcherRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::Named)
    }
}

/// A matcher resolved against the registry, ready for comparisons
#[derive(Clone)]
pub struct ResolvedMatcher {
    name: String,
    matcher: Arc<dyn RequestMatcher>,
}

impl ResolvedMatcher {
    /// Name the matcher was resolved from
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the comparison
    pub fn matches(&self, incoming: &Request, recorded: &Request) -> bool {
        self.matcher.matches(incoming, recorded)
    }
}

impl fmt::Debug for ResolvedMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Registry of named request matchers
pub struct RequestMatcherRegistry {
    matchers: DashMap<String, Arc<dyn RequestMatcher>>,
}

impl RequestMatcherRegistry {
    /// Create a registry holding the built-in matchers
    #[must_use]
    pub fn new() -> Self {
        let registry = Self {
            matchers: DashMap::new(),
        };
        registry.insert("method", |a: &Request, b: &Request| a.method == b.method);
        registry.insert("uri", |a: &Request, b: &Request| a.uri == b.uri);
        registry.insert("host", |a: &Request, b: &Request| host(a) == host(b));
        registry.insert("path", |a: &Request, b: &Request| path(a) == path(b));
        registry.insert("query", |a: &Request, b: &Request| {
            query_pairs(query(a).as_deref(), &[]) == query_pairs(query(b).as_deref(), &[])
        });
        registry.insert("body", |a: &Request, b: &Request| a.body == b.body);
        registry.insert("body_as_json", body_as_json);
        registry.insert("headers", |a: &Request, b: &Request| a.headers == b.headers);
        registry
    }

    /// Register a matcher, replacing (with a warning) any existing one
    pub fn register(&self, name: impl Into<String>, matcher: impl RequestMatcher + 'static) {
        let name = name.into();
        if self.matchers.contains_key(&name) {
            warn!(
                "There is already a request matcher registered for {:?}. Overriding it.",
                name
            );
        }
        self.insert(&name, matcher);
    }

    fn insert(&self, name: &str, matcher: impl RequestMatcher + 'static) {
        self.matchers.insert(name.to_string(), Arc::new(matcher));
    }

    /// Look up a registered matcher
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the registered matchers if
    /// `name` is unknown
    pub fn get(&self, name: &str) -> Result<Arc<dyn RequestMatcher>> {
        self.matchers
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                let known: Vec<String> = self.names().iter().map(|n| format!("{n:?}")).collect();
                VcrError::Configuration(format!(
                    "There is no matcher registered for {name:?}. Did you mean one of {}?",
                    known.join(", ")
                ))
            })
    }

    /// Resolve matcher references, preserving their order
    ///
    /// # Errors
    ///
    /// Returns a configuration error for the first unknown name
    pub fn resolve(&self, refs: &[MatcherRef]) -> Result<Vec<ResolvedMatcher>> {
        refs.iter()
            .map(|matcher_ref| match matcher_ref {
                MatcherRef::Named(name) => Ok(ResolvedMatcher {
                    name: name.clone(),
                    matcher: self.get(name)?,
                }),
                MatcherRef::Custom(matcher) => Ok(ResolvedMatcher {
                    name: "custom".to_string(),
                    matcher: Arc::clone(matcher),
                }),
            })
            .collect()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.matchers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// A matcher comparing URIs while ignoring the given query parameters
    pub fn uri_without_params(params: &[&str]) -> MatcherRef {
        let ignored: Vec<String> = params.iter().map(|p| (*p).to_string()).collect();
        MatcherRef::custom(move |a: &Request, b: &Request| {
            partial_uri(&a.uri, &ignored) == partial_uri(&b.uri, &ignored)
        })
    }
}

impl Default for RequestMatcherRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn host(request: &Request) -> Option<String> {
    request
        .parsed_uri()
        .and_then(|uri| uri.host().map(str::to_ascii_lowercase))
}

fn path(request: &Request) -> Option<String> {
    request.parsed_uri().map(|uri| uri.path().to_string())
}

fn query(request: &Request) -> Option<String> {
    request
        .parsed_uri()
        .and_then(|uri| uri.query().map(str::to_string))
}

fn body_as_json(a: &Request, b: &Request) -> bool {
    let parse = |request: &Request| {
        serde_json::from_str::<serde_json::Value>(request.body.as_deref().unwrap_or("")).ok()
    };
    match (parse(a), parse(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Decoded, sorted query pairs minus the `ignored` keys
fn query_pairs(query: Option<&str>, ignored: &[String]) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = query
        .unwrap_or("")
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(key), decode(value))
        })
        .filter(|(key, _)| !ignored.contains(key))
        .collect();
    pairs.sort();
    pairs
}

fn decode(component: &str) -> String {
    let spaced = component.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| spaced.clone())
}

fn partial_uri<'a>(uri: &'a str, ignored: &[String]) -> (&'a str, Vec<(String, String)>) {
    let without_fragment = uri.split('#').next().unwrap_or(uri);
    match without_fragment.split_once('?') {
        Some((base, query)) => (base, query_pairs(Some(query), ignored)),
        None => (without_fragment, Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(registry: &RequestMatcherRegistry, name: &str, a: &Request, b: &Request) -> bool {
        registry.get(name).unwrap().matches(a, b)
    }

    #[test]
    fn test_method_and_uri() {
        let registry = RequestMatcherRegistry::new();
        let get = Request::get("http://example.com/a");
        let post = Request::new("POST", "http://example.com/a", None, Default::default());

        assert!(!check(&registry, "method", &get, &post));
        assert!(check(&registry, "uri", &get, &post));
        assert!(check(
            &registry,
            "uri",
            &Request::get("http://example.com/a"),
            &Request::get("http://example.com:80/a")
        ));
    }

    #[test]
    fn test_host_and_path() {
        let registry = RequestMatcherRegistry::new();
        let a = Request::get("http://Example.com/foo?x=1");
        let b = Request::get("https://example.com/foo?x=2");
        let c = Request::get("http://other.com/bar");

        assert!(check(&registry, "host", &a, &b));
        assert!(check(&registry, "path", &a, &b));
        assert!(!check(&registry, "host", &a, &c));
        assert!(!check(&registry, "path", &a, &c));
    }

    #[test]
    fn test_query_ignores_order_and_encoding() {
        let registry = RequestMatcherRegistry::new();
        let a = Request::get("http://e.com/?b=2&a=hello%20world");
        let b = Request::get("http://e.com/other?a=hello+world&b=2");
        let c = Request::get("http://e.com/?a=1");

        assert!(check(&registry, "query", &a, &b));
        assert!(!check(&registry, "query", &a, &c));
    }

    #[test]
    fn test_body_headers_and_json() {
        let registry = RequestMatcherRegistry::new();
        let a = Request::get("http://e.com/").with_body(r#"{"a":1,"b":2}"#);
        let b = Request::get("http://e.com/").with_body(r#"{ "b": 2, "a": 1 }"#);

        assert!(!check(&registry, "body", &a, &b));
        assert!(check(&registry, "body_as_json", &a, &b));
        assert!(check(&registry, "headers", &a, &b));
        assert!(!check(
            &registry,
            "headers",
            &a,
            &b.clone().with_header("Accept", "*/*")
        ));
    }

    #[test]
    fn test_unknown_matcher_is_configuration_error() {
        let registry = RequestMatcherRegistry::new();
        let err = registry.resolve(&["method".into(), "colour".into()]).err().unwrap();

        assert!(matches!(err, VcrError::Configuration(_)));
        assert!(err.to_string().contains("\"colour\""));
        assert!(err.to_string().contains("\"method\""));
    }

    #[test]
    fn test_resolve_keeps_order_and_custom() {
        let registry = RequestMatcherRegistry::new();
        let resolved = registry
            .resolve(&[
                "uri".into(),
                MatcherRef::custom(|_: &Request, _: &Request| true),
                "method".into(),
            ])
            .unwrap();

        let names: Vec<&str> = resolved.iter().map(ResolvedMatcher::name).collect();
        assert_eq!(names, vec!["uri", "custom", "method"]);
    }

    #[test]
    fn test_register_overrides() {
        let registry = RequestMatcherRegistry::new();
        registry.register("uri", |_: &Request, _: &Request| true);

        let a = Request::get("http://a.com/");
        let b = Request::get("http://b.com/");
        assert!(check(&registry, "uri", &a, &b));
    }

    #[test]
    fn test_uri_without_params() {
        let matcher = RequestMatcherRegistry::uri_without_params(&["timestamp"]);
        let registry = RequestMatcherRegistry::new();
        let resolved = registry.resolve(&[matcher]).unwrap();

        let a = Request::get("http://e.com/api?id=1&timestamp=100");
        let b = Request::get("http://e.com/api?timestamp=200&id=1");
        let c = Request::get("http://e.com/api?id=2&timestamp=100");

        assert!(resolved[0].matches(&a, &b));
        assert!(!resolved[0].matches(&a, &c));
    }

    #[test]
    fn test_matcher_ref_serde() {
        let refs: Vec<MatcherRef> = serde_json::from_str(r#"["method","host"]"#).unwrap();
        assert_eq!(refs[1].label(), "host");
        assert_eq!(serde_json::to_string(&refs).unwrap(), r#"["method","host"]"#);

        let inline = RequestMatcherRegistry::uri_without_params(&["x"]);
        assert!(serde_json::to_string(&inline).is_err());
    }
}
