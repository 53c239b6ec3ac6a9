//! Recorded HTTP interactions: requests, responses and their pairing

mod filter;
mod format;
pub mod normalize;

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use chrono::{DateTime, SubsecRound, Utc};
use http::Uri;
use serde::{Deserialize, Serialize};

pub use filter::FilterText;

/// Header map: name to list of values
pub type Headers = BTreeMap<String, Vec<String>>;

/// An outbound HTTP request as seen by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "format::RequestFields")]
pub struct Request {
    /// Lowercase method name (`get`, `post`, ...)
    pub method: String,
    /// Absolute URI with an explicit port
    pub uri: String,
    /// Request body, `None` when there is none
    #[serde(with = "format::body")]
    pub body: Option<String>,
    /// Request headers
    pub headers: Headers,
}

impl Request {
    /// Create a normalized request
    #[must_use]
    pub fn new(
        method: &str,
        uri: impl Into<String>,
        body: Option<String>,
        headers: Headers,
    ) -> Self {
        let uri = uri.into();
        Self {
            method: normalize::normalize_method(method),
            uri: normalize::with_explicit_port(&uri),
            body,
            headers,
        }
    }

    /// Shorthand for a body-less request without headers
    #[must_use]
    pub fn get(uri: impl Into<String>) -> Self {
        Self::new("get", uri, None, Headers::new())
    }

    /// Append a header value
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.entry(name.into()).or_default().push(value.into());
        self
    }

    /// Replace the body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Parse the URI, `None` if it is not a valid URI
    pub fn parsed_uri(&self) -> Option<Uri> {
        self.uri.parse().ok()
    }

    /// `get http://host/path` summary used in log lines and error messages
    pub fn summary(&self) -> String {
        format!("[{} {}]", self.method, self.uri)
    }
}

impl FilterText for Request {
    fn filter_text(&mut self, text: &str, replacement: &str) {
        self.uri.filter_text(text, replacement);
        self.body.filter_text(text, replacement);
        self.headers.filter_text(text, replacement);
    }
}

/// Response status line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "format::StatusFields")]
pub struct ResponseStatus {
    /// Status code
    pub code: u16,
    /// Trimmed reason phrase, `None` when blank
    pub message: Option<String>,
}

impl ResponseStatus {
    /// Create a status, normalizing the message
    #[must_use]
    pub fn new(code: u16, message: Option<String>) -> Self {
        Self {
            code,
            message: normalize::status_message(message),
        }
    }
}

/// A recorded HTTP response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "format::ResponseFields")]
pub struct Response {
    /// Status code and message
    pub status: ResponseStatus,
    /// Response headers
    pub headers: Headers,
    /// Response body
    #[serde(with = "format::body")]
    pub body: Option<String>,
    /// HTTP version (`1.1`), if known
    pub http_version: Option<String>,
}

impl Response {
    /// Create a response
    #[must_use]
    pub fn new(
        status: ResponseStatus,
        headers: Headers,
        body: Option<String>,
        http_version: Option<String>,
    ) -> Self {
        Self {
            status,
            headers,
            body,
            http_version,
        }
    }

    /// Shorthand for a `200 OK` response with a body
    #[must_use]
    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(
            ResponseStatus::new(200, Some("OK".to_string())),
            Headers::new(),
            Some(body.into()),
            Some("1.1".to_string()),
        )
    }

    /// Append a header value
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.entry(name.into()).or_default().push(value.into());
        self
    }

    /// Rewrite an existing `Content-Length` header to match the body
    ///
    /// The header is matched case-insensitively and never added when absent.
    pub fn update_content_length_header(&mut self) {
        let length = self.body.as_ref().map_or(0, String::len).to_string();
        if let Some(values) = self
            .headers
            .iter_mut()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .map(|(_, values)| values)
        {
            *values = vec![length];
        }
    }

    /// `200 OK` style summary used in log lines
    pub fn summary(&self) -> String {
        match &self.status.message {
            Some(message) => format!("[{} {message}]", self.status.code),
            None => format!("[{}]", self.status.code),
        }
    }
}

impl FilterText for Response {
    fn filter_text(&mut self, text: &str, replacement: &str) {
        self.status.message.filter_text(text, replacement);
        self.headers.filter_text(text, replacement);
        self.body.filter_text(text, replacement);
        self.http_version.filter_text(text, replacement);
    }
}

/// A request/response pair and the time it was recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpInteraction {
    /// The request
    pub request: Request,
    /// The response served for it
    pub response: Response,
    /// Recording time, whole seconds
    #[serde(with = "format::http_date")]
    pub recorded_at: DateTime<Utc>,
}

impl HttpInteraction {
    /// Pair a request and response recorded at `recorded_at`
    #[must_use]
    pub fn new(request: Request, response: Response, recorded_at: DateTime<Utc>) -> Self {
        Self {
            request,
            response,
            recorded_at: recorded_at.trunc_subsecs(0),
        }
    }

    /// Pair a request and response recorded now
    #[must_use]
    pub fn recorded_now(request: Request, response: Response) -> Self {
        Self::new(request, response, Utc::now())
    }

    /// Replace `text` with `replacement` everywhere in the request and response
    ///
    /// Does nothing when either string is empty.
    pub fn filter(&mut self, text: &str, replacement: &str) -> &mut Self {
        if !text.is_empty() && !replacement.is_empty() {
            self.request.filter_text(text, replacement);
            self.response.filter_text(text, replacement);
        }
        self
    }

    /// Copy of this interaction with `text` replaced by `replacement`
    #[must_use]
    pub fn filtered(&self, text: &str, replacement: &str) -> Self {
        let mut copy = self.clone();
        copy.filter(text, replacement);
        copy
    }
}

/// Interaction handed to hooks, with a transient ignore flag
///
/// The flag lives on this wrapper only, so it never reaches a cassette file.
#[derive(Debug)]
pub struct HookAwareInteraction<'a> {
    interaction: &'a mut HttpInteraction,
    ignored: bool,
}

impl<'a> HookAwareInteraction<'a> {
    /// Wrap an interaction; it starts out not ignored
    pub fn new(interaction: &'a mut HttpInteraction) -> Self {
        Self {
            interaction,
            ignored: false,
        }
    }

    /// Drop this interaction from the set being recorded or played back
    pub fn ignore(&mut self) {
        self.ignored = true;
    }

    /// Whether a hook asked to drop this interaction
    pub fn is_ignored(&self) -> bool {
        self.ignored
    }
}

impl Deref for HookAwareInteraction<'_> {
    type Target = HttpInteraction;

    fn deref(&self) -> &Self::Target {
        self.interaction
    }
}

impl DerefMut for HookAwareInteraction<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.interaction
    }
}
