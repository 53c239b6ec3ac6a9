//! Construction-time normalization for requests and responses

use http::Uri;
use serde_json::Value;

/// Lowercase an HTTP method (`GET` → `get`)
#[must_use]
pub fn normalize_method(method: &str) -> String {
    method.trim().to_ascii_lowercase()
}

/// Give a URI an explicit port when its scheme has a well-known default
///
/// `http://example.com/a` becomes `http://example.com:80/a`. URIs that
/// already carry a port, use another scheme, or fail to parse are returned
/// unchanged.
#[must_use]
pub fn with_explicit_port(uri: &str) -> String {
    let Ok(parsed) = uri.parse::<Uri>() else {
        return uri.to_string();
    };
    let (Some(scheme), Some(authority)) = (parsed.scheme_str(), parsed.authority()) else {
        return uri.to_string();
    };
    if authority.port().is_some() {
        return uri.to_string();
    }

    let port = match scheme.to_ascii_lowercase().as_str() {
        "http" => 80,
        "https" => 443,
        _ => return uri.to_string(),
    };

    let prefix_len = scheme.len() + "://".len();
    let authority = authority.as_str();
    match uri.get(prefix_len..) {
        Some(rest) if rest.starts_with(authority) => format!(
            "{}{authority}:{port}{}",
            &uri[..prefix_len],
            &rest[authority.len()..]
        ),
        _ => uri.to_string(),
    }
}

/// Normalize a loosely-typed header value into a list of strings
///
/// `null` becomes `[]`, a scalar becomes a one-element list and sequence
/// entries are stringified.
#[must_use]
pub fn header_values(value: Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .into_iter()
            .filter(|item| !item.is_null())
            .map(scalar_to_string)
            .collect(),
        scalar => vec![scalar_to_string(scalar)],
    }
}

fn scalar_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Trim a status message; blank messages become `None`
#[must_use]
pub fn status_message(message: Option<String>) -> Option<String> {
    message
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
}
