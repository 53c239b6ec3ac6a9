//! Cassette-file shapes for request/response fields
//!
//! Bodies are stored as `{encoding, string}` maps, header values as lists and
//! timestamps as HTTP dates. Deserialization is lenient and always goes
//! through the normalizing constructors.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::normalize;
use super::{Headers, Request, Response, ResponseStatus};

/// Request fields as read from a cassette
#[derive(Deserialize)]
pub struct RequestFields {
    method: String,
    uri: String,
    #[serde(default, deserialize_with = "body::deserialize")]
    body: Option<String>,
    #[serde(default, deserialize_with = "headers::deserialize")]
    headers: Headers,
}

impl From<RequestFields> for Request {
    fn from(fields: RequestFields) -> Self {
        Request::new(&fields.method, fields.uri, fields.body, fields.headers)
    }
}

/// Status fields as read from a cassette
#[derive(Deserialize)]
pub struct StatusFields {
    code: u16,
    #[serde(default)]
    message: Option<String>,
}

impl From<StatusFields> for ResponseStatus {
    fn from(fields: StatusFields) -> Self {
        ResponseStatus::new(fields.code, fields.message)
    }
}

/// Response fields as read from a cassette
#[derive(Deserialize)]
pub struct ResponseFields {
    status: ResponseStatus,
    #[serde(default, deserialize_with = "headers::deserialize")]
    headers: Headers,
    #[serde(default, deserialize_with = "body::deserialize")]
    body: Option<String>,
    #[serde(default)]
    http_version: Option<String>,
}

impl From<ResponseFields> for Response {
    fn from(fields: ResponseFields) -> Self {
        Response::new(fields.status, fields.headers, fields.body, fields.http_version)
    }
}

pub mod body {
    use super::{Deserialize, Deserializer};
    use serde::{Serialize, Serializer};

    #[derive(Serialize)]
    struct BodyRef<'a> {
        encoding: &'static str,
        string: &'a str,
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawBody {
        Record {
            #[serde(default)]
            string: Option<String>,
        },
        Plain(String),
    }

    pub fn serialize<S: Serializer>(body: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
        match body {
            Some(string) => BodyRef {
                encoding: "UTF-8",
                string,
            }
            .serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        let raw = Option::<RawBody>::deserialize(deserializer)?;
        Ok(raw.and_then(|raw| match raw {
            RawBody::Record { string } => string,
            RawBody::Plain(string) => Some(string),
        }))
    }
}

pub mod headers {
    use super::{normalize, BTreeMap, Deserialize, Deserializer, Headers, Value};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Headers, D::Error> {
        let raw = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?;
        Ok(raw
            .unwrap_or_default()
            .into_iter()
            .map(|(name, value)| (name, normalize::header_values(value)))
            .collect())
    }
}

pub mod http_date {
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&at.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc2822(&text)
            .or_else(|_| DateTime::parse_from_rfc3339(&text))
            .map(|at| at.with_timezone(&Utc))
            .map_err(|e| D::Error::custom(format!("invalid recorded_at {text:?}: {e}")))
    }
}
