//! Loading cassette text, optionally as a template
//!
//! Template cassettes reference variables as `<%= name %>`; the values come
//! from the cassette's `template_variables` option.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::persister::Persister;
use crate::{Result, VcrError};

/// Whether cassette content is rendered as a template, and with which values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawTemplateVariables", into = "RawTemplateVariables")]
pub enum TemplateVariables {
    /// Content is used verbatim
    #[default]
    Disabled,
    /// Content is a template without variables
    Enabled,
    /// Content is a template rendered with these values
    Values(BTreeMap<String, String>),
}

impl TemplateVariables {
    /// Build from `(name, value)` pairs
    pub fn values<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Values(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawTemplateVariables {
    Flag(bool),
    Values(BTreeMap<String, String>),
}

impl From<RawTemplateVariables> for TemplateVariables {
    fn from(raw: RawTemplateVariables) -> Self {
        match raw {
            RawTemplateVariables::Flag(false) => Self::Disabled,
            RawTemplateVariables::Flag(true) => Self::Enabled,
            RawTemplateVariables::Values(values) => Self::Values(values),
        }
    }
}

impl From<TemplateVariables> for RawTemplateVariables {
    fn from(variables: TemplateVariables) -> Self {
        match variables {
            TemplateVariables::Disabled => Self::Flag(false),
            TemplateVariables::Enabled => Self::Flag(true),
            TemplateVariables::Values(values) => Self::Values(values),
        }
    }
}

/// Reads a cassette's raw text through its persister
pub struct CassetteContentReader<'a> {
    persister: &'a dyn Persister,
    cassette_name: &'a str,
}

impl<'a> CassetteContentReader<'a> {
    /// Reader for the cassette called `cassette_name`
    pub fn new(persister: &'a dyn Persister, cassette_name: &'a str) -> Self {
        Self {
            persister,
            cassette_name,
        }
    }

    /// Read the text stored under `storage_key` and render it
    ///
    /// # Errors
    ///
    /// Returns a persistence error if reading fails, an invalid-format error
    /// for non UTF-8 content, or a missing-variable error from rendering
    pub fn read(&self, storage_key: &str, variables: &TemplateVariables) -> Result<Option<String>> {
        let Some(bytes) = self.persister.read(storage_key)? else {
            return Ok(None);
        };
        let raw = String::from_utf8(bytes).map_err(|e| VcrError::InvalidCassetteFormat {
            cassette: self.cassette_name.to_string(),
            reason: e.to_string(),
        })?;
        render(raw, variables, self.cassette_name).map(Some)
    }
}

/// Substitute template variables in `raw`
///
/// # Errors
///
/// Returns [`VcrError::MissingTemplateVariable`] for the first placeholder
/// without a value
pub fn render(raw: String, variables: &TemplateVariables, cassette_name: &str) -> Result<String> {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    let placeholder = PLACEHOLDER
        .get_or_init(|| Regex::new(r"<%=\s*([A-Za-z_][A-Za-z0-9_]*)\s*%>").expect("valid regex"));

    let values = match variables {
        TemplateVariables::Disabled => return Ok(raw),
        TemplateVariables::Enabled => None,
        TemplateVariables::Values(values) => Some(values),
    };

    let mut missing: Option<String> = None;
    let rendered = placeholder.replace_all(&raw, |caps: &Captures<'_>| {
        let name = &caps[1];
        match values.and_then(|values| values.get(name)) {
            Some(value) => value.clone(),
            None => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    if let Some(variable) = missing {
        return Err(VcrError::MissingTemplateVariable {
            cassette: cassette_name.to_string(),
            example: example_variables(values, &variable),
            variable,
        });
    }

    Ok(rendered.into_owned())
}

/// `{ known = "value", missing = "some value" }`
fn example_variables(values: Option<&BTreeMap<String, String>>, missing: &str) -> String {
    let mut example = values.cloned().unwrap_or_default();
    example.insert(missing.to_string(), "some value".to_string());

    let entries: Vec<String> = example
        .iter()
        .map(|(name, value)| format!("{name} = {value:?}"))
        .collect();
    format!("{{ {} }}", entries.join(", "))
}
