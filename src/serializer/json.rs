//! JSON cassette serializer

use super::{CassetteDocument, FormatError, Serializer};

/// Writes cassettes as pretty-printed `.json` files
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn file_extension(&self) -> &str {
        "json"
    }

    fn serialize(&self, document: &CassetteDocument) -> Result<String, FormatError> {
        serde_json::to_string_pretty(document).map_err(|e| FormatError::Serialize(Box::new(e)))
    }

    fn deserialize(&self, text: &str) -> Result<CassetteDocument, FormatError> {
        serde_json::from_str(text).map_err(|e| FormatError::Deserialize(Box::new(e)))
    }
}
