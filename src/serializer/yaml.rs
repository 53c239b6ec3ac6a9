//! YAML cassette serializer (the default)

use super::{CassetteDocument, FormatError, Serializer};

/// Writes cassettes as `.yml` files
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlSerializer;

impl Serializer for YamlSerializer {
    fn file_extension(&self) -> &str {
        "yml"
    }

    fn serialize(&self, document: &CassetteDocument) -> Result<String, FormatError> {
        serde_yaml::to_string(document).map_err(|e| FormatError::Serialize(Box::new(e)))
    }

    fn deserialize(&self, text: &str) -> Result<CassetteDocument, FormatError> {
        serde_yaml::from_str(text).map_err(|e| FormatError::Deserialize(Box::new(e)))
    }
}
