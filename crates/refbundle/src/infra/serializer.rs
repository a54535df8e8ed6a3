//! Encoding bundled trees back to text.

use serde_json::Value;

use crate::infra::workspace::ContentKind;

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to encode YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Output settings for a bundled document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Serializer {
    /// Forced output format; `None` keeps the root document's own format.
    pub format: Option<ContentKind>,
    pub pretty: bool,
}

impl Default for Serializer {
    fn default() -> Self {
        Self {
            format: None,
            pretty: true,
        }
    }
}

impl Serializer {
    pub fn new(format: Option<ContentKind>, pretty: bool) -> Self {
        Self { format, pretty }
    }

    /// Encode `value`, falling back to `source_kind` when no format is forced.
    pub fn encode(&self, value: &Value, source_kind: ContentKind) -> Result<String, EncodeError> {
        match self.format.unwrap_or(source_kind) {
            ContentKind::Json if self.pretty => Ok(serde_json::to_string_pretty(value)?),
            ContentKind::Json => Ok(serde_json::to_string(value)?),
            ContentKind::Yaml => Ok(serde_yaml::to_string(value)?),
        }
    }
}
