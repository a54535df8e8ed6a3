//! Decoding JSON and YAML text into the shared tree model.

use serde_json::{Map, Number, Value};

use crate::infra::workspace::{ContentKind, WorkspaceContent};

/// Default ceiling on YAML input, in code points.
pub const DEFAULT_MAX_YAML_CODEPOINTS: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserOptions {
    pub max_yaml_codepoints: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            max_yaml_codepoints: DEFAULT_MAX_YAML_CODEPOINTS,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("YAML input exceeds {limit} code points")]
    TooLarge { limit: usize },
}

/// Decoder for workspace content.
#[derive(Debug, Clone, Default)]
pub struct Parser {
    options: ParserOptions,
}

impl Parser {
    pub fn new(options: ParserOptions) -> Self {
        Self { options }
    }

    pub fn decode(&self, content: &WorkspaceContent) -> Result<Value, DecodeError> {
        match content.kind {
            ContentKind::Json => Ok(serde_json::from_str(&content.data)?),
            ContentKind::Yaml => self.decode_yaml(&content.data),
        }
    }

    fn decode_yaml(&self, data: &str) -> Result<Value, DecodeError> {
        let limit = self.options.max_yaml_codepoints;
        if data.len() > limit && data.chars().nth(limit).is_some() {
            return Err(DecodeError::TooLarge { limit });
        }
        let yaml: serde_yaml::Value = serde_yaml::from_str(data)?;
        Ok(yaml_to_json(yaml))
    }
}

fn yaml_to_json(value: serde_yaml::Value) -> Value {
    use serde_yaml::Value as Yaml;

    match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => yaml_number(&n),
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(items.into_iter().map(yaml_to_json).collect()),
        Yaml::Mapping(mapping) => {
            let mut object = Map::with_capacity(mapping.len());
            for (key, value) in mapping {
                object.insert(yaml_key(key), yaml_to_json(value));
            }
            Value::Object(object)
        }
        Yaml::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

fn yaml_number(n: &serde_yaml::Number) -> Value {
    if let Some(i) = n.as_i64() {
        Value::Number(i.into())
    } else if let Some(u) = n.as_u64() {
        Value::Number(u.into())
    } else {
        n.as_f64()
            .and_then(Number::from_f64)
            .map_or(Value::Null, Value::Number)
    }
}

/// Mapping keys such as `200:` are not strings in YAML; use their textual form.
fn yaml_key(key: serde_yaml::Value) -> String {
    use serde_yaml::Value as Yaml;

    match key {
        Yaml::String(s) => s,
        Yaml::Null => "null".to_owned(),
        Yaml::Bool(b) => b.to_string(),
        Yaml::Number(n) => n.to_string(),
        Yaml::Tagged(tagged) => yaml_key(tagged.value),
        other => serde_yaml::to_string(&other)
            .map(|text| text.trim_end().to_owned())
            .unwrap_or_default(),
    }
}
