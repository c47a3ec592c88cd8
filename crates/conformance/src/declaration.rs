//! Declaration loader
//!
//! A declaration is the immutable set of named outputs describing intended
//! infrastructure state. Some outputs carry structured data encoded as JSON
//! text; [`Declaration::decode`] turns those into value trees exactly once.

use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Key naming convention applied when decoding an encoded output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStyle {
    /// Keys are field names: trimmed and ASCII-lowercased
    Symbol,
    /// Keys are data (labels, metadata) and kept exactly as written
    Verbatim,
}

impl KeyStyle {
    fn apply(self, key: &str) -> String {
        match self {
            Self::Symbol => key.trim().to_ascii_lowercase(),
            Self::Verbatim => key.to_string(),
        }
    }
}

/// Immutable tree of named declared values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Declaration {
    values: BTreeMap<String, Value>,
}

impl Declaration {
    /// Build a declaration from already-parsed values
    pub fn from_values<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            values: values.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Parse raw declaration text
    ///
    /// Accepts either a plain JSON object of named values or the envelope
    /// produced by `terraform output -json` / `tofu output -json`, where every
    /// entry is `{"value": ..., "type": ..., "sensitive": ...}`.
    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_named(text, "declaration")
    }

    /// Read and parse a declaration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let declaration = Self::parse_named(&text, &path.display().to_string())?;
        log::debug!(
            "Loaded {} declared values from {}",
            declaration.len(),
            path.display()
        );
        Ok(declaration)
    }

    fn parse_named(text: &str, source_name: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(text).map_err(|e| Error::Parse {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })?;

        let Value::Object(entries) = root else {
            return Err(Error::Parse {
                source_name: source_name.to_string(),
                message: "top level must be an object of named values".to_string(),
            });
        };

        let values = if is_output_envelope(&entries) {
            entries
                .into_iter()
                .map(|(name, entry)| match entry {
                    Value::Object(mut fields) => {
                        (name, fields.remove("value").unwrap_or(Value::Null))
                    }
                    other => (name, other),
                })
                .collect()
        } else {
            entries.into_iter().collect()
        };

        Ok(Self { values })
    }

    /// Number of declared values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing was declared
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Names of every declared value
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Get a value if declared
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Look up a required value
    pub fn lookup(&self, name: &str) -> Result<&Value> {
        self.values.get(name).ok_or_else(|| Error::MissingKey {
            key: name.to_string(),
        })
    }

    /// Look up a required string value
    pub fn string(&self, name: &str) -> Result<&str> {
        self.lookup(name)?.as_str().ok_or(Error::Type {
            key: name.to_string(),
            expected: "string",
        })
    }

    /// Look up an optional string, falling back to a default when absent or blank
    pub fn string_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        match self.get(name).and_then(Value::as_str) {
            Some(s) if !s.trim().is_empty() => s,
            _ => default,
        }
    }

    /// Look up an optional string; absent, null and blank all yield `None`
    pub fn optional_string(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Look up an optional boolean
    ///
    /// Booleans encoded as the strings "true"/"false" are accepted, since
    /// some tooling stringifies every output.
    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        match self.get(name) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => match s.trim() {
                "true" => true,
                "false" => false,
                _ => default,
            },
            _ => default,
        }
    }

    /// Decode a required output holding structured data
    pub fn decode(&self, name: &str, style: KeyStyle) -> Result<Value> {
        decode_value(name, self.lookup(name)?, style)
    }

    /// Decode an optional output; an absent output decodes to null
    pub fn decode_or_null(&self, name: &str, style: KeyStyle) -> Result<Value> {
        match self.get(name) {
            Some(value) => decode_value(name, value, style),
            None => Ok(Value::Null),
        }
    }
}

/// Whether every entry looks like `{"value": ..., "type": ...}`
fn is_output_envelope(entries: &Map<String, Value>) -> bool {
    !entries.is_empty()
        && entries.values().all(|entry| {
            entry
                .as_object()
                .is_some_and(|fields| fields.contains_key("value") && fields.contains_key("type"))
        })
}

/// Secondary decode pass: text is parsed once, then keys are restyled
fn decode_value(name: &str, value: &Value, style: KeyStyle) -> Result<Value> {
    let tree = match value {
        Value::String(text) if text.trim().is_empty() => Value::Null,
        Value::String(text) => serde_json::from_str(text).map_err(|e| Error::Parse {
            source_name: name.to_string(),
            message: e.to_string(),
        })?,
        other => other.clone(),
    };
    restyle_keys(name, tree, style)
}

/// Restyle every object key; two keys restyling to the same name are an error
fn restyle_keys(name: &str, value: Value, style: KeyStyle) -> Result<Value> {
    match value {
        Value::Object(map) => {
            let mut restyled = Map::with_capacity(map.len());
            for (key, inner) in map {
                let styled = style.apply(&key);
                if restyled.contains_key(&styled) {
                    return Err(Error::Parse {
                        source_name: name.to_string(),
                        message: format!("key '{key}' collides with another key as '{styled}'"),
                    });
                }
                restyled.insert(styled, restyle_keys(name, inner, style)?);
            }
            Ok(Value::Object(restyled))
        }
        Value::Array(items) => items
            .into_iter()
            .map(|v| restyle_keys(name, v, style))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        other => Ok(other),
    }
}
