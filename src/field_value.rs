use std::borrow::Cow;
use std::fmt;

use hashbrown::HashMap;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::err::{DecodeError, FieldError};
use crate::guid::Guid;

/// A single decoded payload value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Number(serde_json::Number),
    Bool(bool),
    Null,
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integral value of a number, or of a string holding a decimal integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Number(n) => n.as_i64(),
            FieldValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Textual form used for message substitution. `Null` renders as an empty string.
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            FieldValue::String(s) => Cow::Borrowed(s),
            FieldValue::Number(n) => Cow::Owned(n.to_string()),
            FieldValue::Bool(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
            FieldValue::Null => Cow::Borrowed(""),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            FieldValue::String(_) => "a string",
            FieldValue::Number(_) => "a number",
            FieldValue::Bool(_) => "a boolean",
            FieldValue::Null => "null",
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<JsonValue> for FieldValue {
    /// Nested arrays and objects are not part of the flat payload model; they are kept as
    /// their JSON text.
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::String(s) => FieldValue::String(s),
            JsonValue::Number(n) => FieldValue::Number(n),
            JsonValue::Bool(b) => FieldValue::Bool(b),
            JsonValue::Null => FieldValue::Null,
            other @ (JsonValue::Array(_) | JsonValue::Object(_)) => {
                FieldValue::String(other.to_string())
            }
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Number(n.into())
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// Named payload values of one decoded record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldMap(HashMap<String, FieldValue>);

impl FieldMap {
    pub fn new() -> Self {
        FieldMap(HashMap::new())
    }

    /// Parse a JSON object document into a field map.
    pub fn from_json_str(text: &str) -> Result<Self, DecodeError> {
        let value: JsonValue =
            serde_json::from_str(text).map_err(|source| DecodeError::Json { source })?;

        match value {
            JsonValue::Object(object) => Ok(object
                .into_iter()
                .map(|(k, v)| (k, FieldValue::from(v)))
                .collect()),
            JsonValue::Array(_) => Err(DecodeError::NotAnObject { found: "an array" }),
            JsonValue::String(_) => Err(DecodeError::NotAnObject { found: "a string" }),
            JsonValue::Number(_) => Err(DecodeError::NotAnObject { found: "a number" }),
            JsonValue::Bool(_) => Err(DecodeError::NotAnObject { found: "a boolean" }),
            JsonValue::Null => Err(DecodeError::NotAnObject { found: "null" }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn require(&self, name: &'static str) -> Result<&FieldValue, FieldError> {
        self.get(name).ok_or(FieldError::Missing { name })
    }

    pub fn require_str(&self, name: &'static str) -> Result<&str, FieldError> {
        let value = self.require(name)?;
        value.as_str().ok_or_else(|| FieldError::WrongType {
            name,
            expected: "a string",
            found: value.kind().to_string(),
        })
    }

    /// Any scalar is accepted and rendered as text.
    pub fn require_text(&self, name: &'static str) -> Result<String, FieldError> {
        Ok(self.require(name)?.to_text().into_owned())
    }

    pub fn require_i64(&self, name: &'static str) -> Result<i64, FieldError> {
        let value = self.require(name)?;
        value.as_i64().ok_or_else(|| FieldError::WrongType {
            name,
            expected: "an integer",
            found: value.to_text().into_owned(),
        })
    }

    pub fn require_guid(&self, name: &'static str) -> Result<Guid, FieldError> {
        self.require_str(name)?
            .parse()
            .map_err(|source| FieldError::InvalidGuid { name, source })
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        FieldMap(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
