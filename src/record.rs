//! # Records
//!
//! Schema-light entries as they come back from a collection scan.
//!
//! Stored values are untyped, so every read goes through [`Record::text`] which
//! either yields the string at a field or says why it could not. A single bad
//! record is then something the caller can step over instead of a failed scan.
use std::{collections::BTreeMap, fmt};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Field name to string value, as handed to [`crate::store::DocumentStore::append`].
pub type Fields = BTreeMap<String, String>;

/// Store-generated key of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("field `{0}` is absent")]
    Missing(String),

    #[error("field `{0}` is not a string")]
    NotText(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: RecordId,
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(id: RecordId, fields: Map<String, Value>) -> Self {
        Self { id, fields }
    }

    pub fn from_fields(id: RecordId, fields: &Fields) -> Self {
        let fields = fields
            .iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect();

        Self { id, fields }
    }

    pub fn text(&self, field: &str) -> Result<&str, FieldError> {
        match self.fields.get(field) {
            Some(Value::String(value)) => Ok(value),
            Some(_) => Err(FieldError::NotText(field.to_string())),
            None => Err(FieldError::Missing(field.to_string())),
        }
    }
}
