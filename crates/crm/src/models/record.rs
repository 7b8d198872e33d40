//! Record model: an opaque field map as returned by the CRM

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Unique identifier for a record (CRM record ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A CRM record
///
/// The engine never interprets the schema: a record is a map from API field
/// name to JSON value. Only `id` and `Modified_Time` carry meaning here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Field holding the record ID
    pub const ID: &'static str = "id";
    /// Field used as sort and filter key for incremental sync
    pub const MODIFIED_TIME: &'static str = "Modified_Time";

    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Builder method to set a field
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Record ID, accepting both string and numeric encodings
    pub fn id(&self) -> Option<RecordId> {
        match self.0.get(Self::ID)? {
            Value::String(s) if !s.is_empty() => Some(RecordId::new(s.as_str())),
            Value::Number(n) => Some(RecordId::new(n.to_string())),
            _ => None,
        }
    }

    /// `Modified_Time` normalized to UTC
    ///
    /// Returns None when the field is absent or not RFC 3339.
    pub fn modified_time(&self) -> Option<DateTime<Utc>> {
        let raw = self.0.get(Self::MODIFIED_TIME)?.as_str()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    /// True when every predicate field equals the record's value
    ///
    /// An empty predicate matches everything.
    pub fn matches(&self, predicate: &BTreeMap<String, Value>) -> bool {
        predicate
            .iter()
            .all(|(field, expected)| self.0.get(field) == Some(expected))
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}
