//! In-memory model of a compile-command database.
//!
//! A database is a JSON array of objects, one per compiled source file. Only
//! the `file` field means anything here; `directory`, `command`,
//! `arguments`, `output` and whatever else the generator emits are carried
//! through untouched, in their original order.

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the field records are filtered on.
const FILE_FIELD: &str = "file";

/// One compiler invocation.
///
/// Invariant: `fields` always holds a string under `"file"`.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRecord {
    fields: Map<String, Value>,
}

impl InvocationRecord {
    /// Creates a record with only a `file` field.
    pub fn new(file: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert(FILE_FIELD.to_string(), Value::String(file.into()));
        Self { fields }
    }

    /// Adds or replaces an opaque field, builder style.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if key != FILE_FIELD {
            self.fields.insert(key, value.into());
        }
        self
    }

    /// Wraps a JSON object, checking that it carries a string `file`.
    pub fn from_fields(fields: Map<String, Value>) -> Result<Self, String> {
        match fields.get(FILE_FIELD) {
            Some(Value::String(_)) => Ok(Self { fields }),
            Some(other) => Err(format!(
                "`file` must be a string, found {}",
                json_kind(other)
            )),
            None => Err("record is missing the `file` field".to_string()),
        }
    }

    /// The source file this invocation compiles.
    pub fn file(&self) -> &str {
        self.fields
            .get(FILE_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Looks up any field by name.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// All fields in their original order.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl Serialize for InvocationRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for InvocationRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = Map::<String, Value>::deserialize(deserializer)?;
        Self::from_fields(fields).map_err(de::Error::custom)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// An ordered list of invocation records, in build-system generation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvocationDatabase {
    records: Vec<InvocationRecord>,
}

impl InvocationDatabase {
    /// Creates an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a database from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Serializes the database as indented JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// The records in order.
    pub fn records(&self) -> &[InvocationRecord] {
        &self.records
    }

    /// Iterates over the records in order.
    pub fn iter(&self) -> std::slice::Iter<'_, InvocationRecord> {
        self.records.iter()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the database has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Appends a record.
    pub fn push(&mut self, record: InvocationRecord) {
        self.records.push(record);
    }
}

impl From<Vec<InvocationRecord>> for InvocationDatabase {
    fn from(records: Vec<InvocationRecord>) -> Self {
        Self { records }
    }
}

impl FromIterator<InvocationRecord> for InvocationDatabase {
    fn from_iter<I: IntoIterator<Item = InvocationRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a InvocationDatabase {
    type Item = &'a InvocationRecord;
    type IntoIter = std::slice::Iter<'a, InvocationRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl IntoIterator for InvocationDatabase {
    type Item = InvocationRecord;
    type IntoIter = std::vec::IntoIter<InvocationRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
