//! Rows, cells, predicates, and assignments.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use atoll_types::Timestamp;

/// A typed cell value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Uuid(Uuid),
    Str(String),
    Bytes(Vec<u8>),
    Uuids(Vec<Uuid>),
}

impl Value {
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Value::Uuid(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_uuids(&self) -> Option<&[Uuid]> {
        match self {
            Value::Uuids(ids) => Some(ids),
            _ => None,
        }
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Value::Uuid(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

/// A cell: value plus the stamp of the write that installed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub value: Value,
    pub written: Timestamp,
}

/// A row: named cells. Absent fields read as null.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Row {
    cells: BTreeMap<String, Cell>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// The value of a field, `None` if null.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.cells.get(field).map(|cell| &cell.value)
    }

    /// The stamp of the write that installed a field, `None` if null.
    pub fn written(&self, field: &str) -> Option<Timestamp> {
        self.cells.get(field).map(|cell| cell.written)
    }

    /// Sets a cell. Used by store implementations at the write point.
    pub fn put(&mut self, field: impl Into<String>, value: Value, written: Timestamp) {
        self.cells.insert(field.into(), Cell { value, written });
    }

    /// Clears a cell (assign-null).
    pub fn clear(&mut self, field: &str) {
        self.cells.remove(field);
    }
}

/// One field test inside a predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Test {
    IsNull,
    NotNull,
    Eq(Value),
}

/// A conjunction of per-field conditions, evaluated atomically at the
/// store's linearization point.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Predicate {
    conditions: Vec<(String, Test)>,
}

impl Predicate {
    /// A predicate that always holds (unconditional update).
    pub fn always() -> Self {
        Self::default()
    }

    /// Additionally require `field` to be null.
    pub fn and_null(mut self, field: impl Into<String>) -> Self {
        self.conditions.push((field.into(), Test::IsNull));
        self
    }

    /// Additionally require `field` to be non-null.
    pub fn and_not_null(mut self, field: impl Into<String>) -> Self {
        self.conditions.push((field.into(), Test::NotNull));
        self
    }

    /// Additionally require `field = value`.
    pub fn and_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), Test::Eq(value.into())));
        self
    }

    /// Evaluates against a row (a missing row is an empty row).
    pub fn holds(&self, row: &Row) -> bool {
        self.conditions.iter().all(|(field, test)| match test {
            Test::IsNull => row.get(field).is_none(),
            Test::NotNull => row.get(field).is_some(),
            Test::Eq(value) => row.get(field) == Some(value),
        })
    }
}

/// One field write inside a conditional update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub(crate) field: String,
    pub(crate) value: Option<Value>,
}

impl Assignment {
    /// `field := value`.
    pub fn set(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: Some(value.into()),
        }
    }

    /// `field := null`.
    pub fn clear(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: None,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// The assigned value, `None` for assign-null.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }
}
