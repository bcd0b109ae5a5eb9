//! Transaction operations in the shape of the OVSDB `transact` method.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// A database row as a JSON object keyed by column name.
pub type Row = Map<String, Value>;

/// Column holding the row UUID in every table.
pub const UUID_COLUMN: &str = "_uuid";

/// Equality condition of a `where` clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub column: String,
    pub value: Value,
}

impl Condition {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Condition selecting a row by its UUID.
    pub fn uuid(uuid: impl Into<String>) -> Self {
        Self::eq(UUID_COLUMN, uuid.into())
    }

    pub fn matches(&self, row: &Row) -> bool {
        row.get(&self.column) == Some(&self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mutator {
    Insert,
    Delete,
}

/// In-place change of a set or map column.
///
/// For set columns `value` is a JSON array of members. For map columns an
/// insert takes an object of pairs and never overwrites an existing key; a
/// delete takes either an object (pairs removed only when key and value both
/// match) or an array of keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    pub column: String,
    pub mutator: Mutator,
    pub value: Value,
}

impl Mutation {
    pub fn insert_set<I, S>(column: &str, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::set(column, Mutator::Insert, members)
    }

    pub fn delete_set<I, S>(column: &str, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::set(column, Mutator::Delete, members)
    }

    pub fn insert_map<'a, I>(column: &str, pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        Self::map(column, Mutator::Insert, pairs)
    }

    /// Removes the given pairs; a key whose current value differs is kept.
    pub fn delete_map<'a, I>(column: &str, pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        Self::map(column, Mutator::Delete, pairs)
    }

    /// Removes the given keys whatever their values.
    pub fn delete_keys<I, S>(column: &str, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::set(column, Mutator::Delete, keys)
    }

    fn set<I, S>(column: &str, mutator: Mutator, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let members: Vec<Value> = members.into_iter().map(|m| Value::String(m.into())).collect();
        Self {
            column: column.to_string(),
            mutator,
            value: Value::Array(members),
        }
    }

    fn map<'a, I>(column: &str, mutator: Mutator, pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let pairs: Map<String, Value> = pairs
            .into_iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        Self {
            column: column.to_string(),
            mutator,
            value: Value::Object(pairs),
        }
    }
}

/// One operation of a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Operation {
    Insert {
        table: String,
        row: Row,
        /// Placeholder other operations of the same transaction may use to
        /// reference the row before its real UUID exists.
        #[serde(rename = "uuid-name", default, skip_serializing_if = "Option::is_none")]
        uuid_name: Option<String>,
    },
    Update {
        table: String,
        #[serde(rename = "where")]
        conditions: Vec<Condition>,
        row: Row,
    },
    Mutate {
        table: String,
        #[serde(rename = "where")]
        conditions: Vec<Condition>,
        mutations: Vec<Mutation>,
    },
    Delete {
        table: String,
        #[serde(rename = "where")]
        conditions: Vec<Condition>,
    },
}

impl Operation {
    pub fn table(&self) -> &str {
        match self {
            Operation::Insert { table, .. }
            | Operation::Update { table, .. }
            | Operation::Mutate { table, .. }
            | Operation::Delete { table, .. } => table,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Insert { .. } => "insert",
            Operation::Update { .. } => "update",
            Operation::Mutate { .. } => "mutate",
            Operation::Delete { .. } => "delete",
        }
    }
}

/// Per-operation outcome of a transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl OperationResult {
    pub fn inserted(uuid: String) -> Self {
        Self {
            uuid: Some(uuid),
            ..Default::default()
        }
    }

    pub fn counted(count: usize) -> Self {
        Self {
            count: Some(count),
            ..Default::default()
        }
    }

    /// Error text if the server reported this operation as failed.
    pub fn failure(&self) -> Option<String> {
        self.error.as_ref().map(|error| match &self.details {
            Some(details) => format!("{error}: {details}"),
            None => error.clone(),
        })
    }
}

/// Empty value of a set column, used when a mutation targets a missing column.
pub(crate) fn empty_like(value: &Value) -> Value {
    match value {
        Value::Object(_) => json!({}),
        _ => json!([]),
    }
}
