//! Builds transaction operations from typed records.
//!
//! A record is addressed by its UUID when it has a real one, otherwise by
//! the value of its table's index column. Records with neither cannot be
//! updated, mutated or deleted.

use std::sync::LazyLock;
use std::sync::atomic::{AtomicU32, Ordering};

use serde_json::Value;

use super::Model;
use crate::db::{Condition, Mutation, Operation, Row, UUID_COLUMN};
use crate::error::{NbError, Result};

static NAMED_UUID_COUNTER: LazyLock<AtomicU32> = LazyLock::new(|| AtomicU32::new(rand::random::<u32>() % 1_000_000_000));

/// Returns a placeholder UUID valid inside one transaction.
///
/// Placeholders are `u` followed by ten digits so they can never collide
/// with a real UUID.
pub fn named_uuid() -> String {
    let n = NAMED_UUID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("u{n:010}")
}

pub fn is_named_uuid(uuid: &str) -> bool {
    uuid.len() == 11 && uuid.starts_with('u') && uuid[1..].bytes().all(|b| b.is_ascii_digit())
}

pub(crate) fn to_row<T: Model>(record: &T) -> Result<Row> {
    match serde_json::to_value(record)? {
        Value::Object(row) => Ok(row),
        other => Err(NbError::PreconditionFailed(format!(
            "{} record serialized to {other} instead of a row",
            T::TABLE
        ))),
    }
}

/// `where` clause addressing `record`.
pub fn where_clause<T: Model>(record: &T) -> Result<Vec<Condition>> {
    let uuid = record.uuid();
    if !uuid.is_empty() && !is_named_uuid(uuid) {
        return Ok(vec![Condition::uuid(uuid)]);
    }
    if let (Some(column), Some(value)) = (T::INDEX, record.index_value()) {
        if !value.is_empty() {
            return Ok(vec![Condition::eq(column, value)]);
        }
    }
    Err(NbError::PreconditionFailed(format!(
        "{} record has neither a uuid nor an index value",
        T::TABLE
    )))
}

/// Insert of `record`. A named UUID on the record becomes the operation's
/// `uuid-name` so later operations of the transaction can reference it.
pub fn insert<T: Model>(record: &T) -> Result<Operation> {
    let mut row = to_row(record)?;
    row.remove(UUID_COLUMN);
    let uuid = record.uuid();
    Ok(Operation::Insert {
        table: T::TABLE.to_string(),
        row,
        uuid_name: is_named_uuid(uuid).then(|| uuid.to_string()),
    })
}

/// Update writing `fields` of `record`; every column except `_uuid` when
/// `fields` is empty.
pub fn update<T: Model>(record: &T, fields: &[&str]) -> Result<Operation> {
    let conditions = where_clause(record)?;
    let mut full = to_row(record)?;
    full.remove(UUID_COLUMN);

    let row = if fields.is_empty() {
        full
    } else {
        let mut row = Row::new();
        for field in fields {
            match full.remove(*field) {
                Some(value) => {
                    row.insert(field.to_string(), value);
                }
                None => {
                    return Err(NbError::PreconditionFailed(format!(
                        "{} has no updatable column {field}",
                        T::TABLE
                    )));
                }
            }
        }
        row
    };

    Ok(Operation::Update {
        table: T::TABLE.to_string(),
        conditions,
        row,
    })
}

pub fn mutate<T: Model>(record: &T, mutations: Vec<Mutation>) -> Result<Operation> {
    Ok(Operation::Mutate {
        table: T::TABLE.to_string(),
        conditions: where_clause(record)?,
        mutations,
    })
}

pub fn delete<T: Model>(record: &T) -> Result<Operation> {
    Ok(Operation::Delete {
        table: T::TABLE.to_string(),
        conditions: where_clause(record)?,
    })
}
