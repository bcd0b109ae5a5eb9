//! Errors reported by a northbound database connection.

use thiserror::Error;

/// Failure of a select or transaction at the database layer.
///
/// A transaction that fails with any of these is aborted as a whole: none of
/// its operations are visible afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DbError {
    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("constraint violation: {table} already has a row with {column} = {value}")]
    ConstraintViolation {
        table: String,
        column: String,
        value: String,
    },

    #[error("duplicate uuid-name {0} in transaction")]
    DuplicateUuidName(String),

    #[error("column {column} of {table} cannot be modified")]
    ImmutableColumn { table: String, column: String },

    #[error("invalid mutation of {table}.{column}: {reason}")]
    InvalidMutation {
        table: String,
        column: String,
        reason: String,
    },

    #[error("malformed row in {table}: {reason}")]
    MalformedRow { table: String, reason: String },

    #[error("transaction aborted: {0}")]
    Aborted(String),

    #[error("not connected to the northbound database")]
    NotConnected,
}
