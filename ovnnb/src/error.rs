//! Error types for northbound resource access.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::db::DbError;

/// What an accessor was doing when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Get,
    List,
    Create,
    Update,
    Mutate,
    Delete,
    Migrate,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Get => "get",
            Action::List => "list",
            Action::Create => "create",
            Action::Update => "update",
            Action::Mutate => "mutate",
            Action::Delete => "delete",
            Action::Migrate => "migrate",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum NbError {
    #[error("{kind} {key:?} not found")]
    NotFound { kind: &'static str, key: String },

    #[error("more than one {kind} matches {key:?} ({count} found)")]
    Ambiguous {
        kind: &'static str,
        key: String,
        count: usize,
    },

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("transaction {txn} ({action}) failed")]
    TransactionFailed {
        txn: String,
        action: Action,
        #[source]
        source: DbError,
    },

    #[error("{txn} timed out after {after:?}")]
    Timeout { txn: String, after: Duration },

    #[error("failed to {action} {kind} {key:?}")]
    Resource {
        action: Action,
        kind: &'static str,
        key: String,
        #[source]
        source: Box<NbError>,
    },

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("failed to encode or decode a row")]
    Codec(#[from] serde_json::Error),
}

impl NbError {
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        NbError::NotFound { kind, key: key.into() }
    }

    /// Wraps `self` with the resource and action it belongs to.
    pub fn context(self, action: Action, kind: &'static str, key: impl Into<String>) -> Self {
        NbError::Resource {
            action,
            kind,
            key: key.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through [`NbError::Resource`] wrappers.
    pub fn root(&self) -> &NbError {
        match self {
            NbError::Resource { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), NbError::NotFound { .. })
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self.root(), NbError::Ambiguous { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), NbError::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, NbError>;

/// Adds resource context to the error of a `Result`.
pub(crate) trait ResultExt<T> {
    fn context(self, action: Action, kind: &'static str, key: &str) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, action: Action, kind: &'static str, key: &str) -> Result<T> {
        self.map_err(|e| e.context(action, kind, key))
    }
}
