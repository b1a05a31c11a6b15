use thiserror::Error;

use crate::codec::{MalformedIdError, MeterId};
use crate::hooks::HookKind;

pub type Result<T> = std::result::Result<T, MeterError>;

/// Boxed error carried through hook handlers without interpretation
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures surfaced by the backing store, classified so callers can
/// tell a uniqueness violation apart from everything else
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("unique meter id constraint violated")]
    Duplicate,

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("execution plan diagnostics not supported by this backend")]
    DiagnosticsUnsupported,

    #[error("stored meter record is corrupt: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum MeterError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("meter {0} not found")]
    NotFound(MeterId),

    #[error("meter {0} already exists")]
    Duplicate(MeterId),

    #[error("update to sequence {sequence} conflicted: meter {id} changed or does not exist")]
    ConcurrentUpdate { id: MeterId, sequence: u64 },

    #[error("malformed meter id: {0}")]
    MalformedId(#[from] MalformedIdError),

    #[error("a {0} handler is already registered")]
    AlreadyRegistered(HookKind),

    #[error("no {0} handler has been registered")]
    MissingHandler(HookKind),

    #[error("cannot invoke {0}: handler not set")]
    HandlerNotSet(HookKind),

    #[error("{kind} handler failed: {source}")]
    HookFailed {
        kind: HookKind,
        #[source]
        source: BoxError,
    },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl MeterError {
    /// HTTP status an embedding API layer would map this error to
    pub fn http_status(&self) -> u16 {
        match self {
            MeterError::InvalidArgument(_) | MeterError::MalformedId(_) => 400,
            MeterError::NotFound(_) => 404,
            MeterError::Duplicate(_) | MeterError::ConcurrentUpdate { .. } => 409,
            MeterError::AlreadyRegistered(_)
            | MeterError::MissingHandler(_)
            | MeterError::HandlerNotSet(_)
            | MeterError::HookFailed { .. }
            | MeterError::Database(_) => 500,
        }
    }

    /// True for the uniqueness violation raised on insert of a taken id
    pub fn is_duplicate(&self) -> bool {
        matches!(self, MeterError::Duplicate(_))
    }

    /// True when a retry after re-reading the record could succeed
    pub fn is_concurrent_update(&self) -> bool {
        matches!(self, MeterError::ConcurrentUpdate { .. })
    }
}
