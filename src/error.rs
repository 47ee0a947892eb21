//! Structured error kinds surfaced at the API boundary (spec.md ERROR HANDLING DESIGN).
//!
//! Call sites use `anyhow::Result` and attach context the way the teacher repo does
//! (`anyhow!`, `.context(...)`); this enum is downcast out of the chain when a caller
//! needs the structured kind, e.g. to decide whether a denial was `DEADLOCK_PREVENTION`
//! and the owning transaction must be aborted.

use crate::page::PageId;
use crate::record::Rid;
use std::fmt;

/// Why a transaction was forced to abort by the lock manager or its own protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    LockOnShrinking,
    DeadlockPrevention,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::LockOnShrinking => write!(f, "LOCK_ON_SHRINKING"),
            AbortReason::DeadlockPrevention => write!(f, "DEADLOCK_PREVENTION"),
        }
    }
}

#[derive(Debug)]
pub enum Error {
    DatabaseExists(String),
    DatabaseNotFound(String),
    TableExists(String),
    TableNotFound(String),
    PageNotExist(PageId),
    RecordNotFound(Rid),
    TransactionAbort(AbortReason),
    Unix(String),
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DatabaseExists(name) => write!(f, "database {name} already exists"),
            Error::DatabaseNotFound(name) => write!(f, "database {name} not found"),
            Error::TableExists(name) => write!(f, "table {name} already exists"),
            Error::TableNotFound(name) => write!(f, "table {name} not found"),
            Error::PageNotExist(id) => write!(f, "page {id:?} does not exist"),
            Error::RecordNotFound(rid) => write!(f, "record {rid:?} not found"),
            Error::TransactionAbort(reason) => write!(f, "transaction aborted: {reason}"),
            Error::Unix(msg) => write!(f, "I/O error: {msg}"),
            Error::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = anyhow::Result<T>;
