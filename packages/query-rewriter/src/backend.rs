use async_trait::async_trait;

use crate::QueryResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// The statement violated a unique or primary key.
    DuplicateKey,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn duplicate_key(message: impl Into<String>) -> Self {
        Self {
            kind: BackendErrorKind::DuplicateKey,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: BackendErrorKind::Other,
            message: message.into(),
        }
    }

    pub fn is_duplicate_key(&self) -> bool {
        self.kind == BackendErrorKind::DuplicateKey
    }
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for BackendError {}

/// Runs rewritten statements against the underlying database.
#[async_trait(?Send)]
pub trait StatementExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<QueryResult, BackendError>;

    /// Reserves `count` consecutive auto-increment ids for `table` and
    /// returns the first one.
    async fn reserve_auto_increment(&self, table: &str, count: u64) -> Result<u64, BackendError>;
}
