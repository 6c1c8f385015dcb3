use crate::backend::BackendError;
use crate::errors::ErrorCode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteError {
    pub code: ErrorCode,
    pub message: String,
    /// Original statement text the error was raised for, when known.
    pub sql: Option<String>,
    /// Offending clause or value.
    pub clause: Option<String>,
}

impl RewriteError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            sql: None,
            clause: None,
        }
    }

    pub fn with_clause(mut self, clause: impl Into<String>) -> Self {
        self.clause = Some(clause.into());
        self
    }

    /// Attaches the statement text unless an inner layer already did.
    pub fn with_sql(mut self, sql: &str) -> Self {
        if self.sql.is_none() {
            self.sql = Some(sql.to_string());
        }
        self
    }
}

impl std::fmt::Display for RewriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)?;
        if let Some(clause) = &self.clause {
            write!(f, " (at `{clause}`)")?;
        }
        if let Some(sql) = &self.sql {
            write!(f, " in `{sql}`")?;
        }
        Ok(())
    }
}

impl std::error::Error for RewriteError {}

#[derive(Debug)]
pub enum QueryError {
    Rewrite(RewriteError),
    Backend(BackendError),
}

impl QueryError {
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Rewrite(error) => Some(error.code),
            Self::Backend(_) => None,
        }
    }
}

impl From<RewriteError> for QueryError {
    fn from(value: RewriteError) -> Self {
        Self::Rewrite(value)
    }
}

impl From<BackendError> for QueryError {
    fn from(value: BackendError) -> Self {
        Self::Backend(value)
    }
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rewrite(error) => write!(f, "{error}"),
            Self::Backend(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for QueryError {}
