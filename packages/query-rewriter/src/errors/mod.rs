use crate::RewriteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ParseMismatch,
    MissingBindVar,
    PkCombinatorialLimitExceeded,
    EncodingError,
    UnknownTable,
    RowCapExceeded,
    InvalidConfig,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ParseMismatch => "PARSE_MISMATCH",
            Self::MissingBindVar => "MISSING_BIND_VAR",
            Self::PkCombinatorialLimitExceeded => "PK_COMBINATORIAL_LIMIT_EXCEEDED",
            Self::EncodingError => "ENCODING_ERROR",
            Self::UnknownTable => "UNKNOWN_TABLE",
            Self::RowCapExceeded => "ROW_CAP_EXCEEDED",
            Self::InvalidConfig => "INVALID_CONFIG",
        }
    }

    pub const fn all() -> &'static [Self] {
        &[
            Self::ParseMismatch,
            Self::MissingBindVar,
            Self::PkCombinatorialLimitExceeded,
            Self::EncodingError,
            Self::UnknownTable,
            Self::RowCapExceeded,
            Self::InvalidConfig,
        ]
    }
}

pub(crate) fn parse_mismatch(detail: impl Into<String>) -> RewriteError {
    RewriteError::new(ErrorCode::ParseMismatch, detail)
}

pub(crate) fn missing_bind_var(name: &str) -> RewriteError {
    RewriteError::new(
        ErrorCode::MissingBindVar,
        format!("missing bind var {name}"),
    )
    .with_clause(format!(":{name}"))
}

pub(crate) fn pk_combinatorial_limit_exceeded(
    table: &str,
    combinations: usize,
    limit: usize,
) -> RewriteError {
    RewriteError::new(
        ErrorCode::PkCombinatorialLimitExceeded,
        format!(
            "primary key IN-lists on `{table}` expand to {combinations} combinations, limit is {limit}"
        ),
    )
}

pub(crate) fn encoding_error(detail: impl Into<String>) -> RewriteError {
    RewriteError::new(ErrorCode::EncodingError, detail)
}

pub(crate) fn unknown_table(table: &str) -> RewriteError {
    RewriteError::new(
        ErrorCode::UnknownTable,
        format!("table `{table}` not found in schema"),
    )
}

pub(crate) fn row_cap_exceeded(context: &str, row_cap: u64) -> RewriteError {
    RewriteError::new(
        ErrorCode::RowCapExceeded,
        format!("{context} returned more than {row_cap} rows"),
    )
}

pub(crate) fn invalid_config(detail: impl Into<String>) -> RewriteError {
    RewriteError::new(ErrorCode::InvalidConfig, detail)
}

#[cfg(test)]
mod tests {
    use super::{
        encoding_error, missing_bind_var, pk_combinatorial_limit_exceeded, unknown_table,
        ErrorCode,
    };
    use std::collections::HashSet;

    #[test]
    fn error_code_strings_are_unique() {
        let mut seen = HashSet::new();
        for code in ErrorCode::all() {
            let inserted = seen.insert(code.as_str());
            assert!(inserted, "duplicate error code string: {}", code.as_str());
        }
    }

    #[test]
    fn constructors_include_code_and_context() {
        let missing = missing_bind_var("eid").with_sql("select :eid from t");
        assert_eq!(missing.code, ErrorCode::MissingBindVar);
        assert_eq!(missing.clause.as_deref(), Some(":eid"));
        assert_eq!(
            missing.to_string(),
            "MISSING_BIND_VAR: missing bind var eid (at `:eid`) in `select :eid from t`"
        );

        let limit = pk_combinatorial_limit_exceeded("t", 12, 4);
        assert_eq!(limit.code, ErrorCode::PkCombinatorialLimitExceeded);
        assert!(limit.message.contains("12 combinations"));

        assert_eq!(encoding_error("bad").code, ErrorCode::EncodingError);
        assert_eq!(unknown_table("nope").code, ErrorCode::UnknownTable);
    }

    #[test]
    fn inner_sql_context_is_not_overwritten() {
        let error = encoding_error("bad")
            .with_sql("select 1")
            .with_sql("select 2");
        assert_eq!(error.sql.as_deref(), Some("select 1"));
    }
}
