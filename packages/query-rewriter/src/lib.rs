mod backend;
mod config;
mod error;
mod errors;
mod plan;
mod rewriter;
mod schema;
mod sql;
mod stats;
mod types;

pub use backend::{BackendError, BackendErrorKind, StatementExecutor};
pub use config::{RewriterConfig, DEFAULT_PK_EXPANSION_LIMIT, DEFAULT_ROW_CAP};
pub use error::{QueryError, RewriteError};
pub use errors::ErrorCode;
pub use plan::{PlanKind, PlanSignature, RewritePlan};
pub use rewriter::{Execution, PreparedStatement, QueryRewriter};
pub use schema::{ColumnSchema, ColumnType, MemoryCatalog, SchemaCatalog, TableSchema};
pub use sql::{
    classify, encode_literal, parse_statement, plan_dml, plan_select, BindVars, DmlKind,
    DmlRewrite, DmlStep, InsertKind, InsertRewrite, LockMode, Operand, ParsedStatement,
    PendingProbe, PkQualification, RowKeyTuple, SelectPlan, StatementBody, StatementClass,
    StreamAnnotation, UnqualifiedReason, UpsertRewrite,
};
pub use stats::{CacheOutcome, Counters, StatsRecorder, StatsSnapshot};
pub use types::{QueryResult, Value};
