pub(crate) mod ast_utils;
pub(crate) mod classify;
pub(crate) mod insert;
pub(crate) mod params;
pub(crate) mod parse;
pub(crate) mod pk_resolver;
pub(crate) mod row_key;
pub(crate) mod select;
pub(crate) mod stream;
pub(crate) mod upsert;

pub use classify::{
    classify, DmlKind, InsertKind, PkQualification, StatementClass, UnqualifiedReason,
};
pub use insert::InsertRewrite;
pub use params::{encode_literal, BindVars, Operand};
pub use parse::{parse_statement, LockMode, ParsedStatement, StatementBody};
pub use pk_resolver::{plan_dml, DmlRewrite, DmlStep, PendingProbe};
pub use row_key::RowKeyTuple;
pub use select::{plan_select, SelectPlan};
pub use stream::StreamAnnotation;
pub use upsert::UpsertRewrite;
