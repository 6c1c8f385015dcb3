use sqlparser::ast::{
    BinaryOperator, Expr, GroupByExpr, JoinConstraint, JoinOperator, LimitClause, Query, Select,
};

use crate::config::RewriterConfig;
use crate::errors;
use crate::sql::ast_utils::{number_expr, rewrite_query_selects, with_comments};
use crate::sql::params::{bind_node, operand_from_expr, BindVars, Operand};
use crate::sql::parse::{LockMode, SelectBody};
use crate::{RewriteError, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectPlan {
    /// Returns column metadata and no rows.
    pub field_query: String,
    /// Bound, capped, comment-preserving query that produces the rows.
    pub full_query: String,
}

pub fn plan_select(
    body: &SelectBody,
    comments: &[String],
    binds: &BindVars,
    config: &RewriterConfig,
) -> Result<SelectPlan, RewriteError> {
    let mut bound = body.query.as_ref().clone();
    bind_node(&mut bound, binds)?;
    Ok(SelectPlan {
        field_query: field_query(&bound)?,
        full_query: full_query(&bound, comments, body.lock, config)?,
    })
}

/// Every SELECT gets `WHERE 1 != 1`; grouping, ordering, limits and locks are dropped.
pub(crate) fn field_query(query: &Query) -> Result<String, RewriteError> {
    let mut query = query.clone();
    rewrite_query_selects(
        &mut query,
        &mut |select| {
            select.selection = Some(always_false());
            select.group_by = GroupByExpr::Expressions(Vec::new(), Vec::new());
            select.having = None;
            falsify_join_conditions(select);
            Ok(())
        },
        &mut |query| {
            query.order_by = None;
            query.limit_clause = None;
            query.fetch = None;
            query.locks = Vec::new();
            Ok(())
        },
    )?;
    Ok(query.to_string())
}

/// Caps the outermost query at `row_cap + 1` rows and re-attaches comments and locks.
pub(crate) fn full_query(
    query: &Query,
    comments: &[String],
    lock: Option<LockMode>,
    config: &RewriterConfig,
) -> Result<String, RewriteError> {
    let mut query = query.clone();
    cap_limit(&mut query, config)?;
    let mut rendered = with_comments(query.to_string(), comments);
    if let Some(lock) = lock {
        rendered.push(' ');
        rendered.push_str(lock.as_sql());
    }
    Ok(rendered)
}

pub(crate) fn cap_limit(query: &mut Query, config: &RewriterConfig) -> Result<(), RewriteError> {
    let cap = number_expr(config.injected_limit());
    if query.limit_clause.is_none() {
        query.limit_clause = Some(LimitClause::LimitOffset {
            limit: Some(cap),
            offset: None,
            limit_by: Vec::new(),
        });
        return Ok(());
    }
    let Some(limit_clause) = &mut query.limit_clause else {
        return Ok(());
    };
    match limit_clause {
        LimitClause::LimitOffset { limit, .. } => match limit {
            None => *limit = Some(cap),
            Some(existing) => {
                if limit_exceeds(existing, config.row_cap)? {
                    *existing = cap;
                }
            }
        },
        LimitClause::OffsetCommaLimit { limit, .. } => {
            if limit_exceeds(limit, config.row_cap)? {
                *limit = cap;
            }
        }
    }
    Ok(())
}

/// Whether a literal limit is above the cap. Computed limits are left alone.
fn limit_exceeds(limit: &Expr, row_cap: u64) -> Result<bool, RewriteError> {
    match operand_from_expr(limit) {
        Some(Operand::Value(Value::Integer(count))) => match u64::try_from(count) {
            Ok(count) => Ok(count > row_cap),
            Err(_) => Err(invalid_limit(limit)),
        },
        Some(Operand::Value(Value::Unsigned(count))) => Ok(count > row_cap),
        Some(Operand::Value(_)) => Err(invalid_limit(limit)),
        Some(Operand::Bind(_)) | None => Ok(false),
    }
}

fn invalid_limit(limit: &Expr) -> RewriteError {
    errors::encoding_error("LIMIT must be a non-negative integer").with_clause(limit.to_string())
}

/// Inner joins lose their condition; outer joins keep an `ON 1 != 1`.
fn falsify_join_conditions(select: &mut Select) {
    for join in select.from.iter_mut().flat_map(|table| table.joins.iter_mut()) {
        match &mut join.join_operator {
            JoinOperator::Join(constraint)
            | JoinOperator::Inner(constraint)
            | JoinOperator::StraightJoin(constraint) => *constraint = JoinConstraint::None,
            JoinOperator::Left(constraint)
            | JoinOperator::LeftOuter(constraint)
            | JoinOperator::Right(constraint)
            | JoinOperator::RightOuter(constraint) => {
                if matches!(constraint, JoinConstraint::On(_)) {
                    *constraint = JoinConstraint::On(always_false());
                }
            }
            _ => {}
        }
    }
}

fn always_false() -> Expr {
    Expr::BinaryOp {
        left: Box::new(number_expr(1)),
        op: BinaryOperator::Custom("!=".to_string()),
        right: Box::new(number_expr(1)),
    }
}
