use std::ops::ControlFlow;

use sqlparser::ast::{BinaryOperator, Expr, OnInsert, SetExpr, Visit, Visitor};

use crate::config::RewriterConfig;
use crate::errors;
use crate::plan::PlanKind;
use crate::schema::{SchemaCatalog, TableSchema};
use crate::sql::ast_utils::{column_ref, split_conjuncts, unwrap_nested};
use crate::sql::params::{operand_from_expr, Operand};
use crate::sql::parse::{DmlFilter, DmlTable, InsertBody, ParsedStatement, StatementBody};
use crate::{RewriteError, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertKind {
    Simple,
    MultiRow,
    Subquery,
    Upsert,
}

/// Why a DML filter cannot be turned into primary key tuples directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnqualifiedReason {
    NoFilter,
    OrderOrLimit,
    MissingPkColumn(String),
    NonEquality(String),
    NonLiteral(String),
    DuplicatePkColumn(String),
    ExtraCondition,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PkQualification {
    /// Every primary key tuple the filter selects, in primary key order.
    Qualified(Vec<Vec<Operand>>),
    Unqualified(UnqualifiedReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmlKind {
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementClass {
    Select,
    Insert(InsertKind),
    Dml {
        kind: DmlKind,
        qualification: PkQualification,
    },
    Passthrough,
}

impl StatementClass {
    pub fn plan_kind(&self) -> PlanKind {
        match self {
            Self::Select => PlanKind::PassSelect,
            Self::Insert(InsertKind::Simple) => PlanKind::InsertPk,
            Self::Insert(InsertKind::MultiRow) => PlanKind::InsertMulti,
            Self::Insert(InsertKind::Subquery) => PlanKind::InsertSubquery,
            Self::Insert(InsertKind::Upsert) => PlanKind::UpsertPk,
            Self::Dml {
                qualification: PkQualification::Qualified(_),
                ..
            } => PlanKind::DmlPk,
            Self::Dml { .. } => PlanKind::DmlSubquery,
            Self::Passthrough => PlanKind::Passthrough,
        }
    }
}

/// Classifies a parsed statement against the schema. Pure: no execution happens here.
pub fn classify(
    statement: &ParsedStatement,
    catalog: &dyn SchemaCatalog,
    config: &RewriterConfig,
) -> Result<StatementClass, RewriteError> {
    classify_body(&statement.body, catalog, config).map_err(|error| error.with_sql(&statement.sql))
}

fn classify_body(
    body: &StatementBody,
    catalog: &dyn SchemaCatalog,
    config: &RewriterConfig,
) -> Result<StatementClass, RewriteError> {
    match body {
        StatementBody::Select(_) => Ok(StatementClass::Select),
        StatementBody::Passthrough => Ok(StatementClass::Passthrough),
        StatementBody::Insert(insert) => {
            lookup(catalog, &insert.table)?;
            Ok(StatementClass::Insert(insert_kind(insert)?))
        }
        StatementBody::Update(update) => {
            let table = lookup(catalog, &update.table.name)?;
            Ok(StatementClass::Dml {
                kind: DmlKind::Update,
                qualification: pk_qualification(&update.filter, &update.table, table, config)?,
            })
        }
        StatementBody::Delete(delete) => {
            let table = lookup(catalog, &delete.table.name)?;
            Ok(StatementClass::Dml {
                kind: DmlKind::Delete,
                qualification: pk_qualification(&delete.filter, &delete.table, table, config)?,
            })
        }
    }
}

pub(crate) fn lookup<'a>(
    catalog: &'a dyn SchemaCatalog,
    name: &str,
) -> Result<&'a TableSchema, RewriteError> {
    catalog.table(name).ok_or_else(|| errors::unknown_table(name))
}

fn insert_kind(body: &InsertBody) -> Result<InsertKind, RewriteError> {
    let Some(source) = &body.insert.source else {
        return Err(errors::parse_mismatch("INSERT without a VALUES list or SELECT"));
    };
    let values_rows = match source.body.as_ref() {
        SetExpr::Values(values) => Some(values.rows.len()),
        _ => None,
    };
    match &body.insert.on {
        Some(OnInsert::DuplicateKeyUpdate(_)) => match values_rows {
            Some(1) => Ok(InsertKind::Upsert),
            _ => Err(errors::parse_mismatch(
                "ON DUPLICATE KEY UPDATE requires a single VALUES row",
            )),
        },
        Some(_) => Err(errors::parse_mismatch("unsupported INSERT conflict clause")),
        None => Ok(match values_rows {
            Some(1) => InsertKind::Simple,
            Some(_) => InsertKind::MultiRow,
            None => InsertKind::Subquery,
        }),
    }
}

/// Decides whether `filter` pins down primary key tuples without reading the table.
pub(crate) fn pk_qualification(
    filter: &DmlFilter,
    target: &DmlTable,
    table: &TableSchema,
    config: &RewriterConfig,
) -> Result<PkQualification, RewriteError> {
    let Some(selection) = &filter.selection else {
        return Ok(PkQualification::Unqualified(UnqualifiedReason::NoFilter));
    };
    if !filter.order_by.is_empty() || filter.limit.is_some() {
        return Ok(PkQualification::Unqualified(UnqualifiedReason::OrderOrLimit));
    }

    let mut per_column: Vec<Option<Vec<Operand>>> = vec![None; table.primary_key.len()];
    for conjunct in split_conjuncts(selection) {
        let constraint = match pk_constraint(conjunct, target, table) {
            Ok(constraint) => constraint,
            Err(reason) => return Ok(PkQualification::Unqualified(reason)),
        };
        let (position, operands) = constraint;
        if per_column[position].is_some() {
            return Ok(PkQualification::Unqualified(
                UnqualifiedReason::DuplicatePkColumn(table.primary_key[position].clone()),
            ));
        }
        per_column[position] = Some(operands);
    }

    let mut columns = Vec::with_capacity(per_column.len());
    for (position, operands) in per_column.into_iter().enumerate() {
        match operands {
            Some(operands) => columns.push(operands),
            None => {
                return Ok(PkQualification::Unqualified(
                    UnqualifiedReason::MissingPkColumn(table.primary_key[position].clone()),
                ))
            }
        }
    }

    let combinations = columns
        .iter()
        .try_fold(1usize, |acc, operands| acc.checked_mul(operands.len()))
        .unwrap_or(usize::MAX);
    if combinations > config.pk_expansion_limit {
        return Err(errors::pk_combinatorial_limit_exceeded(
            &table.name,
            combinations,
            config.pk_expansion_limit,
        ));
    }
    Ok(PkQualification::Qualified(cross_product(&columns)))
}

/// The PK position and candidate operands a single conjunct constrains.
fn pk_constraint(
    conjunct: &Expr,
    target: &DmlTable,
    table: &TableSchema,
) -> Result<(usize, Vec<Operand>), UnqualifiedReason> {
    match unwrap_nested(conjunct) {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right,
        } => {
            let (position, other) = match (
                pk_column(left, target, table),
                pk_column(right, target, table),
            ) {
                (Some(position), _) => (position, right.as_ref()),
                (None, Some(position)) => (position, left.as_ref()),
                (None, None) => return Err(reason_for_other(conjunct, target, table)),
            };
            match key_operand(other) {
                Some(operand) => Ok((position, vec![operand])),
                None => Err(UnqualifiedReason::NonLiteral(
                    table.primary_key[position].clone(),
                )),
            }
        }
        Expr::InList {
            expr,
            list,
            negated: false,
        } => {
            let Some(position) = pk_column(expr, target, table) else {
                return Err(reason_for_other(conjunct, target, table));
            };
            let mut operands: Vec<Operand> = Vec::with_capacity(list.len());
            for item in list {
                let Some(operand) = key_operand(item) else {
                    return Err(UnqualifiedReason::NonLiteral(
                        table.primary_key[position].clone(),
                    ));
                };
                if !operands.contains(&operand) {
                    operands.push(operand);
                }
            }
            Ok((position, operands))
        }
        other => Err(reason_for_other(other, target, table)),
    }
}

fn pk_column(expr: &Expr, target: &DmlTable, table: &TableSchema) -> Option<usize> {
    let (qualifier, column) = column_ref(expr)?;
    if !target.owns_qualifier(qualifier) {
        return None;
    }
    table.pk_position(column)
}

fn reason_for_other(expr: &Expr, target: &DmlTable, table: &TableSchema) -> UnqualifiedReason {
    let mut finder = PkReferenceFinder { target, table };
    match Visit::visit(expr, &mut finder) {
        ControlFlow::Break(column) => UnqualifiedReason::NonEquality(column),
        ControlFlow::Continue(()) => UnqualifiedReason::ExtraCondition,
    }
}

struct PkReferenceFinder<'a> {
    target: &'a DmlTable,
    table: &'a TableSchema,
}

impl Visitor for PkReferenceFinder<'_> {
    type Break = String;

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        match pk_column(expr, self.target, self.table) {
            Some(position) => ControlFlow::Break(self.table.primary_key[position].clone()),
            None => ControlFlow::Continue(()),
        }
    }
}

/// A literal NULL never equals a key, so it cannot pin one down.
fn key_operand(expr: &Expr) -> Option<Operand> {
    match operand_from_expr(expr)? {
        Operand::Value(Value::Null) => None,
        operand => Some(operand),
    }
}

fn cross_product(columns: &[Vec<Operand>]) -> Vec<Vec<Operand>> {
    let mut tuples: Vec<Vec<Operand>> = vec![Vec::new()];
    for operands in columns {
        tuples = tuples
            .into_iter()
            .flat_map(|prefix| {
                operands.iter().map(move |operand| {
                    let mut tuple = prefix.clone();
                    tuple.push(operand.clone());
                    tuple
                })
            })
            .collect();
    }
    tuples
}
