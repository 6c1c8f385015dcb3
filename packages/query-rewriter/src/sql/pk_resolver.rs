use sqlparser::ast::{Assignment, AssignmentTarget, Expr, Statement};

use crate::config::RewriterConfig;
use crate::errors;
use crate::schema::TableSchema;
use crate::sql::ast_utils::{object_name_last, with_comments};
use crate::sql::classify::PkQualification;
use crate::sql::params::{bind_node, operand_from_expr, BindVars, Operand};
use crate::sql::parse::{DmlFilter, DmlTable, ParsedStatement, StatementBody};
use crate::sql::row_key::{coerce_pk_value, pk_filter_expr, row_key, RowKeyTuple};
use crate::sql::stream::{annotate, StreamAnnotation};
use crate::{RewriteError, Value};

/// A DML statement rewritten to address rows by primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct DmlRewrite {
    pub sql: String,
    pub annotation: StreamAnnotation,
}

#[derive(Debug)]
pub enum DmlStep<'a> {
    Ready(DmlRewrite),
    /// The primary keys must first be read with `probe.sql`.
    Probe(PendingProbe<'a>),
    /// The filter cannot match any row; nothing needs to run.
    NoRows,
}

#[derive(Debug)]
pub struct PendingProbe<'a> {
    pub sql: String,
    /// Whether the probe's LIMIT is the injected cap rather than the statement's own.
    capped: bool,
    planner: DmlPlanner<'a>,
}

impl PendingProbe<'_> {
    /// Turns the probe's result rows into the rewritten statement.
    /// `None` means the probe matched nothing and no DML should run.
    pub fn resolve(self, rows: Vec<Vec<Value>>) -> Result<Option<DmlRewrite>, RewriteError> {
        let sql = &self.planner.statement.sql;
        if self.capped && rows.len() as u64 > self.planner.config.row_cap {
            return Err(errors::row_cap_exceeded(
                "primary key probe",
                self.planner.config.row_cap,
            )
            .with_sql(sql));
        }
        if rows.is_empty() {
            return Ok(None);
        }
        let tuples = rows
            .into_iter()
            .map(|row| row_key(self.planner.table, row))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|error| error.with_sql(sql))?;
        self.planner.rewrite(&tuples).map(Some)
    }
}

/// Binds the statement and checks its SET list before anything runs, then
/// either rewrites it directly or asks for the probe that finds its keys.
pub fn plan_dml<'a>(
    statement: &'a ParsedStatement,
    table: &'a TableSchema,
    qualification: &PkQualification,
    binds: &'a BindVars,
    config: &'a RewriterConfig,
) -> Result<DmlStep<'a>, RewriteError> {
    let planner = DmlPlanner::new(statement, table, binds, config)?;
    let step = match qualification {
        PkQualification::Qualified(operands) => {
            let mut tuples = Vec::with_capacity(operands.len());
            for tuple in operands {
                let values = tuple
                    .iter()
                    .map(|operand| operand.resolve(binds))
                    .collect::<Result<Vec<_>, _>>()?;
                // `pk = NULL` matches nothing.
                if values.iter().any(Value::is_null) {
                    continue;
                }
                tuples.push(row_key(table, values)?);
            }
            if tuples.is_empty() {
                DmlStep::NoRows
            } else {
                DmlStep::Ready(planner.rewrite(&tuples)?)
            }
        }
        PkQualification::Unqualified(_) => {
            let (sql, capped) = planner.probe_sql()?;
            DmlStep::Probe(PendingProbe {
                sql,
                capped,
                planner,
            })
        }
    };
    Ok(step)
}

#[derive(Debug)]
struct DmlPlanner<'a> {
    statement: &'a ParsedStatement,
    table: &'a TableSchema,
    binds: &'a BindVars,
    config: &'a RewriterConfig,
    /// The bound UPDATE or DELETE; each rewrite only swaps in the key filter.
    template: Statement,
    changes: Vec<(usize, Value)>,
}

impl<'a> DmlPlanner<'a> {
    fn new(
        statement: &'a ParsedStatement,
        table: &'a TableSchema,
        binds: &'a BindVars,
        config: &'a RewriterConfig,
    ) -> Result<Self, RewriteError> {
        let (mut template, changes) = match &statement.body {
            StatementBody::Update(body) => (
                Statement::Update(body.update.clone()),
                pk_changes(&body.update.assignments, table, binds)?,
            ),
            StatementBody::Delete(body) => (Statement::Delete(body.delete.clone()), Vec::new()),
            _ => return Err(errors::parse_mismatch("expected UPDATE or DELETE")),
        };
        bind_node(&mut template, binds)?;
        Ok(Self {
            statement,
            table,
            binds,
            config,
            template,
            changes,
        })
    }

    fn target(&self) -> Result<(&DmlTable, &DmlFilter), RewriteError> {
        match &self.statement.body {
            StatementBody::Update(body) => Ok((&body.table, &body.filter)),
            StatementBody::Delete(body) => Ok((&body.table, &body.filter)),
            _ => Err(errors::parse_mismatch("expected UPDATE or DELETE")),
        }
    }

    /// `SELECT <pk> FROM <table> [WHERE ..] [ORDER BY ..] LIMIT n FOR UPDATE`.
    fn probe_sql(&self) -> Result<(String, bool), RewriteError> {
        let (target, filter) = self.target()?;
        let mut sql = format!(
            "SELECT {} FROM {}",
            self.table.primary_key.join(", "),
            target.relation
        );
        if let Some(selection) = &filter.selection {
            sql.push_str(&format!(" WHERE {}", self.bound(selection)?));
        }
        if !filter.order_by.is_empty() {
            let mut order_by = filter.order_by.clone();
            for item in &mut order_by {
                bind_node(&mut item.expr, self.binds)?;
            }
            let rendered = order_by
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" ORDER BY {rendered}"));
        }
        let own_limit = match &filter.limit {
            Some(limit) => {
                let bound = self.bound(limit)?;
                match operand_from_expr(&bound) {
                    Some(Operand::Value(Value::Integer(count)))
                        if count >= 0 && count as u64 <= self.config.row_cap =>
                    {
                        Some(bound)
                    }
                    Some(Operand::Value(Value::Unsigned(count)))
                        if count <= self.config.row_cap =>
                    {
                        Some(bound)
                    }
                    Some(Operand::Value(Value::Integer(_) | Value::Unsigned(_))) => None,
                    _ => {
                        return Err(errors::encoding_error("LIMIT must be a non-negative integer")
                            .with_clause(bound.to_string())
                            .with_sql(&self.statement.sql))
                    }
                }
            }
            None => None,
        };
        let capped = own_limit.is_none();
        match own_limit {
            Some(limit) => sql.push_str(&format!(" LIMIT {limit}")),
            None => sql.push_str(&format!(" LIMIT {}", self.config.injected_limit())),
        }
        sql.push_str(" FOR UPDATE");
        Ok((sql, capped))
    }

    fn bound(&self, expr: &Expr) -> Result<Expr, RewriteError> {
        let mut expr = expr.clone();
        bind_node(&mut expr, self.binds).map_err(|error| error.with_sql(&self.statement.sql))?;
        Ok(expr)
    }

    fn rewrite(&self, tuples: &[RowKeyTuple]) -> Result<DmlRewrite, RewriteError> {
        self.rewrite_inner(tuples)
            .map_err(|error| error.with_sql(&self.statement.sql))
    }

    fn rewrite_inner(&self, tuples: &[RowKeyTuple]) -> Result<DmlRewrite, RewriteError> {
        let selection = pk_filter_expr(self.table, tuples)?;
        let mut annotation = StreamAnnotation::new(self.table);
        for tuple in tuples {
            annotation.push(tuple.clone());
            if !self.changes.is_empty() {
                let mut changed = tuple.clone();
                for (position, value) in &self.changes {
                    changed.0[*position] = value.clone();
                }
                annotation.push(changed);
            }
        }
        let mut statement = self.template.clone();
        match &mut statement {
            Statement::Update(update) => update.selection = Some(selection),
            Statement::Delete(delete) => delete.selection = Some(selection),
            _ => return Err(errors::parse_mismatch("expected UPDATE or DELETE")),
        }
        let sql = annotate(
            with_comments(statement.to_string(), &self.statement.comments),
            &annotation,
        )?;
        Ok(DmlRewrite { sql, annotation })
    }
}

/// New primary key values assigned by an UPDATE, by primary key position.
pub(crate) fn pk_changes(
    assignments: &[Assignment],
    table: &TableSchema,
    binds: &BindVars,
) -> Result<Vec<(usize, Value)>, RewriteError> {
    let mut changes = Vec::new();
    for assignment in assignments {
        let AssignmentTarget::ColumnName(name) = &assignment.target else {
            return Err(errors::parse_mismatch("tuple assignments are not supported")
                .with_clause(assignment.to_string()));
        };
        let Some(column_name) = object_name_last(name) else {
            continue;
        };
        let Some(position) = table.pk_position(&column_name) else {
            continue;
        };
        let Some(operand) = operand_from_expr(&assignment.value) else {
            return Err(errors::parse_mismatch(format!(
                "primary key column `{column_name}` must be assigned a literal value"
            ))
            .with_clause(assignment.to_string()));
        };
        let Some(column) = table.column(&column_name) else {
            continue;
        };
        let value = coerce_pk_value(column, operand.resolve(binds)?)?;
        changes.push((position, value));
    }
    Ok(changes)
}
