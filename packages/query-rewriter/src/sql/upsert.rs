use std::collections::HashMap;
use std::ops::ControlFlow;

use sqlparser::ast::{
    Assignment, Expr, FunctionArg, FunctionArgExpr, FunctionArguments, OnInsert, VisitMut,
    VisitorMut,
};

use crate::errors;
use crate::schema::TableSchema;
use crate::sql::ast_utils::{column_ref, object_name_matches};
use crate::sql::insert::{build_insert, effective_columns, values_rows, InsertRewrite};
use crate::sql::params::{bind_node, literal_expr, BindVars};
use crate::sql::parse::{InsertBody, ParsedStatement};
use crate::sql::pk_resolver::{pk_changes, DmlRewrite};
use crate::sql::row_key::pk_filter_expr;
use crate::sql::stream::{annotate, StreamAnnotation};
use crate::{RewriteError, Value};

/// A plain insert plus the update to run if it hits a duplicate key.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertRewrite {
    pub insert: InsertRewrite,
    pub update: DmlRewrite,
}

pub(crate) fn plan_upsert(
    statement: &ParsedStatement,
    body: &InsertBody,
    table: &TableSchema,
    binds: &BindVars,
    first_generated_id: Option<u64>,
) -> Result<UpsertRewrite, RewriteError> {
    let mut plain = body.clone();
    let mut assignments = match plain.insert.on.take() {
        Some(OnInsert::DuplicateKeyUpdate(assignments)) => assignments,
        _ => return Err(errors::parse_mismatch("expected ON DUPLICATE KEY UPDATE")),
    };
    plain.insert.ignore = false;
    let insert = build_insert(statement, &plain, table, binds, first_generated_id)?;
    let Some(key) = insert.annotation.tuples().first().cloned() else {
        return Err(errors::parse_mismatch("upsert inserted no row"));
    };

    let inserted = inserted_values(&plain, table, binds, key.values())?;
    resolve_assignments(&mut assignments, &inserted, table, binds)?;

    let changes = pk_changes(&assignments, table, binds)?;
    let mut annotation = StreamAnnotation::new(table);
    annotation.push(key.clone());
    if !changes.is_empty() {
        let mut changed = key.clone();
        for (position, value) in changes {
            changed.0[position] = value;
        }
        annotation.push(changed);
    }

    let set_list = assignments
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    let filter = pk_filter_expr(table, std::slice::from_ref(&key))?;
    let sql = annotate(
        format!(
            "UPDATE {} SET {set_list} WHERE {filter}",
            plain.insert.table
        ),
        &annotation,
    )?;
    Ok(UpsertRewrite {
        insert,
        update: DmlRewrite { sql, annotation },
    })
}

/// Checks the ON DUPLICATE KEY UPDATE list before any id is reserved.
pub(crate) fn validate_upsert(
    body: &InsertBody,
    table: &TableSchema,
    binds: &BindVars,
) -> Result<(), RewriteError> {
    let Some(OnInsert::DuplicateKeyUpdate(assignments)) = &body.insert.on else {
        return Err(errors::parse_mismatch("expected ON DUPLICATE KEY UPDATE"));
    };
    let mut inserted = inserted_values(body, table, binds, &[])?;
    // The generated id is not known yet; any integer goes through the same checks.
    if let Some(auto) = &table.auto_increment {
        inserted.insert(auto.to_ascii_lowercase(), literal_expr(&Value::Integer(0))?);
    }
    let mut assignments = assignments.clone();
    resolve_assignments(&mut assignments, &inserted, table, binds)?;
    pk_changes(&assignments, table, binds)?;
    Ok(())
}

fn resolve_assignments(
    assignments: &mut [Assignment],
    inserted: &HashMap<String, Expr>,
    table: &TableSchema,
    binds: &BindVars,
) -> Result<(), RewriteError> {
    for assignment in assignments {
        let mut resolver = InsertedValueResolver { inserted, table };
        if let ControlFlow::Break(error) = assignment.value.visit(&mut resolver) {
            return Err(error);
        }
        bind_node(&mut assignment.value, binds)?;
    }
    Ok(())
}

/// Bound literal per inserted column, lowercased; primary key columns take their final key value.
fn inserted_values(
    body: &InsertBody,
    table: &TableSchema,
    binds: &BindVars,
    key: &[Value],
) -> Result<HashMap<String, Expr>, RewriteError> {
    let columns = effective_columns(body, table);
    let Some(row) = values_rows(&body.insert)?.first() else {
        return Err(errors::parse_mismatch("upsert requires one VALUES row"));
    };
    let mut inserted = HashMap::new();
    for (column, expr) in columns.iter().zip(row) {
        let mut expr = expr.clone();
        bind_node(&mut expr, binds)?;
        inserted.insert(column.to_ascii_lowercase(), expr);
    }
    for (pk, value) in table.primary_key.iter().zip(key) {
        inserted.insert(pk.to_ascii_lowercase(), literal_expr(value)?);
    }
    Ok(inserted)
}

/// Replaces `VALUES(col)` with the value the insert tried to write.
struct InsertedValueResolver<'a> {
    inserted: &'a HashMap<String, Expr>,
    table: &'a TableSchema,
}

impl InsertedValueResolver<'_> {
    fn resolve(&self, column: &str) -> Result<Expr, RewriteError> {
        if let Some(expr) = self.inserted.get(&column.to_ascii_lowercase()) {
            return Ok(expr.clone());
        }
        match self.table.column(column) {
            Some(schema) => literal_expr(schema.default.as_ref().unwrap_or(&Value::Null)),
            None => Err(errors::parse_mismatch(format!(
                "VALUES() refers to unknown column `{column}`"
            ))),
        }
    }
}

impl VisitorMut for InsertedValueResolver<'_> {
    type Break = RewriteError;

    fn post_visit_expr(&mut self, expr: &mut Expr) -> ControlFlow<Self::Break> {
        let Expr::Function(function) = expr else {
            return ControlFlow::Continue(());
        };
        if !object_name_matches(&function.name, "values") {
            return ControlFlow::Continue(());
        }
        let column = match &function.args {
            FunctionArguments::List(list) => match list.args.as_slice() {
                [FunctionArg::Unnamed(FunctionArgExpr::Expr(arg))] => {
                    column_ref(arg).map(|(_, column)| column.to_string())
                }
                _ => None,
            },
            _ => None,
        };
        let Some(column) = column else {
            return ControlFlow::Break(
                errors::parse_mismatch("VALUES() expects a single column reference")
                    .with_clause(function.to_string()),
            );
        };
        match self.resolve(&column) {
            Ok(resolved) => {
                *expr = resolved;
                ControlFlow::Continue(())
            }
            Err(error) => ControlFlow::Break(error),
        }
    }
}
