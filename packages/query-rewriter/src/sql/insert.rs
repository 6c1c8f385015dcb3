use sqlparser::ast::{Expr, Ident, Insert, Query, SetExpr, Statement, Values};

use crate::config::RewriterConfig;
use crate::errors;
use crate::schema::TableSchema;
use crate::sql::ast_utils::with_comments;
use crate::sql::params::{bind_node, literal_expr, operand_from_expr, BindVars};
use crate::sql::parse::{InsertBody, ParsedStatement};
use crate::sql::row_key::row_key;
use crate::sql::select::cap_limit;
use crate::sql::stream::{annotate, StreamAnnotation};
use crate::{RewriteError, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct InsertRewrite {
    pub sql: String,
    pub annotation: StreamAnnotation,
}

/// Where a row's primary key value comes from.
#[derive(Debug, Clone, PartialEq)]
enum PkSource {
    Given(Value),
    Default(Value),
    Generated,
}

/// Number of rows that need a generated auto-increment id.
pub(crate) fn auto_increment_demand(
    body: &InsertBody,
    table: &TableSchema,
    binds: &BindVars,
) -> Result<u64, RewriteError> {
    let columns = effective_columns(body, table);
    let mut demand = 0;
    for row in values_rows(&body.insert)? {
        let sources = pk_sources(&columns, row, table, binds)?;
        if sources.contains(&PkSource::Generated) {
            demand += 1;
        }
    }
    Ok(demand)
}

/// The capped, bound SELECT feeding an `INSERT ... SELECT`.
pub(crate) fn source_query(
    body: &InsertBody,
    binds: &BindVars,
    config: &RewriterConfig,
) -> Result<String, RewriteError> {
    let Some(source) = &body.insert.source else {
        return Err(errors::parse_mismatch("INSERT without a source query"));
    };
    let mut query = source.as_ref().clone();
    bind_node(&mut query, binds)?;
    cap_limit(&mut query, config)?;
    Ok(query.to_string())
}

/// Replaces the SELECT source with the rows it returned. `None` when it returned nothing.
pub(crate) fn materialize_source(
    body: &InsertBody,
    table: &TableSchema,
    rows: Vec<Vec<Value>>,
    config: &RewriterConfig,
) -> Result<Option<InsertBody>, RewriteError> {
    if rows.len() as u64 > config.row_cap {
        return Err(errors::row_cap_exceeded("INSERT ... SELECT source", config.row_cap));
    }
    if rows.is_empty() {
        return Ok(None);
    }
    let expected_columns = effective_columns(body, table).len();
    let mut literal_rows = Vec::with_capacity(rows.len());
    for row in rows {
        if row.len() != expected_columns {
            return Err(errors::parse_mismatch(format!(
                "INSERT ... SELECT returned {} columns but {} were expected",
                row.len(),
                expected_columns
            )));
        }
        literal_rows.push(row.iter().map(literal_expr).collect::<Result<Vec<_>, _>>()?);
    }

    let mut materialized = body.clone();
    materialized.insert.source = Some(Box::new(Query {
        with: None,
        body: Box::new(SetExpr::Values(Values {
            explicit_row: false,
            value_keyword: false,
            rows: literal_rows,
        })),
        order_by: None,
        limit_clause: None,
        fetch: None,
        locks: Vec::new(),
        for_clause: None,
        settings: None,
        format_clause: None,
        pipe_operators: Vec::new(),
    }));
    Ok(Some(materialized))
}

/// Binds the insert, fills generated ids and annotates every inserted key.
/// `first_generated_id` starts the block reserved for rows lacking an auto-increment value.
pub(crate) fn build_insert(
    statement: &ParsedStatement,
    body: &InsertBody,
    table: &TableSchema,
    binds: &BindVars,
    first_generated_id: Option<u64>,
) -> Result<InsertRewrite, RewriteError> {
    let columns = effective_columns(body, table);
    let auto_column = table.auto_increment.clone();
    let auto_position = auto_column.as_deref().and_then(|name| {
        columns
            .iter()
            .position(|column| column.eq_ignore_ascii_case(name))
    });

    let mut insert = body.insert.clone();
    let mut annotation = StreamAnnotation::new(table);
    let mut next_id = first_generated_id;
    let mut appended_auto_column = false;
    for row in values_rows_mut(&mut insert)? {
        let sources = pk_sources(&columns, row, table, binds)?;
        let mut key = Vec::with_capacity(sources.len());
        for source in sources {
            let value = match source {
                PkSource::Given(value) | PkSource::Default(value) => value,
                PkSource::Generated => {
                    let id = next_id.ok_or_else(|| {
                        errors::parse_mismatch("no auto-increment ids were reserved")
                    })?;
                    next_id = id.checked_add(1);
                    let value = i64::try_from(id)
                        .map(Value::Integer)
                        .unwrap_or(Value::Unsigned(id));
                    let literal = literal_expr(&value)?;
                    match auto_position {
                        Some(position) => row[position] = literal,
                        None => {
                            row.push(literal);
                            appended_auto_column = true;
                        }
                    }
                    value
                }
            };
            key.push(value);
        }
        annotation.push(row_key(table, key)?);
    }
    if appended_auto_column {
        if let Some(name) = &auto_column {
            insert.columns.push(Ident::new(name));
        }
    }

    let mut statement_ast = Statement::Insert(insert);
    bind_node(&mut statement_ast, binds)?;
    let sql = annotate(
        with_comments(statement_ast.to_string(), &statement.comments),
        &annotation,
    )?;
    Ok(InsertRewrite { sql, annotation })
}

/// Fails on any missing bind before ids are reserved or anything runs.
pub(crate) fn check_insert_binds(body: &InsertBody, binds: &BindVars) -> Result<(), RewriteError> {
    let mut statement = Statement::Insert(body.insert.clone());
    bind_node(&mut statement, binds)
}

pub(crate) fn effective_columns(body: &InsertBody, table: &TableSchema) -> Vec<String> {
    if body.columns.is_empty() {
        table
            .columns
            .iter()
            .map(|column| column.name.clone())
            .collect()
    } else {
        body.columns.clone()
    }
}

pub(crate) fn values_rows(insert: &Insert) -> Result<&[Vec<Expr>], RewriteError> {
    match insert.source.as_deref().map(|source| source.body.as_ref()) {
        Some(SetExpr::Values(values)) => Ok(values.rows.as_slice()),
        _ => Err(errors::parse_mismatch("INSERT source is not a VALUES list")),
    }
}

fn values_rows_mut(insert: &mut Insert) -> Result<&mut Vec<Vec<Expr>>, RewriteError> {
    match insert.source.as_deref_mut().map(|source| source.body.as_mut()) {
        Some(SetExpr::Values(values)) => Ok(&mut values.rows),
        _ => Err(errors::parse_mismatch("INSERT source is not a VALUES list")),
    }
}

/// Primary key sources for one VALUES row, in primary key order.
fn pk_sources(
    columns: &[String],
    row: &[Expr],
    table: &TableSchema,
    binds: &BindVars,
) -> Result<Vec<PkSource>, RewriteError> {
    if row.len() != columns.len() {
        return Err(errors::parse_mismatch(format!(
            "INSERT row has {} values for {} columns",
            row.len(),
            columns.len()
        )));
    }
    let mut sources = Vec::with_capacity(table.primary_key.len());
    for column in table.pk_columns() {
        let auto = table.is_auto_increment(&column.name);
        let position = columns
            .iter()
            .position(|name| name.eq_ignore_ascii_case(&column.name));
        let source = match position {
            Some(position) => {
                let Some(operand) = operand_from_expr(&row[position]) else {
                    return Err(errors::parse_mismatch(format!(
                        "could not compute primary key value for `{}`",
                        column.name
                    ))
                    .with_clause(row[position].to_string()));
                };
                let value = operand.resolve(binds)?;
                let unset = matches!(value, Value::Null | Value::Integer(0) | Value::Unsigned(0));
                if auto && unset {
                    PkSource::Generated
                } else {
                    PkSource::Given(value)
                }
            }
            None if auto => PkSource::Generated,
            None => match &column.default {
                Some(default) => PkSource::Default(default.clone()),
                None => {
                    return Err(errors::parse_mismatch(format!(
                        "primary key column `{}` has no value and no default",
                        column.name
                    )))
                }
            },
        };
        sources.push(source);
    }
    Ok(sources)
}
