use sqlparser::ast::{BinaryOperator, Expr, Ident};

use crate::errors;
use crate::schema::{ColumnSchema, ColumnType, TableSchema};
use crate::sql::ast_utils::{and_all, or_all};
use crate::sql::params::{format_real, literal_expr, number_value, validate_decimal};
use crate::{RewriteError, Value};

/// Primary key values of one row, in primary key order.
#[derive(Debug, Clone, PartialEq)]
pub struct RowKeyTuple(pub Vec<Value>);

impl RowKeyTuple {
    pub fn values(&self) -> &[Value] {
        &self.0
    }
}

/// Builds a tuple from raw values in primary key order, coercing each to its column type.
pub(crate) fn row_key(
    table: &TableSchema,
    values: Vec<Value>,
) -> Result<RowKeyTuple, RewriteError> {
    if values.len() != table.primary_key.len() {
        return Err(errors::parse_mismatch(format!(
            "expected {} primary key values for `{}`, got {}",
            table.primary_key.len(),
            table.name,
            values.len()
        )));
    }
    let values = table
        .pk_columns()
        .zip(values)
        .map(|(column, value)| coerce_pk_value(column, value))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RowKeyTuple(values))
}

/// Normalizes a value to the representation of `column`'s type.
pub(crate) fn coerce_pk_value(column: &ColumnSchema, value: Value) -> Result<Value, RewriteError> {
    let mismatch = |value: &Value| {
        errors::encoding_error(format!(
            "{} value is not valid for primary key column `{}`",
            value.type_name(),
            column.name
        ))
        .with_clause(column.name.clone())
    };
    if value.is_null() {
        return Err(errors::encoding_error(format!(
            "primary key column `{}` cannot be NULL",
            column.name
        )));
    }
    match column.column_type {
        ColumnType::Integer { .. } => coerce_integer(column, value),
        ColumnType::Decimal => match value {
            Value::Integer(number) => Ok(Value::Decimal(number.to_string())),
            Value::Unsigned(number) => Ok(Value::Decimal(number.to_string())),
            Value::Real(number) => Ok(Value::Decimal(format_real(number)?)),
            Value::Decimal(text) | Value::Text(text) => {
                Ok(Value::Decimal(validate_decimal(text.trim())?.to_string()))
            }
            other => Err(mismatch(&other)),
        },
        ColumnType::Float => match value {
            Value::Integer(number) => Ok(Value::Real(number as f64)),
            Value::Unsigned(number) => Ok(Value::Real(number as f64)),
            Value::Real(number) => Ok(Value::Real(number)),
            Value::Decimal(text) | Value::Text(text) => text
                .trim()
                .parse::<f64>()
                .map(Value::Real)
                .map_err(|_| mismatch(&Value::Text(text))),
            other => Err(mismatch(&other)),
        },
        ColumnType::Text | ColumnType::Temporal => match value {
            Value::Text(text) => Ok(Value::Text(text)),
            Value::Integer(number) => Ok(Value::Text(number.to_string())),
            Value::Unsigned(number) => Ok(Value::Text(number.to_string())),
            Value::Decimal(text) => Ok(Value::Text(text)),
            Value::Blob(bytes) => String::from_utf8(bytes)
                .map(Value::Text)
                .map_err(|error| mismatch(&Value::Blob(error.into_bytes()))),
            other => Err(mismatch(&other)),
        },
        ColumnType::Binary => match value {
            Value::Blob(bytes) => Ok(Value::Blob(bytes)),
            Value::Text(text) | Value::Decimal(text) => Ok(Value::Blob(text.into_bytes())),
            Value::Integer(number) => Ok(Value::Blob(number.to_string().into_bytes())),
            Value::Unsigned(number) => Ok(Value::Blob(number.to_string().into_bytes())),
            other => Err(mismatch(&other)),
        },
    }
}

fn coerce_integer(column: &ColumnSchema, value: Value) -> Result<Value, RewriteError> {
    let number: i128 = match &value {
        Value::Integer(number) => i128::from(*number),
        Value::Unsigned(number) => i128::from(*number),
        Value::Real(number) if number.fract() == 0.0 && number.is_finite() => *number as i128,
        Value::Decimal(text) | Value::Text(text) => match number_value(text.trim()) {
            Value::Integer(number) => i128::from(number),
            Value::Unsigned(number) => i128::from(number),
            _ => return Err(integer_error(column, &value)),
        },
        _ => return Err(integer_error(column, &value)),
    };
    let Some((min, max)) = column.column_type.integer_bounds() else {
        return Err(integer_error(column, &value));
    };
    if number < min || number > max {
        return Err(errors::encoding_error(format!(
            "value {number} is out of range for primary key column `{}`",
            column.name
        ))
        .with_clause(column.name.clone()));
    }
    Ok(match i64::try_from(number) {
        Ok(signed) => Value::Integer(signed),
        Err(_) => Value::Unsigned(number as u64),
    })
}

fn integer_error(column: &ColumnSchema, value: &Value) -> RewriteError {
    errors::encoding_error(format!(
        "{} value is not a valid integer for primary key column `{}`",
        value.type_name(),
        column.name
    ))
    .with_clause(column.name.clone())
}

/// Filter selecting exactly `tuples`: `pk IN (..)` for a single-column key,
/// otherwise `(a = .. AND b = ..) OR (..)`.
pub(crate) fn pk_filter_expr(
    table: &TableSchema,
    tuples: &[RowKeyTuple],
) -> Result<Expr, RewriteError> {
    if tuples.is_empty() {
        return Err(errors::parse_mismatch("cannot build a primary key filter for zero rows"));
    }
    if let [pk] = table.primary_key.as_slice() {
        let list = tuples
            .iter()
            .map(|tuple| literal_expr(&tuple.0[0]))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Expr::InList {
            expr: Box::new(Expr::Identifier(Ident::new(pk))),
            list,
            negated: false,
        });
    }
    let mut disjuncts = Vec::with_capacity(tuples.len());
    for tuple in tuples {
        let terms = table
            .primary_key
            .iter()
            .zip(tuple.values())
            .map(|(pk, value)| {
                Ok(Expr::BinaryOp {
                    left: Box::new(Expr::Identifier(Ident::new(pk))),
                    op: BinaryOperator::Eq,
                    right: Box::new(literal_expr(value)?),
                })
            })
            .collect::<Result<Vec<_>, RewriteError>>()?;
        if let Some(conjunction) = and_all(terms) {
            disjuncts.push(Expr::Nested(Box::new(conjunction)));
        }
    }
    or_all(disjuncts).ok_or_else(|| errors::parse_mismatch("empty primary key"))
}
