use std::collections::BTreeMap;
use std::ops::ControlFlow;

use sqlparser::ast::{Expr, UnaryOperator, Value as SqlValue};
use sqlparser::ast::{VisitMut, VisitorMut};

use crate::errors;
use crate::sql::ast_utils::unwrap_nested;
use crate::{RewriteError, Value};

/// Named bind variables. Positional `?` markers are named `v1`, `v2`, … in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindVars {
    values: BTreeMap<String, Value>,
}

impl BindVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional(values: impl IntoIterator<Item = Value>) -> Self {
        let mut binds = Self::new();
        for (index, value) in values.into_iter().enumerate() {
            binds.insert(format!("v{}", index + 1), value);
        }
        binds
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub(crate) fn require(&self, name: &str) -> Result<&Value, RewriteError> {
        self.get(name).ok_or_else(|| errors::missing_bind_var(name))
    }
}

/// A literal or an unresolved bind reference taken from the statement text.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    Bind(String),
}

impl Operand {
    pub(crate) fn resolve(&self, binds: &BindVars) -> Result<Value, RewriteError> {
        match self {
            Self::Value(value) => Ok(value.clone()),
            Self::Bind(name) => binds.require(name).cloned(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PlaceholderState {
    next_ordinal: usize,
}

/// Renames `?`, `?N` and `$N` markers to `:vN` so every bind is addressed by name.
pub(crate) fn canonicalize_placeholders<T: VisitMut>(
    node: &mut T,
    state: &mut PlaceholderState,
) -> Result<(), RewriteError> {
    let mut visitor = PlaceholderCanonicalizer { state };
    if let ControlFlow::Break(error) = node.visit(&mut visitor) {
        return Err(error);
    }
    Ok(())
}

struct PlaceholderCanonicalizer<'a> {
    state: &'a mut PlaceholderState,
}

impl VisitorMut for PlaceholderCanonicalizer<'_> {
    type Break = RewriteError;

    fn pre_visit_value(&mut self, value: &mut SqlValue) -> ControlFlow<Self::Break> {
        let SqlValue::Placeholder(token) = value else {
            return ControlFlow::Continue(());
        };
        let trimmed = token.trim();
        let ordinal = if trimmed == "?" {
            self.state.next_ordinal += 1;
            self.state.next_ordinal
        } else if let Some(numeric) = trimmed
            .strip_prefix('?')
            .or_else(|| trimmed.strip_prefix('$'))
        {
            match numeric.parse::<usize>() {
                Ok(parsed) if parsed > 0 => {
                    self.state.next_ordinal = self.state.next_ordinal.max(parsed);
                    parsed
                }
                _ => {
                    return ControlFlow::Break(
                        errors::parse_mismatch(format!("invalid placeholder '{trimmed}'"))
                            .with_clause(trimmed),
                    )
                }
            }
        } else {
            return ControlFlow::Continue(());
        };
        *value = SqlValue::Placeholder(format!(":v{ordinal}"));
        ControlFlow::Continue(())
    }
}

pub(crate) fn placeholder_name(token: &str) -> Option<&str> {
    token.trim().strip_prefix(':')
}

/// Replaces every `:name` placeholder under `node` with its encoded literal.
pub(crate) fn bind_node<T: VisitMut>(node: &mut T, binds: &BindVars) -> Result<(), RewriteError> {
    let mut visitor = PlaceholderBinder { binds };
    if let ControlFlow::Break(error) = node.visit(&mut visitor) {
        return Err(error);
    }
    Ok(())
}

struct PlaceholderBinder<'a> {
    binds: &'a BindVars,
}

impl VisitorMut for PlaceholderBinder<'_> {
    type Break = RewriteError;

    fn pre_visit_value(&mut self, value: &mut SqlValue) -> ControlFlow<Self::Break> {
        let SqlValue::Placeholder(token) = value else {
            return ControlFlow::Continue(());
        };
        let Some(name) = placeholder_name(token) else {
            return ControlFlow::Continue(());
        };
        match self.binds.require(name).and_then(encode_value) {
            Ok(encoded) => {
                *value = encoded;
                ControlFlow::Continue(())
            }
            Err(error) => ControlFlow::Break(error),
        }
    }
}

/// Encodes a typed value as a SQL literal node.
pub(crate) fn encode_value(value: &Value) -> Result<SqlValue, RewriteError> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Integer(value) => SqlValue::Number(value.to_string(), false),
        Value::Unsigned(value) => SqlValue::Number(value.to_string(), false),
        Value::Real(value) => SqlValue::Number(format_real(*value)?, false),
        Value::Decimal(text) => SqlValue::Number(validate_decimal(text)?.to_string(), false),
        Value::Text(text) => SqlValue::SingleQuotedString(escape_string(text)),
        Value::Blob(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => SqlValue::SingleQuotedString(escape_string(text)),
            Err(_) => SqlValue::HexStringLiteral(hex_upper(bytes)),
        },
    })
}

pub(crate) fn literal_expr(value: &Value) -> Result<Expr, RewriteError> {
    Ok(Expr::Value(encode_value(value)?.into()))
}

/// The literal text a value renders as inside a rewritten statement.
pub fn encode_literal(value: &Value) -> Result<String, RewriteError> {
    Ok(match value {
        Value::Text(text) => format!("'{}'", escape_string(text)),
        Value::Blob(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => format!("'{}'", escape_string(text)),
            Err(_) => format!("X'{}'", hex_upper(bytes)),
        },
        other => encode_value(other)?.to_string(),
    })
}

pub(crate) fn format_real(value: f64) -> Result<String, RewriteError> {
    if !value.is_finite() {
        return Err(errors::encoding_error(format!(
            "float value {value} cannot be encoded as a SQL literal"
        )));
    }
    Ok(value.to_string())
}

pub(crate) fn validate_decimal(text: &str) -> Result<&str, RewriteError> {
    if is_decimal_literal(text) {
        Ok(text)
    } else {
        Err(errors::encoding_error(format!("'{text}' is not a decimal number")).with_clause(text))
    }
}

fn is_decimal_literal(text: &str) -> bool {
    let unsigned = text
        .strip_prefix('-')
        .or_else(|| text.strip_prefix('+'))
        .unwrap_or(text);
    let (mantissa, exponent) = match unsigned.find(|c| c == 'e' || c == 'E') {
        Some(index) => (&unsigned[..index], Some(&unsigned[index + 1..])),
        None => (unsigned, None),
    };
    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let digits_ok = |part: &str| part.bytes().all(|byte| byte.is_ascii_digit());
    let mantissa_ok =
        digits_ok(whole) && digits_ok(fraction) && !(whole.is_empty() && fraction.is_empty());
    let exponent_ok = match exponent {
        None => true,
        Some(exponent) => {
            let digits = exponent
                .strip_prefix('-')
                .or_else(|| exponent.strip_prefix('+'))
                .unwrap_or(exponent);
            !digits.is_empty() && digits_ok(digits)
        }
    };
    mantissa_ok && exponent_ok
}

/// MySQL backslash escaping for the body of a single-quoted string.
pub(crate) fn escape_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\0' => out.push_str("\\0"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\u{8}' => out.push_str("\\b"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{1a}' => out.push_str("\\Z"),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out
}

fn hex_upper(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02X}")).collect()
}

/// Literal or bind reference for a scalar expression; `None` for anything computed.
pub(crate) fn operand_from_expr(expr: &Expr) -> Option<Operand> {
    match unwrap_nested(expr) {
        Expr::Value(value) => operand_from_sql_value(&value.value),
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => match operand_from_expr(expr)? {
            Operand::Value(value) => negate(value).map(Operand::Value),
            Operand::Bind(_) => None,
        },
        Expr::UnaryOp {
            op: UnaryOperator::Plus,
            expr,
        } => match operand_from_expr(expr)? {
            operand @ Operand::Value(
                Value::Integer(_) | Value::Unsigned(_) | Value::Decimal(_),
            ) => Some(operand),
            _ => None,
        },
        _ => None,
    }
}

fn operand_from_sql_value(value: &SqlValue) -> Option<Operand> {
    let value = match value {
        SqlValue::Number(text, _) => number_value(text),
        SqlValue::SingleQuotedString(text) | SqlValue::DoubleQuotedString(text) => {
            Value::Text(text.clone())
        }
        SqlValue::HexStringLiteral(hex) => Value::Blob(decode_hex(hex)?),
        SqlValue::Boolean(flag) => Value::Integer(i64::from(*flag)),
        SqlValue::Null => Value::Null,
        SqlValue::Placeholder(token) => {
            return placeholder_name(token).map(|name| Operand::Bind(name.to_string()))
        }
        _ => return None,
    };
    Some(Operand::Value(value))
}

pub(crate) fn number_value(text: &str) -> Value {
    if let Ok(value) = text.parse::<i64>() {
        Value::Integer(value)
    } else if let Ok(value) = text.parse::<u64>() {
        Value::Unsigned(value)
    } else {
        Value::Decimal(text.to_string())
    }
}

fn negate(value: Value) -> Option<Value> {
    match value {
        Value::Integer(value) => Some(match value.checked_neg() {
            Some(negated) => Value::Integer(negated),
            None => Value::Decimal(format!("-{}", value.unsigned_abs())),
        }),
        Value::Unsigned(value) => Some(if value == 1u64 << 63 {
            Value::Integer(i64::MIN)
        } else {
            Value::Decimal(format!("-{value}"))
        }),
        Value::Decimal(text) => Some(match text.strip_prefix('-') {
            Some(positive) => Value::Decimal(positive.to_string()),
            None => Value::Decimal(format!("-{text}")),
        }),
        Value::Real(value) => Some(Value::Real(-value)),
        _ => None,
    }
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|index| u8::from_str_radix(hex.get(index..index + 2)?, 16).ok())
        .collect()
}
