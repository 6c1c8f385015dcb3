use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::errors;
use crate::schema::{ColumnType, TableSchema};
use crate::sql::params::{escape_string, format_real};
use crate::sql::row_key::RowKeyTuple;
use crate::{RewriteError, Value};

/// Replication comment naming the primary keys a DML statement touches,
/// e.g. `/* _stream vtocc_a (eid id ) (1 1 ) (1 2 ); */`.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamAnnotation {
    table: String,
    pk_columns: Vec<String>,
    column_types: Vec<ColumnType>,
    tuples: Vec<RowKeyTuple>,
}

impl StreamAnnotation {
    pub fn new(table: &TableSchema) -> Self {
        Self {
            table: table.name.clone(),
            pk_columns: table.primary_key.clone(),
            column_types: table.pk_columns().map(|column| column.column_type).collect(),
            tuples: Vec::new(),
        }
    }

    pub fn push(&mut self, tuple: RowKeyTuple) {
        self.tuples.push(tuple);
    }

    pub fn tuples(&self) -> &[RowKeyTuple] {
        &self.tuples
    }

    pub fn render(&self) -> Result<String, RewriteError> {
        let mut out = format!("/* _stream {} (", self.table);
        for column in &self.pk_columns {
            out.push_str(column);
            out.push(' ');
        }
        out.push(')');
        for tuple in &self.tuples {
            out.push_str(" (");
            for (value, column_type) in tuple.values().iter().zip(&self.column_types) {
                out.push_str(&render_value(*column_type, value)?);
                out.push(' ');
            }
            out.push(')');
        }
        out.push_str("; */");
        Ok(out)
    }
}

/// Appends the annotation to a rendered statement.
pub(crate) fn annotate(sql: String, annotation: &StreamAnnotation) -> Result<String, RewriteError> {
    Ok(format!("{sql} {}", annotation.render()?))
}

fn render_value(column_type: ColumnType, value: &Value) -> Result<String, RewriteError> {
    let rendered = match (column_type, value) {
        (_, Value::Null) => "null".to_string(),
        (ColumnType::Binary, Value::Blob(bytes)) => format!("'{}'", BASE64.encode(bytes)),
        (ColumnType::Binary, Value::Text(text)) => format!("'{}'", BASE64.encode(text)),
        (ColumnType::Text | ColumnType::Temporal, Value::Text(text)) => {
            format!("'{}'", escape_string(text).replace("*/", "*\\/"))
        }
        (ColumnType::Integer { .. }, Value::Integer(number)) => number.to_string(),
        (ColumnType::Integer { .. }, Value::Unsigned(number)) => number.to_string(),
        (ColumnType::Decimal, Value::Decimal(text)) => text.clone(),
        (ColumnType::Float, Value::Real(number)) => format_real(*number)?,
        (column_type, value) => {
            return Err(errors::encoding_error(format!(
                "cannot annotate {} value for {column_type:?} key column",
                value.type_name()
            )))
        }
    };
    Ok(rendered)
}
