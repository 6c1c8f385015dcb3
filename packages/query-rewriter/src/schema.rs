use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors;
use crate::{RewriteError, Value};

/// Semantic column type; drives literal encoding and annotation rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer { bits: u8, unsigned: bool },
    Decimal,
    Float,
    Text,
    Binary,
    Temporal,
}

impl ColumnType {
    pub const fn signed(bits: u8) -> Self {
        Self::Integer {
            bits,
            unsigned: false,
        }
    }

    pub const fn unsigned(bits: u8) -> Self {
        Self::Integer {
            bits,
            unsigned: true,
        }
    }

    /// Inclusive bounds of an integer column, widened to i128.
    pub(crate) fn integer_bounds(self) -> Option<(i128, i128)> {
        let Self::Integer { bits, unsigned } = self else {
            return None;
        };
        let bits = u32::from(bits.clamp(1, 64));
        if unsigned {
            Some((0, (1i128 << bits) - 1))
        } else {
            Some((-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub column_type: ColumnType,
    #[serde(default)]
    pub default: Option<Value>,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            default: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
    /// Primary key column names in key order.
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub auto_increment: Option<String>,
}

impl TableSchema {
    pub fn new(
        name: impl Into<String>,
        columns: Vec<ColumnSchema>,
        primary_key: &[&str],
    ) -> Result<Self, RewriteError> {
        let table = Self {
            name: name.into(),
            columns,
            primary_key: primary_key.iter().map(|name| name.to_string()).collect(),
            auto_increment: None,
        };
        table.validate()?;
        Ok(table)
    }

    pub fn with_auto_increment(mut self, column: &str) -> Result<Self, RewriteError> {
        self.auto_increment = Some(column.to_string());
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), RewriteError> {
        if self.primary_key.is_empty() {
            return Err(errors::invalid_config(format!(
                "table `{}` has no primary key",
                self.name
            )));
        }
        for pk in &self.primary_key {
            if self.column(pk).is_none() {
                return Err(errors::invalid_config(format!(
                    "primary key column `{pk}` is not a column of `{}`",
                    self.name
                )));
            }
        }
        if let Some(column) = &self.auto_increment {
            match self.column(column).map(|column| column.column_type) {
                Some(ColumnType::Integer { .. }) => {}
                _ => {
                    return Err(errors::invalid_config(format!(
                        "auto-increment column `{column}` of `{}` must be an integer column",
                        self.name
                    )))
                }
            }
        }
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns
            .iter()
            .find(|column| column.name.eq_ignore_ascii_case(name))
    }

    pub fn pk_position(&self, name: &str) -> Option<usize> {
        self.primary_key
            .iter()
            .position(|pk| pk.eq_ignore_ascii_case(name))
    }

    pub fn pk_columns(&self) -> impl Iterator<Item = &ColumnSchema> + '_ {
        self.primary_key
            .iter()
            .filter_map(|name| self.column(name))
    }

    pub fn is_auto_increment(&self, name: &str) -> bool {
        self.auto_increment
            .as_deref()
            .is_some_and(|column| column.eq_ignore_ascii_case(name))
    }
}

/// Read-only table lookup used while rewriting.
pub trait SchemaCatalog: Send + Sync {
    fn table(&self, name: &str) -> Option<&TableSchema>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    tables: BTreeMap<String, TableSchema>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: TableSchema) -> Self {
        self.insert(table);
        self
    }

    pub fn insert(&mut self, table: TableSchema) {
        self.tables.insert(table.name.to_ascii_lowercase(), table);
    }

    /// Loads a catalog from a JSON array of table schemas.
    pub fn from_json(json: &str) -> Result<Self, RewriteError> {
        let tables: Vec<TableSchema> = serde_json::from_str(json)
            .map_err(|error| errors::invalid_config(format!("invalid schema JSON: {error}")))?;
        let mut catalog = Self::new();
        for table in tables {
            table.validate()?;
            catalog.insert(table);
        }
        Ok(catalog)
    }
}

impl SchemaCatalog for MemoryCatalog {
    fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(&name.to_ascii_lowercase())
    }
}
