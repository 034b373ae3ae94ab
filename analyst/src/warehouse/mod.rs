//! Warehouse SQL execution: tabular results, the REST implementation and the memo cache

mod cache;
mod sql_api;

pub use cache::CachedWarehouse;
pub use sql_api::{SqlApiWarehouse, StatementContext};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use std::fmt;
use std::sync::Arc;

use crate::error::Result;

/// Coarse column classification used by the statistical summary
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Text,
    Boolean,
    /// Calendar dates; summarized like categories
    Date,
    Other,
}

impl ColumnKind {
    /// Map a warehouse type name (`fixed`, `real`, `text`, ...) to a kind
    pub fn from_sql_type(sql_type: &str) -> Self {
        match sql_type.to_ascii_lowercase().as_str() {
            "fixed" | "real" | "number" | "decimal" | "float" | "double" | "integer" => ColumnKind::Numeric,
            "text" | "varchar" | "string" | "variant" | "object" | "array" => ColumnKind::Text,
            "boolean" => ColumnKind::Boolean,
            "date" => ColumnKind::Date,
            _ => ColumnKind::Other,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Null,
    Number(f64),
    Text(String),
    Bool(bool),
}

impl Cell {
    /// Parse a raw result value according to its column kind
    pub fn parse(raw: Option<&str>, kind: ColumnKind) -> Self {
        let Some(raw) = raw else {
            return Cell::Null;
        };
        match kind {
            ColumnKind::Numeric => raw
                .parse::<f64>()
                .map(Cell::Number)
                .unwrap_or_else(|_| Cell::Text(raw.to_string())),
            ColumnKind::Boolean => match raw.to_ascii_lowercase().as_str() {
                "true" => Cell::Bool(true),
                "false" => Cell::Bool(false),
                _ => Cell::Text(raw.to_string()),
            },
            ColumnKind::Date => Cell::Text(epoch_days_to_date(raw).unwrap_or_else(|| raw.to_string())),
            ColumnKind::Text | ColumnKind::Other => Cell::Text(raw.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }
}

/// Dates arrive as a count of days since 1970-01-01
fn epoch_days_to_date(raw: &str) -> Option<String> {
    let days: i64 = raw.trim().parse().ok()?;
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    let date = epoch.checked_add_signed(Duration::try_days(days)?)?;
    Some(date.format("%Y-%m-%d").to_string())
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Text(s) => write!(f, "{}", s),
            Cell::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// A query result: ordered columns and rows of cells
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Cell>>) -> Self {
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// The first `n` rows
    pub fn head(&self, n: usize) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// Index of a column, matched case-insensitively
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// All cells of one column, in row order
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &Cell> {
        self.rows.iter().filter_map(move |row| row.get(index))
    }
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Run one SQL statement. Execution failures come back as
    /// `AnalystError::SqlExecution`; nothing panics past this boundary.
    async fn execute(&self, sql: &str) -> Result<Table>;
}

#[async_trait]
impl<W: Warehouse + ?Sized> Warehouse for Arc<W> {
    async fn execute(&self, sql: &str) -> Result<Table> {
        (**self).execute(sql).await
    }
}
