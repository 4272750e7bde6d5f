//! Relation - a named, typed table held in memory for SQL access

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Column type as inferred at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Text,
    Date,
    Timestamp,
    Other,
}

impl ColumnType {
    pub fn from_dtype(dtype: &DataType) -> Self {
        match dtype {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => ColumnType::Integer,
            DataType::Float32 | DataType::Float64 => ColumnType::Float,
            DataType::Boolean => ColumnType::Boolean,
            DataType::String => ColumnType::Text,
            DataType::Date => ColumnType::Date,
            DataType::Datetime(_, _) => ColumnType::Timestamp,
            _ => ColumnType::Other,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "BIGINT",
            ColumnType::Float => "DOUBLE",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Text => "VARCHAR",
            ColumnType::Date => "DATE",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Other => "OTHER",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub column_type: ColumnType,
}

/// A loaded dataset. Immutable once built.
#[derive(Debug, Clone)]
pub struct Relation {
    name: String,
    columns: Vec<ColumnSchema>,
    frame: DataFrame,
}

impl Relation {
    /// A relation with no columns and no rows, the result of a failed load.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            frame: DataFrame::empty(),
        }
    }

    pub fn from_frame(name: impl Into<String>, frame: DataFrame) -> Self {
        let columns = frame
            .get_columns()
            .iter()
            .map(|series| ColumnSchema {
                name: series.name().to_string(),
                column_type: ColumnType::from_dtype(series.dtype()),
            })
            .collect();

        Self {
            name: name.into(),
            columns,
            frame,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.frame.height()
    }

    /// True when there is nothing to register.
    pub fn has_no_columns(&self) -> bool {
        self.columns.is_empty()
    }
}
