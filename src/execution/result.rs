//! Query Result - Standardized result of one SQL statement against the catalog

use crate::error::Result;
use itertools::Itertools;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Result of a single statement.
///
/// Failures are carried as data (`success == false`, `errors`) so callers on
/// the reasoning side always get something they can render.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub success: bool,

    /// Output column names, in order
    pub columns: Vec<String>,

    /// At most `row_limit` rows, each aligned with `columns`
    pub rows: Vec<Vec<Value>>,

    /// Rows the statement actually produced before truncation
    pub total_rows: usize,

    pub truncated: bool,

    pub execution_time_ms: u64,

    pub errors: Vec<String>,
}

impl QueryResult {
    /// Build a successful result keeping only the first `row_limit` rows.
    pub fn success(data: DataFrame, row_limit: usize, execution_time_ms: u64) -> Result<Self> {
        let total_rows = data.height();
        let kept = data.head(Some(row_limit));
        let columns: Vec<String> = kept.get_column_names().iter().map(|s| s.to_string()).collect();

        let mut rows = Vec::with_capacity(kept.height());
        for row_idx in 0..kept.height() {
            let mut row = Vec::with_capacity(columns.len());
            for series in kept.get_columns() {
                row.push(any_value_to_json(series.get(row_idx)?));
            }
            rows.push(row);
        }

        Ok(Self {
            success: true,
            columns,
            rows,
            total_rows,
            truncated: total_rows > row_limit,
            execution_time_ms,
            errors: Vec::new(),
        })
    }

    pub fn error(error: String, execution_time_ms: u64) -> Self {
        Self {
            success: false,
            columns: Vec::new(),
            rows: Vec::new(),
            total_rows: 0,
            truncated: false,
            execution_time_ms,
            errors: vec![error],
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn error_message(&self) -> Option<String> {
        if self.success {
            None
        } else {
            Some(self.errors.join("; "))
        }
    }

    /// Rows as column-name keyed objects.
    pub fn row_maps(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect::<Map<String, Value>>()
            })
            .collect()
    }

    /// Fixed-width text table with a leading row index.
    pub fn render_table(&self) -> String {
        if self.rows.is_empty() {
            return format!("Empty result\nColumns: [{}]", self.columns.join(", "));
        }

        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(render_cell).collect())
            .collect();

        let index_width = (self.rows.len() - 1).to_string().len();
        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                cells
                    .iter()
                    .map(|row| row[idx].chars().count())
                    .chain(std::iter::once(name.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut lines = Vec::with_capacity(cells.len() + 2);
        lines.push(format!(
            "{:>iw$}  {}",
            "",
            self.columns
                .iter()
                .zip(&widths)
                .map(|(name, w)| pad_left(name, *w))
                .join("  "),
            iw = index_width
        ));
        for (row_idx, row) in cells.iter().enumerate() {
            lines.push(format!(
                "{:>iw$}  {}",
                row_idx,
                row.iter().zip(&widths).map(|(cell, w)| pad_left(cell, *w)).join("  "),
                iw = index_width
            ));
        }
        if self.truncated {
            lines.push(format!("[showing {} of {} rows]", self.rows.len(), self.total_rows));
        }

        lines.join("\n")
    }
}

fn pad_left(text: &str, width: usize) -> String {
    let len = text.chars().count();
    format!("{}{}", " ".repeat(width.saturating_sub(len)), text)
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn any_value_to_json(value: AnyValue) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Bool(b),
        AnyValue::String(s) => Value::String(s.to_string()),
        AnyValue::StringOwned(s) => Value::String(s.to_string()),
        AnyValue::Int8(i) => Value::Number(i.into()),
        AnyValue::Int16(i) => Value::Number(i.into()),
        AnyValue::Int32(i) => Value::Number(i.into()),
        AnyValue::Int64(i) => Value::Number(i.into()),
        AnyValue::UInt8(u) => Value::Number(u.into()),
        AnyValue::UInt16(u) => Value::Number(u.into()),
        AnyValue::UInt32(u) => Value::Number(u.into()),
        AnyValue::UInt64(u) => Value::Number(u.into()),
        AnyValue::Float32(f) => float_to_json(f as f64),
        AnyValue::Float64(f) => float_to_json(f),
        other => Value::String(other.to_string()),
    }
}

fn float_to_json(f: f64) -> Value {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
