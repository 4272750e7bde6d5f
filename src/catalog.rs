//! Relation Catalog
//!
//! Holds every successfully loaded relation under its dataset name and runs
//! ad-hoc SQL over them. The catalog is filled once at startup and only read
//! afterwards; each statement gets its own SQL context built from cheap
//! clones of the registered frames, so concurrent callers never share mutable
//! query state and a `DROP TABLE` cannot touch the registered set.

use crate::config::DEFAULT_ROW_LIMIT;
use crate::execution::result::QueryResult;
use crate::ingestion::relation::Relation;
use polars::prelude::*;
use polars::sql::SQLContext;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct RelationCatalog {
    relations: BTreeMap<String, Relation>,
    row_limit: usize,
}

impl Default for RelationCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl RelationCatalog {
    pub fn new() -> Self {
        Self {
            relations: BTreeMap::new(),
            row_limit: DEFAULT_ROW_LIMIT,
        }
    }

    pub fn with_row_limit(mut self, row_limit: usize) -> Self {
        self.row_limit = row_limit;
        self
    }

    pub fn row_limit(&self) -> usize {
        self.row_limit
    }

    /// Register `relation` under its name. Relations without columns are
    /// refused; returns whether the relation was added.
    pub fn register(&mut self, relation: Relation) -> bool {
        if relation.has_no_columns() {
            debug!("Not registering {}: no columns", relation.name());
            return false;
        }
        info!(
            "🗂️  Registered {} ({} rows, {} columns)",
            relation.name(),
            relation.row_count(),
            relation.column_count()
        );
        self.relations.insert(relation.name().to_string(), relation);
        true
    }

    /// Registered names in sorted order.
    pub fn relation_names(&self) -> Vec<String> {
        self.relations.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.values()
    }

    /// One line per relation: name, row count and typed columns.
    pub fn describe(&self) -> String {
        self.relations
            .values()
            .map(|relation| {
                let columns = relation
                    .columns()
                    .iter()
                    .map(|c| format!("{} {}", quote_identifier(&c.name), c.column_type))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{} ({} rows): {}", relation.name(), relation.row_count(), columns)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Execute `sql` over the registered relations.
    ///
    /// Never fails: parse errors, unknown relations, execution errors and
    /// engine panics all come back as a failed [`QueryResult`].
    pub fn execute(&self, sql: &str) -> QueryResult {
        let start_time = Instant::now();
        debug!("Executing SQL: {}", sql);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run(sql)));
        let execution_time_ms = start_time.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(Ok(frame)) => QueryResult::success(frame, self.row_limit, execution_time_ms)
                .unwrap_or_else(|e| QueryResult::error(e.to_string(), execution_time_ms)),
            Ok(Err(e)) => QueryResult::error(e.to_string(), execution_time_ms),
            Err(payload) => QueryResult::error(panic_message(payload.as_ref()), execution_time_ms),
        };

        if let Some(message) = result.error_message() {
            warn!("❌ Query failed in {}ms: {}", execution_time_ms, message);
        } else {
            info!(
                "✅ Query completed in {}ms, returned {} of {} rows",
                execution_time_ms,
                result.row_count(),
                result.total_rows
            );
        }
        result
    }

    fn run(&self, sql: &str) -> PolarsResult<DataFrame> {
        let mut ctx = SQLContext::new();
        for (name, relation) in &self.relations {
            ctx.register(name, relation.frame().clone().lazy());
        }
        ctx.execute(sql)?.collect()
    }
}

/// Double-quote identifiers that are not plain `[A-Za-z_][A-Za-z0-9_]*`.
pub fn quote_identifier(name: &str) -> String {
    let plain = name
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false)
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("query engine panicked: {}", detail)
}
