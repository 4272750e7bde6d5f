//! Dataset ingestion
//!
//! Loads the configured CSV sources, each in isolation, and registers the
//! ones that produced at least one column.

pub mod csv_loader;
pub mod relation;

use crate::catalog::RelationCatalog;
use crate::config::AppConfig;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

pub use csv_loader::{load, LoadIssue, LoadOutcome};
pub use relation::{ColumnSchema, ColumnType, Relation};

/// What happened to one configured source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub path: PathBuf,
    pub rows: usize,
    pub columns: usize,
    pub registered: bool,
    pub issue: Option<LoadIssue>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub sources: Vec<SourceStatus>,
}

impl LoadReport {
    /// User-facing warning lines, one per source with an issue.
    pub fn warnings(&self) -> Vec<String> {
        self.sources
            .iter()
            .filter_map(|s| s.issue.as_ref().map(|issue| format!("{}: {}", s.name, issue)))
            .collect()
    }

    pub fn registered_count(&self) -> usize {
        self.sources.iter().filter(|s| s.registered).count()
    }
}

/// Load every configured source and build the catalog.
pub fn load_catalog(config: &AppConfig) -> (RelationCatalog, LoadReport) {
    info!(
        "📂 Loading {} datasets from {}",
        config.sources.len(),
        config.data_dir.display()
    );

    let mut catalog = RelationCatalog::new().with_row_limit(config.row_limit);
    let mut report = LoadReport::default();

    for source in &config.sources {
        let outcome = csv_loader::load_source(source, &config.data_dir);
        let rows = outcome.relation.row_count();
        let columns = outcome.relation.column_count();
        let registered = catalog.register(outcome.relation);

        report.sources.push(SourceStatus {
            name: source.name.clone(),
            path: source.path_in(&config.data_dir),
            rows,
            columns,
            registered,
            issue: outcome.issue,
        });
    }

    info!(
        "📊 Catalog ready: {} of {} datasets registered",
        report.registered_count(),
        config.sources.len()
    );
    (catalog, report)
}
