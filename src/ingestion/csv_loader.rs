//! CSV Loader - Best-effort ingestion of delimited files into relations
//!
//! Every file is loaded in its own failure domain. A missing file, an
//! undecodable file or a file without a header yields an empty relation and a
//! [`LoadIssue`]; lines that do not fit the header are dropped one by one.

use crate::config::{DatasetSource, SourceEncoding};
use crate::error::{InsightsError, Result};
use crate::ingestion::relation::Relation;
use csv::ReaderBuilder;
use polars::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Non-fatal condition encountered while loading one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadIssue {
    SourceMissing { path: PathBuf },
    ParseDegraded { skipped_lines: usize },
    LoadFailed { reason: String },
}

impl fmt::Display for LoadIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadIssue::SourceMissing { path } => {
                write!(
                    f,
                    "File not found: {}. Please verify the dataset is available.",
                    path.display()
                )
            }
            LoadIssue::ParseDegraded { skipped_lines } => {
                write!(f, "skipped {} malformed line(s)", skipped_lines)
            }
            LoadIssue::LoadFailed { reason } => write!(f, "{}", reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub relation: Relation,
    pub issue: Option<LoadIssue>,
}

/// Load `path` under a name derived from its file stem.
pub fn load(path: &Path, encoding: Option<SourceEncoding>) -> Relation {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("relation")
        .to_string();
    load_csv(&name, path, encoding.unwrap_or_default()).relation
}

pub fn load_source(source: &DatasetSource, data_dir: &Path) -> LoadOutcome {
    load_csv(&source.name, &source.path_in(data_dir), source.encoding)
}

pub fn load_csv(name: &str, path: &Path, encoding: SourceEncoding) -> LoadOutcome {
    if !path.exists() {
        let issue = LoadIssue::SourceMissing { path: path.to_path_buf() };
        warn!("⚠️  {}", issue);
        return LoadOutcome {
            relation: Relation::empty(name),
            issue: Some(issue),
        };
    }

    match read_relation(name, path, encoding) {
        Ok((relation, 0)) => {
            info!(
                "📥 Loaded {} from {} ({} rows, {} columns)",
                name,
                path.display(),
                relation.row_count(),
                relation.column_count()
            );
            LoadOutcome { relation, issue: None }
        }
        Ok((relation, skipped_lines)) => {
            let issue = LoadIssue::ParseDegraded { skipped_lines };
            warn!(
                "⚠️  Loaded {} from {} with {} ({} rows kept)",
                name,
                path.display(),
                issue,
                relation.row_count()
            );
            LoadOutcome {
                relation,
                issue: Some(issue),
            }
        }
        Err(e) => {
            let issue = LoadIssue::LoadFailed {
                reason: format!("Warning loading {}: {}", path.display(), e),
            };
            warn!("⚠️  {}", issue);
            LoadOutcome {
                relation: Relation::empty(name),
                issue: Some(issue),
            }
        }
    }
}

fn read_relation(name: &str, path: &Path, encoding: SourceEncoding) -> Result<(Relation, usize)> {
    let bytes = std::fs::read(path)?;
    let text = decode(bytes, encoding)?;
    parse_csv(name, &text)
}

fn decode(bytes: Vec<u8>, encoding: SourceEncoding) -> Result<String> {
    match encoding {
        SourceEncoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
        SourceEncoding::Utf8 => {
            let text = String::from_utf8(bytes).map_err(|e| {
                InsightsError::Parse(format!(
                    "file is not valid UTF-8 ({}); try the latin1 encoding hint",
                    e.utf8_error()
                ))
            })?;
            Ok(match text.strip_prefix('\u{feff}') {
                Some(stripped) => stripped.to_string(),
                None => text,
            })
        }
    }
}

/// Parse CSV text into a relation, returning it with the number of skipped lines.
pub fn parse_csv(name: &str, text: &str) -> Result<(Relation, usize)> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records = reader.records();
    let header = match records.next() {
        Some(record) => record?,
        None => {
            return Err(InsightsError::Parse("No columns to parse from file".to_string()));
        }
    };
    let headers = normalize_headers(header.iter());
    let width = headers.len();

    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); width];
    let mut skipped = 0usize;

    for (line_idx, result) in records.enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                debug!("Skipping unreadable record after line {}: {}", line_idx + 1, e);
                skipped += 1;
                continue;
            }
        };
        if record.len() > width {
            debug!(
                "Skipping record {}: expected {} fields, saw {}",
                line_idx + 2,
                width,
                record.len()
            );
            skipped += 1;
            continue;
        }
        for (col_idx, column) in cells.iter_mut().enumerate() {
            let cell = record.get(col_idx).map(str::trim).filter(|c| !c.is_empty());
            column.push(cell.map(str::to_string));
        }
    }

    let series: Vec<Series> = headers
        .iter()
        .zip(cells)
        .map(|(header, column)| infer_series(header, column))
        .collect();
    let frame = DataFrame::new(series)?;

    Ok((Relation::from_frame(name, frame), skipped))
}

/// Blank headers become `Unnamed: <idx>`, repeats get `.1`, `.2`, ...
fn normalize_headers<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut headers = Vec::new();

    for (idx, header) in raw.enumerate() {
        let base = match header.trim() {
            "" => format!("Unnamed: {}", idx),
            trimmed => trimmed.to_string(),
        };
        let mut candidate = base.clone();
        let mut suffix = 1;
        while seen.contains(&candidate) {
            candidate = format!("{}.{}", base, suffix);
            suffix += 1;
        }
        seen.insert(candidate.clone());
        headers.push(candidate);
    }

    headers
}

/// Narrowest type that fits every non-null cell: integer, float, boolean, text.
fn infer_series(name: &str, cells: Vec<Option<String>>) -> Series {
    if cells.iter().all(Option::is_none) {
        return Series::new(name, cells);
    }

    if cells.iter().flatten().all(|c| c.parse::<i64>().is_ok()) {
        let values: Vec<Option<i64>> = cells
            .iter()
            .map(|c| c.as_ref().and_then(|v| v.parse().ok()))
            .collect();
        return Series::new(name, values);
    }

    if cells.iter().flatten().all(|c| c.parse::<f64>().is_ok()) {
        let values: Vec<Option<f64>> = cells
            .iter()
            .map(|c| c.as_ref().and_then(|v| v.parse().ok()))
            .collect();
        return Series::new(name, values);
    }

    if cells.iter().flatten().all(|c| parse_bool(c).is_some()) {
        let values: Vec<Option<bool>> = cells
            .iter()
            .map(|c| c.as_deref().and_then(parse_bool))
            .collect();
        return Series::new(name, values);
    }

    Series::new(name, cells)
}

fn parse_bool(cell: &str) -> Option<bool> {
    if cell.eq_ignore_ascii_case("true") {
        Some(true)
    } else if cell.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::relation::ColumnType;

    fn temp_csv(contents: &[u8]) -> PathBuf {
        let path = std::env::temp_dir()
            .join(format!("retail-insights-{}.csv", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_missing_file_yields_empty_relation() {
        let path = std::env::temp_dir().join("definitely-not-here-7c1e.csv");
        let outcome = load_csv("expenses", &path, SourceEncoding::Utf8);

        assert!(outcome.relation.has_no_columns());
        assert_eq!(outcome.relation.row_count(), 0);
        assert!(matches!(outcome.issue, Some(LoadIssue::SourceMissing { .. })));
    }

    #[test]
    fn test_infers_column_types() {
        let path = temp_csv(b"sku,qty,price,active\nA1,2,10.0,true\nB2,,4.5,False\n");
        let outcome = load_csv("sales_report", &path, SourceEncoding::Utf8);
        std::fs::remove_file(&path).ok();

        assert!(outcome.issue.is_none());
        let relation = outcome.relation;
        assert_eq!(relation.row_count(), 2);
        let types: Vec<ColumnType> = relation.columns().iter().map(|c| c.column_type).collect();
        assert_eq!(
            types,
            vec![ColumnType::Text, ColumnType::Integer, ColumnType::Float, ColumnType::Boolean]
        );
        assert_eq!(relation.frame().column("qty").unwrap().null_count(), 1);
    }

    #[test]
    fn test_skips_lines_with_too_many_fields() {
        let (relation, skipped) = parse_csv("t", "a,b\n1,2\n3,4,5\n6,7\n").unwrap();
        assert_eq!(skipped, 1);
        assert_eq!(relation.row_count(), 2);
    }

    #[test]
    fn test_short_lines_are_padded_with_nulls() {
        let (relation, skipped) = parse_csv("t", "a,b,c\n1,2,3\n4\n").unwrap();
        assert_eq!(skipped, 0);
        assert_eq!(relation.row_count(), 2);
        assert_eq!(relation.frame().column("c").unwrap().null_count(), 1);
    }

    #[test]
    fn test_degraded_parse_reports_issue() {
        let path = temp_csv(b"a,b\n1,2\n1,2,3,4\n");
        let outcome = load_csv("t", &path, SourceEncoding::Utf8);
        std::fs::remove_file(&path).ok();

        assert_eq!(outcome.issue, Some(LoadIssue::ParseDegraded { skipped_lines: 1 }));
        assert_eq!(outcome.relation.row_count(), 1);
    }

    #[test]
    fn test_header_normalization() {
        let (relation, _) = parse_csv("t", "id,,id,Order ID\n1,2,3,4\n").unwrap();
        let names: Vec<&str> = relation.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "Unnamed: 1", "id.1", "Order ID"]);
    }

    #[test]
    fn test_empty_file_fails_softly() {
        let path = temp_csv(b"");
        let outcome = load_csv("t", &path, SourceEncoding::Utf8);
        std::fs::remove_file(&path).ok();

        assert!(outcome.relation.has_no_columns());
        assert!(matches!(outcome.issue, Some(LoadIssue::LoadFailed { .. })));
    }

    #[test]
    fn test_latin1_hint_decodes_high_bytes() {
        let path = temp_csv(b"city,amount\nBogot\xe1,12\n");
        let strict = load_csv("t", &path, SourceEncoding::Utf8);
        let latin1 = load_csv("t", &path, SourceEncoding::Latin1);
        std::fs::remove_file(&path).ok();

        assert!(matches!(strict.issue, Some(LoadIssue::LoadFailed { .. })));
        assert!(latin1.issue.is_none());
        let city = latin1.relation.frame().column("city").unwrap().get(0).unwrap();
        assert_eq!(city, AnyValue::String("Bogotá"));
    }

    #[test]
    fn test_bom_is_stripped() {
        let text = decode(b"\xef\xbb\xbfa,b\n1,2\n".to_vec(), SourceEncoding::Utf8).unwrap();
        let (relation, _) = parse_csv("t", &text).unwrap();
        assert_eq!(relation.columns()[0].name, "a");
    }

    #[test]
    fn test_load_names_relation_after_file_stem() {
        let path = temp_csv(b"x\n1\n");
        let relation = load(&path, None);
        let stem = path.file_stem().unwrap().to_str().unwrap().to_string();
        std::fs::remove_file(&path).ok();

        assert_eq!(relation.name(), stem);
        assert_eq!(relation.row_count(), 1);
    }
}
