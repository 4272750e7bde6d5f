use retail_insights::agent::memory::{HistoryStore, InMemoryHistoryStore, Role};
use retail_insights::agent::tools::{QueryTool, ERROR_MARKER};
use retail_insights::agent::{self, ChatRequest};
use retail_insights::catalog::RelationCatalog;
use retail_insights::config::{retail_sources, AppConfig};
use retail_insights::ingestion::{self, LoadIssue, LoadReport};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Scratch data directory holding a subset of the retail CSV files.
struct DataDir {
    path: PathBuf,
}

impl DataDir {
    fn new() -> Self {
        let path =
            std::env::temp_dir().join(format!("retail-insights-it-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&path).unwrap();
        Self { path }
    }

    fn write(&self, file_name: &str, contents: &[u8]) {
        fs::write(self.path.join(file_name), contents).unwrap();
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DataDir {
    fn drop(&mut self) {
        fs::remove_dir_all(&self.path).ok();
    }
}

fn seeded_data_dir() -> DataDir {
    let dir = DataDir::new();
    dir.write("Sale Report.csv", b"SKU Code,Design No.,Stock,qty,price\nA1,D1,5,2,10.0\n");

    // Latin-1 encoded, with one line carrying an extra field
    let mut amazon = b"Order ID,Status,ship-city,Amount\n".to_vec();
    amazon.extend_from_slice(b"405-1,Shipped,Montr\xe9al,449.0\n");
    amazon.extend_from_slice(b"405-2,Cancelled,Pune,120.5,extra\n");
    amazon.extend_from_slice(b"405-3,Shipped,Delhi,300.0\n");
    dir.write("Amazon Sale Report.csv", &amazon);

    let mut may = String::from("n,label\n");
    for n in 0..10_000 {
        may.push_str(&format!("{},row{}\n", n, n));
    }
    dir.write("May-2022.csv", may.as_bytes());

    // header-only file still yields a relation with columns
    dir.write("Expense IIGF.csv", b"Recived Amount,Expance\n");
    dir
}

fn load(dir: &DataDir) -> (Arc<RelationCatalog>, LoadReport, AppConfig) {
    let config = AppConfig {
        data_dir: dir.path().to_path_buf(),
        ..AppConfig::default()
    };
    let (catalog, report) = ingestion::load_catalog(&config);
    (Arc::new(catalog), report, config)
}

#[test]
fn test_loads_available_sources_and_reports_missing_ones() {
    let dir = seeded_data_dir();
    let (catalog, report, _) = load(&dir);

    assert_eq!(
        catalog.relation_names(),
        vec!["amazon_sales", "expenses", "may_2022", "sales_report"]
    );
    assert_eq!(report.sources.len(), retail_sources().len());

    let missing: Vec<&str> = report
        .sources
        .iter()
        .filter(|s| matches!(s.issue, Some(LoadIssue::SourceMissing { .. })))
        .map(|s| s.name.as_str())
        .collect();
    assert_eq!(missing, vec!["cloud_warehouse", "international_sales", "pl_march_2021"]);

    let amazon = report.sources.iter().find(|s| s.name == "amazon_sales").unwrap();
    assert!(amazon.registered);
    assert_eq!(amazon.rows, 2);
    assert!(matches!(amazon.issue, Some(LoadIssue::ParseDegraded { skipped_lines: 1 })));

    let expenses = catalog.get("expenses").unwrap();
    assert_eq!(expenses.row_count(), 0);
    assert_eq!(expenses.column_count(), 2);

    assert!(report.warnings().iter().any(|w| w.starts_with("pl_march_2021: File not found:")));
}

#[test]
fn test_question_about_sales_report_revenue() {
    let dir = seeded_data_dir();
    let (catalog, _, config) = load(&dir);
    let tool = agent::query_tool(&config, catalog);

    let output = tool.run_query("SELECT SUM(qty * price) AS total FROM sales_report");
    assert!(!output.starts_with(ERROR_MARKER), "{}", output);
    assert!(output.contains("20.0"), "{}", output);

    let quoted = tool.run_query(r#"SELECT "SKU Code", "Design No." FROM sales_report"#);
    assert!(quoted.contains("A1") && quoted.contains("D1"), "{}", quoted);
}

#[test]
fn test_latin1_text_survives_loading() {
    let dir = seeded_data_dir();
    let (catalog, _, config) = load(&dir);
    let tool = agent::query_tool(&config, catalog);

    let output =
        tool.run_query(r#"SELECT "ship-city" FROM amazon_sales WHERE "Order ID" = '405-1'"#);
    assert!(output.contains("Montréal"), "{}", output);
}

#[test]
fn test_result_sizes_are_bounded() {
    let dir = seeded_data_dir();
    let (catalog, _, config) = load(&dir);
    let tool = agent::query_tool(&config, catalog);

    let empty = tool.run_query("SELECT n FROM may_2022 WHERE n < 0");
    assert!(empty.starts_with("Empty result"), "{}", empty);

    let exact = tool.run_query("SELECT n FROM may_2022 LIMIT 50");
    assert_eq!(exact.lines().count(), 51);
    assert!(!exact.contains("[showing"));

    let one_over = tool.run_query("SELECT n FROM may_2022 LIMIT 51");
    assert_eq!(one_over.lines().count(), 52);
    assert_eq!(one_over.lines().last(), Some("[showing 50 of 51 rows]"));

    let everything = tool.run_query("SELECT * FROM may_2022");
    assert_eq!(everything.lines().count(), 52);
    assert_eq!(everything.lines().last(), Some("[showing 50 of 10000 rows]"));
}

#[test]
fn test_bad_statements_come_back_as_text() {
    let dir = seeded_data_dir();
    let (catalog, _, config) = load(&dir);
    let tool = agent::query_tool(&config, catalog);

    for sql in [
        "SELEKT * FORM x",
        "SELECT * FROM pl_march_2021",
        "SELECT no_such_column FROM sales_report",
        "",
    ] {
        let output = tool.run_query(sql);
        assert!(output.starts_with(ERROR_MARKER), "{:?} -> {}", sql, output);
    }
}

#[test]
fn test_statements_cannot_change_the_catalog() {
    let dir = seeded_data_dir();
    let (catalog, _, _) = load(&dir);
    let tool = QueryTool::new(Arc::clone(&catalog));

    tool.run_query("DROP TABLE sales_report");
    assert!(catalog.contains("sales_report"));
    assert!(tool.run_query("SELECT qty FROM sales_report").contains('2'));
}

#[test]
fn test_concurrent_queries_share_the_catalog() {
    let dir = seeded_data_dir();
    let (catalog, _, _) = load(&dir);
    let tool = Arc::new(QueryTool::new(catalog));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let tool = Arc::clone(&tool);
            std::thread::spawn(move || {
                tool.run_query(&format!("SELECT n FROM may_2022 WHERE n = {}", i))
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let output = handle.join().unwrap();
        assert!(output.lines().nth(1).unwrap().ends_with(&i.to_string()), "{}", output);
    }
}

#[tokio::test]
async fn test_chat_turns_grow_history_in_order() {
    let dir = seeded_data_dir();
    let (catalog, _, config) = load(&dir);
    let store = Arc::new(InMemoryHistoryStore::new());
    // no credential configured: offline collaborator runs typed SQL
    let service = agent::chat_service_with_store(&config, catalog, store.clone());

    let first = service
        .respond(ChatRequest::new(
            "streamlit_session",
            "SELECT SUM(qty * price) AS total FROM sales_report",
        ))
        .await
        .unwrap();
    assert!(first.answer_text.contains("20.0"));

    let second = service
        .respond(ChatRequest::new("streamlit_session", "what sold best?"))
        .await
        .unwrap();
    assert!(second.answer_text.contains("Available tables:"));

    let history = store.get_or_create("streamlit_session").messages();
    let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User, Role::Assistant]);
    assert_eq!(history[2].content, "what sold best?");
    assert_eq!(history[3].content, second.answer_text);
    assert!(history.windows(2).all(|w| w[0].created_at <= w[1].created_at));

    assert!(store.get_or_create("another_session").is_empty());
}
