//! HTTP Server for the Retail Insights chat UI
//! Simple HTTP server using tokio and basic HTTP handling

use anyhow::Result;
use clap::Parser;
use retail_insights::agent::service::ChatService;
use retail_insights::agent::tools::QueryTool;
use retail_insights::agent::{self, ChatRequest};
use retail_insights::catalog::RelationCatalog;
use retail_insights::config::AppConfig;
use retail_insights::ingestion::{self, LoadReport};
use retail_insights::observability;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

#[derive(Parser)]
#[command(name = "server")]
#[command(about = "HTTP API for the Retail Insights assistant")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind: String,

    /// Directory holding the retail CSV files
    #[arg(short, long, default_value = ".")]
    data_dir: PathBuf,

    /// Refuse SQL statements other than queries
    #[arg(long)]
    read_only: bool,
}

struct AppState {
    chat: ChatService,
    tool: Arc<QueryTool>,
    report: LoadReport,
}

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    observability::init_tracing();

    let args = Args::parse();
    let mut config = AppConfig::from_env(args.data_dir);
    config.read_only = args.read_only;

    // The catalog is fully loaded before the listener accepts anything.
    let (catalog, report) = ingestion::load_catalog(&config);
    for warning in report.warnings() {
        warn!("{}", warning);
    }
    let state = Arc::new(build_state(&config, catalog, report));

    let listener = TcpListener::bind(&args.bind).await?;
    info!("🚀 Retail Insights API listening on http://{}", args.bind);

    loop {
        let (stream, addr) = listener.accept().await?;
        debug!("New connection from: {}", addr);
        tokio::spawn(handle_connection(stream, Arc::clone(&state)));
    }
}

fn build_state(config: &AppConfig, catalog: RelationCatalog, report: LoadReport) -> AppState {
    let catalog = Arc::new(catalog);
    AppState {
        chat: agent::chat_service(config, Arc::clone(&catalog)),
        tool: agent::query_tool(config, catalog),
        report,
    }
}

async fn handle_connection(mut stream: TcpStream, state: Arc<AppState>) {
    use tokio::time::{timeout, Duration};

    // Read request with timeout to prevent hanging
    let mut buffer = Vec::new();
    let mut temp_buf = [0; 8192];

    let read_result = timeout(Duration::from_secs(5), async {
        loop {
            match stream.read(&mut temp_buf).await {
                Ok(0) => break, // EOF
                Ok(n) => {
                    buffer.extend_from_slice(&temp_buf[..n]);
                    if request_complete(&buffer) || buffer.len() > 1_000_000 {
                        break;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    })
    .await;

    match read_result {
        Err(_) => {
            warn!("Request read timeout");
            return;
        }
        Ok(Err(e)) => {
            error!("Failed to read from stream: {}", e);
            return;
        }
        Ok(Ok(())) => {}
    }

    if buffer.is_empty() {
        return;
    }

    let request = String::from_utf8_lossy(&buffer);
    let response = handle_request(&state, &request).await;
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        error!("Failed to write response: {}", e);
    }
}

/// Headers received and, if announced, the whole body.
fn request_complete(buffer: &[u8]) -> bool {
    let text = String::from_utf8_lossy(buffer);
    match text.find("\r\n\r\n") {
        Some(headers_end) => match extract_content_length(&text[..headers_end]) {
            Some(content_length) => buffer.len() >= headers_end + 4 + content_length,
            None => true,
        },
        None => false,
    }
}

fn extract_content_length(headers: &str) -> Option<usize> {
    headers.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

async fn handle_request(state: &AppState, request: &str) -> String {
    let (head, body) = request.split_once("\r\n\r\n").unwrap_or((request, ""));
    let mut parts = head.lines().next().unwrap_or("").split_whitespace();
    let (method, raw_path) = match (parts.next(), parts.next()) {
        (Some(method), Some(path)) => (method, path),
        _ => return create_response(400, "Bad Request", "{}"),
    };

    let path = raw_path.split('?').next().unwrap_or("/");
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };
    debug!("Request: {} {}", method, path);

    match (method, path) {
        ("OPTIONS", _) => create_response(204, "No Content", ""),
        ("GET", "/health") => {
            let body = json!({ "status": "ok", "relations": state.tool.catalog().len() });
            create_response(200, "OK", &body.to_string())
        }
        ("GET", "/api/tables") => create_response(200, "OK", &tables_body(state).to_string()),
        ("POST", "/api/query") => match serde_json::from_str::<QueryRequest>(body) {
            Ok(req) => {
                let body = json!({ "result": state.tool.run_query(&req.query) });
                create_response(200, "OK", &body.to_string())
            }
            Err(e) => bad_request(&e.to_string()),
        },
        ("POST", "/api/chat") => match serde_json::from_str::<ChatRequest>(body) {
            Ok(req) => match state.chat.respond(req).await {
                Ok(response) => create_response(200, "OK", &json!(response).to_string()),
                Err(e) => {
                    error!("Chat turn failed: {}", e);
                    let body = json!({ "error": e.to_string() });
                    create_response(500, "Internal Server Error", &body.to_string())
                }
            },
            Err(e) => bad_request(&e.to_string()),
        },
        _ => create_response(404, "Not Found", &json!({ "error": "not found" }).to_string()),
    }
}

fn tables_body(state: &AppState) -> serde_json::Value {
    let tables: Vec<serde_json::Value> = state
        .tool
        .catalog()
        .relations()
        .map(|relation| {
            json!({
                "name": relation.name(),
                "rows": relation.row_count(),
                "columns": relation.columns(),
            })
        })
        .collect();
    json!({ "tables": tables, "load_warnings": state.report.warnings() })
}

fn bad_request(reason: &str) -> String {
    create_response(400, "Bad Request", &json!({ "error": reason }).to_string())
}

fn create_response(status: u16, status_text: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Content-Length: {}\r\n\
         \r\n\
         {}",
        status,
        status_text,
        body.len(),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;
    use retail_insights::ingestion::Relation;

    fn state() -> AppState {
        let mut catalog = RelationCatalog::new();
        let frame = df!("sku" => ["A1"], "qty" => [2i64], "price" => [10.0]).unwrap();
        catalog.register(Relation::from_frame("sales_report", frame));
        // no API key: offline collaborator
        build_state(&AppConfig::default(), catalog, LoadReport::default())
    }

    fn post(path: &str, body: &str) -> String {
        format!(
            "POST {} HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            path,
            body.len(),
            body
        )
    }

    fn body_of(response: &str) -> serde_json::Value {
        let (_, body) = response.split_once("\r\n\r\n").unwrap();
        serde_json::from_str(body).unwrap()
    }

    #[tokio::test]
    async fn test_chat_endpoint() {
        let state = state();
        let body =
            r#"{"session_id":"s1","user_text":"SELECT SUM(qty*price) AS total FROM sales_report"}"#;
        let response = handle_request(&state, &post("/api/chat", body)).await;

        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(body_of(&response)["answer_text"].as_str().unwrap().contains("20.0"));
        assert_eq!(state.chat.history("s1").len(), 2);
    }

    #[tokio::test]
    async fn test_query_endpoint_reports_errors_as_text() {
        let state = state();
        let request = post("/api/query", r#"{"query":"SELEKT * FORM x"}"#);
        let response = handle_request(&state, &request).await;

        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(body_of(&response)["result"]
            .as_str()
            .unwrap()
            .starts_with("Error executing query:"));
    }

    #[tokio::test]
    async fn test_tables_and_unknown_routes() {
        let state = state();
        let tables = handle_request(&state, "GET /api/tables HTTP/1.1\r\n\r\n").await;
        assert_eq!(body_of(&tables)["tables"][0]["name"], "sales_report");

        let missing = handle_request(&state, "GET /nope HTTP/1.1\r\n\r\n").await;
        assert!(missing.starts_with("HTTP/1.1 404"));

        let malformed = handle_request(&state, &post("/api/chat", "{}")).await;
        assert!(malformed.starts_with("HTTP/1.1 400"));
    }

    #[test]
    fn test_request_complete() {
        assert!(!request_complete(b"POST / HTTP/1.1\r\nContent-Length: 4\r\n\r\nab"));
        assert!(request_complete(b"POST / HTTP/1.1\r\nContent-Length: 4\r\n\r\nabcd"));
        assert!(request_complete(b"GET / HTTP/1.1\r\n\r\n"));
        assert!(!request_complete(b"GET / HTTP/1.1\r\n"));
    }
}
