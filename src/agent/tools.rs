//! Query tool gateway
//!
//! The one capability handed to the reasoning collaborator: SQL text in,
//! text out. Whatever goes wrong while executing the statement comes back as
//! a string starting with [`ERROR_MARKER`]; nothing is raised to the caller.

use crate::catalog::RelationCatalog;
use crate::llm::FunctionDefinition;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::cmp::Ordering;
use std::sync::Arc;
use strsim::jaro_winkler;
use tracing::{info, warn};

pub const QUERY_TOOL_NAME: &str = "run_sql_query";
pub const ERROR_MARKER: &str = "Error executing query:";

lazy_static! {
    static ref RELATION_REF: Regex =
        Regex::new(r#"(?i)\b(?:from|join)\s+"?([A-Za-z_][A-Za-z0-9_]*)"#).unwrap();
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    pub description: String,
    pub parameter_type: ParameterType,
    pub required: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum ParameterType {
    String,
    Number,
    Boolean,
}

impl ParameterType {
    fn json_type(&self) -> &'static str {
        match self {
            ParameterType::String => "string",
            ParameterType::Number => "number",
            ParameterType::Boolean => "boolean",
        }
    }
}

impl Tool {
    /// JSON-schema function definition for tool-calling models.
    pub fn to_function_definition(&self) -> FunctionDefinition {
        let properties: serde_json::Map<String, Value> = self
            .parameters
            .iter()
            .map(|p| {
                (
                    p.name.clone(),
                    json!({ "type": p.parameter_type.json_type(), "description": p.description }),
                )
            })
            .collect();
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        FunctionDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryTool {
    catalog: Arc<RelationCatalog>,
    read_only: bool,
}

impl QueryTool {
    pub fn new(catalog: Arc<RelationCatalog>) -> Self {
        Self {
            catalog,
            read_only: false,
        }
    }

    /// Refuse anything that does not parse as a plain query.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn catalog(&self) -> &RelationCatalog {
        &self.catalog
    }

    pub fn relation_names(&self) -> Vec<String> {
        self.catalog.relation_names()
    }

    /// Name, description and parameters advertised to the collaborator.
    pub fn spec(&self) -> Tool {
        let names = self.relation_names();
        let tables = if names.is_empty() {
            "(none loaded)".to_string()
        } else {
            names.join(", ")
        };

        Tool {
            name: QUERY_TOOL_NAME.to_string(),
            description: format!(
                "Executes SQL queries on the retail sales data.\n\
                 Input: Syntactically correct SQL query string.\n\
                 Returns: Top {} rows of the query result as a string, or an error message.\n\
                 Available tables: {}.",
                self.catalog.row_limit(),
                tables
            ),
            parameters: vec![ToolParameter {
                name: "query".to_string(),
                description: "The SQL query to execute".to_string(),
                parameter_type: ParameterType::String,
                required: true,
            }],
        }
    }

    /// Execute `sql_text` and render the outcome as text.
    pub fn run_query(&self, sql_text: &str) -> String {
        let sql = sql_text.trim();
        info!("🔍 Running tool query: {}", sql);

        if sql.is_empty() {
            return format!("{} empty query", ERROR_MARKER);
        }
        if self.read_only {
            if let Err(reason) = check_read_only(sql) {
                warn!("Refused statement: {}", reason);
                return format!("{} {}", ERROR_MARKER, reason);
            }
        }

        let result = self.catalog.execute(sql);
        match result.error_message() {
            None => result.render_table(),
            Some(message) => match self.suggest_relation(sql) {
                Some(hint) => format!("{} {} ({})", ERROR_MARKER, message, hint),
                None => format!("{} {}", ERROR_MARKER, message),
            },
        }
    }

    /// Tool-call entry point taking the raw JSON argument string.
    pub fn call(&self, arguments: &str) -> String {
        match parse_query_argument(arguments) {
            Ok(sql) => self.run_query(&sql),
            Err(reason) => format!("{} invalid tool input: {}", ERROR_MARKER, reason),
        }
    }

    /// Relation names are case-sensitive, so a reference differing only in
    /// case from a registered name is unknown too and gets that name back.
    fn suggest_relation(&self, sql: &str) -> Option<String> {
        let names = self.relation_names();
        RELATION_REF
            .captures_iter(sql)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .filter(|referenced| !names.contains(referenced))
            .find_map(|unknown| {
                let lowered = unknown.to_lowercase();
                names
                    .iter()
                    .map(|n| (n, jaro_winkler(&lowered, &n.to_lowercase())))
                    .filter(|(_, score)| *score >= 0.8)
                    .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
                    .map(|(best, _)| {
                        format!("unknown table '{}', did you mean '{}'?", unknown, best)
                    })
            })
    }
}

/// Accepts `{"query": "..."}`, a bare JSON string, or raw SQL text.
pub fn parse_query_argument(arguments: &str) -> Result<String, String> {
    match serde_json::from_str::<Value>(arguments) {
        Ok(Value::Object(map)) => map
            .get("query")
            .and_then(|q| q.as_str())
            .map(str::to_string)
            .ok_or_else(|| "missing string field 'query'".to_string()),
        Ok(Value::String(sql)) => Ok(sql),
        Ok(other) => Err(format!("expected an object with a 'query' field, got {}", other)),
        Err(_) if !arguments.trim().is_empty() && !arguments.trim_start().starts_with('{') => {
            Ok(arguments.to_string())
        }
        Err(e) => Err(e.to_string()),
    }
}

fn check_read_only(sql: &str) -> Result<(), String> {
    let statements = match Parser::parse_sql(&GenericDialect {}, sql) {
        Ok(statements) => statements,
        // let the engine report the syntax error itself
        Err(_) => return Ok(()),
    };
    match statements.iter().find(|s| !matches!(s, Statement::Query(_))) {
        Some(statement) => Err(format!(
            "only read-only SELECT queries are permitted, refused `{}`",
            statement
        )),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::Relation;
    use polars::prelude::*;

    fn tool() -> QueryTool {
        let mut catalog = RelationCatalog::new();
        let frame = df!("sku" => ["A1"], "qty" => [2i64], "price" => [10.0]).unwrap();
        catalog.register(Relation::from_frame("sales_report", frame));
        QueryTool::new(Arc::new(catalog))
    }

    #[test]
    fn test_spec_lists_tables() {
        let spec = tool().spec();
        assert_eq!(spec.name, "run_sql_query");
        assert!(spec.description.contains("Available tables: sales_report."));
        assert!(spec.description.contains("Top 50 rows"));

        let definition = spec.to_function_definition();
        assert_eq!(definition.parameters["required"], json!(["query"]));
        assert_eq!(definition.parameters["properties"]["query"]["type"], "string");
    }

    #[test]
    fn test_run_query_renders_table() {
        let output = tool().run_query("SELECT SUM(qty*price) AS total FROM sales_report");
        assert_eq!(output, "   total\n0   20.0");
    }

    #[test]
    fn test_invalid_sql_returns_marker() {
        let output = tool().run_query("SELEKT * FORM x");
        assert!(output.starts_with(ERROR_MARKER), "{}", output);
    }

    #[test]
    fn test_unknown_table_gets_a_hint() {
        let output = tool().run_query("SELECT * FROM sale_report");
        assert!(output.starts_with(ERROR_MARKER));
        assert!(output.contains("did you mean 'sales_report'?"), "{}", output);
    }

    #[test]
    fn test_case_mismatch_gets_the_registered_name() {
        let output = tool().run_query("SELECT * FROM Sales_Report");
        assert!(output.starts_with(ERROR_MARKER), "{}", output);
        assert!(
            output.contains("unknown table 'Sales_Report', did you mean 'sales_report'?"),
            "{}",
            output
        );
    }

    #[test]
    fn test_read_only_guard() {
        let guarded = tool().read_only(true);
        let output = guarded.run_query("DROP TABLE sales_report");
        assert!(output.starts_with(ERROR_MARKER));
        assert!(output.contains("read-only"));
        assert!(guarded.run_query("SELECT sku FROM sales_report").contains("A1"));
    }

    #[test]
    fn test_parse_query_argument() {
        assert_eq!(parse_query_argument(r#"{"query": "SELECT 1"}"#).unwrap(), "SELECT 1");
        assert_eq!(parse_query_argument(r#""SELECT 2""#).unwrap(), "SELECT 2");
        assert_eq!(parse_query_argument("SELECT 3").unwrap(), "SELECT 3");
        assert!(parse_query_argument(r#"{"sql": "SELECT 1"}"#).is_err());
        assert!(parse_query_argument(r#"{"query": "#).is_err());
    }

    #[test]
    fn test_call_with_bad_arguments_returns_marker() {
        let output = tool().call("{not json");
        assert!(output.starts_with(ERROR_MARKER));
    }
}
