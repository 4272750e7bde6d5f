//! Offline collaborator
//!
//! Used when no model credential is configured. It cannot interpret
//! questions, but SQL typed by the user (a fenced ```sql block or a line that
//! starts with SELECT/WITH) is run straight through the query tool.

use crate::agent::collaborator::Collaborator;
use crate::agent::memory::ChatMessage;
use crate::agent::tools::QueryTool;
use crate::error::Result;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;

lazy_static! {
    static ref FENCED_SQL: Regex = Regex::new(r"(?is)```(?:sql)?\s*(.+?)```").unwrap();
    static ref BARE_SQL: Regex = Regex::new(r"(?ims)^[ \t]*((?:select|with)\b.*)\z").unwrap();
}

pub struct OfflineCollaborator {
    tool: Arc<QueryTool>,
}

impl OfflineCollaborator {
    pub fn new(tool: Arc<QueryTool>) -> Self {
        Self { tool }
    }

    fn help_text(&self) -> String {
        let names = self.tool.relation_names();
        let example = names
            .first()
            .map(|n| format!("SELECT * FROM {} LIMIT 5", n))
            .unwrap_or_else(|| "SELECT 1".to_string());
        format!(
            "No language model is configured (set GOOGLE_API_KEY), so I can only run SQL \
             you type.\nAvailable tables: {}\nTry: {}",
            if names.is_empty() { "(none loaded)".to_string() } else { names.join(", ") },
            example
        )
    }
}

/// Pull a SQL statement out of free text, if there is one.
pub fn extract_sql(input: &str) -> Option<String> {
    FENCED_SQL
        .captures(input)
        .or_else(|| BARE_SQL.captures(input))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|sql| !sql.is_empty())
}

#[async_trait]
impl Collaborator for OfflineCollaborator {
    async fn invoke(&self, input: &str, _history: &[ChatMessage]) -> Result<String> {
        Ok(match extract_sql(input) {
            Some(sql) => self.tool.run_query(&sql),
            None => self.help_text(),
        })
    }
}
