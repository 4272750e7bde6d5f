//! Application configuration
//!
//! Everything the process needs is gathered into [`AppConfig`] once at
//! startup and handed to the components that need it. The environment is
//! only ever read here, never written.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Rows returned to the reasoning loop per query.
pub const DEFAULT_ROW_LIMIT: usize = 50;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// Character encoding of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceEncoding {
    #[default]
    Utf8,
    Latin1,
}

/// One named CSV source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSource {
    /// Relation name the dataset is queryable under
    pub name: String,
    /// File name, resolved against the data directory
    pub file_name: String,
    #[serde(default)]
    pub encoding: SourceEncoding,
}

impl DatasetSource {
    pub fn new(name: &str, file_name: &str) -> Self {
        Self {
            name: name.to_string(),
            file_name: file_name.to_string(),
            encoding: SourceEncoding::Utf8,
        }
    }

    pub fn with_encoding(mut self, encoding: SourceEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn path_in(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.file_name)
    }
}

/// The seven retail datasets the assistant knows about.
pub fn retail_sources() -> Vec<DatasetSource> {
    vec![
        DatasetSource::new("amazon_sales", "Amazon Sale Report.csv")
            .with_encoding(SourceEncoding::Latin1),
        DatasetSource::new("cloud_warehouse", "Cloud Warehouse Compersion Chart.csv"),
        DatasetSource::new("expenses", "Expense IIGF.csv"),
        DatasetSource::new("international_sales", "International sale Report.csv"),
        DatasetSource::new("may_2022", "May-2022.csv"),
        DatasetSource::new("pl_march_2021", "PL March 2021.csv"),
        DatasetSource::new("sales_report", "Sale Report.csv"),
    ]
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// `None` selects the offline collaborator
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub temperature: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: 0.0,
        }
    }
}

impl LlmConfig {
    /// Reads `GOOGLE_API_KEY`, `LLM_MODEL` and `LLM_BASE_URL`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: std::env::var("GOOGLE_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            model: std::env::var("LLM_MODEL").unwrap_or(defaults.model),
            base_url: std::env::var("LLM_BASE_URL").unwrap_or(defaults.base_url),
            temperature: defaults.temperature,
        }
    }
}

/// Budget handed to the reasoning collaborator for one turn.
#[derive(Debug, Clone, Copy)]
pub struct AgentLimits {
    pub max_iterations: usize,
    pub max_execution_time: Duration,
}

impl Default for AgentLimits {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            max_execution_time: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub sources: Vec<DatasetSource>,
    pub row_limit: usize,
    /// Refuse statements other than queries at the gateway
    pub read_only: bool,
    pub llm: LlmConfig,
    pub limits: AgentLimits,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            sources: retail_sources(),
            row_limit: DEFAULT_ROW_LIMIT,
            read_only: false,
            llm: LlmConfig::default(),
            limits: AgentLimits::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            llm: LlmConfig::from_env(),
            ..Self::default()
        }
    }
}
