use anyhow::Result;
use clap::{Parser, Subcommand};
use retail_insights::agent::{self, ChatRequest};
use retail_insights::config::AppConfig;
use retail_insights::ingestion;
use retail_insights::observability;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "retail-insights")]
#[command(about = "Ask questions about the retail sales datasets in plain language")]
struct Args {
    /// Directory holding the retail CSV files
    #[arg(short, long, default_value = ".", global = true)]
    data_dir: PathBuf,

    /// Model API key (or set GOOGLE_API_KEY env var)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Model name (or set LLM_MODEL env var)
    #[arg(long, global = true)]
    model: Option<String>,

    /// OpenAI-compatible endpoint (or set LLM_BASE_URL env var)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Refuse SQL statements other than queries
    #[arg(long, global = true)]
    read_only: bool,

    /// Rows shown per query result
    #[arg(long, global = true)]
    row_limit: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive chat session
    Chat {
        /// Session to continue; a fresh one is created by default
        #[arg(long)]
        session_id: Option<String>,
    },
    /// Ask a single question and exit
    Ask { question: String },
    /// Run one SQL statement through the query tool
    Query { sql: String },
    /// List the registered tables and their columns
    Tables,
}

impl Args {
    fn config(&self) -> AppConfig {
        let mut config = AppConfig::from_env(self.data_dir.clone());
        if let Some(key) = &self.api_key {
            config.llm.api_key = Some(key.clone());
        }
        if let Some(model) = &self.model {
            config.llm.model = model.clone();
        }
        if let Some(base_url) = &self.base_url {
            config.llm.base_url = base_url.clone();
        }
        if let Some(row_limit) = self.row_limit {
            config.row_limit = row_limit;
        }
        config.read_only = self.read_only;
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    observability::init_tracing();

    let args = Args::parse();
    let config = args.config();

    info!("Retail Insights starting...");
    let (catalog, report) = ingestion::load_catalog(&config);
    for warning in report.warnings() {
        eprintln!("⚠️  {}", warning);
    }
    let catalog = Arc::new(catalog);

    match args.command {
        Command::Tables => {
            println!("{}", catalog.describe());
        }
        Command::Query { sql } => {
            let tool = agent::query_tool(&config, catalog);
            println!("{}", tool.run_query(&sql));
        }
        Command::Ask { question } => {
            let service = agent::chat_service(&config, catalog);
            let session_id = uuid::Uuid::new_v4().to_string();
            let response = service.respond(ChatRequest::new(session_id, question)).await?;
            println!("{}", response.answer_text);
        }
        Command::Chat { session_id } => {
            let service = agent::chat_service(&config, catalog);
            let session_id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            println!("Retail Insights chat (session {}). Type 'exit' to quit.", session_id);

            let stdin = io::stdin();
            let mut lines = stdin.lock().lines();
            loop {
                print!("> ");
                io::stdout().flush()?;
                let line = match lines.next() {
                    Some(line) => line?,
                    None => break,
                };
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                if text.eq_ignore_ascii_case("exit") || text.eq_ignore_ascii_case("quit") {
                    break;
                }

                match service.respond(ChatRequest::new(session_id.as_str(), text)).await {
                    Ok(response) => println!("{}\n", response.answer_text),
                    Err(e) => {
                        warn!("Turn failed: {}", e);
                        println!("Sorry, something went wrong: {}\n", e);
                    }
                }
            }
        }
    }

    Ok(())
}
