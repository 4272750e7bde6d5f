//! Conversational layer: the query tool, session histories and the
//! collaborators that answer user turns.

pub mod collaborator;
pub mod contracts;
pub mod executor;
pub mod memory;
pub mod offline;
pub mod service;
pub mod tools;

use crate::catalog::RelationCatalog;
use crate::config::AppConfig;
use crate::llm::LlmClient;
use collaborator::Collaborator;
use executor::ToolCallingAgent;
use memory::{HistoryStore, InMemoryHistoryStore};
use offline::OfflineCollaborator;
use service::ChatService;
use std::sync::Arc;
use tools::QueryTool;
use tracing::{info, warn};

pub use contracts::{ChatRequest, ChatResponse};

/// Build the query tool for an already loaded catalog.
pub fn query_tool(config: &AppConfig, catalog: Arc<RelationCatalog>) -> Arc<QueryTool> {
    Arc::new(QueryTool::new(catalog).read_only(config.read_only))
}

/// Pick the collaborator for this configuration: the tool-calling agent when
/// a credential is present, the offline one otherwise.
pub fn collaborator(config: &AppConfig, tool: Arc<QueryTool>) -> Arc<dyn Collaborator> {
    match LlmClient::from_config(&config.llm) {
        Ok(client) => {
            info!("🤖 Using model {} for reasoning", client.model());
            Arc::new(ToolCallingAgent::new(Arc::new(client), tool, config.limits))
        }
        Err(_) => {
            warn!("No LLM API key configured - answering in offline SQL mode");
            Arc::new(OfflineCollaborator::new(tool))
        }
    }
}

pub fn chat_service(config: &AppConfig, catalog: Arc<RelationCatalog>) -> ChatService {
    chat_service_with_store(config, catalog, Arc::new(InMemoryHistoryStore::new()))
}

pub fn chat_service_with_store(
    config: &AppConfig,
    catalog: Arc<RelationCatalog>,
    histories: Arc<dyn HistoryStore>,
) -> ChatService {
    let tool = query_tool(config, catalog);
    ChatService::new(collaborator(config, tool), histories)
}
