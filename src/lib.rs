pub mod agent;
pub mod catalog;
pub mod config;
pub mod error;
pub mod execution;
pub mod ingestion;
pub mod llm;
pub mod observability;
