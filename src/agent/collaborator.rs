use crate::agent::memory::ChatMessage;
use crate::error::Result;
use async_trait::async_trait;

/// The reasoning side of a conversation.
///
/// Given the user's input and the prior turns of the session, produce the
/// final answer text. Implementations may call the query tool any number of
/// times in between.
#[async_trait]
pub trait Collaborator: Send + Sync {
    async fn invoke(&self, input: &str, history: &[ChatMessage]) -> Result<String>;
}
