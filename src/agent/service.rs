//! Conversation service
//!
//! Turns a `{session_id, user_text}` request into an answer: look up the
//! session's history, hand the turn to the collaborator, record both sides.

use crate::agent::collaborator::Collaborator;
use crate::agent::contracts::{ChatRequest, ChatResponse};
use crate::agent::memory::{HistoryHandle, HistoryStore};
use crate::error::Result;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct ChatService {
    collaborator: Arc<dyn Collaborator>,
    histories: Arc<dyn HistoryStore>,
}

impl ChatService {
    pub fn new(collaborator: Arc<dyn Collaborator>, histories: Arc<dyn HistoryStore>) -> Self {
        Self {
            collaborator,
            histories,
        }
    }

    /// Answer one user turn. The turn is recorded only if it succeeds.
    pub async fn respond(&self, request: ChatRequest) -> Result<ChatResponse> {
        let history = self.histories.get_or_create(&request.session_id);
        let prior = history.messages();
        info!(
            "💬 [{}] turn {} : {}",
            request.session_id,
            prior.len() / 2 + 1,
            request.user_text
        );

        let answer = match self.collaborator.invoke(&request.user_text, &prior).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("[{}] collaborator failed: {}", request.session_id, e);
                return Err(e);
            }
        };

        history.append_turn(request.user_text, answer.clone());

        Ok(ChatResponse { answer_text: answer })
    }

    pub fn history(&self, session_id: &str) -> HistoryHandle {
        self.histories.get_or_create(session_id)
    }
}
