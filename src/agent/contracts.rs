use serde::{Deserialize, Serialize};

/// One user turn as submitted by a front-end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub user_text: String,
}

impl ChatRequest {
    pub fn new(session_id: impl Into<String>, user_text: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_text: user_text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer_text: String,
}
