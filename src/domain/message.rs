use crate::domain::error::{AppError, Result};
use crate::domain::outcome::QueryOutcome;
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const MAX_INPUT_CHARS: u64 = 8000;

#[derive(Debug, Deserialize, Validate)]
pub struct InboundMessage {
    #[serde(default)]
    #[validate(length(max = MAX_INPUT_CHARS))]
    pub user_input: Option<String>,
    /// Older clients send the text under `message`.
    #[serde(default)]
    #[validate(length(max = MAX_INPUT_CHARS))]
    pub message: Option<String>,
}

impl InboundMessage {
    pub fn parse(text_data: &str) -> Result<Self> {
        serde_json::from_str(text_data)
            .map_err(|e| AppError::ParseError(format!("Invalid message payload: {}", e)))
    }

    /// The user's text, preferring `user_input` over `message`. Only the
    /// empty string counts as missing; whitespace is passed on as typed.
    pub fn text(&self) -> Option<&str> {
        self.user_input
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.message.as_deref().filter(|s| !s.is_empty()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboundMessage {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub loading_message: Option<String>,
    pub is_last_message: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", skip_deserializing)]
    pub data: Option<QueryOutcome>,
}

impl OutboundMessage {
    pub fn content(content: impl Into<String>, is_last_message: bool) -> Self {
        Self {
            content: content.into(),
            loading_message: None,
            is_last_message,
            error: None,
            data: None,
        }
    }

    pub fn loading(message: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            loading_message: Some(message.into()),
            is_last_message: false,
            error: None,
            data: None,
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            loading_message: None,
            is_last_message: true,
            error: Some(error.into()),
            data: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_data(mut self, data: QueryOutcome) -> Self {
        self.data = Some(data);
        self
    }
}
