//! Per-request observability handle.
//!
//! Every stage of a chat request logs and reports progress through one
//! [`RequestContext`]: events go to `tracing` inside the request span and to
//! the shared [`LogBuffer`], and user-facing messages go to the outbound
//! channel of the session that owns the request.

use crate::domain::message::OutboundMessage;
use crate::infrastructure::logging::LogBuffer;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, info_span, warn, Span};
use uuid::Uuid;

pub const LOG_SOURCE: &str = "SQL-CHAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

#[derive(Clone)]
pub struct RequestContext {
    request_id: Uuid,
    span: Span,
    logs: Arc<LogBuffer>,
    outbound: UnboundedSender<OutboundMessage>,
}

impl RequestContext {
    pub fn new(logs: Arc<LogBuffer>, outbound: UnboundedSender<OutboundMessage>) -> Self {
        let request_id = Uuid::new_v4();
        let span = info_span!("chat_request", request_id = %request_id);
        Self {
            request_id,
            span,
            logs,
            outbound,
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        let _entered = self.span.enter();
        match level {
            LogLevel::Debug => debug!(source = LOG_SOURCE, "{}", message),
            LogLevel::Info => info!(source = LOG_SOURCE, "{}", message),
            LogLevel::Warn => warn!(source = LOG_SOURCE, "{}", message),
            LogLevel::Error => error!(source = LOG_SOURCE, "{}", message),
        }
        self.logs.push(level.as_str(), LOG_SOURCE, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    /// Fire-and-forget. A closed receiver only means nobody is listening
    /// any more.
    pub fn send(&self, message: OutboundMessage) {
        if self.outbound.send(message).is_err() {
            debug!(request_id = %self.request_id, "Outbound channel closed, message dropped");
        }
    }

    pub fn progress(&self, loading_message: impl Into<String>) {
        self.send(OutboundMessage::loading(loading_message));
    }
}

/// First `max_chars` characters of `text`, with `...` appended when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
