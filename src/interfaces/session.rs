use crate::application::use_cases::request_context::{preview, RequestContext};
use crate::application::use_cases::sql_chat::SqlChatPipeline;
use crate::domain::error::{AppError, Result};
use crate::domain::message::{InboundMessage, OutboundMessage};
use crate::infrastructure::logging::LogBuffer;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::Instrument;
use validator::Validate;

pub const EMPTY_INPUT_ERROR: &str = "No user input provided";

/// One conversation. Requests are handled one at a time; a failed request
/// is reported to the client and the session keeps accepting messages.
pub struct ChatSession {
    pipeline: Arc<SqlChatPipeline>,
    logs: Arc<LogBuffer>,
    outbound: UnboundedSender<OutboundMessage>,
}

impl ChatSession {
    pub fn new(
        pipeline: Arc<SqlChatPipeline>,
        logs: Arc<LogBuffer>,
        outbound: UnboundedSender<OutboundMessage>,
    ) -> Self {
        Self {
            pipeline,
            logs,
            outbound,
        }
    }

    /// Handle one raw inbound payload. The last message emitted always has
    /// `is_last_message` set.
    pub async fn handle_message(&mut self, text_data: &str) {
        let ctx = RequestContext::new(self.logs.clone(), self.outbound.clone());
        ctx.info(&format!("Received message: {}", preview(text_data, 100)));

        let span = ctx.span().clone();
        if let Err(e) = self.process(&ctx, text_data).instrument(span).await {
            let message = match e {
                AppError::InputError(msg) => msg,
                other => format!("Error processing message: {}", other),
            };
            ctx.error(&message);
            ctx.send(OutboundMessage::error(message));
        }
    }

    async fn process(&self, ctx: &RequestContext, text_data: &str) -> Result<()> {
        let inbound = InboundMessage::parse(text_data)?;
        inbound
            .validate()
            .map_err(|e| AppError::ValidationError(e.to_string()))?;

        let user_input = match inbound.text() {
            Some(text) => text,
            None => {
                ctx.warn("Received empty message");
                return Err(AppError::InputError(EMPTY_INPUT_ERROR.to_string()));
            }
        };

        self.pipeline.run(ctx, user_input).await?;
        Ok(())
    }
}
