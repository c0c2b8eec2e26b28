use crate::domain::error::Result;
use crate::domain::llm_config::LLMConfig;
use crate::infrastructure::llm_clients::LLMClient;
use crate::infrastructure::response::{split_reasoning, OracleReply};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// The text-generation service as the pipeline sees it: one prompt in,
/// reasoning and cleaned response out. Transport failures propagate.
#[derive(Clone)]
pub struct Oracle {
    client: Arc<dyn LLMClient>,
    config: LLMConfig,
}

impl Oracle {
    pub fn new(client: Arc<dyn LLMClient>, config: LLMConfig) -> Self {
        Self { client, config }
    }

    pub async fn invoke(&self, prompt: &str, system_prompt: &str) -> Result<OracleReply> {
        let start = Instant::now();
        let raw = self
            .client
            .generate(&self.config, system_prompt, prompt)
            .await?;

        let reply = split_reasoning(&raw);
        debug!(
            model = %self.config.model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            reasoning_chars = reply.reasoning.chars().count(),
            response_chars = reply.response.chars().count(),
            "Oracle call finished"
        );
        Ok(reply)
    }
}

/// Today's date as the prompts print it.
pub fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::test_support::ScriptedLlm;

    #[tokio::test]
    async fn test_invoke_splits_reasoning() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            "<think>check tables</think>\n\nAll good.",
        ]));
        let oracle = Oracle::new(llm.clone(), LLMConfig::default());

        let reply = oracle.invoke("hi", "system").await.unwrap();
        assert_eq!(reply.reasoning, "check tables");
        assert_eq!(reply.response, "All good.");

        let calls = llm.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].system, "system");
        assert_eq!(calls[0].user, "hi");
    }

    #[tokio::test]
    async fn test_invoke_propagates_transport_error() {
        let oracle = Oracle::new(Arc::new(ScriptedLlm::new(Vec::<&str>::new())), LLMConfig::default());
        assert!(oracle.invoke("hi", "system").await.is_err());
    }
}
