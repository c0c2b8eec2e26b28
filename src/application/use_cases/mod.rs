pub mod intent_classifier;
pub mod llm_output;
pub mod oracle;
pub mod relevance_scorer;
pub mod request_context;
pub mod result_normalizer;
pub mod result_summarizer;
pub mod schema_formatter;
pub mod sql_auditor;
pub mod sql_chat;
pub mod sql_generator;

#[cfg(test)]
pub(crate) mod test_support;
