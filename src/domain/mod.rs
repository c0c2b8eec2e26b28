pub mod error;
pub mod intent;
pub mod llm_config;
pub mod message;
pub mod outcome;
pub mod schema;
