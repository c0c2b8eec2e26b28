pub mod use_cases;

pub use use_cases::sql_chat::{ChatOutcome, SqlChatPipeline};
