//! Hand-written fakes for the oracle and the relational store.

use crate::application::use_cases::request_context::RequestContext;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use crate::domain::message::OutboundMessage;
use crate::domain::outcome::StoreOutput;
use crate::domain::schema::{ColumnSchema, SchemaSnapshot, TableSchema};
use crate::infrastructure::db::RelationalStore;
use crate::infrastructure::llm_clients::LLMClient;
use crate::infrastructure::logging::LogBuffer;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver};

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system: String,
    pub user: String,
}

/// Answers each `generate` call with the next scripted response. Running out
/// of responses is an `LLMError`.
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<Result<String>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedLlm {
    pub fn new<S: Into<String>>(responses: Vec<S>) -> Self {
        Self::with_results(responses.into_iter().map(|r| Ok(r.into())).collect())
    }

    pub fn with_results(responses: Vec<Result<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LLMClient for ScriptedLlm {
    async fn generate(&self, _config: &LLMConfig, system: &str, user: &str) -> Result<String> {
        self.calls.lock().unwrap().push(RecordedCall {
            system: system.to_string(),
            user: user.to_string(),
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::LLMError("no scripted response left".to_string())))
    }
}

/// In-memory store: a fixed schema, a per-table comment map, and scripted
/// answers for `execute`.
pub struct FakeStore {
    pub schema: SchemaSnapshot,
    pub comments: HashMap<String, Vec<(String, String)>>,
    pub supports_comments: bool,
    outputs: Mutex<VecDeque<Result<StoreOutput>>>,
    executed: Mutex<Vec<String>>,
}

impl FakeStore {
    pub fn new(schema: SchemaSnapshot) -> Self {
        let comments = schema
            .tables
            .iter()
            .map(|table| {
                let pairs = table
                    .columns
                    .iter()
                    .filter(|c| !c.comment.is_empty())
                    .map(|c| (c.name.clone(), c.comment.clone()))
                    .collect();
                (table.name.clone(), pairs)
            })
            .collect();
        Self {
            schema,
            comments,
            supports_comments: true,
            outputs: Mutex::new(VecDeque::new()),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_output(self, output: Result<StoreOutput>) -> Self {
        self.outputs.lock().unwrap().push_back(output);
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl RelationalStore for FakeStore {
    fn dialect(&self) -> &'static str {
        "fake"
    }

    fn supports_comments(&self) -> bool {
        self.supports_comments
    }

    async fn introspect(&self) -> Result<SchemaSnapshot> {
        Ok(self.schema.clone())
    }

    async fn column_comments(&self, table: &str) -> Result<Vec<(String, String)>> {
        Ok(self.comments.get(table).cloned().unwrap_or_default())
    }

    async fn execute(&self, sql: &str) -> Result<StoreOutput> {
        self.executed.lock().unwrap().push(sql.to_string());
        self.outputs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(StoreOutput::Affected(0)))
    }
}

/// `orders` ("订单表") with `id` and `amount` ("金额").
pub fn orders_schema() -> SchemaSnapshot {
    SchemaSnapshot::new(vec![TableSchema {
        name: "orders".to_string(),
        comment: "订单表".to_string(),
        columns: vec![
            ColumnSchema {
                name: "id".to_string(),
                data_type: "integer".to_string(),
                comment: String::new(),
            },
            ColumnSchema {
                name: "amount".to_string(),
                data_type: "numeric".to_string(),
                comment: "金额".to_string(),
            },
        ],
    }])
}

pub fn context() -> (RequestContext, UnboundedReceiver<OutboundMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RequestContext::new(Arc::new(LogBuffer::default()), tx), rx)
}

pub fn drain(rx: &mut UnboundedReceiver<OutboundMessage>) -> Vec<OutboundMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}
