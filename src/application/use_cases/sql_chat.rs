//! Chat request pipeline.
//!
//! One request walks a small state machine:
//!
//! ```text
//! Classifying -> Generating -> Auditing -> Executing -> Summarizing -> Done
//!                    ^            |
//!                    +-- retry ---+            Generating -> Failed
//! ```
//!
//! A rejected audit sends the pipeline back to `Generating` with the
//! auditor's revised intent until `max_retries` regenerations have been
//! spent; after that the last candidate is executed anyway. Every step
//! awaits the previous one, so there is never more than one generation or
//! audit in flight.

use super::intent_classifier::IntentClassifier;
use super::oracle::Oracle;
use super::relevance_scorer::RelevanceScorer;
use super::request_context::{preview, RequestContext};
use super::result_normalizer::ResultNormalizer;
use super::result_summarizer::ResultSummarizer;
use super::sql_auditor::SqlAuditor;
use super::sql_generator::SqlGenerator;
use crate::domain::error::Result;
use crate::domain::intent::{AuditOutcome, OperationIntent};
use crate::domain::message::OutboundMessage;
use crate::domain::outcome::QueryOutcome;
use crate::infrastructure::config::PipelineConfig;
use crate::infrastructure::db::RelationalStore;
use std::sync::Arc;

pub const GENERATION_FAILED_MESSAGE: &str =
    "Cannot generate a valid SQL statement, please describe your request more clearly.";
pub const GENERATION_FAILED_ERROR: &str = "Cannot generate SQL";

/// How a request ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatOutcome {
    /// The classifier answered without asking for a data operation.
    Conversational,
    /// A generation attempt produced no SQL.
    GenerationFailed { attempts: u32 },
    Executed {
        sql: String,
        attempts: u32,
        outcome: QueryOutcome,
    },
}

enum Stage {
    Classifying,
    Generating {
        intent: OperationIntent,
    },
    Auditing {
        intent: OperationIntent,
        sql: String,
        response: String,
    },
    Executing {
        intent: OperationIntent,
        sql: String,
        response: String,
    },
    Summarizing {
        intent: OperationIntent,
        sql: String,
        outcome: QueryOutcome,
    },
    Done(ChatOutcome),
}

pub struct SqlChatPipeline {
    store: Arc<dyn RelationalStore>,
    classifier: IntentClassifier,
    generator: SqlGenerator,
    auditor: SqlAuditor,
    normalizer: ResultNormalizer,
    summarizer: ResultSummarizer,
    max_retries: u32,
}

impl SqlChatPipeline {
    pub fn new(oracle: Oracle, store: Arc<dyn RelationalStore>, config: &PipelineConfig) -> Self {
        Self {
            classifier: IntentClassifier::new(oracle.clone()),
            generator: SqlGenerator::new(
                oracle.clone(),
                RelevanceScorer::new(config.relevance_limit),
            ),
            auditor: SqlAuditor::new(oracle.clone()),
            normalizer: ResultNormalizer::new(store.clone()),
            summarizer: ResultSummarizer::new(oracle, config.summary_sample_rows),
            store,
            max_retries: config.max_retries,
        }
    }

    pub fn store(&self) -> &Arc<dyn RelationalStore> {
        &self.store
    }

    /// Run one request to completion. Progress and results go out through
    /// `ctx`; oracle and introspection failures are returned to the caller.
    pub async fn run(&self, ctx: &RequestContext, user_input: &str) -> Result<ChatOutcome> {
        ctx.info(&format!("Processing user input: {}", preview(user_input, 50)));
        ctx.progress("Analysing your request...");

        // One live read per request, shared by every stage below.
        let schema = self.store.introspect().await?;
        ctx.debug(&format!("Schema tables: {}", schema.table_names().join(", ")));
        let dialect = self.store.dialect();

        let mut attempts: u32 = 0;
        let mut retries: u32 = 0;
        let mut stage = Stage::Classifying;

        loop {
            stage = match stage {
                Stage::Classifying => {
                    let intent = self.classifier.classify(ctx, user_input, &schema).await?;
                    ctx.send(OutboundMessage::content(
                        intent.raw_response.clone(),
                        !intent.is_actionable(),
                    ));
                    if intent.is_actionable() {
                        ctx.progress(format!(
                            "Generating SQL for the {} operation...",
                            intent.kind_label()
                        ));
                        Stage::Generating { intent }
                    } else {
                        Stage::Done(ChatOutcome::Conversational)
                    }
                }

                Stage::Generating { intent } => {
                    attempts += 1;
                    let candidate = self
                        .generator
                        .generate(ctx, &intent, &schema, dialect)
                        .await?;
                    match candidate.sql {
                        Some(sql) => Stage::Auditing {
                            intent,
                            sql,
                            response: candidate.source_response,
                        },
                        None => {
                            ctx.warn("Could not generate a valid SQL statement");
                            ctx.send(
                                OutboundMessage::error(GENERATION_FAILED_ERROR)
                                    .with_content(GENERATION_FAILED_MESSAGE),
                            );
                            Stage::Done(ChatOutcome::GenerationFailed { attempts })
                        }
                    }
                }

                Stage::Auditing {
                    intent,
                    sql,
                    response,
                } => {
                    ctx.progress("Auditing the generated SQL...");
                    let audit = self
                        .auditor
                        .audit(ctx, user_input, &sql, &intent, &schema)
                        .await?;
                    self.after_audit(ctx, audit, intent, sql, response, &mut retries)
                }

                Stage::Executing {
                    intent,
                    sql,
                    response,
                } => {
                    ctx.info(&format!("Executing SQL: {}", preview(&sql, 50)));
                    ctx.send(OutboundMessage::content(response, false));
                    let outcome = self.normalizer.execute(ctx, &sql).await;
                    if outcome.has_rows() {
                        Stage::Summarizing {
                            intent,
                            sql,
                            outcome,
                        }
                    } else {
                        self.finish(ctx, &sql, &outcome);
                        Stage::Done(ChatOutcome::Executed {
                            sql,
                            attempts,
                            outcome,
                        })
                    }
                }

                Stage::Summarizing {
                    intent,
                    sql,
                    mut outcome,
                } => {
                    ctx.progress("Optimizing the result presentation...");
                    let presentation = self
                        .summarizer
                        .summarize(ctx, user_input, &sql, &intent, &outcome)
                        .await;
                    if let QueryOutcome::Query { formatted_view, .. } = &mut outcome {
                        *formatted_view = Some(presentation);
                    }
                    self.finish(ctx, &sql, &outcome);
                    Stage::Done(ChatOutcome::Executed {
                        sql,
                        attempts,
                        outcome,
                    })
                }

                Stage::Done(outcome) => return Ok(outcome),
            };
        }
    }

    fn after_audit(
        &self,
        ctx: &RequestContext,
        audit: AuditOutcome,
        intent: OperationIntent,
        sql: String,
        response: String,
        retries: &mut u32,
    ) -> Stage {
        if audit.accepts() {
            return Stage::Executing {
                intent,
                sql,
                response,
            };
        }

        let revised = match audit.revised_intent(&intent) {
            Some(revised) if *retries < self.max_retries => revised,
            _ => {
                ctx.warn(&format!(
                    "Audit still failing after {} retries, executing last candidate",
                    retries
                ));
                return Stage::Executing {
                    intent,
                    sql,
                    response,
                };
            }
        };

        if let AuditOutcome::Verdict(verdict) = &audit {
            ctx.send(OutboundMessage::content(
                rejection_notice(&verdict.issues, &revised),
                false,
            ));
        }

        *retries += 1;
        ctx.info(&format!(
            "Regenerating SQL from audit feedback (attempt {}/{})",
            retries, self.max_retries
        ));
        ctx.progress(format!(
            "Regenerating SQL (attempt {}/{})...",
            retries, self.max_retries
        ));
        Stage::Generating { intent: revised }
    }

    fn finish(&self, ctx: &RequestContext, sql: &str, outcome: &QueryOutcome) {
        let status = outcome.status_line();
        if outcome.is_success() {
            ctx.info(&status);
        } else {
            ctx.error(&format!("{} ({})", status, preview(sql, 50)));
        }

        let message = OutboundMessage::content(format!("\n\nExecution result:\n{}", status), true);
        ctx.send(if outcome.is_success() {
            message.with_data(outcome.clone())
        } else {
            message
        });
    }
}

fn rejection_notice(issues: &[String], revised: &OperationIntent) -> String {
    let issue_list: String = issues.iter().map(|issue| format!("\n- {}", issue)).collect();
    format!(
        "SQL audit found these issues:{}\n\nNew operation description:\n```{}\n{}\n```\n\nRegenerating SQL from it...\n",
        issue_list,
        revised.kind_label(),
        revised.description
    )
}
