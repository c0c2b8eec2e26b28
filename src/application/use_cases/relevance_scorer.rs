//! Relevance scoring of schema tables against an operation description.
//!
//! Scoring is keyword based and pure: the same description, kind and schema
//! always yield the same ranking. Points per table:
//! - +5 when the table name or its comment appears in the description
//! - +3 per column whose name is one of the description's words
//! - +2 per other column whose comment contains one of those words
//! - +1 for Query on a table with an `id` column, or Insert on a table with
//!   a `createtime` column

use crate::domain::intent::OperationKind;
use crate::domain::schema::{SchemaSnapshot, TableSchema};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static WORD_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w+\b").unwrap());

pub const DEFAULT_RELEVANCE_LIMIT: usize = 5;
const MAX_EVIDENCE: usize = 3;

const DIRECT_MATCH_SCORE: u32 = 5;
const COLUMN_NAME_SCORE: u32 = 3;
const COLUMN_COMMENT_SCORE: u32 = 2;
const KIND_BONUS: u32 = 1;

const NO_MATCH_HINT: &str =
    "No table clearly matches; pick suitable tables from the database structure.";

#[derive(Debug, Clone, PartialEq)]
pub struct RankedTable {
    pub table: String,
    pub comment: String,
    pub score: u32,
    /// At most three reasons the table scored.
    pub evidence: Vec<String>,
}

/// Tables ordered by descending score; ties keep snapshot order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelevanceRanking {
    pub entries: Vec<RankedTable>,
}

impl RelevanceRanking {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.table.as_str()).collect()
    }

    /// Prompt fragment listing the ranked tables.
    pub fn render(&self) -> String {
        if self.entries.is_empty() {
            return NO_MATCH_HINT.to_string();
        }
        self.entries
            .iter()
            .map(|entry| {
                format!(
                    "- **{}** ({})\n  matched: {}",
                    entry.table,
                    entry.comment,
                    entry.evidence.join(", ")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct RelevanceScorer {
    limit: usize,
}

impl Default for RelevanceScorer {
    fn default() -> Self {
        Self::new(DEFAULT_RELEVANCE_LIMIT)
    }
}

impl RelevanceScorer {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    pub fn rank(
        &self,
        description: &str,
        kind: Option<OperationKind>,
        schema: &SchemaSnapshot,
    ) -> RelevanceRanking {
        let description = description.to_lowercase();
        let words: Vec<&str> = WORD_PATTERN
            .find_iter(&description)
            .map(|m| m.as_str())
            .collect();
        let word_set: HashSet<&str> = words.iter().copied().collect();

        let mut entries: Vec<RankedTable> = schema
            .tables
            .iter()
            .filter_map(|table| score_table(table, &description, &words, &word_set, kind))
            .collect();

        // sort_by is stable, so equal scores keep snapshot order
        entries.sort_by(|a, b| b.score.cmp(&a.score));
        entries.truncate(self.limit);

        RelevanceRanking { entries }
    }
}

fn score_table(
    table: &TableSchema,
    description: &str,
    words: &[&str],
    word_set: &HashSet<&str>,
    kind: Option<OperationKind>,
) -> Option<RankedTable> {
    let mut score = 0;
    let mut evidence = Vec::new();

    let table_comment = table.comment.to_lowercase();
    if description.contains(&table.name.to_lowercase())
        || (!table_comment.is_empty() && description.contains(&table_comment))
    {
        score += DIRECT_MATCH_SCORE;
        evidence.push(format!("{} (direct match)", table.name));
    }

    for column in &table.columns {
        let column_comment = column.comment.to_lowercase();
        if word_set.contains(column.name.to_lowercase().as_str()) {
            score += COLUMN_NAME_SCORE;
            evidence.push(format!("column: {}", column.name));
        } else if !column_comment.is_empty()
            && words.iter().any(|word| column_comment.contains(word))
        {
            score += COLUMN_COMMENT_SCORE;
            evidence.push(format!("column comment: {}", column.comment));
        }
    }

    let bonus_column = match kind {
        Some(OperationKind::Query) => Some("id"),
        Some(OperationKind::Insert) => Some("createtime"),
        _ => None,
    };
    if bonus_column.is_some_and(|name| table.has_column(name)) {
        score += KIND_BONUS;
    }

    if score == 0 {
        return None;
    }

    evidence.truncate(MAX_EVIDENCE);
    Some(RankedTable {
        table: table.name.clone(),
        comment: table.comment.clone(),
        score,
        evidence,
    })
}
