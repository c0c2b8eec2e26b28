use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of data operation the user asked for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Query,
    Insert,
    Update,
    Delete,
}

impl OperationKind {
    /// Order in which classifier tags are honoured when a response carries
    /// more than one of them.
    pub const CLASSIFICATION_PRIORITY: [OperationKind; 4] = [
        OperationKind::Insert,
        OperationKind::Query,
        OperationKind::Update,
        OperationKind::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Fence tags accepted for this kind. The Chinese labels are what older
    /// prompts asked models to emit, and some models still do.
    pub fn tags(&self) -> &'static [&'static str] {
        match self {
            Self::Query => &["query", "查询"],
            Self::Insert => &["insert", "新增"],
            Self::Update => &["update", "更改"],
            Self::Delete => &["delete", "删除"],
        }
    }

    pub fn sql_verb(&self) -> &'static str {
        match self {
            Self::Query => "SELECT",
            Self::Insert => "INSERT INTO",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }

    /// Parse a label produced by the model (English or Chinese, any case).
    pub fn parse(label: &str) -> Option<Self> {
        let normalized = label.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }
        Self::CLASSIFICATION_PRIORITY
            .into_iter()
            .find(|kind| kind.tags().iter().any(|tag| *tag == normalized))
            .or(match normalized.as_str() {
                "select" => Some(Self::Query),
                _ => None,
            })
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the user wants done. `kind == None` means a conversational reply
/// with no database action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationIntent {
    pub kind: Option<OperationKind>,
    pub description: String,
    pub raw_response: String,
}

impl OperationIntent {
    pub fn conversational(raw_response: impl Into<String>) -> Self {
        Self {
            kind: None,
            description: String::new(),
            raw_response: raw_response.into(),
        }
    }

    pub fn actionable(
        kind: OperationKind,
        description: impl Into<String>,
        raw_response: impl Into<String>,
    ) -> Self {
        Self {
            kind: Some(kind),
            description: description.into(),
            raw_response: raw_response.into(),
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.kind.is_some()
    }

    pub fn kind_label(&self) -> &'static str {
        self.kind.map(|k| k.as_str()).unwrap_or("unknown")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlCandidate {
    /// `None` when the generator response carried no fenced sql block.
    pub sql: Option<String>,
    pub source_response: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditVerdict {
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub suggested_kind: OperationKind,
    pub suggested_description: String,
}

/// Result of auditing one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditOutcome {
    Verdict(AuditVerdict),
    /// The auditor answered but its output could not be read.
    Indeterminate { reason: String },
}

impl AuditOutcome {
    /// Fail-open policy: an unreadable audit never blocks execution.
    pub fn accepts(&self) -> bool {
        match self {
            AuditOutcome::Verdict(verdict) => verdict.is_valid,
            AuditOutcome::Indeterminate { .. } => true,
        }
    }

    /// The intent to regenerate with when the candidate was rejected.
    pub fn revised_intent(&self, current: &OperationIntent) -> Option<OperationIntent> {
        match self {
            AuditOutcome::Verdict(verdict) if !verdict.is_valid => Some(OperationIntent {
                kind: Some(verdict.suggested_kind),
                description: verdict.suggested_description.clone(),
                raw_response: current.raw_response.clone(),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_labels() {
        assert_eq!(OperationKind::parse("Query"), Some(OperationKind::Query));
        assert_eq!(OperationKind::parse(" 新增 "), Some(OperationKind::Insert));
        assert_eq!(OperationKind::parse("更改"), Some(OperationKind::Update));
        assert_eq!(OperationKind::parse("DELETE"), Some(OperationKind::Delete));
        assert_eq!(OperationKind::parse("select"), Some(OperationKind::Query));
        assert_eq!(OperationKind::parse("merge"), None);
        assert_eq!(OperationKind::parse(""), None);
    }

    #[test]
    fn test_indeterminate_audit_is_accepted() {
        let outcome = AuditOutcome::Indeterminate {
            reason: "no json".to_string(),
        };
        let intent = OperationIntent::actionable(OperationKind::Query, "all users", "raw");
        assert!(outcome.accepts());
        assert!(outcome.revised_intent(&intent).is_none());
    }

    #[test]
    fn test_rejected_verdict_revises_intent() {
        let outcome = AuditOutcome::Verdict(AuditVerdict {
            is_valid: false,
            issues: vec!["wrong table".to_string()],
            suggested_kind: OperationKind::Query,
            suggested_description: "list active users".to_string(),
        });
        let intent = OperationIntent::actionable(OperationKind::Delete, "users", "raw");
        assert!(!outcome.accepts());
        let revised = outcome.revised_intent(&intent).unwrap();
        assert_eq!(revised.kind, Some(OperationKind::Query));
        assert_eq!(revised.description, "list active users");
        assert_eq!(revised.raw_response, "raw");
    }
}
