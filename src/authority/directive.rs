//! Directives and their results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::router::{MessageKind, Recipient, RoutedMessage};
use crate::store::RecordPriority;

/// Priority of a directive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectivePriority {
    #[default]
    Normal,
    High,
    Critical,
}

impl DirectivePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            DirectivePriority::Normal => "normal",
            DirectivePriority::High => "high",
            DirectivePriority::Critical => "critical",
        }
    }
}

impl std::str::FromStr for DirectivePriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(DirectivePriority::Normal),
            "high" => Ok(DirectivePriority::High),
            "critical" => Ok(DirectivePriority::Critical),
            _ => Err(format!("Invalid directive priority: {}", s)),
        }
    }
}

impl From<DirectivePriority> for RecordPriority {
    fn from(priority: DirectivePriority) -> Self {
        match priority {
            DirectivePriority::Normal => RecordPriority::Normal,
            DirectivePriority::High => RecordPriority::High,
            DirectivePriority::Critical => RecordPriority::Critical,
        }
    }
}

/// An instruction issued to a worker unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Directive {
    pub id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub target: Recipient,
    /// Free-form verb, e.g. `APPROVAL_GRANTED`
    pub name: String,
    pub params: Value,
    pub priority: DirectivePriority,
    pub requires_confirmation: bool,
}

impl Directive {
    pub fn new(
        target: Recipient,
        name: impl Into<String>,
        params: Value,
        priority: DirectivePriority,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            issued_at: Utc::now(),
            target,
            name: name.into(),
            params,
            priority,
            requires_confirmation: true,
        }
    }

    /// Build the router message carrying this directive
    pub fn to_message(&self, from: &str) -> RoutedMessage {
        RoutedMessage {
            correlation_id: self.id,
            from: from.to_string(),
            to: self.target.clone(),
            kind: MessageKind::Command,
            priority: self.priority,
            payload: serde_json::json!({
                "directive_id": self.id,
                "name": self.name,
                "params": self.params,
                "issued_at": self.issued_at,
            }),
            requires_response: self.requires_confirmation,
        }
    }
}

/// Outcome classification of a directive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveStatus {
    /// The worker reported completion
    Executed,
    /// Accepted without a completion report
    Queued,
    Failed,
    /// Held back pending human approval
    RequiresApproval,
}

impl DirectiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DirectiveStatus::Executed => "executed",
            DirectiveStatus::Queued => "queued",
            DirectiveStatus::Failed => "failed",
            DirectiveStatus::RequiresApproval => "requires_approval",
        }
    }
}

/// Result of an administrative operation
///
/// `directive_id` is absent when no directive was issued (for example a
/// decision on an unknown approval).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectiveResult {
    pub directive_id: Option<Uuid>,
    pub status: DirectiveStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DirectiveResult {
    pub fn executed(directive_id: Option<Uuid>, data: Option<Value>) -> Self {
        Self {
            directive_id,
            status: DirectiveStatus::Executed,
            data,
            error: None,
        }
    }

    pub fn queued(directive_id: Option<Uuid>, data: Option<Value>) -> Self {
        Self {
            directive_id,
            status: DirectiveStatus::Queued,
            data,
            error: None,
        }
    }

    /// A failure; an empty message is replaced so `error` is never blank
    pub fn failed(directive_id: Option<Uuid>, error: impl Into<String>) -> Self {
        let mut error = error.into();
        if error.trim().is_empty() {
            error = "unknown failure".to_string();
        }
        Self {
            directive_id,
            status: DirectiveStatus::Failed,
            data: None,
            error: Some(error),
        }
    }

    pub fn requires_approval(approval_id: Uuid) -> Self {
        Self {
            directive_id: None,
            status: DirectiveStatus::RequiresApproval,
            data: Some(serde_json::json!({ "approval_id": approval_id })),
            error: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == DirectiveStatus::Failed
    }
}
