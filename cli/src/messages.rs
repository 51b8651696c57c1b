//! WebSocket message types for the Overwatch protocol
//!
//! These types mirror the server's protocol. Some fields may not be used
//! directly by the CLI but are part of the complete protocol.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// A request awaiting sign-off
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub requested_by: String,
    pub category: String,
    pub description: String,
    pub urgency: String,
    #[serde(default)]
    pub context: Value,
    pub status: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// An issued directive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Directive {
    pub id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub target: Value,
    pub name: String,
    pub params: Value,
    pub priority: String,
}

impl Directive {
    /// Display form of the target (`*` for broadcast)
    pub fn target_label(&self) -> String {
        match &self.target {
            Value::Object(map) => map
                .get("participant")
                .and_then(Value::as_str)
                .unwrap_or("?")
                .to_string(),
            Value::String(s) if s == "broadcast" => "*".to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectiveResult {
    pub directive_id: Option<Uuid>,
    pub status: String,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Highlight {
    pub kind: String,
    pub impact: String,
    pub title: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Headline {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentSummary {
    pub worker_id: String,
    pub display_name: String,
    pub status: String,
    pub actions_completed: u64,
    pub actions_pending: u64,
    pub headline: Headline,
    pub trend: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BriefingMetrics {
    pub cycle_count: u64,
    pub actions_executed: u64,
    pub success_rate: f64,
    #[serde(default)]
    pub sub_metrics: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Briefing {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub summary: String,
    pub highlights: Vec<Highlight>,
    pub pending_approvals: Vec<Approval>,
    pub departments: Vec<DepartmentSummary>,
    pub metrics: BriefingMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyEvaluation {
    pub requires_approval: bool,
    pub rules: Vec<String>,
}

/// A proposed action checked against the admission policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalCheck {
    pub action_type: String,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
}

/// Messages from client to server
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    GenerateBriefing,
    RecentBriefings {
        #[serde(skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
    },
    GetBriefing {
        briefing_id: Uuid,
    },
    QueueApproval {
        requested_by: String,
        category: String,
        description: String,
        urgency: String,
        #[serde(skip_serializing_if = "Value::is_null")]
        context: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        expires_at: Option<DateTime<Utc>>,
    },
    DecideApproval {
        approval_id: Uuid,
        decision: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    PendingApprovals,
    GetApproval {
        approval_id: Uuid,
    },
    IssueDirective {
        target: String,
        name: String,
        params: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        priority: Option<String>,
    },
    IssueGated {
        target: String,
        name: String,
        params: Value,
        priority: String,
        check: ApprovalCheck,
    },
    DirectiveHistory {
        #[serde(skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },
    CheckPolicy {
        #[serde(flatten)]
        check: ApprovalCheck,
    },
    SetObjective {
        target: String,
        objective: String,
        timeframe: String,
        target_value: Value,
    },
    OverrideDecision {
        target: String,
        override_type: String,
        details: Value,
    },
    BroadcastDirective {
        name: String,
        params: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        priority: Option<String>,
    },
    Subscribe,
}

/// Messages from server to client
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Briefing { briefing: Box<Briefing> },
    Briefings { briefings: Vec<Briefing> },
    ApprovalQueued { approval_id: Uuid },
    PendingApprovals { approvals: Vec<Approval> },
    Approval { approval: Approval },
    Result { result: DirectiveResult },
    DirectiveHistory { directives: Vec<Directive> },
    PolicyEvaluation { evaluation: PolicyEvaluation },
    Subscribed,
    /// Pushed after `subscribe`; the payload is tagged by `kind`
    Event { event: Value },
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_check_policy_is_flattened() {
        let msg = ClientMessage::CheckPolicy {
            check: ApprovalCheck {
                action_type: "pricing_change".to_string(),
                confidence: 99.0,
                recipient_count: None,
                amount: None,
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "check_policy");
        assert_eq!(json["action_type"], "pricing_change");
        assert!(json.get("recipient_count").is_none());
    }

    #[test]
    fn test_parse_result_message() {
        let msg: ServerMessage = serde_json::from_value(json!({
            "type": "result",
            "result": { "directive_id": null, "status": "failed", "error": "approval x not found" }
        }))
        .unwrap();

        match msg {
            ServerMessage::Result { result } => {
                assert_eq!(result.status, "failed");
                assert!(result.data.is_none());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_directive_target_label() {
        let directive: Directive = serde_json::from_value(json!({
            "id": Uuid::nil(),
            "issued_at": "2026-01-10T00:00:00Z",
            "target": { "participant": "sales" },
            "name": "PING",
            "params": {},
            "priority": "normal",
            "requires_confirmation": true,
        }))
        .unwrap();
        assert_eq!(directive.target_label(), "sales");
    }
}
