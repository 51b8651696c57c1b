//! Events emitted by the authority components

use serde::Serialize;
use uuid::Uuid;

use super::approval::{ApprovalCategory, ApprovalStatus};
use super::directive::DirectiveStatus;

/// Forwarded to subscribed WebSocket sessions
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthorityEvent {
    /// An approval entered the active queue
    ApprovalQueued {
        approval_id: Uuid,
        requested_by: String,
        category: ApprovalCategory,
    },
    /// An approval was approved or rejected
    ApprovalDecided {
        approval_id: Uuid,
        status: ApprovalStatus,
    },
    /// An approval passed its expiry undecided
    ApprovalExpired { approval_id: Uuid },
    /// A directive was appended to the history
    DirectiveIssued {
        directive_id: Uuid,
        target: String,
        name: String,
    },
    /// The router answered (or failed) for a directive
    DirectiveCompleted {
        directive_id: Uuid,
        status: DirectiveStatus,
    },
    BriefingGenerated { briefing_id: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serialization() {
        let event = AuthorityEvent::ApprovalDecided {
            approval_id: Uuid::nil(),
            status: ApprovalStatus::Rejected,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "kind": "approval_decided",
                "approval_id": Uuid::nil(),
                "status": "rejected",
            })
        );
    }
}
