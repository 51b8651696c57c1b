//! WebSocket server handler
//!
//! Administrative surface of the command center. Every client message gets
//! exactly one reply; failures come back as `error` messages. After a
//! `subscribe`, authority events are pushed between replies.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::stream::{BoxStream, SplitSink};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::authority::{
    Approval, ApprovalCheck, ApprovalRequest, AuthorityEvent, Briefing, Decision, Directive,
    DirectivePriority, DirectiveResult, GatedDirective, PolicyEvaluation,
};
use crate::error::AppError;
use crate::AppState;

const DEFAULT_HISTORY_LIMIT: usize = 50;
const DEFAULT_BRIEFING_LIMIT: u32 = 10;

/// WebSocket handler
pub async fn handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut events: Option<BoxStream<'static, AuthorityEvent>> = None;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                let msg = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                };

                // Parse client message
                let reply = match serde_json::from_str::<ClientMessage>(&msg) {
                    Ok(ClientMessage::Subscribe) => {
                        if events.is_none() {
                            events = Some(state.center.events());
                            tracing::debug!("WebSocket session subscribed to events");
                        }
                        ServerMessage::Subscribed
                    }
                    Ok(client_msg) => handle_message(&state, client_msg).await,
                    Err(e) => ServerMessage::Error {
                        message: AppError::BadRequest(format!("Invalid message: {}", e))
                            .to_string(),
                    },
                };

                if let Err(e) = send(&mut sender, &reply).await {
                    tracing::error!("Failed to send reply: {}", e);
                    break;
                }
            }
            Some(event) = next_event(&mut events) => {
                if let Err(e) = send(&mut sender, &ServerMessage::Event { event }).await {
                    tracing::error!("Failed to send event: {}", e);
                    break;
                }
            }
        }
    }
}

/// Next event for a subscribed session; never resolves otherwise
async fn next_event(
    events: &mut Option<BoxStream<'static, AuthorityEvent>>,
) -> Option<AuthorityEvent> {
    match events {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn handle_message(state: &AppState, msg: ClientMessage) -> ServerMessage {
    let center = &state.center;

    match msg {
        ClientMessage::GenerateBriefing => ServerMessage::Briefing {
            briefing: Box::new(center.generate_briefing().await),
        },
        ClientMessage::RecentBriefings { limit } => {
            match center
                .recent_briefings(limit.unwrap_or(DEFAULT_BRIEFING_LIMIT))
                .await
            {
                Ok(briefings) => ServerMessage::Briefings { briefings },
                Err(e) => ServerMessage::Error {
                    message: e.to_string(),
                },
            }
        }
        ClientMessage::GetBriefing { briefing_id } => {
            match center.get_briefing(briefing_id).await {
                Ok(briefing) => ServerMessage::Briefing {
                    briefing: Box::new(briefing),
                },
                Err(e) => ServerMessage::Error {
                    message: e.to_string(),
                },
            }
        }
        ClientMessage::QueueApproval { request } => ServerMessage::ApprovalQueued {
            approval_id: center.queue_approval(request).await,
        },
        ClientMessage::DecideApproval {
            approval_id,
            decision,
            reason,
        } => ServerMessage::Result {
            result: center.decide_approval(approval_id, decision, reason).await,
        },
        ClientMessage::PendingApprovals => ServerMessage::PendingApprovals {
            approvals: center.pending_approvals().await,
        },
        ClientMessage::GetApproval { approval_id } => {
            match center.get_approval(approval_id).await {
                Ok(approval) => ServerMessage::Approval { approval },
                Err(e) => ServerMessage::Error {
                    message: e.to_string(),
                },
            }
        }
        ClientMessage::IssueDirective {
            target,
            name,
            params,
            priority,
        } => ServerMessage::Result {
            result: center
                .issue_directive(&target, &name, params, priority)
                .await,
        },
        ClientMessage::BroadcastDirective {
            name,
            params,
            priority,
        } => ServerMessage::Result {
            result: center.broadcast_directive(&name, params, priority).await,
        },
        // Sessions own their event stream; handled in `handle_socket`
        ClientMessage::Subscribe => ServerMessage::Subscribed,
        ClientMessage::IssueGated { directive } => ServerMessage::Result {
            result: center.issue_gated(directive).await,
        },
        ClientMessage::DirectiveHistory { limit } => ServerMessage::DirectiveHistory {
            directives: center
                .directive_history(limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
                .await,
        },
        ClientMessage::CheckPolicy { check } => ServerMessage::PolicyEvaluation {
            evaluation: center.check_policy(&check),
        },
        ClientMessage::SetObjective {
            target,
            objective,
            timeframe,
            target_value,
        } => ServerMessage::Result {
            result: center
                .set_objective(&target, &objective, &timeframe, target_value)
                .await,
        },
        ClientMessage::OverrideDecision {
            target,
            override_type,
            details,
        } => ServerMessage::Result {
            result: center
                .override_decision(&target, &override_type, details)
                .await,
        },
    }
}

async fn send(
    sender: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> crate::error::Result<()> {
    let text = serde_json::to_string(msg)?;
    sender
        .send(Message::Text(text))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// Messages from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Build a new briefing
    GenerateBriefing,
    /// Archived briefings, newest first
    RecentBriefings { limit: Option<u32> },
    GetBriefing { briefing_id: Uuid },
    /// Queue a request for sign-off
    QueueApproval {
        #[serde(flatten)]
        request: ApprovalRequest,
    },
    DecideApproval {
        approval_id: Uuid,
        decision: Decision,
        reason: Option<String>,
    },
    PendingApprovals,
    /// Pending or archived approval by id
    GetApproval { approval_id: Uuid },
    IssueDirective {
        target: String,
        name: String,
        #[serde(default)]
        params: Value,
        priority: Option<DirectivePriority>,
    },
    /// Issue unless the policy demands approval first
    IssueGated {
        #[serde(flatten)]
        directive: GatedDirective,
    },
    DirectiveHistory { limit: Option<usize> },
    CheckPolicy {
        #[serde(flatten)]
        check: ApprovalCheck,
    },
    SetObjective {
        target: String,
        objective: String,
        timeframe: String,
        #[serde(default)]
        target_value: Value,
    },
    OverrideDecision {
        target: String,
        override_type: String,
        #[serde(default)]
        details: Value,
    },
    /// Same directive to every worker
    BroadcastDirective {
        name: String,
        #[serde(default)]
        params: Value,
        priority: Option<DirectivePriority>,
    },
    /// Start receiving authority events on this session
    Subscribe,
}

/// Messages from server to client
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Briefing { briefing: Box<Briefing> },
    Briefings { briefings: Vec<Briefing> },
    ApprovalQueued { approval_id: Uuid },
    PendingApprovals { approvals: Vec<Approval> },
    Approval { approval: Approval },
    /// Outcome of a directive or decision
    Result { result: DirectiveResult },
    DirectiveHistory { directives: Vec<Directive> },
    PolicyEvaluation { evaluation: PolicyEvaluation },
    Subscribed,
    /// Pushed to subscribed sessions
    Event { event: AuthorityEvent },
    /// Error occurred
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_queue_approval() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "queue_approval",
            "requested_by": "sales",
            "category": "pricing_change",
            "description": "Discount bundle",
            "urgency": "high",
        }))
        .unwrap();

        match msg {
            ClientMessage::QueueApproval { request } => {
                assert_eq!(request.requested_by, "sales");
                assert_eq!(request.urgency, crate::authority::Urgency::High);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_parse_issue_directive_defaults() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "issue_directive",
            "target": "sales",
            "name": "PING",
        }))
        .unwrap();

        match msg {
            ClientMessage::IssueDirective {
                params, priority, ..
            } => {
                assert_eq!(params, Value::Null);
                assert!(priority.is_none());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_parse_unknown_type_fails() {
        let result = serde_json::from_value::<ClientMessage>(json!({ "type": "self_destruct" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_server_message_tagging() {
        let msg = ServerMessage::ApprovalQueued {
            approval_id: Uuid::nil(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "approval_queued");
        assert_eq!(json["approval_id"], Uuid::nil().to_string());
    }
}
