//! Directive dispatcher
//!
//! Issues directives to worker units through the message router, keeps an
//! in-memory history in issuance order, and records every directive in the
//! record store for audit. Router failures are reported as `failed` results,
//! never raised.

use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use super::directive::{Directive, DirectivePriority, DirectiveResult};
use super::events::AuthorityEvent;
use crate::router::{MessageRouter, Recipient, Report, ReportStatus, RouterError};
use crate::store::{NewRecord, RecordPriority, RecordStore};

pub const OVERRIDE_DECISION: &str = "OVERRIDE_DECISION";
pub const SET_OBJECTIVE: &str = "SET_OBJECTIVE";

/// Issues directives and keeps their history
pub struct DirectiveDispatcher {
    scope: String,
    authority_id: String,
    router: Arc<dyn MessageRouter>,
    store: Arc<dyn RecordStore>,
    /// Issued directives, oldest first
    history: Mutex<Vec<Directive>>,
    event_tx: broadcast::Sender<AuthorityEvent>,
}

impl DirectiveDispatcher {
    pub fn new(
        scope: impl Into<String>,
        authority_id: impl Into<String>,
        router: Arc<dyn MessageRouter>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            scope: scope.into(),
            authority_id: authority_id.into(),
            router,
            store,
            history: Mutex::new(Vec::new()),
            event_tx,
        }
    }

    /// Subscribe to directive events
    pub fn subscribe(&self) -> broadcast::Receiver<AuthorityEvent> {
        self.event_tx.subscribe()
    }

    pub fn authority_id(&self) -> &str {
        &self.authority_id
    }

    /// Issue a directive to one worker unit
    pub async fn issue(
        &self,
        target: &str,
        name: &str,
        params: Value,
        priority: DirectivePriority,
    ) -> DirectiveResult {
        let recipient = Recipient::Participant(target.to_string());
        self.dispatch(recipient, name, params, priority, classify_single)
            .await
    }

    /// Issue one directive to every participant the router knows
    pub async fn broadcast(
        &self,
        name: &str,
        params: Value,
        priority: DirectivePriority,
    ) -> DirectiveResult {
        self.dispatch(Recipient::Broadcast, name, params, priority, classify_broadcast)
            .await
    }

    /// Record a strategic override, then tell the worker
    pub async fn override_decision(
        &self,
        target: &str,
        override_type: &str,
        details: Value,
    ) -> DirectiveResult {
        let record = NewRecord::new(
            &self.scope,
            "strategy",
            Uuid::new_v4().to_string(),
            json!({
                "target": target,
                "override_type": override_type,
                "details": details,
            }),
            &self.authority_id,
        )
        .with_tags(["override", target])
        .with_priority(RecordPriority::High);
        self.persist(record, "override").await;

        self.issue(
            target,
            OVERRIDE_DECISION,
            json!({ "override_type": override_type, "details": details }),
            DirectivePriority::High,
        )
        .await
    }

    /// Record a new objective, then tell the worker
    pub async fn set_objective(
        &self,
        target: &str,
        objective: &str,
        timeframe: &str,
        target_value: Value,
    ) -> DirectiveResult {
        let record = NewRecord::new(
            &self.scope,
            "strategy",
            Uuid::new_v4().to_string(),
            json!({
                "target": target,
                "objective": objective,
                "timeframe": timeframe,
                "target_value": target_value,
            }),
            &self.authority_id,
        )
        .with_tags(["objective", target]);
        self.persist(record, "objective").await;

        self.issue(
            target,
            SET_OBJECTIVE,
            json!({
                "objective": objective,
                "timeframe": timeframe,
                "target_value": target_value,
            }),
            DirectivePriority::Normal,
        )
        .await
    }

    /// The most recent `limit` directives, oldest first
    pub async fn history(&self, limit: usize) -> Vec<Directive> {
        let history = self.history.lock().await;
        let start = history.len().saturating_sub(limit);
        history[start..].to_vec()
    }

    async fn dispatch(
        &self,
        target: Recipient,
        name: &str,
        params: Value,
        priority: DirectivePriority,
        classify: fn(Uuid, Vec<Report>) -> DirectiveResult,
    ) -> DirectiveResult {
        // Created under the lock so history order matches issued_at order
        let directive = {
            let mut history = self.history.lock().await;
            let directive = Directive::new(target, name, params, priority);
            history.push(directive.clone());
            directive
        };

        tracing::info!(
            "Issuing {} to {} ({})",
            directive.name,
            directive.target.as_str(),
            directive.id
        );
        let _ = self.event_tx.send(AuthorityEvent::DirectiveIssued {
            directive_id: directive.id,
            target: directive.target.as_str().to_string(),
            name: directive.name.clone(),
        });

        let message = directive.to_message(&self.authority_id);
        let result = match self.router.send(message).await {
            Ok(reports) => classify(directive.id, reports),
            Err(e) => {
                log_router_error(&directive, &e);
                DirectiveResult::failed(Some(directive.id), e.to_string())
            }
        };

        let record = NewRecord::new(
            &self.scope,
            "directive",
            directive.id.to_string(),
            json!({ "directive": directive, "result": result }),
            &self.authority_id,
        )
        .with_tags([directive.name.as_str(), directive.target.as_str()])
        .with_priority(RecordPriority::from(directive.priority))
        .with_status(result.status.as_str());
        self.persist(record, "directive").await;

        let _ = self.event_tx.send(AuthorityEvent::DirectiveCompleted {
            directive_id: directive.id,
            status: result.status,
        });

        result
    }

    async fn persist(&self, record: NewRecord, what: &str) {
        let key = record.key.clone();
        if let Err(e) = self.store.write(record).await {
            tracing::warn!("Failed to persist {} record {}: {}", what, key, e);
        }
    }
}

fn log_router_error(directive: &Directive, error: &RouterError) {
    match error {
        RouterError::UnknownParticipant(_) | RouterError::Rejected { .. } => {
            tracing::warn!("Directive {} not delivered: {}", directive.id, error)
        }
        RouterError::Timeout | RouterError::Transport(_) => {
            tracing::error!("Directive {} transport fault: {}", directive.id, error)
        }
    }
}

fn classify_single(directive_id: Uuid, reports: Vec<Report>) -> DirectiveResult {
    match reports.into_iter().next() {
        Some(report) if report.status == ReportStatus::Completed => {
            DirectiveResult::executed(Some(directive_id), report.data)
        }
        Some(report) => DirectiveResult::queued(Some(directive_id), report.data),
        None => DirectiveResult::queued(Some(directive_id), None),
    }
}

fn classify_broadcast(directive_id: Uuid, reports: Vec<Report>) -> DirectiveResult {
    let completed: Vec<Value> = reports
        .into_iter()
        .filter(|r| r.status == ReportStatus::Completed)
        .map(|r| r.data.unwrap_or(Value::Null))
        .collect();

    if completed.is_empty() {
        DirectiveResult::queued(Some(directive_id), None)
    } else {
        DirectiveResult::executed(Some(directive_id), Some(Value::Array(completed)))
    }
}
