//! Approval gateway
//!
//! Holds the active queue of pending approvals. Decisions drain the queue;
//! an approved request notifies its requester through the dispatcher.
//! Expiry is swept lazily on every read and decision, and optionally by a
//! background ticker.

use chrono::Utc;
use futures::StreamExt;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::IntervalStream;
use uuid::Uuid;

use super::approval::{Approval, ApprovalRequest, ApprovalStatus, Decision};
use super::directive::{DirectivePriority, DirectiveResult};
use super::dispatcher::DirectiveDispatcher;
use super::events::AuthorityEvent;
use super::policy::{AdmissionPolicy, ApprovalCheck};
use crate::error::{AppError, Result};
use crate::store::{NewRecord, RecordQuery, RecordStore, SortField, SortOrder};

pub const APPROVAL_GRANTED: &str = "APPROVAL_GRANTED";

const REHYDRATE_LIMIT: u32 = 1000;

/// Queue of approvals awaiting a human decision
pub struct ApprovalGateway {
    scope: String,
    authority_id: String,
    /// Pending approvals, oldest first
    queue: Mutex<Vec<Approval>>,
    store: Arc<dyn RecordStore>,
    dispatcher: Arc<DirectiveDispatcher>,
    policy: AdmissionPolicy,
    event_tx: broadcast::Sender<AuthorityEvent>,
}

impl ApprovalGateway {
    pub fn new(
        scope: impl Into<String>,
        store: Arc<dyn RecordStore>,
        dispatcher: Arc<DirectiveDispatcher>,
        policy: AdmissionPolicy,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            scope: scope.into(),
            authority_id: dispatcher.authority_id().to_string(),
            queue: Mutex::new(Vec::new()),
            store,
            dispatcher,
            policy,
            event_tx,
        }
    }

    /// Subscribe to approval events
    pub fn subscribe(&self) -> broadcast::Receiver<AuthorityEvent> {
        self.event_tx.subscribe()
    }

    pub fn policy(&self) -> &AdmissionPolicy {
        &self.policy
    }

    /// Whether an action must wait for sign-off under this gateway's policy
    pub fn should_require_approval(&self, check: &ApprovalCheck) -> bool {
        self.policy.requires_approval(check)
    }

    /// Add a request to the active queue
    pub async fn queue(&self, request: ApprovalRequest) -> Uuid {
        let approval = Approval::new(request);
        let id = approval.id;

        {
            let mut queue = self.queue.lock().await;
            queue.push(approval.clone());
        }

        tracing::info!(
            "Queued {} approval {} for {}",
            approval.category.as_str(),
            id,
            approval.requested_by
        );
        self.persist(&approval).await;

        let _ = self.event_tx.send(AuthorityEvent::ApprovalQueued {
            approval_id: id,
            requested_by: approval.requested_by.clone(),
            category: approval.category,
        });

        id
    }

    /// Approve or reject a pending approval
    pub async fn decide(
        &self,
        id: Uuid,
        decision: Decision,
        reason: Option<String>,
    ) -> DirectiveResult {
        self.sweep_expired().await;

        let approval = {
            let mut queue = self.queue.lock().await;
            let Some(index) = queue.iter().position(|a| a.id == id) else {
                return DirectiveResult::failed(None, format!("approval {} not found", id));
            };
            let mut approval = queue.remove(index);
            if let Err(e) = approval.decide(decision, reason.clone()) {
                // Only pending approvals are queued
                tracing::error!("Queued approval {} was not pending: {}", id, e);
                return DirectiveResult::failed(None, e);
            }
            approval
        };

        tracing::info!("Approval {} {}", id, approval.status.as_str());
        self.persist(&approval).await;

        let _ = self.event_tx.send(AuthorityEvent::ApprovalDecided {
            approval_id: id,
            status: approval.status,
        });

        match decision {
            Decision::Approved => self.notify_requester(approval).await,
            Decision::Rejected => self.record_rejection(approval, reason).await,
        }
    }

    /// Snapshot of the active queue after expiring stale entries
    pub async fn pending_approvals(&self) -> Vec<Approval> {
        self.sweep_expired().await;
        let queue = self.queue.lock().await;
        queue.clone()
    }

    /// Look up any approval, active or archived
    pub async fn get(&self, id: Uuid) -> Result<Option<Approval>> {
        {
            let queue = self.queue.lock().await;
            if let Some(approval) = queue.iter().find(|a| a.id == id) {
                return Ok(Some(approval.clone()));
            }
        }

        let entry = self
            .store
            .get(&self.scope, "approval", &id.to_string())
            .await?;
        entry
            .map(|e| {
                serde_json::from_value(e.value)
                    .map_err(|e| AppError::Internal(format!("Invalid approval record: {}", e)))
            })
            .transpose()
    }

    /// Expire every queued approval whose expiry has passed
    pub async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut expired = Vec::new();

        {
            let mut queue = self.queue.lock().await;
            queue.retain_mut(|approval| {
                if !approval.is_expired_at(now) {
                    return true;
                }
                if approval.expire().is_ok() {
                    expired.push(approval.clone());
                }
                false
            });
        }

        for approval in &expired {
            tracing::info!("Approval {} expired", approval.id);
            self.persist(approval).await;
            let _ = self.event_tx.send(AuthorityEvent::ApprovalExpired {
                approval_id: approval.id,
            });
        }

        expired.len()
    }

    /// Run the expiry sweep on a fixed interval
    pub fn spawn_expiry_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let gateway = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticks = IntervalStream::new(tokio::time::interval(every));
            while ticks.next().await.is_some() {
                let expired = gateway.sweep_expired().await;
                if expired > 0 {
                    tracing::debug!("Expiry sweep removed {} approvals", expired);
                }
            }
        })
    }

    /// Reload pending approvals from the record store
    pub async fn rehydrate(&self) -> Result<usize> {
        let query = RecordQuery::category("approval")
            .status(ApprovalStatus::Pending.as_str())
            .sort(SortField::CreatedAt, SortOrder::Asc)
            .limit(REHYDRATE_LIMIT);
        let entries = self.store.query(&self.scope, &query).await?;

        let mut queue = self.queue.lock().await;
        let mut known: HashSet<Uuid> = queue.iter().map(|a| a.id).collect();
        let mut restored = 0;

        for entry in entries {
            let approval: Approval = match serde_json::from_value(entry.value) {
                Ok(approval) => approval,
                Err(e) => {
                    tracing::warn!("Skipping unreadable approval record {}: {}", entry.key, e);
                    continue;
                }
            };
            if approval.status == ApprovalStatus::Pending && known.insert(approval.id) {
                queue.push(approval);
                restored += 1;
            }
        }

        tracing::info!("Rehydrated {} pending approvals", restored);
        Ok(restored)
    }

    async fn notify_requester(&self, approval: Approval) -> DirectiveResult {
        let params = json!({
            "approval_id": approval.id,
            "category": approval.category,
            "context": approval.context,
            "reason": approval.decision_reason,
        });
        let notification = self
            .dispatcher
            .issue(
                &approval.requested_by,
                APPROVAL_GRANTED,
                params,
                DirectivePriority::from(approval.urgency),
            )
            .await;

        DirectiveResult::executed(
            notification.directive_id,
            Some(json!({ "approval": approval, "notification": notification })),
        )
    }

    async fn record_rejection(&self, approval: Approval, reason: Option<String>) -> DirectiveResult {
        let record = NewRecord::new(
            &self.scope,
            "approval_decision",
            approval.id.to_string(),
            json!({
                "approval_id": approval.id,
                "decision": Decision::Rejected,
                "reason": reason,
                "requested_by": approval.requested_by,
                "decided_at": approval.decided_at,
            }),
            &self.authority_id,
        )
        .with_tags(["rejected", approval.category.as_str()])
        .with_priority(approval.urgency.into())
        .with_status(ApprovalStatus::Rejected.as_str());

        if let Err(e) = self.store.write(record).await {
            tracing::warn!("Failed to record rejection of {}: {}", approval.id, e);
        }

        DirectiveResult::executed(
            None,
            Some(json!({
                "approval_id": approval.id,
                "status": approval.status,
                "reason": reason,
            })),
        )
    }

    async fn persist(&self, approval: &Approval) {
        let value = match serde_json::to_value(approval) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to serialize approval {}: {}", approval.id, e);
                return;
            }
        };

        let record = NewRecord::new(
            &self.scope,
            "approval",
            approval.id.to_string(),
            value,
            &approval.requested_by,
        )
        .with_tags([approval.category.as_str(), approval.urgency.as_str()])
        .with_priority(approval.urgency.into())
        .with_status(approval.status.as_str());

        if let Err(e) = self.store.write(record).await {
            tracing::warn!("Failed to persist approval {}: {}", approval.id, e);
        }
    }
}
