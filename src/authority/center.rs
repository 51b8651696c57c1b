//! Command center - the administrative surface over the authority layer
//!
//! Wires the dispatcher, gateway and aggregator together over one record
//! store and one router, and exposes the operations the WebSocket surface
//! calls.

use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use super::approval::{Approval, ApprovalCategory, ApprovalRequest, Decision, Urgency};
use super::briefing::{Briefing, BriefingAggregator, BriefingSettings};
use super::directive::{Directive, DirectivePriority, DirectiveResult};
use super::dispatcher::DirectiveDispatcher;
use super::events::AuthorityEvent;
use super::gateway::ApprovalGateway;
use super::policy::{AdmissionPolicy, ApprovalCheck, PolicyRule};
use crate::error::{AppError, Result};
use crate::router::MessageRouter;
use crate::store::RecordStore;

/// Construction parameters for a [`CommandCenter`]
#[derive(Debug, Clone)]
pub struct CenterSettings {
    /// Tenant scope for every record the center writes
    pub scope: String,
    /// Sender identity on routed messages
    pub authority_id: String,
    pub policy: AdmissionPolicy,
    pub briefing: BriefingSettings,
}

impl Default for CenterSettings {
    fn default() -> Self {
        Self {
            scope: "default".to_string(),
            authority_id: "overwatch".to_string(),
            policy: AdmissionPolicy::default(),
            briefing: BriefingSettings::default(),
        }
    }
}

/// Outcome of a policy check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyEvaluation {
    pub requires_approval: bool,
    pub rules: Vec<PolicyRule>,
}

/// A directive that must pass the admission policy first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatedDirective {
    pub target: String,
    pub name: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub priority: DirectivePriority,
    pub check: ApprovalCheck,
}

pub struct CommandCenter {
    dispatcher: Arc<DirectiveDispatcher>,
    gateway: Arc<ApprovalGateway>,
    aggregator: BriefingAggregator,
}

impl CommandCenter {
    pub fn new(
        store: Arc<dyn RecordStore>,
        router: Arc<dyn MessageRouter>,
        settings: CenterSettings,
    ) -> Self {
        let dispatcher = Arc::new(DirectiveDispatcher::new(
            settings.scope.clone(),
            settings.authority_id.clone(),
            router,
            store.clone(),
        ));
        let gateway = Arc::new(ApprovalGateway::new(
            settings.scope.clone(),
            store.clone(),
            dispatcher.clone(),
            settings.policy,
        ));
        let aggregator = BriefingAggregator::new(
            settings.scope,
            settings.authority_id,
            store,
            gateway.clone(),
            settings.briefing,
        );

        Self {
            dispatcher,
            gateway,
            aggregator,
        }
    }

    pub fn dispatcher(&self) -> &Arc<DirectiveDispatcher> {
        &self.dispatcher
    }

    pub fn gateway(&self) -> &Arc<ApprovalGateway> {
        &self.gateway
    }

    pub fn aggregator(&self) -> &BriefingAggregator {
        &self.aggregator
    }

    /// Events from all three services, merged. Lagged receivers skip ahead.
    pub fn events(&self) -> BoxStream<'static, AuthorityEvent> {
        let receivers = [
            self.dispatcher.subscribe(),
            self.gateway.subscribe(),
            self.aggregator.subscribe(),
        ];
        let streams = receivers.into_iter().map(|rx| {
            BroadcastStream::new(rx)
                .filter_map(|item| async move {
                    match item {
                        Ok(event) => Some(event),
                        Err(e) => {
                            tracing::warn!("Event subscriber fell behind: {}", e);
                            None
                        }
                    }
                })
                .boxed()
        });
        stream::select_all(streams).boxed()
    }

    pub async fn generate_briefing(&self) -> Briefing {
        self.aggregator.generate_briefing().await
    }

    pub async fn recent_briefings(&self, limit: u32) -> Result<Vec<Briefing>> {
        self.aggregator.recent_briefings(limit).await
    }

    pub async fn get_briefing(&self, id: Uuid) -> Result<Briefing> {
        self.aggregator
            .get_briefing(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("briefing {}", id)))
    }

    /// Look up an approval, pending or archived
    pub async fn get_approval(&self, id: Uuid) -> Result<Approval> {
        self.gateway
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("approval {}", id)))
    }

    pub async fn queue_approval(&self, request: ApprovalRequest) -> Uuid {
        self.gateway.queue(request).await
    }

    pub async fn decide_approval(
        &self,
        id: Uuid,
        decision: Decision,
        reason: Option<String>,
    ) -> DirectiveResult {
        self.gateway.decide(id, decision, reason).await
    }

    pub async fn pending_approvals(&self) -> Vec<Approval> {
        self.gateway.pending_approvals().await
    }

    pub async fn issue_directive(
        &self,
        target: &str,
        name: &str,
        params: Value,
        priority: Option<DirectivePriority>,
    ) -> DirectiveResult {
        self.dispatcher
            .issue(target, name, params, priority.unwrap_or_default())
            .await
    }

    /// Issue one directive to every worker the router knows
    pub async fn broadcast_directive(
        &self,
        name: &str,
        params: Value,
        priority: Option<DirectivePriority>,
    ) -> DirectiveResult {
        self.dispatcher
            .broadcast(name, params, priority.unwrap_or_default())
            .await
    }

    pub async fn directive_history(&self, limit: usize) -> Vec<Directive> {
        self.dispatcher.history(limit).await
    }

    pub fn check_policy(&self, check: &ApprovalCheck) -> PolicyEvaluation {
        let rules = self.gateway.policy().evaluate(check);
        PolicyEvaluation {
            requires_approval: !rules.is_empty(),
            rules,
        }
    }

    /// Issue a directive, or queue it for approval when the policy says so
    pub async fn issue_gated(&self, gated: GatedDirective) -> DirectiveResult {
        if !self.gateway.should_require_approval(&gated.check) {
            return self
                .dispatcher
                .issue(&gated.target, &gated.name, gated.params, gated.priority)
                .await;
        }

        let policy = self.gateway.policy();
        let category = policy
            .suggested_category(&gated.check)
            .unwrap_or(ApprovalCategory::Escalation);
        let request = ApprovalRequest::new(
            gated.target.clone(),
            category,
            format!("{} for {}", gated.name, gated.target),
        )
        .with_urgency(urgency_for(gated.priority))
        .with_context(json!({
            "directive": {
                "target": gated.target,
                "name": gated.name,
                "params": gated.params,
                "priority": gated.priority,
            },
            "rules": policy.evaluate(&gated.check),
            "check": gated.check,
        }));

        let approval_id = self.gateway.queue(request).await;
        DirectiveResult::requires_approval(approval_id)
    }

    pub async fn set_objective(
        &self,
        target: &str,
        objective: &str,
        timeframe: &str,
        target_value: Value,
    ) -> DirectiveResult {
        self.dispatcher
            .set_objective(target, objective, timeframe, target_value)
            .await
    }

    pub async fn override_decision(
        &self,
        target: &str,
        override_type: &str,
        details: Value,
    ) -> DirectiveResult {
        self.dispatcher
            .override_decision(target, override_type, details)
            .await
    }

    /// Reload pending approvals persisted by an earlier process
    pub async fn rehydrate(&self) -> Result<usize> {
        self.gateway.rehydrate().await
    }

    pub fn spawn_expiry_sweeper(&self, every: Duration) -> JoinHandle<()> {
        self.gateway.spawn_expiry_sweeper(every)
    }
}

fn urgency_for(priority: DirectivePriority) -> Urgency {
    match priority {
        DirectivePriority::Normal => Urgency::Normal,
        DirectivePriority::High => Urgency::High,
        DirectivePriority::Critical => Urgency::Critical,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::{ApprovalStatus, DirectiveStatus};
    use crate::router::{LocalRouter, Report, RoutedMessage, RouterError};
    use crate::store::tests::setup_test_store;

    async fn setup() -> CommandCenter {
        let store = Arc::new(setup_test_store().await);
        let router = Arc::new(LocalRouter::new(Duration::from_millis(200)));
        router
            .register("outreach", |_msg: RoutedMessage| async move {
                Ok::<_, RouterError>(Report::completed(json!({ "sent": true })))
            })
            .await;

        let settings = CenterSettings {
            scope: "acme".to_string(),
            briefing: BriefingSettings {
                workers: Vec::new(),
                ..BriefingSettings::default()
            },
            ..CenterSettings::default()
        };
        CommandCenter::new(store, router, settings)
    }

    fn campaign(recipients: u64) -> GatedDirective {
        GatedDirective {
            target: "outreach".to_string(),
            name: "SEND_CAMPAIGN".to_string(),
            params: json!({ "campaign": "spring" }),
            priority: DirectivePriority::High,
            check: ApprovalCheck::new("email_campaign", 90.0).with_recipients(recipients),
        }
    }

    #[tokio::test]
    async fn test_issue_gated_passes_through() {
        let center = setup().await;
        let result = center.issue_gated(campaign(50)).await;

        assert_eq!(result.status, DirectiveStatus::Executed);
        assert!(center.pending_approvals().await.is_empty());
        assert_eq!(center.directive_history(10).await.len(), 1);
    }

    #[tokio::test]
    async fn test_issue_gated_queues_then_approval_notifies() {
        let center = setup().await;
        let result = center.issue_gated(campaign(150)).await;

        assert_eq!(result.status, DirectiveStatus::RequiresApproval);
        assert!(center.directive_history(10).await.is_empty());

        let pending = center.pending_approvals().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].category, ApprovalCategory::LargeCampaign);
        assert_eq!(pending[0].urgency, Urgency::High);
        assert_eq!(pending[0].requested_by, "outreach");
        assert_eq!(pending[0].context["directive"]["name"], "SEND_CAMPAIGN");
        assert_eq!(pending[0].context["rules"], json!(["large_audience"]));

        let decided = center
            .decide_approval(pending[0].id, Decision::Approved, None)
            .await;
        assert_eq!(decided.status, DirectiveStatus::Executed);
        assert_eq!(decided.data.unwrap()["approval"]["status"], "approved");

        let history = center.directive_history(10).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].name, "APPROVAL_GRANTED");
    }

    #[tokio::test]
    async fn test_broadcast_directive_reaches_registered_workers() {
        let center = setup().await;
        let result = center
            .broadcast_directive("STATUS_CHECK", json!({}), None)
            .await;

        assert_eq!(result.status, DirectiveStatus::Executed);
        assert_eq!(result.data, Some(json!([{ "sent": true }])));
        let history = center.directive_history(1).await;
        assert_eq!(history[0].target, crate::router::Recipient::Broadcast);
    }

    #[tokio::test]
    async fn test_issue_gated_category_from_first_rule() {
        let center = setup().await;
        let gated = GatedDirective {
            target: "outreach".to_string(),
            name: "REPRICE".to_string(),
            params: json!({}),
            priority: DirectivePriority::Normal,
            check: ApprovalCheck::new("pricing_change", 60.0),
        };

        let result = center.issue_gated(gated).await;
        assert_eq!(result.status, DirectiveStatus::RequiresApproval);

        let pending = center.pending_approvals().await;
        assert_eq!(pending[0].category, ApprovalCategory::PricingChange);
        assert_eq!(
            pending[0].context["rules"],
            json!(["pricing_change", "low_confidence"])
        );
    }

    #[tokio::test]
    async fn test_events_merge_all_services() {
        let center = setup().await;
        let mut events = center.events();

        let id = center
            .queue_approval(ApprovalRequest::new(
                "outreach",
                ApprovalCategory::Escalation,
                "Complaint",
            ))
            .await;
        center.decide_approval(id, Decision::Approved, None).await;
        center.generate_briefing().await;

        let mut seen = Vec::new();
        while seen.len() < 5 {
            let event = tokio::time::timeout(Duration::from_secs(1), events.next())
                .await
                .unwrap()
                .unwrap();
            seen.push(event);
        }

        assert!(seen
            .iter()
            .any(|e| matches!(e, AuthorityEvent::ApprovalQueued { approval_id, .. } if *approval_id == id)));
        assert!(seen.iter().any(|e| matches!(
            e,
            AuthorityEvent::ApprovalDecided { status: ApprovalStatus::Approved, .. }
        )));
        assert!(seen
            .iter()
            .any(|e| matches!(e, AuthorityEvent::DirectiveIssued { name, .. } if name == "APPROVAL_GRANTED")));
        assert!(seen
            .iter()
            .any(|e| matches!(e, AuthorityEvent::DirectiveCompleted { .. })));
        assert!(seen
            .iter()
            .any(|e| matches!(e, AuthorityEvent::BriefingGenerated { .. })));
    }

    #[tokio::test]
    async fn test_check_policy_lists_rules() {
        let center = setup().await;
        let evaluation = center.check_policy(&ApprovalCheck::new("pricing_change", 60.0));
        assert!(evaluation.requires_approval);
        assert_eq!(
            evaluation.rules,
            vec![PolicyRule::PricingChange, PolicyRule::LowConfidence]
        );
    }

    #[tokio::test]
    async fn test_issue_directive_defaults_priority() {
        let center = setup().await;
        center
            .issue_directive("outreach", "PING", json!({}), None)
            .await;
        let history = center.directive_history(1).await;
        assert_eq!(history[0].priority, DirectivePriority::Normal);
    }

    #[tokio::test]
    async fn test_briefing_roundtrip_through_center() {
        let center = setup().await;
        center
            .queue_approval(ApprovalRequest::new(
                "outreach",
                ApprovalCategory::Escalation,
                "Unsubscribe complaint",
            ))
            .await;

        let briefing = center.generate_briefing().await;
        assert_eq!(briefing.pending_approvals.len(), 1);
        assert_eq!(
            briefing.pending_approvals[0].status,
            ApprovalStatus::Pending
        );

        let recent = center.recent_briefings(5).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, briefing.id);

        let fetched = center.get_briefing(briefing.id).await.unwrap();
        assert_eq!(fetched.summary, briefing.summary);
    }

    #[tokio::test]
    async fn test_lookups_report_not_found() {
        let center = setup().await;
        let missing = Uuid::new_v4();

        let err = center.get_briefing(missing).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = center.get_approval(missing).await.unwrap_err();
        assert_eq!(err.to_string(), format!("Not found: approval {}", missing));
    }

    #[tokio::test]
    async fn test_get_approval_after_decision() {
        let center = setup().await;
        let id = center
            .queue_approval(ApprovalRequest::new(
                "outreach",
                ApprovalCategory::LargeCampaign,
                "Spring blast",
            ))
            .await;
        center
            .decide_approval(id, Decision::Rejected, Some("too broad".to_string()))
            .await;

        let approval = center.get_approval(id).await.unwrap();
        assert_eq!(approval.status, ApprovalStatus::Rejected);
        assert_eq!(approval.decision_reason.as_deref(), Some("too broad"));
    }
}
