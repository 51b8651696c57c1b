//! Authority layer integration tests
//!
//! End-to-end flows across the dispatcher, gateway and aggregator over a
//! shared SQLite record store.

use chrono::{Duration as ChronoDuration, Utc};
use overwatch::authority::{
    ApprovalCategory, ApprovalRequest, ApprovalStatus, CommandCenter, Decision,
    DirectivePriority, DirectiveStatus, Urgency,
};
use overwatch::router::{LocalRouter, Report, RoutedMessage, RouterError};
use overwatch::store::{NewRecord, RecordQuery, RecordStore};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_test::assert_ok;

mod common;

use common::SCOPE;

#[tokio::test]
async fn test_approval_grant_reaches_requester() {
    let store = common::setup_store().await;
    let (tx, mut inbox) = mpsc::unbounded_channel();
    let router = Arc::new(LocalRouter::new(Duration::from_millis(500)));
    router
        .register("reputation", move |msg: RoutedMessage| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(msg);
                Ok::<_, RouterError>(Report::completed(json!({ "posted": true })))
            }
        })
        .await;
    let center = CommandCenter::new(store.clone(), router, common::center_settings(&[]));

    let id = center
        .queue_approval(
            ApprovalRequest::new(
                "reputation",
                ApprovalCategory::NegativeReviewResponse,
                "Reply to a 1-star review",
            )
            .with_urgency(Urgency::High)
            .with_context(json!({ "draft": "We're sorry to hear that" })),
        )
        .await;

    let result = center
        .decide_approval(id, Decision::Approved, Some("tone is fine".to_string()))
        .await;
    assert_eq!(result.status, DirectiveStatus::Executed);

    let message = inbox.recv().await.unwrap();
    assert_eq!(message.from, "overwatch");
    assert_eq!(message.priority, DirectivePriority::High);
    assert_eq!(message.payload["name"], "APPROVAL_GRANTED");
    assert_eq!(
        message.payload["params"]["context"]["draft"],
        "We're sorry to hear that"
    );

    let entry = assert_ok!(store.get(SCOPE, "approval", &id.to_string()).await).unwrap();
    assert_eq!(entry.metadata.status.as_deref(), Some("approved"));

    let audit = assert_ok!(
        store
            .query(SCOPE, &RecordQuery::category("directive").tag("APPROVAL_GRANTED"))
            .await
    );
    assert_eq!(audit.len(), 1);
}

#[tokio::test]
async fn test_critical_rejection_scenario() {
    let (center, store) = common::setup_center(&[]).await;

    let id = center
        .queue_approval(
            ApprovalRequest::new("sales", ApprovalCategory::PricingChange, "Cut prices 30%")
                .with_urgency(Urgency::Critical),
        )
        .await;
    assert_eq!(center.pending_approvals().await.len(), 1);

    let result = center
        .decide_approval(id, Decision::Rejected, Some("too aggressive".to_string()))
        .await;
    assert_eq!(result.status, DirectiveStatus::Executed);
    assert!(center.pending_approvals().await.is_empty());

    let decisions = assert_ok!(
        store
            .query(SCOPE, &RecordQuery::category("approval_decision").tag("rejected"))
            .await
    );
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].value["reason"], "too aggressive");

    let archived = assert_ok!(center.gateway().get(id).await).unwrap();
    assert_eq!(archived.status, ApprovalStatus::Rejected);

    let again = center.decide_approval(id, Decision::Approved, None).await;
    assert_eq!(again.status, DirectiveStatus::Failed);
}

#[tokio::test]
async fn test_unknown_target_fails_with_history() {
    let (center, _store) = common::setup_center(&[]).await;

    let result = center
        .issue_directive("ghost", "PING", json!({}), None)
        .await;
    assert_eq!(result.status, DirectiveStatus::Failed);
    assert!(!result.error.unwrap_or_default().is_empty());

    let history = center.directive_history(10).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].name, "PING");
}

#[tokio::test]
async fn test_expired_approval_is_gone() {
    let (center, store) = common::setup_center(&[]).await;

    let id = center
        .queue_approval(
            ApprovalRequest::new("content", ApprovalCategory::Escalation, "Legal review")
                .expires_at(Utc::now() - ChronoDuration::minutes(1)),
        )
        .await;

    assert!(center.pending_approvals().await.is_empty());
    let result = center.decide_approval(id, Decision::Approved, None).await;
    assert!(result.is_failed());

    let entry = assert_ok!(store.get(SCOPE, "approval", &id.to_string()).await).unwrap();
    assert_eq!(entry.metadata.status.as_deref(), Some("expired"));
}

#[tokio::test]
async fn test_pending_approvals_survive_restart() {
    let store = common::setup_store().await;

    let first = CommandCenter::new(
        store.clone(),
        common::setup_router().await,
        common::center_settings(&[]),
    );
    let id = first
        .queue_approval(ApprovalRequest::new(
            "sales",
            ApprovalCategory::LargeCampaign,
            "Email 5000 leads",
        ))
        .await;
    drop(first);

    let second = CommandCenter::new(
        store.clone(),
        common::setup_router().await,
        common::center_settings(&[]),
    );
    assert!(second.pending_approvals().await.is_empty());
    assert_eq!(assert_ok!(second.rehydrate().await), 1);

    let result = second.decide_approval(id, Decision::Approved, None).await;
    assert_eq!(result.status, DirectiveStatus::Executed);
}

#[tokio::test]
async fn test_briefing_over_worker_activity() {
    let (center, store) = common::setup_center(&["sales", "content", "outreach"]).await;

    for i in 0..6 {
        assert_ok!(
            store
                .write(
                    NewRecord::new(SCOPE, "workflow", format!("sales-{}", i), json!({}), "sales")
                        .with_status("completed")
                        .with_cycle_id(format!("cycle-{}", i % 2)),
                )
                .await
        );
    }
    assert_ok!(
        store
            .write(NewRecord::new(
                SCOPE,
                "performance",
                "sales-perf",
                json!({ "leads_advanced": 12 }),
                "sales",
            ))
            .await
    );
    assert_ok!(
        store
            .write(
                NewRecord::new(SCOPE, "workflow", "content-0", json!({}), "content")
                    .with_status("failed"),
            )
            .await
    );
    assert_ok!(
        store
            .write(
                NewRecord::new(
                    SCOPE,
                    "strategy",
                    "weekly-plan",
                    json!("Prioritise upsells to existing customers"),
                    "strategy",
                )
                .with_tag("summary"),
            )
            .await
    );
    center
        .override_decision("content", "hold", json!({ "until": "monday" }))
        .await;

    let briefing = center.generate_briefing().await;

    assert_eq!(briefing.departments.len(), 3);
    assert_eq!(briefing.metrics.cycle_count, 2);
    assert_eq!(briefing.metrics.actions_executed, 6);
    assert_eq!(briefing.metrics.sub_metrics["leads_advanced"], 12.0);

    assert_eq!(
        briefing.highlights[0].detail,
        "Prioritise upsells to existing customers"
    );
    let titles: Vec<&str> = briefing.highlights.iter().map(|h| h.title.as_str()).collect();
    assert!(titles.contains(&"Outreach needs attention"));
    assert!(titles.contains(&"Sales Pipeline is on a roll"));
    assert!(titles.contains(&"Decision overridden"));
    assert!(briefing.summary.starts_with("Ran 2 cycles."));
    assert!(briefing.summary.contains("Advanced 12 leads."));

    let stored = assert_ok!(center.aggregator().get_briefing(briefing.id).await).unwrap();
    assert_eq!(stored.summary, briefing.summary);
    assert_eq!(stored.metrics.cycle_count, briefing.metrics.cycle_count);
}

#[tokio::test]
async fn test_briefing_reads_time_out_per_worker() {
    struct SlowStore;

    #[async_trait::async_trait]
    impl RecordStore for SlowStore {
        async fn write(&self, _record: NewRecord) -> overwatch::error::Result<()> {
            Ok(())
        }

        async fn get(
            &self,
            _scope: &str,
            _category: &str,
            _key: &str,
        ) -> overwatch::error::Result<Option<overwatch::store::Entry>> {
            Ok(None)
        }

        async fn query(
            &self,
            _scope: &str,
            _query: &RecordQuery,
        ) -> overwatch::error::Result<Vec<overwatch::store::Entry>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Vec::new())
        }
    }

    let mut settings = common::center_settings(&["sales", "content"]);
    settings.briefing.read_timeout = Duration::from_millis(20);
    let center = CommandCenter::new(
        Arc::new(SlowStore),
        common::setup_router().await,
        settings,
    );

    let briefing = tokio::time::timeout(Duration::from_secs(2), center.generate_briefing())
        .await
        .expect("briefing should not wait on slow reads");

    assert_eq!(briefing.departments.len(), 2);
    assert!(briefing
        .departments
        .iter()
        .all(|d| d.actions_completed == 0));
    assert!(briefing
        .summary
        .contains("2 items need immediate attention."));
}

#[tokio::test]
async fn test_pending_approvals_returns_a_copy() {
    let (center, _store) = common::setup_center(&[]).await;
    center
        .queue_approval(ApprovalRequest::new(
            "sales",
            ApprovalCategory::PricingChange,
            "Bundle discount",
        ))
        .await;

    let mut snapshot = center.pending_approvals().await;
    snapshot.clear();
    assert_eq!(center.pending_approvals().await.len(), 1);

    let mut snapshot = center.pending_approvals().await;
    let mut forged = snapshot[0].clone();
    forged.id = uuid::Uuid::new_v4();
    snapshot.push(forged.clone());
    snapshot[0].description = "edited".to_string();

    let listed = center.pending_approvals().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].description, "Bundle discount");

    let result = center.decide_approval(forged.id, Decision::Approved, None).await;
    assert_eq!(result.status, DirectiveStatus::Failed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_decisions_apply_once() {
    const DECIDERS: usize = 8;

    let (center, store) = common::setup_center(&[]).await;
    let center = Arc::new(center);
    let id = center
        .queue_approval(ApprovalRequest::new(
            "sales",
            ApprovalCategory::LargeCampaign,
            "Spring blast",
        ))
        .await;

    let mut handles = Vec::with_capacity(DECIDERS + 1);
    for _ in 0..DECIDERS {
        let center = center.clone();
        handles.push(tokio::spawn(async move {
            Some(center.decide_approval(id, Decision::Approved, None).await)
        }));
    }
    // A listing racing the decisions sees the approval or nothing
    let lister = center.clone();
    handles.push(tokio::spawn(async move {
        let pending = lister.pending_approvals().await;
        assert!(pending.len() <= 1);
        None
    }));

    let mut executed = 0;
    let mut not_found = 0;
    for handle in handles {
        match assert_ok!(handle.await) {
            Some(result) if result.status == DirectiveStatus::Executed => executed += 1,
            Some(result) => {
                assert_eq!(result.status, DirectiveStatus::Failed);
                assert!(result.error.unwrap().ends_with("not found"));
                not_found += 1;
            }
            None => {}
        }
    }

    assert_eq!(executed, 1);
    assert_eq!(not_found, DECIDERS - 1);
    assert!(center.pending_approvals().await.is_empty());

    let grants = assert_ok!(
        store
            .query(SCOPE, &RecordQuery::category("directive").tag("APPROVAL_GRANTED"))
            .await
    );
    assert_eq!(grants.len(), 1);
}
