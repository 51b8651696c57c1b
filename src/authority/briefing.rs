//! Briefing aggregator
//!
//! Reads recent worker activity from the record store, classifies each
//! worker's health, rolls up metrics, ranks highlights and writes a short
//! natural-language summary. A worker whose records cannot be read is
//! reported as critical with no activity; the briefing still completes.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::approval::Approval;
use super::events::AuthorityEvent;
use super::gateway::ApprovalGateway;
use super::roster::{default_roster, WorkerProfile, DEFAULT_PLANNER};
use crate::error::{AppError, Result};
use crate::store::{Entry, NewRecord, RecordQuery, RecordStore};

const MAX_HIGHLIGHTS: usize = 10;

/// Knobs for briefing generation
#[derive(Debug, Clone)]
pub struct BriefingSettings {
    pub workers: Vec<WorkerProfile>,
    /// Worker that publishes `summary` strategy records
    pub planner: Option<String>,
    /// How far back each briefing looks
    pub period: chrono::Duration,
    /// Maximum records read per worker and category
    pub page_size: u32,
    pub read_timeout: Duration,
    /// Maximum concurrent worker reads
    pub fanout: usize,
}

impl Default for BriefingSettings {
    fn default() -> Self {
        Self {
            workers: default_roster(),
            planner: Some(DEFAULT_PLANNER.to_string()),
            period: chrono::Duration::hours(24),
            page_size: 50,
            read_timeout: Duration::from_secs(5),
            fanout: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepartmentStatus {
    Healthy,
    NeedsAttention,
    Critical,
}

impl DepartmentStatus {
    fn from_activity(total: usize) -> Self {
        match total {
            0 => DepartmentStatus::Critical,
            1..=2 => DepartmentStatus::NeedsAttention,
            _ => DepartmentStatus::Healthy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Headline {
    pub name: String,
    pub value: f64,
}

/// One worker's activity over the briefing period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentSummary {
    pub worker_id: String,
    pub display_name: String,
    pub status: DepartmentStatus,
    pub actions_completed: u64,
    pub actions_pending: u64,
    pub headline: Headline,
    pub trend: Trend,
}

impl DepartmentSummary {
    /// Critical, zero-activity summary for a worker that could not be read
    pub fn degraded(worker: &WorkerProfile) -> Self {
        Self {
            worker_id: worker.id.clone(),
            display_name: worker.display_name.clone(),
            status: DepartmentStatus::Critical,
            actions_completed: 0,
            actions_pending: 0,
            headline: Headline {
                name: worker.headline_label.clone(),
                value: 0.0,
            },
            trend: Trend::Stable,
        }
    }
}

/// Ranked by declaration order: high first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HighlightKind {
    Success,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub kind: HighlightKind,
    pub impact: Impact,
    pub title: String,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
}

impl Highlight {
    fn new(
        kind: HighlightKind,
        impact: Impact,
        title: impl Into<String>,
        detail: impl Into<String>,
        worker_id: Option<&str>,
    ) -> Self {
        Self {
            kind,
            impact,
            title: title.into(),
            detail: detail.into(),
            worker_id: worker_id.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BriefingMetrics {
    pub cycle_count: u64,
    pub actions_executed: u64,
    /// Percentage of finished workflows that completed, 0 when none finished
    pub success_rate: f64,
    pub sub_metrics: BTreeMap<String, f64>,
}

/// Periodic executive summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
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

/// Records read for one worker
#[derive(Debug, Default)]
struct WorkerActivity {
    performance: Vec<Entry>,
    workflow: Vec<Entry>,
}

impl WorkerActivity {
    fn total(&self) -> usize {
        self.performance.len() + self.workflow.len()
    }

    fn workflows_with_status(&self, statuses: &[&str]) -> u64 {
        self.workflow
            .iter()
            .filter(|e| {
                e.metadata
                    .status
                    .as_deref()
                    .is_some_and(|s| statuses.contains(&s))
            })
            .count() as u64
    }

    fn sum_field(&self, key: &str) -> f64 {
        self.performance
            .iter()
            .filter_map(|e| e.value.get(key).and_then(Value::as_f64))
            .sum()
    }

    fn cycle_ids(&self) -> impl Iterator<Item = &str> {
        self.performance
            .iter()
            .chain(self.workflow.iter())
            .filter_map(|e| e.metadata.cycle_id.as_deref())
    }
}

fn summarize(worker: &WorkerProfile, activity: &WorkerActivity) -> DepartmentSummary {
    let total = activity.total();
    let completed = activity.workflows_with_status(&["completed"]);
    let pending = activity.workflows_with_status(&["pending", "in_progress"]);
    let headline_value = if worker.uses_fallback_headline() {
        completed as f64
    } else {
        activity.sum_field(&worker.headline_key)
    };

    DepartmentSummary {
        worker_id: worker.id.clone(),
        display_name: worker.display_name.clone(),
        status: DepartmentStatus::from_activity(total),
        actions_completed: completed,
        actions_pending: pending,
        headline: Headline {
            name: worker.headline_label.clone(),
            value: headline_value,
        },
        trend: if total > 5 { Trend::Up } else { Trend::Stable },
    }
}

/// `unavailable` holds workers whose records could not be read
fn department_highlights(
    departments: &[DepartmentSummary],
    unavailable: &HashSet<String>,
) -> Vec<Highlight> {
    let mut highlights = Vec::new();
    for dept in departments {
        if dept.status == DepartmentStatus::Critical {
            let detail = if unavailable.contains(&dept.worker_id) {
                "Records unavailable this period"
            } else {
                "No activity recorded this period"
            };
            highlights.push(Highlight::new(
                HighlightKind::Warning,
                Impact::High,
                format!("{} needs attention", dept.display_name),
                detail,
                Some(&dept.worker_id),
            ));
        }
        if dept.actions_completed > 5 && dept.trend == Trend::Up {
            highlights.push(Highlight::new(
                HighlightKind::Success,
                Impact::Medium,
                format!("{} is on a roll", dept.display_name),
                format!("{} actions completed", dept.actions_completed),
                Some(&dept.worker_id),
            ));
        }
        if dept.actions_pending > 3 {
            highlights.push(Highlight::new(
                HighlightKind::Info,
                Impact::Low,
                format!("{} has a backlog", dept.display_name),
                format!("{} actions pending", dept.actions_pending),
                Some(&dept.worker_id),
            ));
        }
    }
    highlights
}

fn compose_summary(metrics: &BriefingMetrics, critical_count: usize) -> String {
    let mut sentences = Vec::new();

    match metrics.cycle_count {
        0 => sentences.push("No cycles ran during this period.".to_string()),
        1 => sentences.push("Ran 1 cycle.".to_string()),
        n => sentences.push(format!("Ran {} cycles.", n)),
    }

    let metric = |key: &str| metrics.sub_metrics.get(key).copied().unwrap_or(0.0);
    let replies = metric("replies_processed");
    if replies > 0.0 {
        sentences.push(format!("Processed {} replies.", replies));
    }
    let leads = metric("leads_advanced");
    if leads > 0.0 {
        sentences.push(format!("Advanced {} leads.", leads));
    }
    let content = metric("content_produced");
    if content > 0.0 {
        sentences.push(format!("Produced {} pieces of content.", content));
    }
    let reviews = metric("reviews_answered");
    if reviews > 0.0 {
        sentences.push(format!("Answered {} reviews.", reviews));
    }
    if metrics.success_rate > 0.0 {
        sentences.push(format!("Success rate was {:.1}%.", metrics.success_rate));
    }
    match critical_count {
        0 => {}
        1 => sentences.push("1 item needs immediate attention.".to_string()),
        n => sentences.push(format!("{} items need immediate attention.", n)),
    }

    sentences.join(" ")
}

/// Builds and archives briefings
pub struct BriefingAggregator {
    scope: String,
    authority_id: String,
    store: Arc<dyn RecordStore>,
    gateway: Arc<ApprovalGateway>,
    settings: BriefingSettings,
    event_tx: broadcast::Sender<AuthorityEvent>,
}

impl BriefingAggregator {
    pub fn new(
        scope: impl Into<String>,
        authority_id: impl Into<String>,
        store: Arc<dyn RecordStore>,
        gateway: Arc<ApprovalGateway>,
        settings: BriefingSettings,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            scope: scope.into(),
            authority_id: authority_id.into(),
            store,
            gateway,
            settings,
            event_tx,
        }
    }

    /// Subscribe to briefing events
    pub fn subscribe(&self) -> broadcast::Receiver<AuthorityEvent> {
        self.event_tx.subscribe()
    }

    pub fn settings(&self) -> &BriefingSettings {
        &self.settings
    }

    /// Build a briefing over the configured period and archive it
    pub async fn generate_briefing(&self) -> Briefing {
        let period_end = Utc::now();
        let period_start = period_end - self.settings.period;

        // Futures are built up front so the stream owns no borrowing closure
        let pending_reads: Vec<_> = self
            .settings
            .workers
            .iter()
            .cloned()
            .map(|worker| self.read_worker_owned(worker, period_start))
            .collect();
        let reads: Vec<(WorkerProfile, Result<WorkerActivity>)> = stream::iter(pending_reads)
            .buffered(self.settings.fanout.max(1))
            .collect()
            .await;

        let mut departments = Vec::with_capacity(reads.len());
        let mut unavailable: HashSet<String> = HashSet::new();
        let mut cycles: HashSet<String> = HashSet::new();
        let mut metrics = BriefingMetrics::default();
        let mut failed = 0u64;
        let mut pending = 0u64;

        for (worker, read) in &reads {
            let activity = match read {
                Ok(activity) => activity,
                Err(e) => {
                    tracing::warn!("Briefing read for {} failed: {}", worker.id, e);
                    departments.push(DepartmentSummary::degraded(worker));
                    unavailable.insert(worker.id.clone());
                    continue;
                }
            };

            let summary = summarize(worker, activity);
            cycles.extend(activity.cycle_ids().map(str::to_string));
            failed += activity.workflows_with_status(&["failed"]);
            pending += summary.actions_pending;
            metrics.actions_executed += summary.actions_completed;
            if !worker.uses_fallback_headline() {
                *metrics
                    .sub_metrics
                    .entry(worker.headline_key.clone())
                    .or_insert(0.0) += summary.headline.value;
            }
            departments.push(summary);
        }

        metrics.cycle_count = cycles.len() as u64;
        let finished = metrics.actions_executed + failed;
        if finished > 0 {
            let rate = metrics.actions_executed as f64 / finished as f64 * 100.0;
            metrics.success_rate = (rate * 10.0).round() / 10.0;
        }
        metrics
            .sub_metrics
            .insert("actions_pending".to_string(), pending as f64);

        let mut highlights = department_highlights(&departments, &unavailable);
        highlights.extend(self.override_highlights(period_start).await);
        highlights.sort_by_key(|h| h.impact);
        highlights.truncate(MAX_HIGHLIGHTS);

        let critical_count = highlights
            .iter()
            .filter(|h| h.impact == Impact::High && h.kind == HighlightKind::Warning)
            .count();

        if let Some(planner) = self.planner_highlight(period_start).await {
            highlights.insert(0, planner);
            highlights.truncate(MAX_HIGHLIGHTS);
        }

        let briefing = Briefing {
            id: Uuid::new_v4(),
            generated_at: Utc::now(),
            period_start,
            period_end,
            summary: compose_summary(&metrics, critical_count),
            highlights,
            pending_approvals: self.gateway.pending_approvals().await,
            departments,
            metrics,
        };

        tracing::info!(
            "Generated briefing {} covering {} departments",
            briefing.id,
            briefing.departments.len()
        );
        self.persist(&briefing).await;

        let _ = self.event_tx.send(AuthorityEvent::BriefingGenerated {
            briefing_id: briefing.id,
        });

        briefing
    }

    /// Fetch an archived briefing
    pub async fn get_briefing(&self, id: Uuid) -> Result<Option<Briefing>> {
        let entry = self
            .store
            .get(&self.scope, "briefing", &id.to_string())
            .await?;
        entry.map(decode_briefing).transpose()
    }

    /// Most recent archived briefings, newest first
    pub async fn recent_briefings(&self, limit: u32) -> Result<Vec<Briefing>> {
        let query = RecordQuery::category("briefing").tag("briefing").limit(limit);
        let entries = self.store.query(&self.scope, &query).await?;
        entries.into_iter().map(decode_briefing).collect()
    }

    async fn read_worker_owned(
        &self,
        worker: WorkerProfile,
        since: DateTime<Utc>,
    ) -> (WorkerProfile, Result<WorkerActivity>) {
        let read = self.read_worker(&worker, since).await;
        (worker, read)
    }

    async fn read_worker(
        &self,
        worker: &WorkerProfile,
        since: DateTime<Utc>,
    ) -> Result<WorkerActivity> {
        let performance = RecordQuery::category("performance")
            .created_by(&worker.id)
            .since(since)
            .limit(self.settings.page_size);
        let workflow = RecordQuery::category("workflow")
            .created_by(&worker.id)
            .since(since)
            .limit(self.settings.page_size);

        let (performance, workflow) =
            tokio::join!(self.timed_query(performance), self.timed_query(workflow));

        Ok(WorkerActivity {
            performance: performance?,
            workflow: workflow?,
        })
    }

    async fn timed_query(&self, query: RecordQuery) -> Result<Vec<Entry>> {
        let read = self.store.query(&self.scope, &query);
        match tokio::time::timeout(self.settings.read_timeout, read).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Internal(format!(
                "read timed out after {:?}",
                self.settings.read_timeout
            ))),
        }
    }

    async fn override_highlights(&self, since: DateTime<Utc>) -> Vec<Highlight> {
        let query = RecordQuery::category("strategy")
            .tag("override")
            .since(since)
            .limit(self.settings.page_size);

        match self.timed_query(query).await {
            Ok(entries) => entries
                .iter()
                .map(|entry| {
                    let target = entry.value.get("target").and_then(Value::as_str);
                    let kind = entry
                        .value
                        .get("override_type")
                        .and_then(Value::as_str)
                        .unwrap_or("override");
                    Highlight::new(
                        HighlightKind::Info,
                        Impact::Low,
                        "Decision overridden",
                        format!("{} override for {}", kind, target.unwrap_or("unknown")),
                        target,
                    )
                })
                .collect(),
            Err(e) => {
                tracing::warn!("Failed to read override records: {}", e);
                Vec::new()
            }
        }
    }

    async fn planner_highlight(&self, since: DateTime<Utc>) -> Option<Highlight> {
        let planner = self.settings.planner.as_deref()?;
        let query = RecordQuery::category("strategy")
            .created_by(planner)
            .tag("summary")
            .since(since)
            .limit(1);

        let entries = match self.timed_query(query).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Failed to read planner summary: {}", e);
                return None;
            }
        };

        let entry = entries.into_iter().next()?;
        let text = match &entry.value {
            Value::String(s) => s.clone(),
            other => other.get("summary").and_then(Value::as_str)?.to_string(),
        };

        Some(Highlight::new(
            HighlightKind::Info,
            Impact::High,
            "Strategy update",
            text,
            Some(planner),
        ))
    }

    async fn persist(&self, briefing: &Briefing) {
        let value = match serde_json::to_value(briefing) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to serialize briefing {}: {}", briefing.id, e);
                return;
            }
        };

        let record = NewRecord::new(
            &self.scope,
            "briefing",
            briefing.id.to_string(),
            value,
            &self.authority_id,
        )
        .with_tag("briefing")
        .with_status("generated")
        .with_field("period_end", json!(briefing.period_end));

        if let Err(e) = self.store.write(record).await {
            tracing::warn!("Failed to persist briefing {}: {}", briefing.id, e);
        }
    }
}

fn decode_briefing(entry: Entry) -> Result<Briefing> {
    serde_json::from_value(entry.value)
        .map_err(|e| AppError::Internal(format!("Invalid briefing record: {}", e)))
}
