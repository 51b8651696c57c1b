//! Approval requests
//!
//! A human-gated request to perform a sensitive action. Status only moves
//! forward: `pending` to one of `approved`, `rejected` or `expired`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::directive::DirectivePriority;
use crate::store::RecordPriority;

/// Category of action awaiting approval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalCategory {
    /// Replying to a negative customer review
    NegativeReviewResponse,
    /// Campaign reaching a large audience
    LargeCampaign,
    /// Any change to product or service pricing
    PricingChange,
    /// Action an agent is not confident about
    LowConfidenceAction,
    /// Escalated by a worker for human judgement
    Escalation,
}

impl ApprovalCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalCategory::NegativeReviewResponse => "negative_review_response",
            ApprovalCategory::LargeCampaign => "large_campaign",
            ApprovalCategory::PricingChange => "pricing_change",
            ApprovalCategory::LowConfidenceAction => "low_confidence_action",
            ApprovalCategory::Escalation => "escalation",
        }
    }
}

impl std::str::FromStr for ApprovalCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "negative_review_response" => Ok(ApprovalCategory::NegativeReviewResponse),
            "large_campaign" => Ok(ApprovalCategory::LargeCampaign),
            "pricing_change" => Ok(ApprovalCategory::PricingChange),
            "low_confidence_action" => Ok(ApprovalCategory::LowConfidenceAction),
            "escalation" => Ok(ApprovalCategory::Escalation),
            _ => Err(format!("Invalid approval category: {}", s)),
        }
    }
}

/// How quickly a decision is needed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Normal => "normal",
            Urgency::High => "high",
            Urgency::Critical => "critical",
        }
    }
}

impl std::str::FromStr for Urgency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Urgency::Low),
            "normal" => Ok(Urgency::Normal),
            "high" => Ok(Urgency::High),
            "critical" => Ok(Urgency::Critical),
            _ => Err(format!("Invalid urgency: {}", s)),
        }
    }
}

impl From<Urgency> for DirectivePriority {
    fn from(urgency: Urgency) -> Self {
        match urgency {
            Urgency::Low | Urgency::Normal => DirectivePriority::Normal,
            Urgency::High => DirectivePriority::High,
            Urgency::Critical => DirectivePriority::Critical,
        }
    }
}

impl From<Urgency> for RecordPriority {
    fn from(urgency: Urgency) -> Self {
        match urgency {
            Urgency::Low => RecordPriority::Low,
            Urgency::Normal => RecordPriority::Normal,
            Urgency::High => RecordPriority::High,
            Urgency::Critical => RecordPriority::Critical,
        }
    }
}

/// Lifecycle status of an approval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Waiting for a decision
    Pending,
    Approved,
    Rejected,
    /// Expiry passed before anyone decided
    Expired,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
            ApprovalStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }
}

impl std::str::FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            "expired" => Ok(ApprovalStatus::Expired),
            _ => Err(format!("Invalid approval status: {}", s)),
        }
    }
}

/// A human (or delegated) decision on a pending approval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approved => "approved",
            Decision::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" | "approve" => Ok(Decision::Approved),
            "rejected" | "reject" => Ok(Decision::Rejected),
            _ => Err(format!("Invalid decision: {}", s)),
        }
    }
}

/// Parameters for queuing a new approval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub requested_by: String,
    pub category: ApprovalCategory,
    pub description: String,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default)]
    pub context: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ApprovalRequest {
    pub fn new(
        requested_by: impl Into<String>,
        category: ApprovalCategory,
        description: impl Into<String>,
    ) -> Self {
        Self {
            requested_by: requested_by.into(),
            category,
            description: description.into(),
            urgency: Urgency::Normal,
            context: Value::Null,
            expires_at: None,
        }
    }

    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

/// A queued request for sign-off
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approval {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub requested_by: String,
    pub category: ApprovalCategory,
    pub description: String,
    pub urgency: Urgency,
    pub context: Value,
    pub status: ApprovalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_reason: Option<String>,
}

impl Approval {
    pub fn new(request: ApprovalRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            requested_by: request.requested_by,
            category: request.category,
            description: request.description,
            urgency: request.urgency,
            context: request.context,
            status: ApprovalStatus::Pending,
            expires_at: request.expires_at,
            decided_at: None,
            decision_reason: None,
        }
    }

    /// Whether the expiry lies strictly before `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }

    pub fn approve(&mut self, reason: Option<String>) -> Result<(), String> {
        self.transition(ApprovalStatus::Approved, reason)
    }

    pub fn reject(&mut self, reason: Option<String>) -> Result<(), String> {
        self.transition(ApprovalStatus::Rejected, reason)
    }

    pub fn expire(&mut self) -> Result<(), String> {
        self.transition(ApprovalStatus::Expired, None)
    }

    /// Apply a decision
    pub fn decide(&mut self, decision: Decision, reason: Option<String>) -> Result<(), String> {
        match decision {
            Decision::Approved => self.approve(reason),
            Decision::Rejected => self.reject(reason),
        }
    }

    fn transition(&mut self, to: ApprovalStatus, reason: Option<String>) -> Result<(), String> {
        if self.status.is_terminal() {
            return Err(format!(
                "Cannot move approval from {} to {}",
                self.status.as_str(),
                to.as_str()
            ));
        }
        self.status = to;
        self.decision_reason = reason;
        self.decided_at = Some(Utc::now());
        Ok(())
    }
}
