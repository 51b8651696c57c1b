//! Admission policy for sensitive actions
//!
//! Decides whether an action must wait for human sign-off. Pure: the same
//! inputs always produce the same answer.

use serde::{Deserialize, Serialize};

use super::approval::ApprovalCategory;

pub const NEGATIVE_REVIEW_RESPONSE: &str = "negative_review_response";
pub const PRICING_CHANGE: &str = "pricing_change";

/// A rule that can force an action into the approval queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyRule {
    /// Negative-review reply below the review confidence floor
    NegativeReviewLowConfidence,
    /// Recipient count above the audience ceiling
    LargeAudience,
    /// Pricing changes are always gated
    PricingChange,
    /// Confidence below the general floor
    LowConfidence,
    /// Monetary amount above the ceiling
    LargeAmount,
}

impl PolicyRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyRule::NegativeReviewLowConfidence => "negative_review_low_confidence",
            PolicyRule::LargeAudience => "large_audience",
            PolicyRule::PricingChange => "pricing_change",
            PolicyRule::LowConfidence => "low_confidence",
            PolicyRule::LargeAmount => "large_amount",
        }
    }

    /// Approval category an action flagged by this rule is filed under
    pub fn category(&self) -> ApprovalCategory {
        match self {
            PolicyRule::NegativeReviewLowConfidence => ApprovalCategory::NegativeReviewResponse,
            PolicyRule::LargeAudience => ApprovalCategory::LargeCampaign,
            PolicyRule::PricingChange => ApprovalCategory::PricingChange,
            PolicyRule::LowConfidence => ApprovalCategory::LowConfidenceAction,
            PolicyRule::LargeAmount => ApprovalCategory::Escalation,
        }
    }
}

/// A proposed action to check against the policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalCheck {
    pub action_type: String,
    /// Agent confidence, 0-100
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
}

impl ApprovalCheck {
    pub fn new(action_type: impl Into<String>, confidence: f64) -> Self {
        Self {
            action_type: action_type.into(),
            confidence,
            recipient_count: None,
            amount: None,
        }
    }

    pub fn with_recipients(mut self, count: u64) -> Self {
        self.recipient_count = Some(count);
        self
    }

    pub fn with_amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }
}

/// Thresholds used to gate actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionPolicy {
    pub negative_review_min_confidence: f64,
    pub confidence_floor: f64,
    pub max_recipients: u64,
    pub max_amount: f64,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            negative_review_min_confidence: 70.0,
            confidence_floor: 80.0,
            max_recipients: 100,
            max_amount: 1000.0,
        }
    }
}

impl AdmissionPolicy {
    /// Every rule the action trips, in a fixed order
    pub fn evaluate(&self, check: &ApprovalCheck) -> Vec<PolicyRule> {
        let mut rules = Vec::new();

        if check.action_type == NEGATIVE_REVIEW_RESPONSE
            && check.confidence < self.negative_review_min_confidence
        {
            rules.push(PolicyRule::NegativeReviewLowConfidence);
        }
        if check.recipient_count.is_some_and(|n| n > self.max_recipients) {
            rules.push(PolicyRule::LargeAudience);
        }
        if check.action_type == PRICING_CHANGE {
            rules.push(PolicyRule::PricingChange);
        }
        if check.confidence < self.confidence_floor {
            rules.push(PolicyRule::LowConfidence);
        }
        if check.amount.is_some_and(|a| a > self.max_amount) {
            rules.push(PolicyRule::LargeAmount);
        }

        rules
    }

    pub fn requires_approval(&self, check: &ApprovalCheck) -> bool {
        !self.evaluate(check).is_empty()
    }

    /// Category for the first matched rule, if any
    pub fn suggested_category(&self, check: &ApprovalCheck) -> Option<ApprovalCategory> {
        self.evaluate(check).first().map(PolicyRule::category)
    }
}

/// Check an action against the default thresholds
pub fn should_require_approval(
    action_type: &str,
    confidence: f64,
    recipient_count: Option<u64>,
    amount: Option<f64>,
) -> bool {
    let check = ApprovalCheck {
        action_type: action_type.to_string(),
        confidence,
        recipient_count,
        amount,
    };
    AdmissionPolicy::default().requires_approval(&check)
}
