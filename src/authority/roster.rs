//! Known worker units and their headline metrics

use serde::{Deserialize, Serialize};

/// Headline used for workers without a dedicated metric
pub const FALLBACK_HEADLINE_KEY: &str = "actions_completed";
pub const FALLBACK_HEADLINE_LABEL: &str = "Actions completed";

/// Default planner identity (writes `summary` strategy records)
pub const DEFAULT_PLANNER: &str = "strategy";

/// A worker unit reported on in briefings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerProfile {
    pub id: String,
    pub display_name: String,
    /// Numeric field summed over the worker's performance records
    pub headline_key: String,
    pub headline_label: String,
}

impl WorkerProfile {
    /// Profile for a worker id, using the built-in mapping when known
    pub fn for_worker(id: &str) -> Self {
        let (display_name, key, label) = match id {
            "outreach" => ("Outreach", "replies_processed", "Replies processed"),
            "sales" => ("Sales Pipeline", "leads_advanced", "Leads advanced"),
            "content" => ("Content Studio", "content_produced", "Content produced"),
            "reputation" => ("Reputation", "reviews_answered", "Reviews answered"),
            "commerce" => ("E-commerce", FALLBACK_HEADLINE_KEY, FALLBACK_HEADLINE_LABEL),
            other => (other, FALLBACK_HEADLINE_KEY, FALLBACK_HEADLINE_LABEL),
        };

        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            headline_key: key.to_string(),
            headline_label: label.to_string(),
        }
    }

    /// Whether the headline falls back to the completed count
    pub fn uses_fallback_headline(&self) -> bool {
        self.headline_key == FALLBACK_HEADLINE_KEY
    }
}

/// The standard set of worker units
pub fn default_roster() -> Vec<WorkerProfile> {
    ["outreach", "sales", "content", "reputation", "commerce"]
        .iter()
        .map(|id| WorkerProfile::for_worker(id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_worker_profiles() {
        let sales = WorkerProfile::for_worker("sales");
        assert_eq!(sales.display_name, "Sales Pipeline");
        assert_eq!(sales.headline_key, "leads_advanced");
        assert!(!sales.uses_fallback_headline());

        let commerce = WorkerProfile::for_worker("commerce");
        assert!(commerce.uses_fallback_headline());
    }

    #[test]
    fn test_unknown_worker_uses_id_and_fallback() {
        let profile = WorkerProfile::for_worker("logistics");
        assert_eq!(profile.display_name, "logistics");
        assert_eq!(profile.headline_label, FALLBACK_HEADLINE_LABEL);
    }

    #[test]
    fn test_default_roster() {
        let ids: Vec<String> = default_roster().into_iter().map(|w| w.id).collect();
        assert_eq!(ids, vec!["outreach", "sales", "content", "reputation", "commerce"]);
    }
}
