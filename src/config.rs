//! Server configuration from flags and environment

use clap::Parser;
use std::time::Duration;

use crate::authority::{
    roster::DEFAULT_PLANNER, AdmissionPolicy, BriefingSettings, CenterSettings, WorkerProfile,
};

#[derive(Debug, Clone, Parser)]
#[command(name = "overwatch")]
#[command(about = "Command and approval authority for autonomous worker units")]
pub struct Config {
    /// SQLite database URL
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:overwatch.db?mode=rwc")]
    pub database_url: String,

    /// Address to listen on
    #[arg(long, env = "OVERWATCH_BIND", default_value = "0.0.0.0:3000")]
    pub bind: String,

    /// Base URL of the message routing service
    #[arg(long, env = "ROUTER_URL", default_value = "http://localhost:8080")]
    pub router_url: String,

    /// Per-delivery router timeout in seconds
    #[arg(long, env = "ROUTER_TIMEOUT_SECS", default_value_t = 30)]
    pub router_timeout_secs: u64,

    /// Tenant scope for stored records
    #[arg(long, env = "OVERWATCH_SCOPE", default_value = "default")]
    pub scope: String,

    /// Sender identity on routed messages
    #[arg(long, env = "OVERWATCH_AUTHORITY_ID", default_value = "overwatch")]
    pub authority_id: String,

    /// Comma-separated worker ids reported on in briefings
    #[arg(
        long,
        env = "OVERWATCH_WORKERS",
        value_delimiter = ',',
        default_value = "outreach,sales,content,reputation,commerce"
    )]
    pub workers: Vec<String>,

    /// Worker that publishes strategy summaries (empty to disable)
    #[arg(long, env = "OVERWATCH_PLANNER", default_value = DEFAULT_PLANNER)]
    pub planner: String,

    /// Briefing look-back window, up to one year
    #[arg(
        long,
        env = "BRIEFING_PERIOD_HOURS",
        default_value_t = 24,
        value_parser = clap::value_parser!(i64).range(1..=8760)
    )]
    pub briefing_period_hours: i64,

    #[arg(long, env = "BRIEFING_PAGE_SIZE", default_value_t = 50)]
    pub briefing_page_size: u32,

    #[arg(long, env = "BRIEFING_READ_TIMEOUT_MS", default_value_t = 5000)]
    pub briefing_read_timeout_ms: u64,

    /// Maximum concurrent worker reads per briefing
    #[arg(long, env = "BRIEFING_FANOUT", default_value_t = 8)]
    pub briefing_fanout: usize,

    /// Run the expiry sweep on this interval (0 keeps expiry lazy)
    #[arg(long, env = "APPROVAL_SWEEP_SECS", default_value_t = 0)]
    pub approval_sweep_secs: u64,

    /// Skip reloading pending approvals at startup
    #[arg(long, env = "NO_REHYDRATE")]
    pub no_rehydrate: bool,
}

impl Config {
    pub fn router_timeout(&self) -> Duration {
        Duration::from_secs(self.router_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.approval_sweep_secs > 0).then(|| Duration::from_secs(self.approval_sweep_secs))
    }

    pub fn briefing_settings(&self) -> BriefingSettings {
        let planner = self.planner.trim();
        BriefingSettings {
            workers: self
                .workers
                .iter()
                .map(|w| w.trim())
                .filter(|w| !w.is_empty())
                .map(WorkerProfile::for_worker)
                .collect(),
            planner: (!planner.is_empty()).then(|| planner.to_string()),
            period: chrono::Duration::hours(self.briefing_period_hours),
            page_size: self.briefing_page_size,
            read_timeout: Duration::from_millis(self.briefing_read_timeout_ms),
            fanout: self.briefing_fanout.max(1),
        }
    }

    pub fn center_settings(&self) -> CenterSettings {
        CenterSettings {
            scope: self.scope.clone(),
            authority_id: self.authority_id.clone(),
            policy: AdmissionPolicy::default(),
            briefing: self.briefing_settings(),
        }
    }
}
