//! Security summary
//!
//! The dashboard's overview panel: score, counts, trend and top offenders,
//! all derived from one state snapshot at read time.

use crate::core::score;
use crate::core::state::{EnforcementStatus, SecurityState};
use crate::core::store::SecurityStore;
use crate::core::trend::{self, AttackingIp, TrendBucket};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::path::Path;

/// Control socket whose presence means fail2ban is running
pub const FAIL2BAN_SOCKET: &str = "/var/run/fail2ban/fail2ban.sock";

/// State of an auxiliary protection service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
pub enum ServiceStatus {
    Running,
    Stopped,
}

/// Read-time tuning for [`summarize`]
#[derive(Debug, Clone)]
pub struct SummaryOptions {
    /// Fill empty trend buckets with placeholder counts
    pub demo_trend_data: bool,
    pub top_ip_limit: usize,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            demo_trend_data: false,
            top_ip_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SecuritySummary {
    pub score: u8,
    pub attacks_blocked_24h: usize,
    pub firewall_rules: usize,
    pub blocked_ips: usize,
    pub attack_trend: Vec<TrendBucket>,
    pub top_attacking_ips: Vec<AttackingIp>,
    pub enforcement: EnforcementStatus,
    pub fail2ban: ServiceStatus,
}

/// Builds the summary for `state` as of `now`
pub fn summarize(
    state: &SecurityState,
    now: DateTime<Utc>,
    options: &SummaryOptions,
    fail2ban: ServiceStatus,
) -> SecuritySummary {
    SecuritySummary {
        score: score::security_score(&state.config),
        attacks_blocked_24h: trend::blocked_since(&state.firewall_rules, now - Duration::hours(24)),
        firewall_rules: state.firewall_rules.len(),
        blocked_ips: state.blocked_ips.len(),
        attack_trend: trend::attack_trend(&state.firewall_rules, now, options.demo_trend_data),
        top_attacking_ips: trend::top_attacking_ips(&state.firewall_rules, options.top_ip_limit),
        enforcement: state.enforcement_status(),
        fail2ban,
    }
}

/// Checks for the fail2ban control socket
pub async fn fail2ban_status() -> ServiceStatus {
    service_status_at(Path::new(FAIL2BAN_SOCKET)).await
}

async fn service_status_at(socket: &Path) -> ServiceStatus {
    match tokio::fs::try_exists(socket).await {
        Ok(true) => ServiceStatus::Running,
        _ => ServiceStatus::Stopped,
    }
}

/// Snapshot the store and summarize it now
pub async fn collect(store: &SecurityStore, options: &SummaryOptions) -> SecuritySummary {
    let state = store.read().await;
    summarize(&state, Utc::now(), options, fail2ban_status().await)
}
