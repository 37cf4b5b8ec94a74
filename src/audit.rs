/// Audit trail of administrative actions
///
/// Every mutating operation records who did what to which target. Entries
/// live in the security state document, newest first, bounded to
/// [`MAX_AUDIT_ENTRIES`]. Eviction is FIFO by insertion order: the tail is
/// dropped regardless of the timestamps it carries.
use crate::core::store::{Commit, SecurityStore};
use crate::core::timefmt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Maximum number of audit entries kept
pub const MAX_AUDIT_ENTRIES: usize = 1000;

/// Actor recorded when the caller does not name one
pub const DEFAULT_ACTOR: &str = "Admin";

/// Actor recorded for actions taken by background tasks
pub const SYSTEM_ACTOR: &str = "System";

/// Actions recorded by the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
pub enum AdminAction {
    #[strum(serialize = "Toggle Firewall")]
    ToggleFirewall,
    #[strum(serialize = "Add Firewall Rule")]
    AddFirewallRule,
    #[strum(serialize = "Open Port")]
    OpenPort,
    #[strum(serialize = "Close Port")]
    ClosePort,
    #[strum(serialize = "Run Security Scan")]
    RunSecurityScan,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditLogEntry {
    pub id: u64,

    /// When the action happened (UTC)
    #[serde(rename = "time", deserialize_with = "timefmt::deserialize_lenient")]
    pub observed_at: DateTime<Utc>,

    /// Who performed the action
    #[serde(rename = "user")]
    pub actor: String,

    pub action: String,

    pub target: String,
}

/// Prepends an entry and drops the oldest ones past [`MAX_AUDIT_ENTRIES`]
pub fn push_bounded(log: &mut VecDeque<AuditLogEntry>, entry: AuditLogEntry) {
    log.push_front(entry);
    log.truncate(MAX_AUDIT_ENTRIES);
}

/// Records an administrative action and persists it.
///
/// Text fields are sanitized before storage. The returned commit carries a
/// persistence error if the write failed; the entry is in memory either way.
pub async fn record(
    store: &SecurityStore,
    actor: &str,
    action: &str,
    target: &str,
) -> Commit<AuditLogEntry> {
    let now = Utc::now();
    let commit = store
        .mutate(|state| state.record_audit(actor, action, target, now))
        .await;

    tracing::debug!(
        id = commit.value().id,
        actor = %commit.value().actor,
        action = %commit.value().action,
        "Recorded audit entry"
    );
    commit
}
