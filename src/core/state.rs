//! The security state aggregate
//!
//! [`SecurityState`] is everything the panel persists about security: rules,
//! audit trail, enforcement config and the blocked-address set. It is only
//! ever changed through [`crate::core::store::SecurityStore::mutate`]; the
//! methods here are the transitions those mutations are built from.

use crate::audit::{self, AuditLogEntry};
use crate::core::firewall::{FirewallConfig, FirewallRule, NewRule};
use crate::validators::{MAX_TEXT_LEN, sanitize_text};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

/// Aggregate root of the persisted security document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SecurityState {
    /// Newest first, at most [`audit::MAX_AUDIT_ENTRIES`]
    #[serde(rename = "audit_logs", default)]
    pub audit_log: VecDeque<AuditLogEntry>,

    /// Newest first
    #[serde(rename = "firewall", default)]
    pub firewall_rules: VecDeque<FirewallRule>,

    #[serde(default)]
    pub config: FirewallConfig,

    /// Every source of a blocked rule; append-only
    #[serde(default)]
    pub blocked_ips: BTreeSet<String>,

    /// Enforcement state last confirmed by the OS command.
    /// `None` until the first successful apply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied: Option<bool>,

    /// Next id handed out to a rule or audit entry
    #[serde(default)]
    pub next_id: u64,
}

/// Desired vs. applied enforcement
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct EnforcementStatus {
    pub desired: bool,
    pub applied: Option<bool>,
    pub in_sync: bool,
}

impl SecurityState {
    /// Hands out the next id. Ids never repeat, including across restarts,
    /// because the counter is persisted with the document.
    pub fn allocate_id(&mut self) -> u64 {
        let id = self.next_id.max(1);
        self.next_id = id.saturating_add(1);
        id
    }

    /// Repairs documents written by older versions.
    ///
    /// - Seeds `next_id` past every existing id
    /// - Re-applies the audit bound
    /// - Restores `blocked_ips` entries for blocked rules
    pub fn normalize(&mut self) {
        let max_id = self
            .audit_log
            .iter()
            .map(|e| e.id)
            .chain(self.firewall_rules.iter().map(|r| r.id))
            .max()
            .unwrap_or(0);
        if self.next_id <= max_id {
            self.next_id = max_id.saturating_add(1);
        }

        self.audit_log.truncate(audit::MAX_AUDIT_ENTRIES);

        for rule in self.firewall_rules.iter().filter(|r| r.is_blocked()) {
            if !self.blocked_ips.contains(&rule.source_ip) {
                self.blocked_ips.insert(rule.source_ip.clone());
            }
        }
    }

    /// Prepends a new audit entry, evicting the oldest past the bound
    pub fn record_audit(
        &mut self,
        actor: &str,
        action: &str,
        target: &str,
        now: DateTime<Utc>,
    ) -> AuditLogEntry {
        let entry = AuditLogEntry {
            id: self.allocate_id(),
            observed_at: now,
            actor: sanitize_text(actor, MAX_TEXT_LEN),
            action: sanitize_text(action, MAX_TEXT_LEN),
            target: sanitize_text(target, MAX_TEXT_LEN),
        };
        audit::push_bounded(&mut self.audit_log, entry.clone());
        entry
    }

    /// Prepends a rule built from a validated draft.
    ///
    /// Blocked sources are added to `blocked_ips` in the same step.
    pub fn insert_rule(&mut self, draft: NewRule, now: DateTime<Utc>) -> FirewallRule {
        let rule = FirewallRule {
            id: self.allocate_id(),
            source_ip: draft.source_ip,
            action: draft.action,
            reason: sanitize_text(&draft.reason, MAX_TEXT_LEN),
            target: sanitize_text(&draft.target, MAX_TEXT_LEN),
            observed_at: now,
        };

        if rule.is_blocked() {
            self.blocked_ips.insert(rule.source_ip.clone());
        }
        self.firewall_rules.push_front(rule.clone());
        rule
    }

    pub fn enforcement_status(&self) -> EnforcementStatus {
        EnforcementStatus {
            desired: self.config.enabled,
            applied: self.applied,
            in_sync: self.applied == Some(self.config.enabled),
        }
    }
}
