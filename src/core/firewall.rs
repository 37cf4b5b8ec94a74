//! Firewall rule and enforcement configuration data structures
//!
//! A [`FirewallRule`] records an allow/block decision for a source address.
//! Rules are immutable once created: the control plane assigns the id and
//! timestamp, and nothing edits or removes them afterwards.
//!
//! [`FirewallConfig`] holds the *desired* enforcement state and the list of
//! ports the panel reports as open.
//!
//! # Example
//!
//! ```
//! use panelguard::core::firewall::{NewRule, RuleAction};
//!
//! let draft = NewRule::new("203.0.113.9", RuleAction::Blocked)
//!     .reason("SSH brute force")
//!     .target("sshd");
//! assert!(draft.action.is_blocked());
//! ```

use crate::core::timefmt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ports reported open on a fresh install
pub const DEFAULT_PORTS: [&str; 4] = ["80", "443", "22", "8888"];

/// The SSH port literal that costs score when left open
pub const SSH_PORT: &str = "22";

/// Decision recorded by a rule
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum RuleAction {
    Allowed,
    Blocked,
}

impl RuleAction {
    pub const fn is_blocked(self) -> bool {
        matches!(self, RuleAction::Blocked)
    }
}

/// A recorded allow/block decision for a source address
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FirewallRule {
    pub id: u64,

    /// Source address (IP or CIDR)
    #[serde(rename = "ip")]
    pub source_ip: String,

    pub action: RuleAction,

    /// Human-readable reason, e.g. "Port scan detected"
    #[serde(default)]
    pub reason: String,

    /// What the rule protects, e.g. a service or port
    #[serde(default)]
    pub target: String,

    #[serde(rename = "time", deserialize_with = "timefmt::deserialize_lenient")]
    pub observed_at: DateTime<Utc>,
}

impl FirewallRule {
    pub fn is_blocked(&self) -> bool {
        self.action.is_blocked()
    }

    /// Display-friendly age such as "2 mins ago"
    pub fn time_ago(&self, now: DateTime<Utc>) -> String {
        timefmt::humanize(self.observed_at, now)
    }
}

/// Caller-supplied part of a rule; id and timestamp are assigned on insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRule {
    pub source_ip: String,
    pub action: RuleAction,
    pub reason: String,
    pub target: String,
}

impl NewRule {
    pub fn new(source_ip: impl Into<String>, action: RuleAction) -> Self {
        Self {
            source_ip: source_ip.into(),
            action,
            reason: String::new(),
            target: String::new(),
        }
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }
}

/// Desired enforcement state and the ports reported open
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FirewallConfig {
    pub enabled: bool,
    #[serde(default)]
    pub ports: Vec<String>,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ports: DEFAULT_PORTS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl FirewallConfig {
    /// Number of ports literally equal to "22"
    pub fn ssh_port_count(&self) -> usize {
        self.ports.iter().filter(|p| p.as_str() == SSH_PORT).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FirewallConfig::default();
        assert!(config.enabled);
        assert_eq!(config.ports, vec!["80", "443", "22", "8888"]);
        assert_eq!(config.ssh_port_count(), 1);
    }

    #[test]
    fn test_action_parsing_is_case_insensitive() {
        assert_eq!("blocked".parse::<RuleAction>().unwrap(), RuleAction::Blocked);
        assert_eq!("ALLOWED".parse::<RuleAction>().unwrap(), RuleAction::Allowed);
        assert!("drop".parse::<RuleAction>().is_err());
        assert_eq!(RuleAction::Blocked.to_string(), "Blocked");
    }

    #[test]
    fn test_rule_reads_legacy_document() {
        let json = r#"{"id":1700000000000000000,"ip":"10.0.0.5","action":"Blocked","reason":"Brute force","target":"SSH","time":"2 mins ago"}"#;
        let rule: FirewallRule = serde_json::from_str(json).unwrap();

        assert!(rule.is_blocked());
        assert_eq!(rule.source_ip, "10.0.0.5");
        let age = Utc::now() - rule.observed_at;
        assert!(age.num_seconds() >= 119 && age.num_seconds() < 180);
    }

    #[test]
    fn test_rule_serializes_absolute_time() {
        let rule = FirewallRule {
            id: 7,
            source_ip: "192.0.2.1".to_string(),
            action: RuleAction::Allowed,
            reason: String::new(),
            target: String::new(),
            observed_at: DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        };

        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["ip"], "192.0.2.1");
        assert_eq!(json["action"], "Allowed");
        assert!(json["time"].as_str().unwrap().starts_with("2024-05-01T12:00:00"));
    }
}
