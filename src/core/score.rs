//! Security score
//!
//! A deterministic 0-100 heuristic over the enforcement config:
//!
//! | Factor | Penalty |
//! |---|---|
//! | Enforcement disabled | 40 |
//! | More than 10 ports open | 10 |
//! | Each port entry equal to `"22"` | 5 |
//!
//! The result is clamped to [0, 100]. Nothing else contributes.

use crate::core::firewall::FirewallConfig;
use serde::Serialize;

pub const MAX_SCORE: u8 = 100;
pub const DISABLED_PENALTY: u32 = 40;
pub const PORT_COUNT_PENALTY: u32 = 10;
pub const SSH_PORT_PENALTY: u32 = 5;

/// Port count above which [`PORT_COUNT_PENALTY`] applies
pub const PORT_COUNT_THRESHOLD: usize = 10;

/// One scoring factor that fired
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    EnforcementDisabled,
    TooManyOpenPorts { count: usize },
    SshOnDefaultPort { occurrences: usize },
}

impl Finding {
    pub fn penalty(&self) -> u32 {
        match self {
            Finding::EnforcementDisabled => DISABLED_PENALTY,
            Finding::TooManyOpenPorts { .. } => PORT_COUNT_PENALTY,
            Finding::SshOnDefaultPort { occurrences } => {
                u32::try_from(*occurrences).map_or(u32::MAX, |n| n.saturating_mul(SSH_PORT_PENALTY))
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Finding::EnforcementDisabled => "Firewall enforcement is disabled".to_string(),
            Finding::TooManyOpenPorts { count } => {
                format!("{count} ports open (more than {PORT_COUNT_THRESHOLD})")
            }
            Finding::SshOnDefaultPort { occurrences: 1 } => {
                "SSH is exposed on the default port 22".to_string()
            }
            Finding::SshOnDefaultPort { occurrences } => {
                format!("Port 22 is listed {occurrences} times")
            }
        }
    }
}

/// Scoring factors that apply to `config`, in table order
pub fn findings(config: &FirewallConfig) -> Vec<Finding> {
    let mut found = Vec::new();

    if !config.enabled {
        found.push(Finding::EnforcementDisabled);
    }

    if config.ports.len() > PORT_COUNT_THRESHOLD {
        found.push(Finding::TooManyOpenPorts {
            count: config.ports.len(),
        });
    }

    let occurrences = config.ssh_port_count();
    if occurrences > 0 {
        found.push(Finding::SshOnDefaultPort { occurrences });
    }

    found
}

/// Computes the clamped security score
pub fn security_score(config: &FirewallConfig) -> u8 {
    let penalty = findings(config)
        .iter()
        .fold(0u32, |total, f| total.saturating_add(f.penalty()));

    let remaining = u32::from(MAX_SCORE).saturating_sub(penalty);
    u8::try_from(remaining).unwrap_or(MAX_SCORE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(enabled: bool, ports: &[&str]) -> FirewallConfig {
        FirewallConfig {
            enabled,
            ports: ports.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn test_perfect_score() {
        assert_eq!(security_score(&config(true, &[])), 100);
        assert_eq!(security_score(&config(true, &["80", "443"])), 100);
    }

    #[test]
    fn test_disabled_empty() {
        assert_eq!(security_score(&config(false, &[])), 60);
    }

    #[test]
    fn test_ssh_only() {
        assert_eq!(security_score(&config(true, &["22"])), 95);
    }

    #[test]
    fn test_all_factors() {
        let ports = ["1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "22"];
        assert_eq!(security_score(&config(false, &ports)), 45);
    }

    #[test]
    fn test_exactly_ten_ports_no_penalty() {
        let ports = ["1", "2", "3", "4", "5", "6", "7", "8", "9", "10"];
        assert_eq!(security_score(&config(true, &ports)), 100);
    }

    #[test]
    fn test_default_config_score() {
        assert_eq!(security_score(&FirewallConfig::default()), 95);
    }

    #[test]
    fn test_clamped_at_zero() {
        let ports = vec!["22"; 50];
        assert_eq!(security_score(&config(false, &ports)), 0);
    }

    #[test]
    fn test_port_match_is_literal() {
        assert_eq!(security_score(&config(true, &["022", " 22", "2222"])), 100);
    }

    #[test]
    fn test_findings_describe() {
        let found = findings(&config(false, &["22"]));
        assert_eq!(found.len(), 2);
        assert_eq!(found[0], Finding::EnforcementDisabled);
        assert!(found[1].describe().contains("22"));
    }
}
