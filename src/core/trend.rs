//! Attack trend aggregation
//!
//! Buckets blocked rules into clock hours for charting, and ranks the
//! addresses blocked most often. Both work on a snapshot and are pure.

use crate::core::firewall::FirewallRule;
use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Number of hourly buckets in a trend
pub const TREND_BUCKETS: usize = 6;

/// Blocked count for one clock hour
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendBucket {
    /// Hour label with its zone, e.g. "14:00 UTC"
    pub hour: String,
    pub count: usize,
    #[serde(skip)]
    pub starts_at: DateTime<Utc>,
}

/// Blocked-rule tally for one source address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttackingIp {
    pub ip: String,
    pub count: usize,
    pub last_seen: DateTime<Utc>,
}

/// Blocked rules per hour for the hour containing `now` and the five before it.
///
/// Buckets are ordered oldest first. A rule lands in a bucket when its
/// timestamp falls inside that clock hour; rules outside the window (older,
/// or dated after `now`'s hour) are ignored.
///
/// With `demo_data` set, buckets with no real matches get a placeholder of
/// `index * 10`. Leave it off in production.
pub fn attack_trend<'a, I>(rules: I, now: DateTime<Utc>, demo_data: bool) -> Vec<TrendBucket>
where
    I: IntoIterator<Item = &'a FirewallRule>,
{
    let hour = Duration::hours(1);
    let current_hour = now.duration_trunc(hour).unwrap_or(now);
    let window_start = current_hour - hour * (TREND_BUCKETS as i32 - 1);

    let mut counts = [0usize; TREND_BUCKETS];
    for rule in rules.into_iter().filter(|r| r.is_blocked()) {
        if rule.observed_at < window_start {
            continue;
        }
        let offset = (rule.observed_at - window_start).num_hours();
        if let Ok(index) = usize::try_from(offset)
            && index < TREND_BUCKETS
        {
            counts[index] += 1;
        }
    }

    counts
        .iter()
        .enumerate()
        .map(|(index, &count)| {
            let starts_at = window_start + hour * index as i32;
            let count = if demo_data && count == 0 {
                index * 10
            } else {
                count
            };
            TrendBucket {
                hour: starts_at.format("%H:00 UTC").to_string(),
                count,
                starts_at,
            }
        })
        .collect()
}

/// Addresses with the most blocked rules: count descending, then address.
pub fn top_attacking_ips<'a, I>(rules: I, limit: usize) -> Vec<AttackingIp>
where
    I: IntoIterator<Item = &'a FirewallRule>,
{
    let mut tally: HashMap<&str, AttackingIp> = HashMap::new();

    for rule in rules.into_iter().filter(|r| r.is_blocked()) {
        tally
            .entry(rule.source_ip.as_str())
            .and_modify(|entry| {
                entry.count += 1;
                entry.last_seen = entry.last_seen.max(rule.observed_at);
            })
            .or_insert_with(|| AttackingIp {
                ip: rule.source_ip.clone(),
                count: 1,
                last_seen: rule.observed_at,
            });
    }

    let mut ranked: Vec<AttackingIp> = tally.into_values().collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.ip.cmp(&b.ip)));
    ranked.truncate(limit);
    ranked
}

/// Blocked rules observed at or after `since`
pub fn blocked_since<'a, I>(rules: I, since: DateTime<Utc>) -> usize
where
    I: IntoIterator<Item = &'a FirewallRule>,
{
    rules
        .into_iter()
        .filter(|r| r.is_blocked() && r.observed_at >= since)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::firewall::RuleAction;

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn rule(ip: &str, action: RuleAction, observed_at: DateTime<Utc>) -> FirewallRule {
        FirewallRule {
            id: 0,
            source_ip: ip.to_string(),
            action,
            reason: String::new(),
            target: String::new(),
            observed_at,
        }
    }

    #[test]
    fn test_labels_are_hour_aligned() {
        let trend = attack_trend(std::iter::empty(), at("2024-05-01T14:37:12Z"), false);

        let labels: Vec<&str> = trend.iter().map(|b| b.hour.as_str()).collect();
        assert_eq!(
            labels,
            vec!["09:00 UTC", "10:00 UTC", "11:00 UTC", "12:00 UTC", "13:00 UTC", "14:00 UTC"]
        );
        assert!(trend.iter().all(|b| b.count == 0));
    }

    #[test]
    fn test_counts_land_in_their_hour() {
        let now = at("2024-05-01T14:37:00Z");
        let rules = vec![
            rule("10.0.0.1", RuleAction::Blocked, at("2024-05-01T14:01:00Z")),
            rule("10.0.0.2", RuleAction::Blocked, at("2024-05-01T14:35:00Z")),
            rule("10.0.0.3", RuleAction::Blocked, at("2024-05-01T13:59:59Z")),
            rule("10.0.0.4", RuleAction::Blocked, at("2024-05-01T09:00:00Z")),
            // Outside the window
            rule("10.0.0.5", RuleAction::Blocked, at("2024-05-01T08:59:59Z")),
            rule("10.0.0.6", RuleAction::Blocked, at("2024-05-01T15:00:00Z")),
            // Not blocked
            rule("10.0.0.7", RuleAction::Allowed, at("2024-05-01T14:10:00Z")),
        ];

        let counts: Vec<usize> = attack_trend(&rules, now, false)
            .iter()
            .map(|b| b.count)
            .collect();
        assert_eq!(counts, vec![1, 0, 0, 0, 1, 2]);
    }

    #[test]
    fn test_demo_data_only_fills_empty_buckets() {
        let now = at("2024-05-01T14:37:00Z");
        let rules = vec![rule("10.0.0.1", RuleAction::Blocked, at("2024-05-01T12:15:00Z"))];

        let counts: Vec<usize> = attack_trend(&rules, now, true)
            .iter()
            .map(|b| b.count)
            .collect();
        assert_eq!(counts, vec![0, 10, 20, 1, 40, 50]);
    }

    #[test]
    fn test_top_attacking_ips_ranking() {
        let t = at("2024-05-01T12:00:00Z");
        let later = at("2024-05-01T13:00:00Z");
        let rules = vec![
            rule("10.0.0.2", RuleAction::Blocked, t),
            rule("10.0.0.1", RuleAction::Blocked, t),
            rule("10.0.0.1", RuleAction::Blocked, later),
            rule("10.0.0.3", RuleAction::Blocked, t),
            rule("10.0.0.9", RuleAction::Allowed, t),
        ];

        let top = top_attacking_ips(&rules, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].ip, "10.0.0.1");
        assert_eq!(top[0].count, 2);
        assert_eq!(top[0].last_seen, later);
        // Tie broken by address
        assert_eq!(top[1].ip, "10.0.0.2");
    }

    #[test]
    fn test_blocked_since() {
        let rules = vec![
            rule("10.0.0.1", RuleAction::Blocked, at("2024-05-01T12:00:00Z")),
            rule("10.0.0.2", RuleAction::Blocked, at("2024-04-29T12:00:00Z")),
            rule("10.0.0.3", RuleAction::Allowed, at("2024-05-01T12:00:00Z")),
        ];
        assert_eq!(blocked_since(&rules, at("2024-04-30T13:00:00Z")), 1);
    }
}
