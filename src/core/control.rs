//! Firewall control plane
//!
//! All mutating security operations go through [`FirewallControl`]. Each one
//! is a single store mutation that also records the matching audit entry, so
//! an action and its audit trail are persisted together.
//!
//! # Enforcement handoff
//!
//! `config.enabled` is the *desired* state and `applied` is what the OS
//! command last confirmed. [`FirewallControl::toggle`] flips the desired
//! state, persists it and returns immediately; a supervised background task
//! then runs the enforcement command and records the applied state. The
//! caller gets an [`ApplyHandle`] it may await or drop.
//!
//! Applies are serialized by a mutex and always apply the desired state
//! *current at execution time*, never the one captured at spawn, so
//! back-to-back toggles cannot leave the OS in a stale state.
//! [`FirewallControl::run_reconciler`] retries until desired == applied.

use crate::audit::{self, AdminAction, AuditLogEntry, SYSTEM_ACTOR};
use crate::core::enforcement::Enforcer;
use crate::core::error::{EnforcementErrorPattern, Error, Result};
use crate::core::firewall::{FirewallConfig, FirewallRule, NewRule};
use crate::core::score::{self, Finding};
use crate::core::store::{Commit, SecurityStore};
use crate::validators;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast, oneshot};
use tracing::{debug, error, info, warn};

/// Result of a toggle: the new desired state and the pending apply
#[derive(Debug)]
pub struct Toggled {
    /// Desired enforcement state after the flip
    pub enabled: bool,
    pub apply: ApplyHandle,
}

/// Completion of a background enforcement apply
#[derive(Debug)]
pub struct ApplyHandle {
    rx: oneshot::Receiver<Result<bool>>,
}

impl ApplyHandle {
    /// Waits for the apply to finish.
    ///
    /// Returns the state the OS firewall was set to.
    ///
    /// # Errors
    ///
    /// The enforcement error, or [`Error::Internal`] if the task died.
    pub async fn wait(self) -> Result<bool> {
        self.rx
            .await
            .map_err(|_| Error::Internal("Enforcement task ended without a result".to_string()))?
    }
}

/// What a reconciliation pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    InSync,
    Applied(bool),
    Failed,
}

/// Outcome of a security scan
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub score: u8,
    pub findings: Vec<Finding>,
    pub scanned_at: DateTime<Utc>,
}

/// Mutating operations over the shared security state
pub struct FirewallControl<E: Enforcer> {
    store: Arc<SecurityStore>,
    enforcer: Arc<E>,
    apply_lock: Arc<Mutex<()>>,
}

impl<E: Enforcer> Clone for FirewallControl<E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            enforcer: Arc::clone(&self.enforcer),
            apply_lock: Arc::clone(&self.apply_lock),
        }
    }
}

impl<E: Enforcer> FirewallControl<E> {
    pub fn new(store: Arc<SecurityStore>, enforcer: E) -> Self {
        Self {
            store,
            enforcer: Arc::new(enforcer),
            apply_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn store(&self) -> &Arc<SecurityStore> {
        &self.store
    }

    /// Current enforcement config
    pub async fn config(&self) -> FirewallConfig {
        self.store.read().await.config.clone()
    }

    /// Adds a rule with a fresh id and the current time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the source is not an IP or CIDR.
    pub async fn add_rule(&self, actor: &str, draft: NewRule) -> Result<Commit<FirewallRule>> {
        let source_ip = validators::validate_source_ip(&draft.source_ip)
            .map_err(|msg| Error::validation("source_ip", msg))?;
        let draft = NewRule { source_ip, ..draft };

        let now = Utc::now();
        let commit = self
            .store
            .mutate(|state| {
                let rule = state.insert_rule(draft, now);
                state.record_audit(
                    actor,
                    AdminAction::AddFirewallRule.as_ref(),
                    &format!("{} {}", rule.action, rule.source_ip),
                    now,
                );
                rule
            })
            .await;

        info!(
            id = commit.value().id,
            "Added {} rule for {}",
            commit.value().action,
            commit.value().source_ip
        );
        Ok(commit)
    }

    /// Flips the desired enforcement state and dispatches the OS apply.
    ///
    /// Returns once the new state is committed (and persisted, unless the
    /// commit says otherwise). The OS command runs in the background.
    pub async fn toggle(&self, actor: &str) -> Commit<Toggled> {
        let now = Utc::now();
        let commit = self
            .store
            .mutate(|state| {
                state.config.enabled = !state.config.enabled;
                let enabled = state.config.enabled;
                state.record_audit(
                    actor,
                    AdminAction::ToggleFirewall.as_ref(),
                    &format!("Enabled: {enabled}"),
                    now,
                );
                enabled
            })
            .await;

        info!("Firewall enforcement desired state: {}", commit.value());
        let apply = self.dispatch_apply();
        commit.map(|enabled| Toggled { enabled, apply })
    }

    /// Adds a port to the configured list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for malformed ports or duplicates.
    pub async fn add_port(&self, actor: &str, port: &str) -> Result<Commit<FirewallConfig>> {
        let port =
            validators::validate_port_spec(port).map_err(|msg| Error::validation("port", msg))?;
        let now = Utc::now();

        let commit = self
            .store
            .mutate(|state| {
                if state.config.ports.contains(&port) {
                    return Err(Error::validation("port", format!("{port} is already open")));
                }
                state.config.ports.push(port.clone());
                state.record_audit(actor, AdminAction::OpenPort.as_ref(), &port, now);
                Ok(state.config.clone())
            })
            .await;

        commit.transpose()
    }

    /// Removes every occurrence of a port from the configured list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the port is not configured.
    pub async fn remove_port(&self, actor: &str, port: &str) -> Result<Commit<FirewallConfig>> {
        let port = port.trim().to_string();
        let now = Utc::now();

        let commit = self
            .store
            .mutate(|state| {
                let before = state.config.ports.len();
                state.config.ports.retain(|p| p != &port);
                if state.config.ports.len() == before {
                    return Err(Error::validation("port", format!("{port} is not open")));
                }
                state.record_audit(actor, AdminAction::ClosePort.as_ref(), &port, now);
                Ok(state.config.clone())
            })
            .await;

        commit.transpose()
    }

    /// Scores the current config and records the scan in the audit log
    pub async fn run_scan(&self, actor: &str) -> Commit<ScanReport> {
        let now = Utc::now();
        self.store
            .mutate(|state| {
                state.record_audit(actor, AdminAction::RunSecurityScan.as_ref(), "Full System", now);
                ScanReport {
                    score: score::security_score(&state.config),
                    findings: score::findings(&state.config),
                    scanned_at: now,
                }
            })
            .await
    }

    /// Records an arbitrary administrative action
    pub async fn record(&self, actor: &str, action: &str, target: &str) -> Commit<AuditLogEntry> {
        audit::record(&self.store, actor, action, target).await
    }

    /// Spawns a supervised apply of the desired state
    fn dispatch_apply(&self) -> ApplyHandle {
        let (tx, rx) = oneshot::channel();
        let control = self.clone();

        tokio::spawn(async move {
            let result = control.apply_desired().await;
            // The caller may not be waiting
            let _ = tx.send(result);
        });

        ApplyHandle { rx }
    }

    /// Applies whatever state is desired right now and records it as applied
    async fn apply_desired(&self) -> Result<bool> {
        let _serialized = self.apply_lock.lock().await;
        let desired = self.store.read().await.config.enabled;

        match self.enforcer.apply(desired).await {
            Ok(()) => {
                let commit = self
                    .store
                    .mutate(|state| state.applied = Some(desired))
                    .await;
                if let Some(e) = commit.persist_error() {
                    warn!("Applied state {desired} not persisted: {e}");
                }
                Ok(desired)
            }
            Err(e) => {
                let hints = match &e {
                    Error::ExternalCommand {
                        stderr: Some(stderr),
                        ..
                    } => EnforcementErrorPattern::match_error(stderr).suggestions,
                    _ => Vec::new(),
                };
                error!(
                    desired,
                    "Firewall state not applied, desired and applied now differ: {e}"
                );
                for hint in hints {
                    warn!("  hint: {hint}");
                }
                Err(e)
            }
        }
    }

    /// One reconciliation pass: applies the desired state if it differs
    pub async fn reconcile_once(&self) -> Reconciled {
        let status = self.store.read().await.enforcement_status();
        if status.in_sync {
            debug!("Enforcement in sync ({})", status.desired);
            return Reconciled::InSync;
        }

        info!(
            desired = status.desired,
            applied = ?status.applied,
            "Enforcement out of sync, reconciling"
        );
        match self.apply_desired().await {
            Ok(state) => Reconciled::Applied(state),
            Err(_) => Reconciled::Failed,
        }
    }

    /// Reconciles every `interval` until shutdown is signalled
    pub async fn run_reconciler(&self, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("Enforcement reconciler started (every {:?})", interval);

        // Only the first failure of an outage is audited
        let mut failing = false;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Enforcement reconciler stopping");
                    return;
                }
                _ = ticker.tick() => match self.reconcile_once().await {
                    Reconciled::Failed if !failing => {
                        failing = true;
                        let _ = self
                            .record(SYSTEM_ACTOR, "Enforcement Failed", "Reconciler will retry")
                            .await;
                    }
                    Reconciled::Failed => {}
                    _ if failing => {
                        failing = false;
                        info!("Enforcement recovered");
                    }
                    _ => {}
                },
            }
        }
    }
}
