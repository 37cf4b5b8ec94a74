//! Shared test utilities for core module tests
//!
//! This module is only compiled in test mode.

use crate::core::enforcement::Enforcer;
use crate::core::error::{Error, Result};
use crate::core::firewall::{NewRule, RuleAction};
use crate::core::store::SecurityStore;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Mutex for tests that need exclusive access to environment variables.
///
/// # Example
///
/// ```ignore
/// let _guard = ENV_VAR_MUTEX.lock().unwrap();
/// unsafe {
///     std::env::set_var("PANELGUARD_ELEVATION_METHOD", "sudo");
/// }
/// // ... test with custom env state ...
/// unsafe {
///     std::env::remove_var("PANELGUARD_ELEVATION_METHOD");
/// }
/// ```
pub static ENV_VAR_MUTEX: Mutex<()> = Mutex::new(());

/// Enforcer that records every requested state instead of running a command
#[derive(Debug, Default)]
pub struct FakeEnforcer {
    calls: Arc<Mutex<Vec<bool>>>,
    fail: bool,
    delay: Option<Duration>,
}

impl FakeEnforcer {
    /// Every apply fails the way a rejected `ufw` call would
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Each apply sleeps before returning
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared view of the states applied so far, in order
    pub fn calls(&self) -> Arc<Mutex<Vec<bool>>> {
        Arc::clone(&self.calls)
    }
}

impl Enforcer for FakeEnforcer {
    async fn apply(&self, enabled: bool) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(Error::ExternalCommand {
                message: "Permission denied".to_string(),
                stderr: Some("ERROR: You need to be root to run this script".to_string()),
                exit_code: Some(1),
            });
        }
        self.calls.lock().unwrap().push(enabled);
        Ok(())
    }
}

/// Store backed by a fresh temp directory.
/// Keep the `TempDir` alive for as long as the store is used.
pub async fn temp_store() -> (TempDir, Arc<SecurityStore>) {
    let dir = tempfile::tempdir().unwrap();
    let store = SecurityStore::open_in(dir.path()).await.unwrap();
    (dir, Arc::new(store))
}

/// Blocked-rule draft for `ip` with a fixed reason
pub fn blocked(ip: &str) -> NewRule {
    NewRule::new(ip, RuleAction::Blocked).reason("Brute force")
}
