//! OS-level firewall enforcement
//!
//! The control plane only knows the [`Enforcer`] trait: "make the OS firewall
//! enabled/disabled". [`UfwEnforcer`] implements it by running
//! `ufw --force enable` or `ufw disable`, elevated when needed.

use crate::core::error::{EnforcementErrorPattern, Error, Result};
use std::future::Future;
use std::process::Stdio;
use std::time::Duration;
use tracing::{error, info};

/// Default firewall frontend
pub const DEFAULT_PROGRAM: &str = "ufw";

/// Upper bound on a single enforcement command
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Applies an enabled/disabled state to the OS firewall
pub trait Enforcer: Send + Sync + 'static {
    /// # Errors
    ///
    /// Returns [`Error::ExternalCommand`] (or [`Error::Elevation`]) when the
    /// state could not be applied.
    fn apply(&self, enabled: bool) -> impl Future<Output = Result<()>> + Send;
}

/// Runs the `ufw` frontend (or a compatible program)
#[derive(Debug, Clone)]
pub struct UfwEnforcer {
    program: String,
    elevate: bool,
    timeout: Duration,
}

impl Default for UfwEnforcer {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl UfwEnforcer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            elevate: true,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Runs the program as the current user
    pub fn without_elevation(mut self) -> Self {
        self.elevate = false;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments for the requested state.
    /// `--force` skips ufw's interactive "may disrupt ssh" prompt.
    pub fn args_for(enabled: bool) -> &'static [&'static str] {
        if enabled {
            &["--force", "enable"]
        } else {
            &["disable"]
        }
    }

    fn command(&self, args: &[&str]) -> Result<tokio::process::Command> {
        if self.elevate {
            Ok(crate::elevation::create_elevated_firewall_command(
                &self.program,
                args,
            )?)
        } else {
            let mut cmd = tokio::process::Command::new(&self.program);
            cmd.args(args);
            Ok(cmd)
        }
    }
}

impl Enforcer for UfwEnforcer {
    async fn apply(&self, enabled: bool) -> Result<()> {
        let args = Self::args_for(enabled);
        info!("Applying firewall state via {} {}", self.program, args.join(" "));

        let mut cmd = self.command(args)?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            error!("Failed to spawn {}: {e}", self.program);
            Error::ExternalCommand {
                message: format!("Failed to spawn {}: {e}", self.program),
                stderr: None,
                exit_code: None,
            }
        })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::ExternalCommand {
                message: format!("{} timed out after {:?}", self.program, self.timeout),
                stderr: None,
                exit_code: None,
            })??;

        if output.status.success() {
            info!("Firewall {}", if enabled { "enabled" } else { "disabled" });
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let translation = EnforcementErrorPattern::match_error(&stderr);
            error!(
                exit_code = ?output.status.code(),
                "Enforcement command failed: {stderr}"
            );
            Err(Error::ExternalCommand {
                message: translation.user_message,
                stderr: Some(stderr),
                exit_code: output.status.code(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_for_state() {
        assert_eq!(UfwEnforcer::args_for(true), &["--force", "enable"]);
        assert_eq!(UfwEnforcer::args_for(false), &["disable"]);
    }

    #[tokio::test]
    async fn test_successful_command() {
        let enforcer = UfwEnforcer::new("true").without_elevation();
        assert!(enforcer.apply(true).await.is_ok());
        assert!(enforcer.apply(false).await.is_ok());
    }

    #[tokio::test]
    async fn test_failing_command() {
        let enforcer = UfwEnforcer::new("false").without_elevation();
        let err = enforcer.apply(true).await.unwrap_err();
        assert!(matches!(
            err,
            Error::ExternalCommand {
                exit_code: Some(1),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let enforcer = UfwEnforcer::new("panelguard_nonexistent_binary_xyz").without_elevation();
        let err = enforcer.apply(true).await.unwrap_err();
        assert!(matches!(err, Error::ExternalCommand { exit_code: None, .. }));
    }

    #[tokio::test]
    async fn test_timeout_kills_command() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow-ufw");
        std::fs::write(&script, "#!/bin/sh\nsleep 5\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let enforcer = UfwEnforcer::new(script.to_string_lossy())
            .without_elevation()
            .with_timeout(Duration::from_millis(100));
        let err = enforcer.apply(true).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
