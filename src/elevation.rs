//! Privilege elevation for the enforcement command
//!
//! The panel may run unprivileged; only the firewall frontend (`ufw` by
//! default) is run with root privileges, and only with fixed arguments.
//!
//! # Elevation Strategy
//!
//! - Running as root: the command is executed directly
//! - **Preferred**: `run0` when available (systemd v256+, no SUID)
//! - **Interactive fallback**: `sudo` when stdin is a terminal
//! - **Service fallback**: `pkexec`
//!
//! # Environment Variables
//!
//! - `PANELGUARD_ELEVATION_METHOD`: Force a specific elevation method (`sudo`, `run0`, or `pkexec`).
//!   Useful with sudoers NOPASSWD rules for the service account.
//! - `PANELGUARD_TEST_NO_ELEVATION`: Bypass elevation entirely (for testing only).
//!
//! # Security
//!
//! - Arguments are passed without shell interpolation
//! - The program comes from the panel configuration, never from request input
//!
//! # Example
//!
//! ```no_run
//! use panelguard::elevation::create_elevated_firewall_command;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut cmd = create_elevated_firewall_command("ufw", &["status"])?;
//! let output = cmd.output().await?;
//! # Ok(())
//! # }
//! ```

use std::io;
use tokio::process::Command;

/// Error type for privilege elevation operations
#[derive(Debug, thiserror::Error)]
pub enum ElevationError {
    /// pkexec binary not found in PATH
    #[error("pkexec not found - please install PolicyKit")]
    PkexecNotFound,

    /// Requested elevation method is not available (binary not found)
    #[error("Elevation method '{0}' is not available (binary not found)")]
    MethodNotAvailable(String),

    /// Invalid value for `PANELGUARD_ELEVATION_METHOD`
    #[error("Invalid PANELGUARD_ELEVATION_METHOD '{0}'. Valid options: sudo, run0, pkexec")]
    InvalidMethod(String),

    /// Empty program name in configuration
    #[error("No enforcement program configured")]
    EmptyProgram,

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Checks if a binary exists in PATH
fn binary_exists(name: &str) -> bool {
    std::env::var_os("PATH")
        .and_then(|paths| {
            std::env::split_paths(&paths).find_map(|dir| {
                let full_path = dir.join(name);
                if full_path.is_file() {
                    Some(full_path)
                } else {
                    None
                }
            })
        })
        .is_some()
}

fn wrapped(wrapper: &str, program: &str, args: &[&str]) -> Command {
    let mut cmd = Command::new(wrapper);
    cmd.arg(program).args(args);
    cmd
}

fn direct(program: &str, args: &[&str]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd
}

/// Builds an elevated command for the configured firewall frontend.
///
/// # Errors
///
/// Returns `Err` if the program is empty, the forced method is unknown or
/// unavailable, or no elevation method exists.
pub fn create_elevated_firewall_command(
    program: &str,
    args: &[&str],
) -> Result<Command, ElevationError> {
    use std::os::fd::AsFd;

    if program.trim().is_empty() {
        return Err(ElevationError::EmptyProgram);
    }

    // 1. Strict Test Mode Override (Highest Priority)
    if std::env::var("PANELGUARD_TEST_NO_ELEVATION").is_ok() {
        return Ok(direct(program, args));
    }

    // 2. Direct Root Execution (No prompt needed)
    if nix::unistd::getuid().is_root() {
        return Ok(direct(program, args));
    }

    // 3. Explicit elevation method override
    if let Ok(method) = std::env::var("PANELGUARD_ELEVATION_METHOD") {
        let method = method.to_lowercase();
        if !method.is_empty() {
            return match method.as_str() {
                "sudo" | "run0" | "pkexec" => {
                    if binary_exists(&method) {
                        Ok(wrapped(&method, program, args))
                    } else {
                        Err(ElevationError::MethodNotAvailable(method))
                    }
                }
                _ => Err(ElevationError::InvalidMethod(method)),
            };
        }
    }

    // 4. Automatic detection - prefer run0 (modern, no SUID), fallback to sudo/pkexec
    if binary_exists("run0") {
        return Ok(wrapped("run0", program, args));
    }

    let is_atty = nix::unistd::isatty(std::io::stdin().as_fd()).unwrap_or(false);
    if is_atty {
        Ok(wrapped("sudo", program, args))
    } else {
        if !binary_exists("pkexec") {
            return Err(ElevationError::PkexecNotFound);
        }
        Ok(wrapped("pkexec", program, args))
    }
}
