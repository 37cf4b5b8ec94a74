use std::path::PathBuf;
use thiserror::Error;

/// Core error types for panelguard
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persisted state exists but could not be parsed.
    ///
    /// Never recovered automatically: the file may hold user data.
    #[error("Cannot read security state at {}: {source}", path.display())]
    Deserialization {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// State write failed after the in-memory mutation was committed
    #[error("Failed to persist security state to {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Enforcement command execution failed
    #[error("Enforcement command failed: {message}")]
    ExternalCommand {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    /// Input validation failed
    #[error("Validation error in {field}: {message}")]
    Validation { field: String, message: String },

    /// Privilege escalation failed
    #[error("Elevation error: {0}")]
    Elevation(#[from] crate::elevation::ElevationError),

    /// Internal logic error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// True for errors that leave memory and disk out of step
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence { .. })
    }
}

/// Represents a translated error with helpful context
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    pub user_message: String,
    pub suggestions: Vec<String>,
}

impl ErrorTranslation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

/// Known failure output of the enforcement command and what to do about it
pub struct EnforcementErrorPattern;

impl EnforcementErrorPattern {
    /// Matches command output against known patterns and returns a user-friendly translation.
    pub fn match_error(msg: &str) -> ErrorTranslation {
        let lower = msg.to_lowercase();

        if lower.contains("need to be root") || lower.contains("permission denied") {
            return ErrorTranslation::new("Insufficient permissions to change the firewall state")
                .with_suggestion("Run the panel as root or configure sudo/run0 for ufw")
                .with_suggestion("Set PANELGUARD_ELEVATION_METHOD to force an elevation method");
        }

        if lower.contains("no such file") || lower.contains("command not found") {
            return ErrorTranslation::new("ufw is not installed or not found in PATH")
                .with_suggestion("Install ufw: sudo apt install ufw  (Debian/Ubuntu)")
                .with_suggestion("Or: sudo dnf install ufw  (Fedora/RHEL)")
                .with_suggestion("Or point enforcement_program at another firewall frontend");
        }

        if lower.contains("iptables") && lower.contains("not found") {
            return ErrorTranslation::new("ufw backend (iptables) is missing")
                .with_suggestion("Install iptables or iptables-nft for your distribution");
        }

        if lower.contains("could not load logging rules") || lower.contains("problem running") {
            return ErrorTranslation::new("ufw failed to load its rule files")
                .with_suggestion("Check /etc/ufw for syntax errors: sudo ufw status verbose")
                .with_suggestion("Reset with: sudo ufw reset (removes all ufw rules)");
        }

        if lower.contains("resource busy") || lower.contains("xtables lock") {
            return ErrorTranslation::new("Firewall backend is locked by another process")
                .with_suggestion("Another firewall manager may be running: systemctl status firewalld")
                .with_suggestion("The reconciler will retry automatically");
        }

        if lower.contains("timed out") || lower.contains("timeout") {
            return ErrorTranslation::new("Enforcement command timed out")
                .with_suggestion("Check system load: uptime")
                .with_suggestion("The reconciler will retry automatically");
        }

        ErrorTranslation::new(format!("Firewall error: {msg}"))
            .with_suggestion("Check the detailed error message for more information")
            .with_suggestion("Verify ufw is working: sudo ufw status")
    }
}

pub type Result<T> = std::result::Result<T, Error>;
