//! panelguard - security state core for a server administration panel
//!
//! Owns the panel's security document (firewall rules, audit trail,
//! enforcement config, blocked addresses), applies the enforcement state to
//! the OS firewall, and streams recent log lines to dashboard clients.
//!
//! # Architecture
//!
//! - [`core`] - State store, control plane, scoring and trend aggregation
//! - [`audit`] - Bounded audit trail of administrative actions
//! - [`stream`] - Per-client log tail loops
//! - [`validators`] - Input validation and sanitization
//! - [`elevation`] - Privilege elevation for the enforcement command
//! - [`config`] - Configuration persistence
//! - [`utils`] - Utility functions (XDG directories, etc.)
//!
//! # Safety Features
//!
//! - One writer: every change goes through the store's write lock
//! - Atomic state writes with SHA-256 checksums and 0o600 permissions
//! - Desired/applied enforcement tracking with background reconciliation
//! - Input sanitization and validation before anything is stored

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]

pub mod audit;
pub mod config;
pub mod core;
pub mod elevation;
pub mod stream;
pub mod utils;
pub mod validators;

// Re-export commonly used types
pub use core::control::FirewallControl;
pub use core::error::{Error, Result};
pub use core::store::{Commit, SecurityStore};
