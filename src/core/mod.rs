//! Core security state functionality
//!
//! - [`state`]: The persisted security aggregate and its transitions
//! - [`store`]: Lock-guarded owner of the state and its JSON document
//! - [`control`]: Mutating operations and enforcement handoff
//! - [`enforcement`]: Applying the enabled state to the OS firewall
//! - [`firewall`]: Rule and config data structures
//! - [`score`], [`trend`], [`summary`]: Read-time aggregation
//! - [`timefmt`]: Timestamp parsing and relative display
//! - [`error`]: Error types

pub mod control;
pub mod enforcement;
pub mod error;
pub mod firewall;
pub mod score;
pub mod state;
pub mod store;
pub mod summary;
pub mod timefmt;
pub mod trend;

#[cfg(test)]
pub mod test_helpers;
