//! VCS vendor adapters
//!
//! Each vendor converts an authenticated webhook delivery into a
//! [`pocketci_core::domain::event::NormalizedEvent`]. Only GitHub is wired in
//! today; new vendors slot in next to it and get picked in the
//! orchestrator's vendor dispatch.

pub mod github;
