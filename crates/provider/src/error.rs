//! Error taxonomy of the session core.

use decoy_host::{HostError, Identity};
use thiserror::Error;

/// Why an admission attempt failed.
///
/// Every variant leaves the host tables exactly as they were before the
/// attempt; partial state is never observable (see `admission`). There is no
/// automatic retry anywhere; callers retry with a fresh attempt if they want
/// to.
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// The identity is already live in the host connection table, or another
    /// admission for it is currently in flight.
    #[error("identity {0} is already connected or being admitted")]
    DuplicateIdentity(Identity),

    /// The operator-configured cap on simultaneous simulated sessions is hit.
    #[error("session cap reached ({active} active, cap {max})")]
    CapacityExceeded { active: usize, max: u32 },

    /// The profile used for the spawn carries no skin configuration.
    #[error("profile has no skin configuration")]
    MissingSkinConfiguration,

    /// The host blacklist (or a ban hook) rejected the pending connection.
    #[error("banned: {reason} ({remaining_secs}s remaining)")]
    Banned { reason: String, remaining_secs: u32 },

    /// A validity hook rejected the pending connection.
    #[error("rejected by host: {explanation}")]
    RejectedByHost { explanation: String },

    /// The accept call went through but the connection never appeared in the
    /// live table: some host component vetoed it without raising anything.
    #[error("host silently rejected the connection")]
    SilentlyRejected,

    /// Host infrastructure fault (main context gone, unknown clone source).
    #[error(transparent)]
    Host(#[from] HostError),
}

/// Lookup failures of the session registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("unsupported search mode")]
    UnsupportedSearchMode,
}
