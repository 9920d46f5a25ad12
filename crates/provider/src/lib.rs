//! Pool of simulated client sessions ("decoys") for a multiplayer game host.
//!
//! A decoy occupies a real slot in the host's connection table: it passes the
//! same admission checks as a human player, holds a numeric identity from a
//! pre-declared pool, and answers the host's idle-timeout sweep with a
//! periodic heartbeat. The crate is organized as a pipeline:
//!
//! - [`IdentityPool`] hands out collision-free identities (FIFO, file-backed).
//! - The admission pipeline ([`DecoyProvider::admit`]) turns an identity plus
//!   a [`ProfileDescriptor`] into a live [`Session`], with transactional
//!   rollback on every failure path.
//! - [`SessionRegistry`] tracks active sessions and serves lookup, broadcast,
//!   ban and kick for the hosting command layer.
//! - The lifecycle loops keep sessions alive and tear them down when the host
//!   drops them or shuts down.
//!
//! All host-table access is marshalled through the
//! [`decoy_host::MainContextHandle`] capability; nothing in this crate touches
//! the table directly.

pub mod admission;
pub mod commands;
pub mod config;
pub mod error;
pub mod idpool;
pub mod lifecycle;
pub mod profile;
pub mod provider;
pub mod registry;
pub mod session;

pub use admission::AdmissionRequest;
pub use config::Config;
pub use error::{AdmissionError, SearchError};
pub use idpool::IdentityPool;
pub use profile::ProfileDescriptor;
pub use provider::DecoyProvider;
pub use registry::SessionRegistry;
pub use session::Session;

/// The only actor type this provider services.
pub const PLAYER_USER_TYPE: &str = "player";

/// Whether `user_type` names the actor type simulated sessions belong to.
/// Comparison is case-insensitive, matching the hosting command layer.
pub fn supports_user_type(user_type: &str) -> bool {
    user_type.eq_ignore_ascii_case(PLAYER_USER_TYPE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_type_gate_is_case_insensitive() {
        assert!(supports_user_type("player"));
        assert!(supports_user_type("Player"));
        assert!(supports_user_type("PLAYER"));
        assert!(!supports_user_type("vehicle"));
        assert!(!supports_user_type(""));
    }
}
