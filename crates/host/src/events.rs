//! Signals and errors surfaced across the host boundary.

use thiserror::Error;

use crate::identity::Identity;

/// Out-of-band notifications emitted by the host while it mutates its own
/// connection table. Delivered on an unbounded channel handed out by
/// [`crate::state::HostState::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSignal {
    /// A client left the live connection table (kick, ban or remote close).
    Disconnected(Identity),
    /// The host started tearing itself down; every connection will be closed
    /// by the host itself.
    CommenceShutdown,
}

/// Errors produced by host primitives.
#[derive(Debug, Error)]
pub enum HostError {
    /// The main execution context stopped accepting work.
    #[error("host main context is closed")]
    ContextClosed,
    /// The referenced client is not present in the live connection table.
    #[error("client {0} is not connected")]
    UnknownClient(Identity),
    /// The client is present but its delivery path is gone.
    #[error("client {0} is not reachable")]
    Unreachable(Identity),
}

/// How the hosting command layer wants a user looked up.
///
/// Marked non-exhaustive: the host may grow further modes the session core
/// does not understand; lookups must reject those instead of guessing.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    FindByNameOrId,
    FindByName,
    FindById,
}
