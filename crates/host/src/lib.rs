//! Host capability surface consumed by the decoy session core.
//!
//! The game host keeps a single mutable connection table (live clients plus
//! pending connection attempts) that is only safe to touch from one logical
//! task. This crate models that boundary:
//!
//! - [`HostState`] owns the tables, the blacklist and the extensibility hooks.
//! - [`MainContextHandle`] is the scoped "run-on-main" primitive every other
//!   component uses to marshal table mutation onto the owning task.
//! - [`HostSignal`] carries disconnect/shutdown notifications out of the host.
//!
//! Nothing in here knows about decoy sessions; it is the seam the provider
//! crate plugs into, and the seam tests replace with hook-instrumented states.

pub mod client;
pub mod events;
pub mod hooks;
pub mod identity;
pub mod main_context;
pub mod state;

pub use client::{
    ChatMessage, ClientProfile, Color, ConnectedClient, ConnectionHandle, Cosmetics, Loadout,
    PendingClient, PlayerNames,
};
pub use events::{HostError, HostSignal, SearchMode};
pub use hooks::{BanVerdict, ValidityVerdict};
pub use identity::Identity;
pub use main_context::MainContextHandle;
pub use state::{BanEntry, HostConfig, HostState};
