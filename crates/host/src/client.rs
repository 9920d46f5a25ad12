//! Connection-table records and the per-connection capability handle.

use std::net::Ipv4Addr;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::events::HostError;
use crate::identity::Identity;
use crate::main_context::MainContextHandle;

/// RGB chat color. The host renders white when callers do not care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color {
        r: 255,
        g: 255,
        b: 255,
    };
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

/// The three name fields the host tracks per connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerNames {
    pub player_name: String,
    pub character_name: String,
    pub nick_name: String,
}

impl PlayerNames {
    /// All three fields set to the same value (operator-supplied names).
    pub fn uniform(name: &str) -> Self {
        Self {
            player_name: name.to_owned(),
            character_name: name.to_owned(),
            nick_name: name.to_owned(),
        }
    }
}

/// Appearance attributes carried through admission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cosmetics {
    pub face_id: u32,
    pub hair_id: u32,
    pub beard_id: u32,
    pub skin_color: Color,
    pub hair_color: Color,
    pub marker_color: Color,
    pub left_handed: bool,
}

/// Cosmetic item ids, one per equipment slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loadout {
    pub shirt: u64,
    pub pants: u64,
    pub hat: u64,
    pub backpack: u64,
    pub vest: u64,
    pub mask: u64,
    pub glasses: u64,
}

/// Everything the host keeps about one connection besides its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientProfile {
    pub names: PlayerNames,
    pub character_id: u8,
    pub group_id: u64,
    pub pro: bool,
    pub cosmetics: Cosmetics,
    /// Packaged cosmetic ids as supplied by the client.
    pub loadout: Loadout,
    pub skillset: u8,
    pub language: String,
    pub hwid: [u8; 20],
    pub ip: Ipv4Addr,
}

impl Default for ClientProfile {
    fn default() -> Self {
        Self {
            names: PlayerNames::default(),
            character_id: 0,
            group_id: 0,
            pro: false,
            cosmetics: Cosmetics::default(),
            loadout: Loadout::default(),
            skillset: 0,
            language: "English".to_owned(),
            hwid: [0; 20],
            ip: Ipv4Addr::UNSPECIFIED,
        }
    }
}

/// Provisional record for a connection attempt not yet committed.
#[derive(Debug, Clone)]
pub struct PendingClient {
    pub id: Identity,
    pub profile: ClientProfile,
    /// Item ids promoted from the packaged loadout before the accept call.
    pub equipped: Loadout,
    /// Set on the clone path: proof/group/authentication already verified for
    /// the source connection, the host must not re-check them.
    pub pre_authenticated: bool,
}

impl PendingClient {
    pub fn new(id: Identity, profile: ClientProfile) -> Self {
        Self {
            id,
            profile,
            equipped: Loadout::default(),
            pre_authenticated: false,
        }
    }

    /// Copies the packaged cosmetic ids into the fields the accept call reads.
    pub fn promote_loadout(&mut self) {
        self.equipped = self.profile.loadout;
    }
}

/// A committed entry of the live connection table.
#[derive(Debug)]
pub struct ConnectedClient {
    pub id: Identity,
    pub profile: ClientProfile,
    pub equipped: Loadout,
    /// Liveness marker the host's idle-timeout sweep reads.
    pub last_packet_at: Instant,
    /// Messages delivered to this connection, drained by the wire layer
    /// (or by tests).
    pub mailbox: Vec<ChatMessage>,
    /// A closed delivery path makes sends fail without removing the entry.
    pub reachable: bool,
}

/// One chat line addressed to a single connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub text: String,
    pub color: Color,
}

/// Capability to talk to (and tear down) one live connection.
///
/// All operations marshal onto the main context; the handle itself is cheap
/// to clone and safe to hold from any task.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: Identity,
    main: MainContextHandle,
}

impl ConnectionHandle {
    pub fn new(id: Identity, main: MainContextHandle) -> Self {
        Self { id, main }
    }

    pub fn id(&self) -> Identity {
        self.id
    }

    /// Delivers one chat line to this connection.
    pub async fn send_message(&self, text: impl Into<String>, color: Color) -> Result<(), HostError> {
        let id = self.id;
        let message = ChatMessage {
            text: text.into(),
            color,
        };
        self.main.run(move |host| host.deliver(id, message)).await?
    }

    /// Kicks the underlying connection. Returns whether the host still had it.
    pub async fn disconnect(&self, reason: impl Into<String>) -> Result<bool, HostError> {
        let id = self.id;
        let reason = reason.into();
        self.main.run(move |host| host.kick(id, &reason)).await
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
