//! The host's single-thread-affine mutable state.
//!
//! `HostState` is never wrapped in a lock. Exactly one task owns it (see
//! [`crate::main_context`]); everyone else submits closures. This mirrors the
//! engine constraint that the connection table may only be mutated from the
//! main loop.

use std::net::Ipv4Addr;
use std::time::Instant;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::client::{ChatMessage, ConnectedClient, PendingClient};
use crate::events::{HostError, HostSignal};
use crate::hooks::{BanVerdict, ValidityVerdict};
use crate::identity::Identity;

/// Third-party ban hook. Receives the pending record, its IPv4 address and the
/// verdict computed from the blacklist so far.
pub type BanHook =
    Box<dyn FnMut(&PendingClient, Ipv4Addr, &mut BanVerdict) -> anyhow::Result<()> + Send>;

/// Third-party validity hook. The verdict starts out accepting.
pub type ValidityHook =
    Box<dyn FnMut(&PendingClient, &mut ValidityVerdict) -> anyhow::Result<()> + Send>;

/// Accept-time veto. Returning `false` silently drops the connection attempt
/// without raising anything (some host components do exactly that).
pub type AcceptFilter = Box<dyn FnMut(&PendingClient) -> bool + Send>;

/// Host-side configuration the session core reads but never writes.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Idle timeout after which the host disconnects a silent client.
    pub timeout_game_secs: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            timeout_game_secs: 30,
        }
    }
}

/// One blacklist record. Matching is by identity; IP and hardware id still
/// flow to the ban hooks for their own matching.
#[derive(Debug, Clone)]
pub struct BanEntry {
    pub target: Identity,
    pub reason: String,
    pub duration_secs: u32,
    pub issued_at: Instant,
}

impl BanEntry {
    fn remaining_secs(&self, now: Instant) -> u32 {
        let elapsed = now.duration_since(self.issued_at).as_secs();
        (self.duration_secs as u64).saturating_sub(elapsed) as u32
    }
}

/// The host's mutable tables plus the extensibility hooks hanging off them.
pub struct HostState {
    config: HostConfig,
    clients: Vec<ConnectedClient>,
    pending: Vec<PendingClient>,
    blacklist: Vec<BanEntry>,
    ban_hooks: Vec<BanHook>,
    validity_hooks: Vec<ValidityHook>,
    accept_filters: Vec<AcceptFilter>,
    signals: UnboundedSender<HostSignal>,
    /// Console join/leave logging toggle; admission flips this off while a
    /// simulated connection goes through so the log stays readable.
    pub log_join_leave: bool,
}

impl HostState {
    /// Creates the state together with the receiving end of its signal stream.
    pub fn new(config: HostConfig) -> (Self, UnboundedReceiver<HostSignal>) {
        let (signals, signal_rx) = mpsc::unbounded_channel();
        (
            Self {
                config,
                clients: Vec::new(),
                pending: Vec::new(),
                blacklist: Vec::new(),
                ban_hooks: Vec::new(),
                validity_hooks: Vec::new(),
                accept_filters: Vec::new(),
                signals,
                log_join_leave: true,
            },
            signal_rx,
        )
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    // ---------------------------------------------------------------------
    // Pending-connection list
    // ---------------------------------------------------------------------

    pub fn register_pending(&mut self, pending: PendingClient) {
        tracing::debug!(target: "host::main", id = %pending.id, "pending connection registered");
        self.pending.push(pending);
    }

    /// Removes the pending entry for `id`. Absence is not an error.
    pub fn remove_pending(&mut self, id: Identity) -> bool {
        let before = self.pending.len();
        self.pending.retain(|p| p.id != id);
        before != self.pending.len()
    }

    pub fn pending_contains(&self, id: Identity) -> bool {
        self.pending.iter().any(|p| p.id == id)
    }

    // ---------------------------------------------------------------------
    // Live connection table
    // ---------------------------------------------------------------------

    pub fn clients_contain(&self, id: Identity) -> bool {
        self.clients.iter().any(|c| c.id == id)
    }

    pub fn client(&self, id: Identity) -> Option<&ConnectedClient> {
        self.clients.iter().find(|c| c.id == id)
    }

    /// Identity of the most recently appended live connection, if any.
    pub fn last_client_id(&self) -> Option<Identity> {
        self.clients.last().map(|c| c.id)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// The accept primitive. Consumes the pending entry for `id` and appends
    /// a live connection unless an accept filter vetoes it.
    ///
    /// Deliberately returns nothing: a vetoed accept is indistinguishable from
    /// a successful one at the call site. Callers verify by inspecting
    /// [`HostState::last_client_id`].
    pub fn accept(&mut self, id: Identity) {
        let Some(index) = self.pending.iter().position(|p| p.id == id) else {
            tracing::warn!(target: "host::main", %id, "accept called without a pending entry");
            return;
        };
        let pending = self.pending.remove(index);

        for filter in &mut self.accept_filters {
            if !filter(&pending) {
                tracing::debug!(target: "host::main", %id, "accept vetoed by filter");
                return;
            }
        }

        if self.log_join_leave {
            tracing::info!(target: "host::main", %id, name = %pending.profile.names.character_name, "client joined");
        }
        self.clients.push(ConnectedClient {
            id: pending.id,
            profile: pending.profile,
            equipped: pending.equipped,
            last_packet_at: Instant::now(),
            mailbox: Vec::new(),
            reachable: true,
        });
    }

    /// Removes a live entry without emitting a disconnect signal (rollback
    /// path after a failed commit).
    pub fn remove_client(&mut self, id: Identity) -> bool {
        let before = self.clients.len();
        self.clients.retain(|c| c.id != id);
        before != self.clients.len()
    }

    /// Kicks a live connection and notifies listeners. Returns whether the
    /// client was present.
    pub fn kick(&mut self, id: Identity, reason: &str) -> bool {
        if !self.remove_client(id) {
            return false;
        }
        if self.log_join_leave {
            tracing::info!(target: "host::main", %id, reason, "client left");
        }
        let _ = self.signals.send(HostSignal::Disconnected(id));
        true
    }

    // ---------------------------------------------------------------------
    // Message delivery
    // ---------------------------------------------------------------------

    pub fn deliver(&mut self, id: Identity, message: ChatMessage) -> Result<(), HostError> {
        let client = self
            .clients
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(HostError::UnknownClient(id))?;
        if !client.reachable {
            return Err(HostError::Unreachable(id));
        }
        client.mailbox.push(message);
        Ok(())
    }

    /// Marks a live connection's delivery path open or closed. Returns
    /// whether the client was present.
    pub fn set_reachable(&mut self, id: Identity, reachable: bool) -> bool {
        match self.clients.iter_mut().find(|c| c.id == id) {
            Some(client) => {
                client.reachable = reachable;
                true
            }
            None => false,
        }
    }

    /// Drains everything delivered to `id` so far.
    pub fn take_messages(&mut self, id: Identity) -> Vec<ChatMessage> {
        self.clients
            .iter_mut()
            .find(|c| c.id == id)
            .map(|c| std::mem::take(&mut c.mailbox))
            .unwrap_or_default()
    }

    // ---------------------------------------------------------------------
    // Ban / validity checks
    // ---------------------------------------------------------------------

    /// Blacklist check followed by the ban-hook chain. A hook fault is logged
    /// and discarded; the verdict computed before the fault stands.
    pub fn check_banned(&mut self, pending: &PendingClient) -> BanVerdict {
        let now = Instant::now();
        let mut verdict = BanVerdict::default();
        if let Some(entry) = self
            .blacklist
            .iter()
            .find(|e| e.target == pending.id && e.remaining_secs(now) > 0)
        {
            verdict.banned = true;
            verdict.reason = entry.reason.clone();
            verdict.remaining_secs = entry.remaining_secs(now);
        }

        let ip = pending.profile.ip;
        for hook in &mut self.ban_hooks {
            if let Err(error) = hook(pending, ip, &mut verdict) {
                tracing::error!(target: "host::main", %error, id = %pending.id, "ban hook raised an error");
            }
        }
        verdict
    }

    /// Default-accept validity verdict run through the validity-hook chain,
    /// with the same fault isolation as [`HostState::check_banned`].
    pub fn check_valid(&mut self, pending: &PendingClient) -> ValidityVerdict {
        let mut verdict = ValidityVerdict::default();
        for hook in &mut self.validity_hooks {
            if let Err(error) = hook(pending, &mut verdict) {
                tracing::error!(target: "host::main", %error, id = %pending.id, "validity hook raised an error");
            }
        }
        verdict
    }

    /// Records a ban and kicks the target if it is connected. Returns whether
    /// a live connection was removed.
    pub fn request_ban(
        &mut self,
        instigator: Identity,
        target: Identity,
        reason: &str,
        duration_secs: u32,
    ) -> bool {
        tracing::info!(
            target: "host::main",
            %instigator,
            %target,
            reason,
            duration_secs,
            "ban requested"
        );
        self.blacklist.push(BanEntry {
            target,
            reason: reason.to_owned(),
            duration_secs,
            issued_at: Instant::now(),
        });
        self.kick(target, reason)
    }

    pub fn add_ban_hook(&mut self, hook: BanHook) {
        self.ban_hooks.push(hook);
    }

    pub fn add_validity_hook(&mut self, hook: ValidityHook) {
        self.validity_hooks.push(hook);
    }

    pub fn add_accept_filter(&mut self, filter: AcceptFilter) {
        self.accept_filters.push(filter);
    }

    pub fn add_blacklist_entry(&mut self, entry: BanEntry) {
        self.blacklist.push(entry);
    }

    // ---------------------------------------------------------------------
    // Liveness
    // ---------------------------------------------------------------------

    /// Refreshes the liveness marker of every listed client.
    pub fn touch(&mut self, ids: &[Identity], now: Instant) {
        for client in &mut self.clients {
            if ids.contains(&client.id) {
                client.last_packet_at = now;
            }
        }
    }

    /// The host's idle sweep: kicks every client silent for longer than the
    /// configured timeout.
    pub fn disconnect_idle(&mut self, now: Instant) {
        let timeout = self.config.timeout_game_secs;
        let idle: Vec<Identity> = self
            .clients
            .iter()
            .filter(|c| now.duration_since(c.last_packet_at).as_secs() >= timeout)
            .map(|c| c.id)
            .collect();
        for id in idle {
            tracing::debug!(target: "host::main", %id, "idle timeout");
            self.kick(id, "timeout");
        }
    }

    // ---------------------------------------------------------------------
    // Shutdown
    // ---------------------------------------------------------------------

    /// Announces host teardown. The host closes every connection itself after
    /// this; listeners must not race it with their own disposal calls.
    pub fn commence_shutdown(&mut self) {
        let _ = self.signals.send(HostSignal::CommenceShutdown);
    }
}

impl std::fmt::Debug for HostState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostState")
            .field("clients", &self.clients.len())
            .field("pending", &self.pending.len())
            .field("blacklist", &self.blacklist.len())
            .field("log_join_leave", &self.log_join_leave)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientProfile;
    use std::time::Duration;

    fn pending(raw: u64) -> PendingClient {
        PendingClient::new(Identity::new(raw), ClientProfile::default())
    }

    fn state() -> (HostState, UnboundedReceiver<HostSignal>) {
        HostState::new(HostConfig::default())
    }

    #[test]
    fn accept_moves_pending_to_clients() {
        let (mut host, _rx) = state();
        host.register_pending(pending(5));
        host.accept(Identity::new(5));
        assert!(host.clients_contain(Identity::new(5)));
        assert!(!host.pending_contains(Identity::new(5)));
        assert_eq!(host.last_client_id(), Some(Identity::new(5)));
    }

    #[test]
    fn accept_filter_vetoes_silently() {
        let (mut host, _rx) = state();
        host.add_accept_filter(Box::new(|_| false));
        host.register_pending(pending(5));
        host.accept(Identity::new(5));
        assert!(!host.clients_contain(Identity::new(5)));
        // Pending entry was still consumed by the accept call.
        assert!(!host.pending_contains(Identity::new(5)));
    }

    #[test]
    fn kick_emits_disconnected_signal() {
        let (mut host, mut rx) = state();
        host.register_pending(pending(9));
        host.accept(Identity::new(9));
        assert!(host.kick(Identity::new(9), "test"));
        assert_eq!(rx.try_recv(), Ok(HostSignal::Disconnected(Identity::new(9))));
        // A second kick finds nothing and stays silent.
        assert!(!host.kick(Identity::new(9), "test"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn ban_hook_error_keeps_blacklist_verdict() {
        let (mut host, _rx) = state();
        host.add_blacklist_entry(BanEntry {
            target: Identity::new(3),
            reason: "cheating".into(),
            duration_secs: 600,
            issued_at: Instant::now(),
        });
        host.add_ban_hook(Box::new(|_, _, _| anyhow::bail!("hook exploded")));
        let verdict = host.check_banned(&pending(3));
        assert!(verdict.banned);
        assert_eq!(verdict.reason, "cheating");
        assert!(verdict.remaining_secs > 0);
    }

    #[test]
    fn validity_defaults_to_accept() {
        let (mut host, _rx) = state();
        let verdict = host.check_valid(&pending(3));
        assert!(verdict.valid);
    }

    #[test]
    fn expired_blacklist_entry_does_not_ban() {
        let (mut host, _rx) = state();
        host.add_blacklist_entry(BanEntry {
            target: Identity::new(3),
            reason: "old".into(),
            duration_secs: 1,
            issued_at: Instant::now() - Duration::from_secs(5),
        });
        let verdict = host.check_banned(&pending(3));
        assert!(!verdict.banned);
    }

    #[test]
    fn unreachable_client_rejects_delivery() {
        use crate::client::{ChatMessage, Color};

        let (mut host, _rx) = state();
        host.register_pending(pending(5));
        host.accept(Identity::new(5));
        assert!(host.set_reachable(Identity::new(5), false));

        let message = ChatMessage {
            text: "hello".to_owned(),
            color: Color::WHITE,
        };
        let err = host.deliver(Identity::new(5), message).unwrap_err();
        assert!(matches!(err, HostError::Unreachable(_)));
        // The entry itself stays in the table.
        assert!(host.clients_contain(Identity::new(5)));
    }

    #[test]
    fn touch_prevents_idle_disconnect() {
        let (mut host, _rx) = state();
        host.register_pending(pending(4));
        host.accept(Identity::new(4));

        let later = Instant::now() + Duration::from_secs(60);
        host.touch(&[Identity::new(4)], later);
        host.disconnect_idle(later);
        assert!(host.clients_contain(Identity::new(4)));

        // Without a refresh the same sweep drops the client.
        let much_later = later + Duration::from_secs(60);
        host.disconnect_idle(much_later);
        assert!(!host.clients_contain(Identity::new(4)));
    }
}
