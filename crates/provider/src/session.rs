//! The live simulated session.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use decoy_host::{Color, ConnectionHandle, HostError, Identity, MainContextHandle};

/// Independently toggleable subsystem flag (simulation / actions).
#[derive(Debug)]
pub struct Toggle(AtomicBool);

impl Toggle {
    pub fn new(enabled: bool) -> Self {
        Toggle(AtomicBool::new(enabled))
    }

    pub fn enabled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn enable(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn disable(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A simulated client admitted into the host connection table.
///
/// Created only by the admission pipeline; owned by the registry until
/// disposal. Disposal happens exactly once, from one of three paths: explicit
/// command, host disconnect signal, or provider teardown.
#[derive(Debug)]
pub struct Session {
    id: Identity,
    connection: ConnectionHandle,
    owners: HashSet<Identity>,
    display_name: String,
    pub simulation: Toggle,
    pub actions: Toggle,
    /// Current view yaw in degrees, bit-cast for lock-free updates from the
    /// rotation loop.
    yaw_bits: AtomicU32,
    disposed: AtomicBool,
}

impl Session {
    pub(crate) fn new(
        id: Identity,
        connection: ConnectionHandle,
        owners: HashSet<Identity>,
        display_name: String,
        simulation_enabled: bool,
    ) -> Self {
        Self {
            id,
            connection,
            owners,
            display_name,
            simulation: Toggle::new(simulation_enabled),
            actions: Toggle::new(true),
            yaw_bits: AtomicU32::new(0f32.to_bits()),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Identity {
        self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Real users allowed to control or despawn this session.
    pub fn owners(&self) -> &HashSet<Identity> {
        &self.owners
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    pub fn yaw(&self) -> f32 {
        f32::from_bits(self.yaw_bits.load(Ordering::Relaxed))
    }

    pub fn set_yaw(&self, yaw: f32) {
        self.yaw_bits.store(yaw.to_bits(), Ordering::Relaxed);
    }

    pub async fn print_message(&self, text: &str, color: Color) -> Result<(), HostError> {
        self.connection.send_message(text, color).await
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Claims the dispose guard. Returns `false` when disposal already ran
    /// (or is running); the caller must then do nothing.
    fn begin_dispose(&self) -> bool {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.simulation.disable();
        self.actions.disable();
        true
    }

    /// Tears the session down, disconnecting its host connection.
    /// Idempotent: the second and later calls are no-ops.
    pub async fn dispose(&self) -> Result<(), HostError> {
        if !self.begin_dispose() {
            return Ok(());
        }
        tracing::debug!(target: "decoy::lifecycle", id = %self.id, "disposing session");
        self.connection.disconnect("dummy removed").await?;
        Ok(())
    }

    /// Schedules disposal onto a later quantum of the main context.
    ///
    /// Used by the disconnect reaction: the host emits the disconnect signal
    /// while iterating its own client list, and the teardown kick must not
    /// mutate that list re-entrantly.
    pub(crate) fn dispose_deferred(self: &std::sync::Arc<Self>, main: &MainContextHandle) {
        let session = self.clone();
        main.defer(move |host| {
            if session.begin_dispose() {
                host.kick(session.id(), "dummy removed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use decoy_host::{HostConfig, HostState};

    fn session(main: MainContextHandle) -> Session {
        Session::new(
            Identity::new(5),
            ConnectionHandle::new(Identity::new(5), main),
            HashSet::new(),
            "Test".to_owned(),
            true,
        )
    }

    #[tokio::test]
    async fn dispose_runs_host_teardown_once() {
        let (state, mut signals) = HostState::new(HostConfig::default());
        let main = MainContextHandle::spawn(state);
        main.run(|host| {
            host.register_pending(decoy_host::PendingClient::new(
                Identity::new(5),
                decoy_host::ClientProfile::default(),
            ));
            host.accept(Identity::new(5));
        })
        .await
        .unwrap();

        let session = session(main.clone());
        session.dispose().await.unwrap();
        session.dispose().await.unwrap();

        assert!(session.is_disposed());
        assert!(!session.simulation.enabled());
        assert!(!session.actions.enabled());
        // Exactly one disconnect reached the host.
        assert!(signals.try_recv().is_ok());
        assert!(signals.try_recv().is_err());
        assert!(!main.run(|host| host.clients_contain(Identity::new(5))).await.unwrap());
    }

    #[tokio::test]
    async fn yaw_roundtrips_through_bits() {
        let (state, _signals) = HostState::new(HostConfig::default());
        let main = MainContextHandle::spawn(state);
        let session = session(main);
        session.set_yaw(182.5);
        assert_eq!(session.yaw(), 182.5);
    }
}
