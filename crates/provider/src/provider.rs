//! Composition root: wires pool, registry, main context and supervisor.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use decoy_host::{HostSignal, Identity, MainContextHandle};
use tokio::sync::Notify;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::Config;
use crate::idpool::IdentityPool;
use crate::lifecycle;
use crate::registry::SessionRegistry;

/// Provider of simulated client sessions.
///
/// Holds the identity pool and the session registry, and runs the lifecycle
/// supervisor (heartbeat + host-signal reaction) for as long as it lives.
/// All host-table access goes through the main context handle it was built
/// with.
pub struct DecoyProvider {
    pub(crate) config: Config,
    pub(crate) main: MainContextHandle,
    pub(crate) registry: SessionRegistry,
    pub(crate) pool: IdentityPool,
    pub(crate) disposed: AtomicBool,
    /// Set once the host announced its own shutdown; suppresses the
    /// per-session disposal broadcast on teardown (the host closes every
    /// connection itself, racing it would double-teardown).
    pub(crate) shutting_down: AtomicBool,
    /// Identities with an admission currently in flight. Explicit choice for
    /// the duplicate-admission race: the pre-check and the commit are not one
    /// critical section, so concurrent attempts for the same identity are
    /// fenced here instead.
    pub(crate) in_flight: Mutex<HashSet<Identity>>,
    pub(crate) dispose_notify: Notify,
}

impl DecoyProvider {
    /// Builds the provider and starts its background loops.
    pub fn new(
        config: Config,
        pool: IdentityPool,
        main: MainContextHandle,
        signals: UnboundedReceiver<HostSignal>,
    ) -> Arc<Self> {
        let provider = Arc::new(Self {
            config,
            registry: SessionRegistry::new(main.clone()),
            main,
            pool,
            disposed: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            in_flight: Mutex::new(HashSet::new()),
            dispose_notify: Notify::new(),
        });
        lifecycle::spawn_heartbeat(provider.clone());
        lifecycle::spawn_signal_loop(provider.clone(), signals);
        provider
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn main(&self) -> &MainContextHandle {
        &self.main
    }

    pub fn pool(&self) -> &IdentityPool {
        &self.pool
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Next pre-declared identity from the pool (sentinel on exhaustion).
    pub fn next_identity(&self) -> Identity {
        self.pool.next_identity()
    }

    /// First identity not taken by an active session and not pooled.
    ///
    /// Linear scan from 1 upward; fine because concurrent session counts are
    /// small (bounded by the operator cap).
    pub fn find_free_identity(&self) -> Identity {
        let mut candidate: u64 = 1;
        loop {
            if !self.registry.contains(Identity::new(candidate))
                && !self.pool.remaining_contains(candidate)
            {
                return Identity::new(candidate);
            }
            candidate += 1;
        }
    }

    /// Tears the provider down.
    ///
    /// Idempotent. Sessions are disposed individually unless the host already
    /// commenced its own shutdown. Admissions already in flight run to
    /// completion; the background loops exit cooperatively.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.dispose_notify.notify_waiters();

        if self.shutting_down.load(Ordering::SeqCst) {
            tracing::debug!(
                target: "decoy::lifecycle",
                "host is shutting down, skipping per-session disposal"
            );
            return;
        }

        for session in self.registry.snapshot() {
            if let Err(error) = session.dispose().await {
                tracing::warn!(
                    target: "decoy::lifecycle",
                    id = %session.id(),
                    %error,
                    "session disposal failed"
                );
            }
        }
    }
}
