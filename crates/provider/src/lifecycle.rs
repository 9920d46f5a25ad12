//! Background loops that keep admitted sessions alive and react to the host.
//!
//! Three loops, all spawned onto the runtime and all exiting cooperatively
//! once the provider is disposed: the heartbeat (anti-idle refresh), the
//! host-signal reaction (disconnects and shutdown) and the optional
//! per-session rotation.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use decoy_host::{HostSignal, Identity};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::provider::DecoyProvider;
use crate::session::Session;

/// Heartbeat period: half the host's idle timeout, floored to whole seconds,
/// never below one second. Guarantees at least one refresh per timeout window
/// with margin.
pub(crate) fn heartbeat_interval(timeout_game_secs: u64) -> Duration {
    Duration::from_secs(((timeout_game_secs as f64 * 0.5) as u64).max(1))
}

/// Periodically refreshes the liveness marker of every registered session so
/// the host's idle sweep never reaps them.
pub(crate) fn spawn_heartbeat(provider: Arc<DecoyProvider>) {
    tokio::spawn(async move {
        let interval = match provider.main.run(|host| host.config().timeout_game_secs).await {
            Ok(timeout) => heartbeat_interval(timeout),
            Err(_) => return,
        };
        loop {
            if provider.disposed.load(Ordering::SeqCst) {
                break;
            }
            let ids: Vec<Identity> = provider
                .registry
                .snapshot()
                .iter()
                .map(|s| s.id())
                .collect();
            if !ids.is_empty() {
                let now = Instant::now();
                if provider.main.run(move |host| host.touch(&ids, now)).await.is_err() {
                    break;
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = provider.dispose_notify.notified() => break,
            }
        }
        tracing::debug!(target: "decoy::lifecycle", "heartbeat loop stopped");
    });
}

/// Consumes the host's signal stream.
///
/// A disconnect for a registered session unregisters it immediately and
/// schedules the remaining teardown onto a later main-context quantum; the
/// shutdown announcement only flips the suppression flag read by
/// [`DecoyProvider::dispose`].
pub(crate) fn spawn_signal_loop(
    provider: Arc<DecoyProvider>,
    mut signals: UnboundedReceiver<HostSignal>,
) {
    tokio::spawn(async move {
        loop {
            if provider.disposed.load(Ordering::SeqCst) {
                break;
            }
            let signal = tokio::select! {
                signal = signals.recv() => match signal {
                    Some(signal) => signal,
                    None => break,
                },
                _ = provider.dispose_notify.notified() => break,
            };
            match signal {
                HostSignal::Disconnected(id) => {
                    if let Some(session) = provider.registry.remove(id) {
                        tracing::debug!(
                            target: "decoy::lifecycle",
                            %id,
                            "host dropped a simulated session"
                        );
                        session.simulation.disable();
                        session.actions.disable();
                        session.dispose_deferred(&provider.main);
                    }
                }
                HostSignal::CommenceShutdown => {
                    tracing::debug!(target: "decoy::lifecycle", "host commenced shutdown");
                    provider.shutting_down.store(true, Ordering::SeqCst);
                }
            }
        }
        tracing::debug!(target: "decoy::lifecycle", "signal loop stopped");
    });
}

/// Spins the session's view yaw while its simulation toggle is enabled.
///
/// The loop ends for good once the toggle goes off (or the session/provider
/// is disposed); re-enabling the toggle later does not restart it.
pub(crate) fn spawn_rotation(provider: Arc<DecoyProvider>, session: Arc<Session>) {
    let step = provider.config.fun.rotate_yaw;
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_millis(1)).await;
            if session.is_disposed()
                || provider.disposed.load(Ordering::SeqCst)
                || !session.simulation.enabled()
            {
                break;
            }
            session.set_yaw((session.yaw() + step) % 360.0);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::AdmissionRequest;
    use crate::config::Config;
    use crate::idpool::IdentityPool;
    use decoy_host::{HostConfig, HostState, MainContextHandle};

    fn setup_with(
        config: Config,
        host_config: HostConfig,
    ) -> (Arc<DecoyProvider>, MainContextHandle) {
        let (state, signals) = HostState::new(host_config);
        let main = MainContextHandle::spawn(state);
        let provider = DecoyProvider::new(config, IdentityPool::new(), main.clone(), signals);
        (provider, main)
    }

    fn request(raw: u64) -> AdmissionRequest {
        AdmissionRequest {
            identity: Some(Identity::new(raw)),
            ..AdmissionRequest::default()
        }
    }

    #[test]
    fn heartbeat_interval_is_half_the_timeout_with_a_floor() {
        assert_eq!(heartbeat_interval(30), Duration::from_secs(15));
        assert_eq!(heartbeat_interval(3), Duration::from_secs(1));
        assert_eq!(heartbeat_interval(1), Duration::from_secs(1));
        assert_eq!(heartbeat_interval(0), Duration::from_secs(1));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn heartbeat_outpaces_the_idle_sweep() {
        let host_config = HostConfig {
            timeout_game_secs: 2,
        };
        let (provider, main) = setup_with(Config::default(), host_config);
        provider.admit(request(5)).await.unwrap();

        // Three full timeout-and-a-half windows; without the heartbeat the
        // sweep below would reap the session.
        tokio::time::sleep(Duration::from_secs(3)).await;
        main.run(|host| host.disconnect_idle(Instant::now())).await.unwrap();
        assert!(main.run(|host| host.clients_contain(Identity::new(5))).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn host_disconnect_unregisters_and_disposes() {
        let (provider, main) = setup_with(Config::default(), HostConfig::default());
        let session = provider.admit(request(5)).await.unwrap();

        main.run(|host| host.kick(Identity::new(5), "simulated drop")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!provider.registry().contains(Identity::new(5)));
        assert!(session.is_disposed());
        assert!(!session.simulation.enabled());
        assert!(!session.actions.enabled());
        // The deferred teardown found the host entry already gone and did not
        // re-kick; the host table stays clean either way.
        assert!(!main.run(|host| host.clients_contain(Identity::new(5))).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shutdown_announcement_suppresses_per_session_disposal() {
        let (provider, main) = setup_with(Config::default(), HostConfig::default());
        let session = provider.admit(request(5)).await.unwrap();

        main.run(|host| host.commence_shutdown()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        provider.dispose().await;

        // The host owns connection teardown during its shutdown; the entry is
        // still there and the session was not disconnected by us.
        assert!(!session.is_disposed());
        assert!(main.run(|host| host.clients_contain(Identity::new(5))).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dispose_tears_down_every_session() {
        let (provider, main) = setup_with(Config::default(), HostConfig::default());
        let first = provider.admit(request(1)).await.unwrap();
        let second = provider.admit(request(2)).await.unwrap();

        provider.dispose().await;
        // Idempotent.
        provider.dispose().await;

        assert!(first.is_disposed());
        assert!(second.is_disposed());
        assert_eq!(main.run(|host| host.client_count()).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rotation_spins_the_yaw_and_stops_for_good_when_disabled() {
        let mut config = Config::default();
        config.fun.always_rotate = true;
        config.fun.rotate_yaw = 15.0;
        let (provider, _main) = setup_with(config, HostConfig::default());
        let session = provider.admit(request(5)).await.unwrap();

        // The yaw wraps modulo 360, so a single timed sample can land back on
        // the start value. Poll until any movement is observed instead.
        let start = session.yaw();
        let mut moved = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(2)).await;
            if session.yaw() != start {
                moved = true;
                break;
            }
        }
        assert!(moved);

        // Disabling the toggle ends the loop permanently; re-enabling it
        // later must not resurrect the rotation.
        session.simulation.disable();
        tokio::time::sleep(Duration::from_millis(20)).await;
        session.simulation.enable();
        let frozen = session.yaw();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(session.yaw(), frozen);
    }
}
