//! Single-consumer task queue that owns the host state.
//!
//! Every mutation of the connection table goes through here. Jobs run strictly
//! in submission order on one task, which is what makes the unguarded
//! [`HostState`] sound. `defer` exploits the FIFO order: a job submitted from
//! inside a running job lands behind everything already queued, i.e. on a
//! later quantum. That is the mechanism behind deferred disposal.

use tokio::sync::{mpsc, oneshot};

use crate::events::HostError;
use crate::state::HostState;

type Job = Box<dyn FnOnce(&mut HostState) + Send>;

/// Cheap-to-clone handle used to marshal work onto the main context.
#[derive(Clone)]
pub struct MainContextHandle {
    tx: mpsc::UnboundedSender<Job>,
}

impl MainContextHandle {
    /// Spawns the owning task and hands back the submission handle.
    ///
    /// The task runs until every handle is dropped; in-flight jobs always
    /// complete before it stops.
    pub fn spawn(state: HostState) -> MainContextHandle {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            let mut state = state;
            while let Some(job) = rx.recv().await {
                job(&mut state);
            }
            tracing::debug!(target: "host::main", "main context stopped");
        });
        Self { tx }
    }

    /// Runs `f` on the main context and returns its result.
    pub async fn run<R, F>(&self, f: F) -> Result<R, HostError>
    where
        F: FnOnce(&mut HostState) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Box::new(move |state| {
                let _ = reply_tx.send(f(state));
            }))
            .map_err(|_| HostError::ContextClosed)?;
        reply_rx.await.map_err(|_| HostError::ContextClosed)
    }

    /// Enqueues `f` for a later quantum without waiting for it.
    pub fn defer<F>(&self, f: F)
    where
        F: FnOnce(&mut HostState) + Send + 'static,
    {
        if self.tx.send(Box::new(f)).is_err() {
            tracing::debug!(target: "host::main", "deferred job dropped, context closed");
        }
    }
}

impl std::fmt::Debug for MainContextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainContextHandle").finish_non_exhaustive()
    }
}
