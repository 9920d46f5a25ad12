//! The admission pipeline: turns a requested identity plus a profile into a
//! live session, or rolls back.
//!
//! The attempt is a small state machine:
//! `Requested -> PendingValidation -> PendingAccepted -> (Committed | RolledBack)`.
//! Both terminal states leave the host tables consistent: either the session
//! is fully present (host table + registry) or every trace of the attempt is
//! gone. Steps never retry; a caller that wants another go starts a fresh
//! attempt.

use std::collections::HashSet;
use std::sync::Arc;

use decoy_host::{ConnectionHandle, HostError, HostState, Identity, PendingClient};

use crate::config::EventFlags;
use crate::error::AdmissionError;
use crate::lifecycle;
use crate::profile::{self, ProfileDescriptor};
use crate::provider::DecoyProvider;
use crate::session::Session;

/// Everything a spawn request carries into the pipeline.
#[derive(Debug, Default)]
pub struct AdmissionRequest {
    /// Explicit identity; resolved via the free-identity scan when absent.
    pub identity: Option<Identity>,
    /// Real users allowed to control/despawn the session.
    pub owners: HashSet<Identity>,
    /// Live connection to derive the profile from instead of configuration.
    pub clone_source: Option<Identity>,
    /// Explicit profile; on the clone path only names/character/group apply.
    pub profile_override: Option<ProfileDescriptor>,
}

/// Removes the in-flight marker when an attempt reaches a terminal state.
struct AdmissionGuard<'a> {
    provider: &'a DecoyProvider,
    id: Identity,
}

impl<'a> AdmissionGuard<'a> {
    /// Fences concurrent attempts for the same identity. The pre-check and
    /// the commit are separate main-context stints, so without this fence two
    /// racing attempts could both pass the pre-check before either commits.
    fn claim(provider: &'a DecoyProvider, id: Identity) -> Result<Self, AdmissionError> {
        let mut in_flight = provider.in_flight.lock().expect("in-flight set poisoned");
        if !in_flight.insert(id) {
            return Err(AdmissionError::DuplicateIdentity(id));
        }
        Ok(Self { provider, id })
    }
}

impl Drop for AdmissionGuard<'_> {
    fn drop(&mut self) {
        self.provider
            .in_flight
            .lock()
            .expect("in-flight set poisoned")
            .remove(&self.id);
    }
}

impl DecoyProvider {
    /// Admits one simulated session.
    ///
    /// On success the session is live in the host connection table and
    /// registered; on any failure both tables are back to their pre-call
    /// contents. Admissions that started before [`DecoyProvider::dispose`]
    /// run to completion.
    pub async fn admit(
        self: &Arc<Self>,
        request: AdmissionRequest,
    ) -> Result<Arc<Session>, AdmissionError> {
        // Step 1: resolve the identity.
        let id = match request.identity {
            Some(id) => id,
            None => self.find_free_identity(),
        };

        let _guard = AdmissionGuard::claim(self, id)?;

        // Step 2: pre-admission validation, fail fast with no side effects.
        if self.main.run(move |host| host.clients_contain(id)).await? {
            return Err(AdmissionError::DuplicateIdentity(id));
        }
        let max = self.config.options.max_sessions;
        let active = self.registry.len();
        if max != 0 && active + 1 > max as usize {
            return Err(AdmissionError::CapacityExceeded { active, max });
        }

        // Step 3: build the pending-connection descriptor.
        let pending = match request.clone_source {
            Some(source_id) => {
                let source = self
                    .main
                    .run(move |host| host.client(source_id).map(|c| c.profile.clone()))
                    .await?
                    .ok_or(HostError::UnknownClient(source_id))?;
                profile::cloned_pending(id, &source, request.profile_override.as_ref())
            }
            None => {
                let descriptor = request
                    .profile_override
                    .clone()
                    .unwrap_or_else(|| self.config.default.clone());
                descriptor.into_pending(id)?
            }
        };
        let display_name = pending.profile.names.character_name.clone();

        // Steps 4-6: register the pending connection and run the host
        // callbacks, all in one main-context stint.
        let events = self.config.events.clone();
        let log_join_leave = self.config.logs.join_leave;
        self.main
            .run(move |host| pre_admit(host, pending, &events, log_join_leave))
            .await??;

        // Step 7: commit, verifying the host actually appended our entry.
        self.main.run(move |host| commit(host, id)).await??;

        // Step 9: wrap the live connection and run post-admission effects.
        let session = Arc::new(Session::new(
            id,
            ConnectionHandle::new(id, self.main.clone()),
            request.owners,
            display_name,
            !self.config.options.disable_simulations,
        ));

        if self.config.fun.always_rotate {
            lifecycle::spawn_rotation(self.clone(), session.clone());
        }
        // The commit already happened; a dead main context here must not turn
        // a live session into a reported failure.
        if let Err(error) = self
            .main
            .run(move |host| {
                if !host.log_join_leave && !log_join_leave {
                    host.log_join_leave = true;
                }
            })
            .await
        {
            tracing::warn!(
                target: "decoy::admission",
                %id,
                %error,
                "join/leave log restore skipped"
            );
        }

        self.registry.insert(session.clone());
        tracing::info!(target: "decoy::admission", %id, "session admitted");
        Ok(session)
    }
}

/// Steps 4-6 on the main context. Any rejection removes the pending entry
/// again before surfacing; the accept call was never reached, so the live
/// table needs no scrubbing here.
fn pre_admit(
    host: &mut HostState,
    pending: PendingClient,
    events: &EventFlags,
    log_join_leave: bool,
) -> Result<(), AdmissionError> {
    let id = pending.id;
    let record = pending.clone();
    host.register_pending(pending);

    if host.log_join_leave && !log_join_leave {
        host.log_join_leave = false;
    }

    if events.call_ban_check {
        let verdict = host.check_banned(&record);
        if verdict.banned {
            host.remove_pending(id);
            tracing::warn!(
                target: "decoy::admission",
                %id,
                reason = %verdict.reason,
                remaining_secs = verdict.remaining_secs,
                "pending connection is banned"
            );
            return Err(AdmissionError::Banned {
                reason: verdict.reason,
                remaining_secs: verdict.remaining_secs,
            });
        }
    }

    if events.call_validity_check {
        let verdict = host.check_valid(&record);
        if !verdict.valid {
            host.remove_pending(id);
            tracing::warn!(
                target: "decoy::admission",
                %id,
                explanation = %verdict.explanation,
                "pending connection rejected"
            );
            return Err(AdmissionError::RejectedByHost {
                explanation: verdict.explanation,
            });
        }
    }

    Ok(())
}

/// Step 7 (and the step 8 rollback for its failure) on the main context.
fn commit(host: &mut HostState, id: Identity) -> Result<(), AdmissionError> {
    host.accept(id);
    if host.last_client_id() != Some(id) {
        // A host component vetoed without raising. The entry may or may not
        // have made it into either table; scrub both.
        host.remove_client(id);
        host.remove_pending(id);
        return Err(AdmissionError::SilentlyRejected);
    }
    Ok(())
}
