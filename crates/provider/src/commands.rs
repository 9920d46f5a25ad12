//! Thin operator entry points.
//!
//! The hosting command layer owns argument parsing and permission checks;
//! these functions take already-parsed values and translate them into one
//! admission attempt each.

use std::collections::HashSet;
use std::sync::Arc;

use decoy_host::Identity;

use crate::admission::AdmissionRequest;
use crate::error::AdmissionError;
use crate::provider::DecoyProvider;
use crate::session::Session;

/// Spawns a session owned by the invoking operator.
///
/// The identity comes from the pre-declared pool; the profile is the
/// configured default, renamed when the operator supplied a name.
pub async fn create(
    provider: &Arc<DecoyProvider>,
    name: Option<&str>,
    owner: Identity,
) -> Result<Arc<Session>, AdmissionError> {
    let request = AdmissionRequest {
        identity: Some(provider.next_identity()),
        owners: HashSet::from([owner]),
        profile_override: name.map(|n| provider.config().default.clone().with_name(n)),
        ..AdmissionRequest::default()
    };
    provider.admit(request).await
}

/// Spawns an unowned session. Same identity and profile resolution as
/// [`create`], just without an owner.
pub async fn spawn(
    provider: &Arc<DecoyProvider>,
    name: Option<&str>,
) -> Result<Arc<Session>, AdmissionError> {
    let request = AdmissionRequest {
        identity: Some(provider.next_identity()),
        profile_override: name.map(|n| provider.config().default.clone().with_name(n)),
        ..AdmissionRequest::default()
    };
    provider.admit(request).await
}
