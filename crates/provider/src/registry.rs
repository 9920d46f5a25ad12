//! Registry of active simulated sessions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use decoy_host::{Color, HostError, Identity, MainContextHandle, SearchMode};

use crate::error::SearchError;
use crate::session::Session;
use crate::supports_user_type;

/// Identity-keyed set of live sessions.
///
/// Mutated from several tasks (admission completion, disconnect reaction,
/// disposal); a single coordinating lock guards the map. Read operations work
/// on a snapshot taken at call time, so they tolerate concurrent
/// insertion/removal without ever observing a torn state.
///
/// Iteration order is the map's, i.e. unspecified; name-search ties resolve
/// in no particular order.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Identity, Arc<Session>>>,
    main: MainContextHandle,
}

impl SessionRegistry {
    pub fn new(main: MainContextHandle) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            main,
        }
    }

    /// Inserts an admitted session. Returns `false` (and keeps the existing
    /// entry) if the identity is already registered.
    pub fn insert(&self, session: Arc<Session>) -> bool {
        let mut sessions = self.sessions.lock().expect("session registry poisoned");
        match sessions.entry(session.id()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(session);
                true
            }
        }
    }

    pub fn remove(&self, id: Identity) -> Option<Arc<Session>> {
        self.sessions
            .lock()
            .expect("session registry poisoned")
            .remove(&id)
    }

    pub fn contains(&self, id: Identity) -> bool {
        self.sessions
            .lock()
            .expect("session registry poisoned")
            .contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().expect("session registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every live session at call time.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions
            .lock()
            .expect("session registry poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Looks a session up the way the hosting command layer asks for it.
    ///
    /// Unsupported user types yield `Ok(None)` immediately. Id lookups return
    /// on the first exact (case-insensitive) match; name lookups keep the
    /// session with the highest confidence tier seen so far (exact beats
    /// prefix beats substring), first seen winning ties.
    ///
    /// The mode check runs per scanned session, so an unsupported mode
    /// against an empty registry yields `Ok(None)` rather than the error.
    pub fn find(
        &self,
        user_type: &str,
        search: &str,
        mode: SearchMode,
    ) -> Result<Option<Arc<Session>>, SearchError> {
        if !supports_user_type(user_type) {
            return Ok(None);
        }

        let mut best: Option<Arc<Session>> = None;
        let mut confidence = 0u8;

        for session in self.snapshot() {
            match mode {
                SearchMode::FindById | SearchMode::FindByNameOrId => {
                    if session.id().to_string().eq_ignore_ascii_case(search) {
                        return Ok(Some(session));
                    }
                    if matches!(mode, SearchMode::FindByNameOrId) {
                        let current = name_confidence(session.display_name(), search);
                        if current > confidence {
                            confidence = current;
                            best = Some(session);
                        }
                    }
                }
                SearchMode::FindByName => {
                    let current = name_confidence(session.display_name(), search);
                    if current > confidence {
                        confidence = current;
                        best = Some(session);
                    }
                }
                _ => return Err(SearchError::UnsupportedSearchMode),
            }
        }

        Ok(best)
    }

    /// Live snapshot of the registry; empty for unsupported user types.
    pub fn list(&self, user_type: &str) -> Vec<Arc<Session>> {
        if !supports_user_type(user_type) {
            return Vec::new();
        }
        self.snapshot()
    }

    /// Delivers `message` to every session, sequentially. Best effort per
    /// session: one failed delivery never blocks the rest.
    pub async fn broadcast(&self, message: &str, color: Option<Color>) {
        let color = color.unwrap_or(Color::WHITE);
        for session in self.snapshot() {
            if let Err(error) = session.print_message(message, color).await {
                tracing::warn!(
                    target: "decoy::registry",
                    id = %session.id(),
                    %error,
                    "broadcast delivery failed"
                );
            }
        }
    }

    /// Bans a simulated session through the host ban primitive.
    ///
    /// Returns `Ok(false)` without effect when the target is not (or no
    /// longer) a registered session or the computed duration is non-positive.
    pub async fn ban(
        &self,
        session: &Arc<Session>,
        instigator: Option<Identity>,
        reason: Option<&str>,
        end_time: Option<SystemTime>,
    ) -> Result<bool, HostError> {
        if !self.contains(session.id()) {
            return Ok(false);
        }

        let reason = reason.unwrap_or("No reason provided").to_owned();
        let duration_secs = match end_time {
            // No end time means permanent.
            None => u32::MAX,
            Some(end) => match end.duration_since(SystemTime::now()) {
                Ok(duration) if duration.as_secs() > 0 => {
                    duration.as_secs().min(u32::MAX as u64) as u32
                }
                _ => return Ok(false),
            },
        };
        let instigator = instigator.unwrap_or(Identity::new(0));

        let id = session.id();
        self.main
            .run(move |host| host.request_ban(instigator, id, &reason, duration_secs))
            .await
    }

    /// Kicks a simulated session's underlying connection.
    /// Returns `Ok(false)` when the target is not a registered session.
    pub async fn kick(&self, session: &Arc<Session>, reason: &str) -> Result<bool, HostError> {
        if !self.contains(session.id()) {
            return Ok(false);
        }
        session.connection().disconnect(reason).await?;
        Ok(true)
    }
}

/// Tiered match confidence: 3 exact, 2 prefix, 1 substring, 0 none.
/// All comparisons are case-insensitive.
fn name_confidence(name: &str, search: &str) -> u8 {
    let name = name.to_lowercase();
    let search = search.to_lowercase();
    if name == search {
        3
    } else if name.starts_with(&search) {
        2
    } else if name.contains(&search) {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PLAYER_USER_TYPE;
    use decoy_host::{ConnectionHandle, HostConfig, HostState};
    use std::collections::HashSet;

    fn registry_with(names: &[(u64, &str)]) -> SessionRegistry {
        let (state, _signals) = HostState::new(HostConfig::default());
        let main = MainContextHandle::spawn(state);
        let registry = SessionRegistry::new(main.clone());
        for (raw, name) in names {
            let id = Identity::new(*raw);
            registry.insert(Arc::new(Session::new(
                id,
                ConnectionHandle::new(id, main.clone()),
                HashSet::new(),
                (*name).to_owned(),
                true,
            )));
        }
        registry
    }

    #[tokio::test]
    async fn unsupported_user_type_finds_nothing() {
        let registry = registry_with(&[(1, "Bob")]);
        let found = registry.find("vehicle", "Bob", SearchMode::FindByName).unwrap();
        assert!(found.is_none());
        assert!(registry.list("vehicle").is_empty());
        assert_eq!(registry.list(PLAYER_USER_TYPE).len(), 1);
    }

    #[tokio::test]
    async fn exact_name_beats_prefix_match() {
        let registry = registry_with(&[(1, "Bobby"), (2, "Bob"), (3, "Alice")]);
        let found = registry
            .find(PLAYER_USER_TYPE, "bob", SearchMode::FindByName)
            .unwrap()
            .unwrap();
        assert_eq!(found.display_name(), "Bob");
    }

    #[tokio::test]
    async fn substring_match_is_found_last() {
        let registry = registry_with(&[(1, "SuperBob"), (2, "Alice")]);
        let found = registry
            .find(PLAYER_USER_TYPE, "bob", SearchMode::FindByName)
            .unwrap()
            .unwrap();
        assert_eq!(found.display_name(), "SuperBob");
    }

    #[tokio::test]
    async fn id_search_matches_exactly() {
        let registry = registry_with(&[(76561, "Bob")]);
        let found = registry
            .find(PLAYER_USER_TYPE, "76561", SearchMode::FindById)
            .unwrap()
            .unwrap();
        assert_eq!(found.id(), Identity::new(76561));

        let miss = registry
            .find(PLAYER_USER_TYPE, "7656", SearchMode::FindById)
            .unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn name_or_id_falls_back_to_name_scoring() {
        let registry = registry_with(&[(1, "Bob"), (2, "Bobby")]);
        let found = registry
            .find(PLAYER_USER_TYPE, "bobby", SearchMode::FindByNameOrId)
            .unwrap()
            .unwrap();
        assert_eq!(found.display_name(), "Bobby");
    }

    #[tokio::test]
    async fn broadcast_survives_an_unreachable_session() {
        use decoy_host::{ClientProfile, PendingClient};

        let (state, _signals) = HostState::new(HostConfig::default());
        let main = MainContextHandle::spawn(state);
        let registry = SessionRegistry::new(main.clone());
        for raw in [1u64, 2, 3] {
            let id = Identity::new(raw);
            main.run(move |host| {
                host.register_pending(PendingClient::new(id, ClientProfile::default()));
                host.accept(id);
            })
            .await
            .unwrap();
            registry.insert(Arc::new(Session::new(
                id,
                ConnectionHandle::new(id, main.clone()),
                HashSet::new(),
                format!("Decoy{raw}"),
                true,
            )));
        }
        main.run(|host| host.set_reachable(Identity::new(2), false))
            .await
            .unwrap();

        registry.broadcast("evening all", None).await;

        // The dead delivery path in the middle never blocks the others.
        for raw in [1u64, 3] {
            let messages = main
                .run(move |host| host.take_messages(Identity::new(raw)))
                .await
                .unwrap();
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].text, "evening all");
            assert_eq!(messages[0].color, Color::WHITE);
        }
        let dropped = main
            .run(|host| host.take_messages(Identity::new(2)))
            .await
            .unwrap();
        assert!(dropped.is_empty());
    }

    #[tokio::test]
    async fn insert_enforces_identity_uniqueness() {
        let registry = registry_with(&[(5, "Bob")]);
        let (state, _signals) = HostState::new(HostConfig::default());
        let main = MainContextHandle::spawn(state);
        let duplicate = Arc::new(Session::new(
            Identity::new(5),
            ConnectionHandle::new(Identity::new(5), main),
            HashSet::new(),
            "Impostor".to_owned(),
            true,
        ));
        assert!(!registry.insert(duplicate));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn confidence_tiers() {
        assert_eq!(name_confidence("Bob", "bob"), 3);
        assert_eq!(name_confidence("Bobby", "bob"), 2);
        assert_eq!(name_confidence("SuperBob", "bob"), 1);
        assert_eq!(name_confidence("Alice", "bob"), 0);
    }
}
