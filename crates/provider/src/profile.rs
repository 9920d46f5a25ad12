//! Profile descriptors and their conversion into pending-connection records.

use decoy_host::{ClientProfile, Color, Cosmetics, Identity, Loadout, PendingClient, PlayerNames};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::error::AdmissionError;

/// Appearance/name/group bundle a session is built from.
///
/// Sourced from the configuration default, an operator override, or (on the
/// clone path) from a real user's live profile. Immutable once admission
/// begins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileDescriptor {
    pub player_name: String,
    pub character_name: String,
    pub nick_name: String,
    pub character_id: u8,
    pub group_id: u64,
    pub is_pro: bool,
    pub face_id: u32,
    pub hair_id: u32,
    pub beard_id: u32,
    pub skin_color: Color,
    pub hair_color: Color,
    pub marker_color: Color,
    pub left_handed: bool,
    /// Cosmetic item ids. Admission fails without them.
    pub skins: Option<Loadout>,
    /// Hardware-id seed; anything that is not exactly 20 bytes is replaced
    /// with random bytes at admission time.
    pub hwid: String,
    pub skillset: u8,
    pub language: String,
}

impl Default for ProfileDescriptor {
    fn default() -> Self {
        Self {
            player_name: "Dummy".to_owned(),
            character_name: "Dummy".to_owned(),
            nick_name: "Dummy".to_owned(),
            character_id: 0,
            group_id: 0,
            is_pro: false,
            face_id: 0,
            hair_id: 0,
            beard_id: 0,
            skin_color: Color::WHITE,
            hair_color: Color::WHITE,
            marker_color: Color::WHITE,
            left_handed: false,
            skins: Some(Loadout::default()),
            hwid: String::new(),
            skillset: 0,
            language: "English".to_owned(),
        }
    }
}

impl ProfileDescriptor {
    /// Sets all three name fields to `name` (operator-supplied spawn names).
    pub fn with_name(mut self, name: &str) -> Self {
        self.player_name = name.to_owned();
        self.character_name = name.to_owned();
        self.nick_name = name.to_owned();
        self
    }

    fn names(&self) -> PlayerNames {
        PlayerNames {
            player_name: self.player_name.clone(),
            character_name: self.character_name.clone(),
            nick_name: self.nick_name.clone(),
        }
    }

    /// Builds the pending-connection record for a config/override spawn.
    ///
    /// Fails with [`AdmissionError::MissingSkinConfiguration`] when no skin
    /// set is present. A malformed hardware id is replaced silently, it is a
    /// fallback, not an error.
    pub(crate) fn into_pending(self, id: Identity) -> Result<PendingClient, AdmissionError> {
        let skins = self.skins.ok_or(AdmissionError::MissingSkinConfiguration)?;
        let profile = ClientProfile {
            names: self.names(),
            character_id: self.character_id,
            group_id: self.group_id,
            pro: self.is_pro,
            cosmetics: Cosmetics {
                face_id: self.face_id,
                hair_id: self.hair_id,
                beard_id: self.beard_id,
                skin_color: self.skin_color,
                hair_color: self.hair_color,
                marker_color: self.marker_color,
                left_handed: self.left_handed,
            },
            loadout: skins,
            skillset: self.skillset,
            language: self.language,
            hwid: hwid_or_random(self.hwid.as_bytes()),
            ..ClientProfile::default()
        };
        let mut pending = PendingClient::new(id, profile);
        pending.pre_authenticated = true;
        pending.promote_loadout();
        Ok(pending)
    }
}

/// Builds the pending record for a clone spawn: everything comes from the
/// source profile, only names, character id and group may be overridden.
pub(crate) fn cloned_pending(
    id: Identity,
    source: &ClientProfile,
    overrides: Option<&ProfileDescriptor>,
) -> PendingClient {
    let mut profile = source.clone();
    if let Some(o) = overrides {
        profile.names = PlayerNames {
            player_name: o.player_name.clone(),
            character_name: o.character_name.clone(),
            nick_name: o.nick_name.clone(),
        };
        profile.character_id = o.character_id;
        profile.group_id = o.group_id;
    }
    let mut pending = PendingClient::new(id, profile);
    pending.pre_authenticated = true;
    pending.promote_loadout();
    pending
}

fn hwid_or_random(bytes: &[u8]) -> [u8; 20] {
    match <[u8; 20]>::try_from(bytes) {
        Ok(hwid) => hwid,
        Err(_) => {
            let mut hwid = [0u8; 20];
            OsRng.fill_bytes(&mut hwid);
            hwid
        }
    }
}
