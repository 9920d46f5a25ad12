//! TOML-backed configuration of the provider.
//!
//! Read once at startup and never written by this crate. Every section has
//! serde defaults so a partial (or missing) file still yields a usable
//! configuration.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::profile::ProfileDescriptor;

/// Which host event hooks the admission pipeline should drive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventFlags {
    /// Run the blacklist + ban-hook check before accepting.
    pub call_ban_check: bool,
    /// Run the validity-hook check before accepting.
    pub call_validity_check: bool,
}

impl Default for EventFlags {
    fn default() -> Self {
        Self {
            call_ban_check: true,
            call_validity_check: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogFlags {
    /// Keep the host's join/leave console log enabled for simulated sessions.
    pub join_leave: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Cap on simultaneously active simulated sessions. Zero means unlimited.
    pub max_sessions: u32,
    /// Spawn sessions with their simulation subsystem disabled.
    pub disable_simulations: bool,
}

/// Cosmetic behaviors applied to every admitted session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Fun {
    pub always_rotate: bool,
    /// Yaw increment per rotation quantum, degrees.
    pub rotate_yaw: f32,
}

impl Default for Fun {
    fn default() -> Self {
        Self {
            always_rotate: false,
            rotate_yaw: 10.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Profile used for spawns without an explicit override or clone source.
    pub default: ProfileDescriptor,
    pub events: EventFlags,
    pub logs: LogFlags,
    pub options: Options,
    pub fun: Fun,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Config> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = toml::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.events.call_ban_check);
        assert!(config.events.call_validity_check);
        assert_eq!(config.options.max_sessions, 0);
        assert!(!config.fun.always_rotate);
        assert!(config.default.skins.is_some());
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [options]
            max_sessions = 8

            [fun]
            always_rotate = true
            "#,
        )
        .unwrap();
        assert_eq!(config.options.max_sessions, 8);
        assert!(config.fun.always_rotate);
        assert_eq!(config.fun.rotate_yaw, 10.0);
        assert!(config.events.call_ban_check);
    }
}
