//! Numeric identity of a connection slot in the host table.

use core::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Opaque 64-bit identity of a (real or simulated) client connection.
///
/// Immutable once assigned. Uniqueness inside the live connection table is
/// enforced by the admission path, not by this type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(u64);

impl Identity {
    /// Degraded-mode fallback handed out when the identity pool is exhausted.
    ///
    /// Callers must treat this value as potentially colliding; it exists so an
    /// exhausted pool never hangs or aborts the caller.
    pub const SENTINEL: Identity = Identity(1);

    pub const fn new(raw: u64) -> Self {
        Identity(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.0)
    }
}

impl From<u64> for Identity {
    fn from(raw: u64) -> Self {
        Identity(raw)
    }
}

impl From<Identity> for u64 {
    fn from(id: Identity) -> Self {
        id.0
    }
}

impl FromStr for Identity {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_roundtrip() {
        let id = Identity::new(7656119);
        let parsed: Identity = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_rejects_non_numeric() {
        assert!("not-a-number".parse::<Identity>().is_err());
    }

    #[test]
    fn sentinel_is_one() {
        assert_eq!(Identity::SENTINEL.raw(), 1);
    }
}
