//! Verdict types passed through the host's extensibility hooks.
//!
//! Third-party hooks receive a mutable verdict and may flip it either way.
//! A hook returning an error is logged and discarded by the host; the verdict
//! computed so far stands (host extensibility must not be able to abort the
//! admission pipeline).

/// Outcome of the ban check for a pending connection.
#[derive(Debug, Clone, Default)]
pub struct BanVerdict {
    pub banned: bool,
    pub reason: String,
    pub remaining_secs: u32,
}

/// Outcome of the generic validity check for a pending connection.
#[derive(Debug, Clone)]
pub struct ValidityVerdict {
    pub valid: bool,
    pub explanation: String,
}

impl Default for ValidityVerdict {
    fn default() -> Self {
        Self {
            valid: true,
            explanation: String::new(),
        }
    }
}
