//! Trust-on-first-use host identity verification.
//!
//! Remote host identities are pinned in an OpenSSH-format known_hosts
//! file. An unknown host is accepted on first contact and recorded; a
//! known host presenting a different key of the same algorithm is
//! rejected as a potential impersonation.

mod store;

pub use store::TrustStore;

use russh::keys::PublicKey;

/// One line of the trust store: a set of hostname patterns and the
/// public key pinned for them.
#[derive(Debug, Clone)]
pub struct HostIdentity {
    /// Hostname patterns this key applies to (comma-separated on disk).
    pub hostnames: Vec<String>,

    /// The pinned public key.
    pub key: PublicKey,
}

impl HostIdentity {
    /// Check whether this identity applies to `host`.
    pub fn applies_to(&self, host: &str) -> bool {
        self.hostnames.iter().any(|h| h == host)
    }
}

/// Outcome of comparing an observed identity against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustDecision {
    /// The host is known and the observed key matches the pinned one.
    KnownMatch,

    /// The host is known under the same key algorithm but the key
    /// differs. Either a MITM attack or the host was reconfigured.
    KnownMismatch,

    /// No entry for this host.
    Unknown,
}
