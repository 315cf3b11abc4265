//! File-backed known_hosts store.

use std::fs::{self, OpenOptions};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, warn};
use russh::keys::PublicKey;

use super::{HostIdentity, TrustDecision};
use crate::error::{ConfigError, Result, TrustError};

/// Append-only registry of remote host identities.
///
/// The backing file uses the OpenSSH known_hosts format, one identity
/// per line: `<comma-separated-hostname-patterns> <key-type> <base64>`.
/// Existing lines are never rewritten or deleted; remediation of a bad
/// entry is a human editing the file.
///
/// One store is shared by every connection of a process. The
/// read-then-append sequence in [`TrustStore::verify`] holds a single
/// lock so two first-contact acceptances cannot interleave.
pub struct TrustStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TrustStore {
    /// Open the store at `path`, creating the file with owner-only
    /// permissions if it does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|source| ConfigError::KnownHostsFile {
                    path: path.clone(),
                    source,
                })?;
            }
            let mut options = OpenOptions::new();
            options.write(true).create(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }
            options
                .open(&path)
                .map_err(|source| ConfigError::KnownHostsFile {
                    path: path.clone(),
                    source,
                })?;
        }

        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    /// The path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Compare an observed `(host, key)` pair against the store.
    ///
    /// The decision depends only on the current file contents; the first
    /// entry matching the host under the observed key's algorithm is
    /// authoritative.
    pub fn check(&self, host: &str, key: &PublicKey) -> Result<TrustDecision> {
        let _guard = self.lock.lock().expect("trust store lock poisoned");
        self.check_locked(host, key)
    }

    /// Append a new identity for `host`. Never touches existing lines.
    pub fn record(&self, host: &str, key: &PublicKey) -> Result<()> {
        let _guard = self.lock.lock().expect("trust store lock poisoned");
        self.record_locked(host, key)
    }

    /// Run the trust-on-first-use protocol for one observed identity.
    ///
    /// - Unknown host: accepted and recorded. Deliberately permissive;
    ///   first contact pins the identity for future comparison.
    /// - Known host, identical key: accepted, store untouched.
    /// - Known host, same algorithm but different key: rejected with
    ///   [`TrustError::KeyMismatch`].
    ///
    /// Read and append happen under one lock acquisition so concurrent
    /// connections cannot interleave their first-contact appends.
    pub fn verify(&self, host: &str, key: &PublicKey) -> Result<TrustDecision> {
        let _guard = self.lock.lock().expect("trust store lock poisoned");

        let decision = self.check_locked(host, key)?;
        match decision {
            TrustDecision::KnownMatch => {
                debug!("host key for {host} matches known_hosts");
            }
            TrustDecision::KnownMismatch => {
                warn!(
                    "host key for {host} does not match known_hosts; \
                     either a MITM attack or {host} was reconfigured"
                );
                return Err(TrustError::KeyMismatch {
                    host: host.to_string(),
                    key_type: key.algorithm().as_str().to_string(),
                }
                .into());
            }
            TrustDecision::Unknown => {
                warn!("{host} is not trusted yet, adding its key to {}", self.path.display());
                self.record_locked(host, key)?;
            }
        }
        Ok(decision)
    }

    /// Load every identity from the backing file.
    pub fn identities(&self) -> Result<Vec<HostIdentity>> {
        let _guard = self.lock.lock().expect("trust store lock poisoned");
        self.load()
    }

    fn check_locked(&self, host: &str, key: &PublicKey) -> Result<TrustDecision> {
        for identity in self.load()? {
            if !identity.applies_to(host) {
                continue;
            }
            if identity.key.algorithm() != key.algorithm() {
                continue;
            }
            if identity.key.key_data() == key.key_data() {
                return Ok(TrustDecision::KnownMatch);
            }
            return Ok(TrustDecision::KnownMismatch);
        }
        Ok(TrustDecision::Unknown)
    }

    fn record_locked(&self, host: &str, key: &PublicKey) -> Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|source| ConfigError::KnownHostsFile {
                path: self.path.clone(),
                source,
            })?;

        let key_text = key
            .to_openssh()
            .map_err(|e| ConfigError::KnownHostsFile {
                path: self.path.clone(),
                source: io::Error::other(e),
            })?;
        writeln!(file, "{host} {key_text}").map_err(|source| ConfigError::KnownHostsFile {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }

    fn load(&self) -> Result<Vec<HostIdentity>> {
        let contents =
            fs::read_to_string(&self.path).map_err(|source| ConfigError::KnownHostsFile {
                path: self.path.clone(),
                source,
            })?;

        let mut identities = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((hosts, key_text)) = line.split_once(char::is_whitespace) else {
                return Err(ConfigError::MalformedKnownHosts {
                    path: self.path.clone(),
                    line: index + 1,
                }
                .into());
            };

            let key = PublicKey::from_openssh(key_text.trim()).map_err(|_| {
                ConfigError::MalformedKnownHosts {
                    path: self.path.clone(),
                    line: index + 1,
                }
            })?;

            identities.push(HostIdentity {
                hostnames: hosts.split(',').map(str::to_string).collect(),
                key,
            });
        }
        Ok(identities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ED25519_A: &str =
        "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIAABAgMEBQYHCAkKCwwNDg8QERITFBUWFxgZGhscHR4f";
    const ED25519_B: &str =
        "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIGRlZmdoaWprbG1ub3BxcnN0dXZ3eHl6e3x9fn+AgYKD";

    fn key(text: &str) -> PublicKey {
        PublicKey::from_openssh(text).unwrap()
    }

    fn store() -> (tempfile::TempDir, TrustStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = TrustStore::open(dir.path().join("known_hosts")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_open_creates_file() {
        let (_dir, store) = store();
        assert!(store.path().exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(store.path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_unknown_host() {
        let (_dir, store) = store();
        assert_eq!(
            store.check("host1", &key(ED25519_A)).unwrap(),
            TrustDecision::Unknown
        );
    }

    #[test]
    fn test_record_then_check_round_trip() {
        let (_dir, store) = store();
        store.record("host1", &key(ED25519_A)).unwrap();
        assert_eq!(
            store.check("host1", &key(ED25519_A)).unwrap(),
            TrustDecision::KnownMatch
        );
    }

    #[test]
    fn test_known_mismatch() {
        let (_dir, store) = store();
        store.record("host1", &key(ED25519_A)).unwrap();
        assert_eq!(
            store.check("host1", &key(ED25519_B)).unwrap(),
            TrustDecision::KnownMismatch
        );
    }

    #[test]
    fn test_verify_accepts_and_records_unknown() {
        let (_dir, store) = store();
        assert_eq!(
            store.verify("host1", &key(ED25519_A)).unwrap(),
            TrustDecision::Unknown
        );
        // Pinned now.
        assert_eq!(
            store.check("host1", &key(ED25519_A)).unwrap(),
            TrustDecision::KnownMatch
        );
    }

    #[test]
    fn test_verify_rejects_mismatch_without_mutation() {
        let (_dir, store) = store();
        store.record("host1", &key(ED25519_A)).unwrap();
        let before = fs::read_to_string(store.path()).unwrap();

        let err = store.verify("host1", &key(ED25519_B)).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Trust(TrustError::KeyMismatch { .. })
        ));
        assert_eq!(fs::read_to_string(store.path()).unwrap(), before);
    }

    #[test]
    fn test_verify_keeps_store_unchanged_on_match() {
        let (_dir, store) = store();
        store.record("host1", &key(ED25519_A)).unwrap();
        let before = fs::read_to_string(store.path()).unwrap();

        store.verify("host1", &key(ED25519_A)).unwrap();
        assert_eq!(fs::read_to_string(store.path()).unwrap(), before);
    }

    #[test]
    fn test_different_host_is_unknown() {
        let (_dir, store) = store();
        store.record("host1", &key(ED25519_A)).unwrap();
        assert_eq!(
            store.check("host2", &key(ED25519_A)).unwrap(),
            TrustDecision::Unknown
        );
    }

    #[test]
    fn test_comma_separated_patterns() {
        let (_dir, store) = store();
        store.record("host1,10.0.0.5", &key(ED25519_A)).unwrap();
        assert_eq!(
            store.check("10.0.0.5", &key(ED25519_A)).unwrap(),
            TrustDecision::KnownMatch
        );
    }

    #[test]
    fn test_malformed_line_is_config_error() {
        let (_dir, store) = store();
        fs::write(store.path(), "host1 not-a-key\n").unwrap();
        let err = store.check("host1", &key(ED25519_A)).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Config(ConfigError::MalformedKnownHosts { line: 1, .. })
        ));
    }

    #[test]
    fn test_blank_and_comment_lines_skipped() {
        let (_dir, store) = store();
        fs::write(
            store.path(),
            format!("# comment\n\nhost1 {ED25519_A}\n"),
        )
        .unwrap();
        assert_eq!(
            store.check("host1", &key(ED25519_A)).unwrap(),
            TrustDecision::KnownMatch
        );
    }
}
