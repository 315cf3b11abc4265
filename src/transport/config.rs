//! SSH connection configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use crate::channel::MatchWindow;
use crate::error::{ConfigError, Result};
use crate::registry::SessionRegistry;

/// How the remote host identity is verified at connect time.
#[derive(Debug, Clone, Default)]
pub enum TrustPolicy {
    /// Trust-on-first-use against the known_hosts store: unknown hosts
    /// are accepted and pinned, changed keys are rejected.
    #[default]
    Tofu,

    /// Accept any host key without checking. For lab use only.
    AcceptAll,
}

/// Which authentication methods to attempt.
#[derive(Debug, Clone, Default)]
pub enum AuthMethod {
    /// Public-key authentication with the configured (or default
    /// `~/.ssh/id_rsa`) key, falling back to password auth.
    #[default]
    KeyThenPassword,

    /// Password authentication only.
    Password,
}

/// SSH connection configuration.
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Target host (hostname or IP address).
    pub host: String,

    /// SSH port (default: 22).
    pub port: u16,

    /// Username for authentication.
    pub username: String,

    /// Password, used both for authentication and for answering
    /// password prompts inside sessions.
    pub password: SecretString,

    /// Authentication method selection.
    pub auth: AuthMethod,

    /// Host key verification policy.
    pub trust: TrustPolicy,

    /// Path to an unencrypted PEM private key. Defaults to
    /// `<ssh_dir>/id_rsa`.
    pub key_path: Option<PathBuf>,

    /// SSH directory holding key material and known_hosts.
    /// Defaults to `$HOME/.ssh`.
    pub ssh_dir: Option<PathBuf>,

    /// Path of the known_hosts file. Defaults to `<ssh_dir>/known_hosts`.
    pub known_hosts_path: Option<PathBuf>,

    /// Connection inactivity timeout.
    pub timeout: Duration,

    /// Terminal width for PTY allocation.
    pub terminal_width: u32,

    /// Terminal height for PTY allocation.
    pub terminal_height: u32,

    /// Prompt match window for session sinks.
    pub match_window: MatchWindow,

    /// Optional registry the client announces itself to.
    pub registry: Option<Arc<SessionRegistry>>,
}

impl SshConfig {
    /// Create a configuration for `username@host` with the given password.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<SecretString>,
    ) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: username.into(),
            password: password.into(),
            auth: AuthMethod::default(),
            trust: TrustPolicy::default(),
            key_path: None,
            ssh_dir: None,
            known_hosts_path: None,
            timeout: Duration::from_secs(30),
            terminal_width: 80,
            terminal_height: 40,
            match_window: MatchWindow::default(),
            registry: None,
        }
    }

    /// Set the SSH port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Select password-only authentication.
    pub fn password_auth(mut self) -> Self {
        self.auth = AuthMethod::Password;
        self
    }

    /// Set the private key path.
    pub fn key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    /// Set the SSH directory (key material and known_hosts).
    pub fn ssh_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.ssh_dir = Some(path.into());
        self
    }

    /// Set the known_hosts file path.
    pub fn known_hosts(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    /// Set the host key verification policy.
    pub fn trust(mut self, trust: TrustPolicy) -> Self {
        self.trust = trust;
        self
    }

    /// Set the connection timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the prompt match window used by session sinks.
    pub fn match_window(mut self, window: MatchWindow) -> Self {
        self.match_window = window;
        self
    }

    /// Announce this client to a session registry.
    pub fn registry(mut self, registry: Arc<SessionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Resolve the SSH directory, defaulting to `$HOME/.ssh`.
    pub fn resolve_ssh_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.ssh_dir {
            return Ok(dir.clone());
        }
        let home = std::env::var_os("HOME").ok_or(ConfigError::NoHomeDirectory)?;
        Ok(PathBuf::from(home).join(".ssh"))
    }

    /// Resolve the private key path, defaulting to `<ssh_dir>/id_rsa`.
    pub fn resolve_key_path(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.key_path {
            return Ok(path.clone());
        }
        Ok(self.resolve_ssh_dir()?.join("id_rsa"))
    }

    /// Resolve the known_hosts path, defaulting to `<ssh_dir>/known_hosts`.
    pub fn resolve_known_hosts_path(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.known_hosts_path {
            return Ok(path.clone());
        }
        Ok(self.resolve_ssh_dir()?.join("known_hosts"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SshConfig::new("host1", "admin", "secret");
        assert_eq!(config.port, 22);
        assert_eq!(config.terminal_width, 80);
        assert_eq!(config.terminal_height, 40);
        assert_eq!(config.match_window, MatchWindow::Chunk);
    }

    #[test]
    fn test_path_resolution_from_ssh_dir() {
        let config = SshConfig::new("host1", "admin", "secret").ssh_dir("/tmp/ssh");
        assert_eq!(
            config.resolve_key_path().unwrap(),
            PathBuf::from("/tmp/ssh/id_rsa")
        );
        assert_eq!(
            config.resolve_known_hosts_path().unwrap(),
            PathBuf::from("/tmp/ssh/known_hosts")
        );
    }

    #[test]
    fn test_explicit_paths_win() {
        let config = SshConfig::new("host1", "admin", "secret")
            .ssh_dir("/tmp/ssh")
            .key_path("/elsewhere/key.pem")
            .known_hosts("/elsewhere/kh");
        assert_eq!(
            config.resolve_key_path().unwrap(),
            PathBuf::from("/elsewhere/key.pem")
        );
        assert_eq!(
            config.resolve_known_hosts_path().unwrap(),
            PathBuf::from("/elsewhere/kh")
        );
    }
}
