//! Error types for sshpilot.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Main error type for sshpilot operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Local configuration errors (key files, known_hosts, environment)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Host identity trust errors
    #[error("Trust error: {0}")]
    Trust(#[from] TrustError),

    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Remote command execution errors
    #[error("Command error: {0}")]
    Command(#[from] CommandError),
}

/// Configuration errors: missing or unreadable local files, bad environment.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Private key file could not be read or decoded
    #[error("Cannot load private key {path}: {message}")]
    KeyFile { path: PathBuf, message: String },

    /// A known_hosts line that is not parseable
    #[error("Malformed known_hosts line {line} in {path}")]
    MalformedKnownHosts { path: PathBuf, line: usize },

    /// Known_hosts file could not be opened or created
    #[error("Cannot open known_hosts file {path}: {source}")]
    KnownHostsFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Home directory could not be resolved for default paths
    #[error("Cannot resolve home directory (HOME not set)")]
    NoHomeDirectory,
}

/// Trust errors: the observed host identity conflicts with the store.
#[derive(Error, Debug)]
pub enum TrustError {
    /// Known host presented a different key of the same algorithm.
    /// Either a MITM attack or the host was reconfigured.
    #[error("Host key mismatch for {host}: stored {key_type} key differs from the observed one")]
    KeyMismatch { host: String, key_type: String },
}

/// Transport layer errors (connection, authentication, session setup).
#[derive(Error, Debug)]
pub enum TransportError {
    /// SSH protocol or connection error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed for all configured methods
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// Failed to open a session channel
    #[error("Failed to open session channel: {0}")]
    SessionOpen(russh::Error),

    /// Failed to allocate a pseudo-terminal on the session
    #[error("Failed to request PTY: {0}")]
    Pty(russh::Error),

    /// I/O error on a channel stream
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Remote command errors (exit status reporting).
#[derive(Error, Debug)]
pub enum CommandError {
    /// The remote command exited with a non-zero status
    #[error("Command '{command}' exited with status {status}")]
    ExitStatus { command: String, status: u32 },

    /// The channel closed without reporting an exit status
    #[error("Command '{command}' did not report an exit status")]
    NoExitStatus { command: String },
}

/// Result type alias using sshpilot's Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_hosts_errors_name_the_store_not_a_key_file() {
        let err = ConfigError::KnownHostsFile {
            path: PathBuf::from("/home/u/.ssh/known_hosts"),
            source: io::Error::other("write failed"),
        };
        let message = err.to_string();
        assert!(message.starts_with("Cannot open known_hosts file"));
        assert!(!message.contains("private key"));
    }
}
