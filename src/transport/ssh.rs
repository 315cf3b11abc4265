//! SSH transport implementation using russh.

use std::sync::{Arc, Mutex};

use log::debug;
use russh::client::{self, Handle, Msg};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use russh::{Channel, Pty};
use secrecy::ExposeSecret;

use super::config::{AuthMethod, SshConfig, TrustPolicy};
use crate::error::{ConfigError, Error, Result, TransportError};
use crate::trust::TrustStore;

/// SSH transport wrapping a russh client handle.
///
/// One transport is owned by one [`crate::Client`] for its whole
/// lifetime; sessions are opened on it per invocation.
pub struct SshTransport {
    /// The russh session handle.
    session: Handle<ClientHandler>,

    /// Configuration used for this connection.
    config: SshConfig,
}

impl SshTransport {
    /// Connect and authenticate, verifying the host identity per the
    /// configured [`TrustPolicy`].
    pub async fn connect(config: SshConfig) -> Result<Self> {
        let store = match config.trust {
            TrustPolicy::Tofu => {
                Some(Arc::new(TrustStore::open(config.resolve_known_hosts_path()?)?))
            }
            TrustPolicy::AcceptAll => None,
        };
        Self::connect_with_store(config, store).await
    }

    /// Connect using an explicit (possibly shared) trust store.
    ///
    /// `None` skips host key verification entirely.
    pub async fn connect_with_store(
        config: SshConfig,
        store: Option<Arc<TrustStore>>,
    ) -> Result<Self> {
        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: Some(config.timeout),
            ..Default::default()
        });

        let trust_error: Arc<Mutex<Option<Error>>> = Arc::new(Mutex::new(None));

        let handler = ClientHandler {
            host: config.host.clone(),
            store,
            trust_error: trust_error.clone(),
        };

        let mut session = client::connect(
            ssh_config,
            (config.host.as_str(), config.port),
            handler,
        )
        .await
        .map_err(|e| {
            // If check_server_key stored a detailed error, surface that
            // instead of the generic russh::Error::UnknownKey.
            if let Some(trust_err) = trust_error.lock().unwrap().take() {
                trust_err
            } else {
                TransportError::Ssh(e).into()
            }
        })?;

        Self::authenticate(&mut session, &config).await?;
        debug!("connected to {}:{} as {}", config.host, config.port, config.username);

        Ok(Self { session, config })
    }

    /// Authenticate with the server.
    async fn authenticate(session: &mut Handle<ClientHandler>, config: &SshConfig) -> Result<()> {
        let success = match config.auth {
            AuthMethod::Password => Self::authenticate_password(session, config).await?,
            AuthMethod::KeyThenPassword => {
                Self::authenticate_key(session, config).await?
                    || Self::authenticate_password(session, config).await?
            }
        };

        if !success {
            return Err(TransportError::AuthenticationFailed {
                user: config.username.clone(),
            }
            .into());
        }

        Ok(())
    }

    async fn authenticate_password(
        session: &mut Handle<ClientHandler>,
        config: &SshConfig,
    ) -> Result<bool> {
        Ok(session
            .authenticate_password(&config.username, config.password.expose_secret())
            .await
            .map_err(TransportError::Ssh)?
            .success())
    }

    async fn authenticate_key(
        session: &mut Handle<ClientHandler>,
        config: &SshConfig,
    ) -> Result<bool> {
        let path = config.resolve_key_path()?;
        let key = load_secret_key(&path, None).map_err(|e| ConfigError::KeyFile {
            path,
            message: e.to_string(),
        })?;

        // Pick the best RSA hash algorithm the server supports.
        let hash_alg = session
            .best_supported_rsa_hash()
            .await
            .map_err(TransportError::Ssh)?
            .flatten();

        Ok(session
            .authenticate_publickey(
                &config.username,
                PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
            )
            .await
            .map_err(TransportError::Ssh)?
            .success())
    }

    /// Open a plain session channel (no PTY). Used for stream transfers.
    pub async fn open_session(&self) -> Result<Channel<Msg>> {
        self.session
            .channel_open_session()
            .await
            .map_err(|e| TransportError::SessionOpen(e).into())
    }

    /// Open a session channel with a PTY allocated.
    ///
    /// The PTY uses the configured dimensions with local echo and output
    /// post-processing disabled and 14.4k baud-rate hints. Interactive
    /// prompts (password entry, confirmations) are only emitted by many
    /// remote programs when a terminal is attached.
    pub async fn open_pty_session(&self) -> Result<Channel<Msg>> {
        let channel = self.open_session().await?;

        let modes = [
            (Pty::ECHO, 0),
            (Pty::OPOST, 0),
            (Pty::TTY_OP_ISPEED, 14400),
            (Pty::TTY_OP_OSPEED, 14400),
        ];
        channel
            .request_pty(
                true,
                "xterm",
                self.config.terminal_width,
                self.config.terminal_height,
                0,
                0,
                &modes,
            )
            .await
            .map_err(TransportError::Pty)?;

        Ok(channel)
    }

    /// The configuration this transport was created with.
    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    /// Close the connection.
    pub async fn close(self) -> Result<()> {
        self.session
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
            .map_err(TransportError::Ssh)?;
        Ok(())
    }
}

/// SSH client handler for russh, delegating host key checks to the
/// trust store.
struct ClientHandler {
    host: String,

    /// `None` accepts every key (TrustPolicy::AcceptAll).
    store: Option<Arc<TrustStore>>,

    /// Stores the detailed trust error so connect() can surface it.
    trust_error: Arc<Mutex<Option<Error>>>,
}

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let Some(ref store) = self.store else {
            return Ok(true);
        };

        match store.verify(&self.host, server_public_key) {
            Ok(_) => Ok(true),
            Err(e) => {
                *self.trust_error.lock().unwrap() = Some(e);
                Ok(false)
            }
        }
    }
}
