//! The client: composition root and operational surface.

use std::path::Path;
use std::time::Duration;

use log::debug;
use secrecy::SecretString;

use crate::channel::PromptRules;
use crate::error::Result;
use crate::registry::RegistryToken;
use crate::session::SessionRunner;
use crate::transfer::FileTransferPump;
use crate::transport::{SshConfig, SshTransport};

/// An authenticated connection to one remote host.
///
/// The client owns the transport for its entire lifetime and constructs
/// a fresh session per operation. Every operation is blocking from the
/// caller's perspective and fails fast: transport and trust errors abort
/// the call, nothing is retried.
///
/// # Example
///
/// ```rust,no_run
/// use sshpilot::{Client, SshConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), sshpilot::Error> {
///     let client = Client::connect(SshConfig::new("192.168.1.10", "admin", "secret")).await?;
///
///     client.run("uname -a").await?;
///     let uptime = client.output("uptime").await?;
///     println!("{uptime}");
///
///     client.exit().await?;
///     Ok(())
/// }
/// ```
pub struct Client {
    transport: SshTransport,
    _registry_token: Option<RegistryToken>,
}

impl Client {
    /// Connect and authenticate according to `config`.
    pub async fn connect(config: SshConfig) -> Result<Self> {
        let registry_token = config.registry.as_ref().map(|registry| {
            registry.register(format!(
                "{}@{}:{}",
                config.username, config.host, config.port
            ))
        });

        let transport = SshTransport::connect(config).await?;
        Ok(Self {
            transport,
            _registry_token: registry_token,
        })
    }

    /// The transport this client owns.
    pub fn transport(&self) -> &SshTransport {
        &self.transport
    }

    fn runner(&self) -> SessionRunner<'_> {
        SessionRunner::new(&self.transport)
    }

    fn username(&self) -> &str {
        &self.transport.config().username
    }

    fn password(&self) -> &SecretString {
        &self.transport.config().password
    }

    fn password_rules(&self) -> PromptRules {
        PromptRules::password(self.username(), self.password())
    }

    /// Run a command, answering password prompts with the stored
    /// password. Fatal on non-zero exit.
    pub async fn run(&self, command: &str) -> Result<()> {
        self.runner().run(self.password_rules(), command).await
    }

    /// Run a command, answering a `(yes/no)? ` confirmation with "yes".
    pub async fn run_with_yes(&self, command: &str) -> Result<()> {
        self.runner().run(PromptRules::yes(), command).await
    }

    /// Run a command with a caller-supplied prompt rule table.
    pub async fn run_with_prompts(&self, rules: PromptRules, command: &str) -> Result<()> {
        self.runner().run(rules, command).await
    }

    /// Run a command that walks through a password-change dialog,
    /// answering both the "New password" and "Retype new password"
    /// prompts with `new_password`.
    pub async fn run_with_password_change(
        &self,
        new_password: &SecretString,
        command: &str,
    ) -> Result<()> {
        self.runner()
            .run(PromptRules::password_change(new_password), command)
            .await
    }

    /// Run a command with `sudo`, answering the sudo password prompt.
    pub async fn sudo_run(&self, command: &str) -> Result<()> {
        self.run(&format!("sudo {command}")).await
    }

    /// Run a command and capture its output. Fatal on non-zero exit.
    pub async fn output(&self, command: &str) -> Result<String> {
        self.runner().output(self.password_rules(), command).await
    }

    /// Run a command and capture its output, returning whatever was
    /// captured even when the command exits non-zero.
    pub async fn output_ignoring_error(&self, command: &str) -> Result<String> {
        self.runner()
            .output_ignoring_error(self.password_rules(), command)
            .await
    }

    /// Open an interactive shell and feed it commands on a fixed delay.
    /// Best-effort pacing; see [`SessionRunner::run_timed_sequence`].
    pub async fn run_timed_sequence(&self, commands: &[&str], delay: Duration) -> Result<()> {
        self.runner().run_timed_sequence(commands, delay).await
    }

    /// Upload a local file to the remote host.
    pub async fn upload_file(&self, local_path: &Path, remote_path: &Path) -> Result<()> {
        FileTransferPump::new(&self.transport)
            .upload(local_path, remote_path)
            .await
    }

    /// Download a remote file into a local file.
    pub async fn download_file(&self, remote_path: &Path, local_path: &Path) -> Result<()> {
        FileTransferPump::new(&self.transport)
            .download(remote_path, local_path)
            .await
    }

    /// Check whether a file exists on the remote host.
    pub async fn file_exists(&self, path: &str) -> Result<bool> {
        let command = format!("(ls {path} >> /dev/null 2>&1 && echo true) || echo false");
        let output = self.output(&command).await?;
        Ok(output.trim() == "true")
    }

    /// Write `content` to a remote file, replacing it.
    pub async fn write_file(&self, content: &str, path: &str) -> Result<()> {
        self.run(&format!("cat <<'EOF' | tee {path}\n{content}\nEOF\n"))
            .await
    }

    /// Write `content` to a remote file through `sudo tee`.
    pub async fn sudo_write_file(&self, content: &str, path: &str) -> Result<()> {
        self.run(&format!("cat <<'EOF' | sudo tee {path}\n{content}\nEOF\n"))
            .await
    }

    /// Append `content` to a remote file.
    pub async fn append_file(&self, content: &str, path: &str) -> Result<()> {
        self.run(&format!("echo '{content}' >> {path}")).await
    }

    /// Install a public key line into the remote user's authorized_keys,
    /// creating `~/.ssh` with owner-only permissions.
    pub async fn authorize_key(&self, public_key: &str) -> Result<()> {
        self.run("mkdir -p ~/.ssh").await?;
        self.append_file(public_key.trim_end(), "~/.ssh/authorized_keys")
            .await?;
        self.run("chmod 700 ~/.ssh").await?;
        self.run("chmod 700 ~/.ssh/authorized_keys").await?;
        Ok(())
    }

    /// Run `exit` on the remote side and close the connection.
    pub async fn exit(self) -> Result<()> {
        self.runner().run(self.password_rules(), "exit").await?;
        debug!("closing connection to {}", self.transport.config().host);
        self.transport.close().await
    }
}
