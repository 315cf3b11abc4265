//! # sshpilot
//!
//! Async SSH client for automating interactive remote shell sessions.
//!
//! sshpilot runs commands on remote hosts, detects the prompts the
//! remote program emits (password requests, yes/no confirmations,
//! password-change dialogs, custom prompts), and injects the right
//! response without a human at the keyboard. Host identities are
//! verified trust-on-first-use against an OpenSSH-format known_hosts
//! file.
//!
//! ## Features
//!
//! - Async SSH connections via russh
//! - Suffix-based prompt detection with canned responses
//! - Trust-on-first-use host key pinning (reject changed keys)
//! - Capture or pass-through of session output
//! - scp-protocol file upload and `cat`-based download
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sshpilot::{Client, SshConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sshpilot::Error> {
//!     let client = Client::connect(SshConfig::new("192.168.1.10", "admin", "secret")).await?;
//!
//!     client.run_with_yes("apt-get upgrade").await?;
//!     let kernel = client.output("uname -r").await?;
//!     println!("{kernel}");
//!
//!     client.exit().await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod client;
pub mod error;
pub mod registry;
pub mod session;
pub mod transfer;
pub mod transport;
pub mod trust;

// Re-export main types for convenience
pub use channel::{Downstream, InterceptingSink, MatchWindow, PromptRule, PromptRules};
pub use client::Client;
pub use error::Error;
pub use registry::{RegistryToken, SessionRegistry};
pub use session::SessionRunner;
pub use transfer::FileTransferPump;
pub use transport::{AuthMethod, SshConfig, SshTransport, TrustPolicy};
pub use trust::{HostIdentity, TrustDecision, TrustStore};
