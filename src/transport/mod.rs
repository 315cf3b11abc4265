//! SSH transport layer wrapping russh.
//!
//! Connection setup, authentication, host key verification, and
//! session channel creation.

pub mod config;
mod ssh;

pub use config::{AuthMethod, SshConfig, TrustPolicy};
pub use ssh::SshTransport;
