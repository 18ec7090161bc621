// ABOUTME: Remote shells on provisioned hosts.
// ABOUTME: The deploy stage talks to hosts only through the RemoteShell trait.

mod client;
mod error;

pub use client::{HostKeyPolicy, HostLogin, Session};
pub use error::{Error, Result};

use async_trait::async_trait;

use crate::process::CommandOutput;

/// A shell on a remote host. Implemented by [`Session`]; faked in tests.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn exec(&self, command: &str) -> Result<CommandOutput>;

    async fn exec_with_stdin(&self, command: &str, input: &[u8]) -> Result<CommandOutput>;

    async fn disconnect(self: Box<Self>) -> Result<()>;
}
