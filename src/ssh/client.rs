// ABOUTME: russh-backed login to provisioned hosts.
// ABOUTME: Key-pair or agent auth, host key learning for new instances, and buffered remote commands.

use super::RemoteShell;
use super::error::{Error, Result};
use crate::config::SshSettings;
use crate::process::CommandOutput;
use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::keys::agent::client::AgentClient;
use russh::keys::known_hosts;
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key, ssh_key};
use russh::{ChannelMsg, Disconnect};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixStream;

/// Keys tried when neither a key file nor an agent is available.
const FALLBACK_KEYS: [&str; 3] = [".ssh/id_ed25519", ".ssh/id_rsa", ".ssh/id_ecdsa"];

const IDLE_LIMIT: Duration = Duration::from_secs(30);

/// What to do with a host key that is not in known_hosts yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Accept and record it. New instances always start here.
    Learn,
    Reject,
}

/// Where and as whom to log in.
#[derive(Debug, Clone)]
pub struct HostLogin {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub key_path: Option<PathBuf>,
    pub unknown_hosts: HostKeyPolicy,
    pub known_hosts_path: Option<PathBuf>,
    pub command_timeout: Duration,
}

impl HostLogin {
    pub fn new(host: impl Into<String>, settings: &SshSettings) -> Self {
        Self {
            host: host.into(),
            port: settings.port,
            user: settings.user.clone(),
            key_path: settings.key_path.clone(),
            unknown_hosts: if settings.trust_first_connection {
                HostKeyPolicy::Learn
            } else {
                HostKeyPolicy::Reject
            },
            known_hosts_path: settings.known_hosts_path.clone(),
            command_timeout: settings.command_timeout,
        }
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Host key verification against known_hosts.
pub(crate) struct HostKeyCheck {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    known_hosts: Option<PathBuf>,
}

impl HostKeyCheck {
    fn lookup(&self, key: &ssh_key::PublicKey) -> std::result::Result<bool, russh::keys::Error> {
        match &self.known_hosts {
            Some(path) => known_hosts::check_known_hosts_path(&self.host, self.port, key, path),
            None => known_hosts::check_known_hosts(&self.host, self.port, key),
        }
    }

    fn remember(&self, key: &ssh_key::PublicKey) {
        let learned = match &self.known_hosts {
            Some(path) => known_hosts::learn_known_hosts_path(&self.host, self.port, key, path),
            None => known_hosts::learn_known_hosts(&self.host, self.port, key),
        };
        if let Err(e) = learned {
            tracing::warn!(host = %self.host, "could not record host key: {}", e);
        }
    }
}

impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match self.lookup(key) {
            Ok(true) => Ok(true),
            // A changed key is never accepted, whatever the policy.
            Err(russh::keys::Error::KeyChanged { .. }) => {
                tracing::error!(host = %self.host, "host key changed");
                Ok(false)
            }
            Ok(false) | Err(_) if self.policy == HostKeyPolicy::Learn => {
                tracing::info!(host = %self.host, "recording host key for new instance");
                self.remember(key);
                Ok(true)
            }
            Ok(false) | Err(_) => Ok(false),
        }
    }
}

enum Credential {
    Agent(AgentClient<UnixStream>),
    Key(Arc<ssh_key::PrivateKey>),
}

impl Credential {
    async fn find(login: &HostLogin) -> Result<Self> {
        if let Some(path) = &login.key_path {
            return read_key(path).map(Credential::Key);
        }
        if let Ok(agent) = AgentClient::connect_env().await {
            return Ok(Credential::Agent(agent));
        }

        let home = std::env::var_os("HOME").map(PathBuf::from).ok_or_else(|| {
            Error::NoCredentials("no key_path, no agent, and HOME is unset".to_string())
        })?;
        FALLBACK_KEYS
            .iter()
            .find_map(|rel| read_key(&home.join(rel)).ok())
            .map(Credential::Key)
            .ok_or_else(|| {
                Error::NoCredentials("no key_path, no agent, and no key under ~/.ssh".to_string())
            })
    }
}

fn read_key(path: &Path) -> Result<Arc<ssh_key::PrivateKey>> {
    load_secret_key(path, None)
        .map(Arc::new)
        .map_err(|e| Error::UnreadableKey {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// A logged-in session on one host.
pub struct Session {
    login: HostLogin,
    handle: Handle<HostKeyCheck>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("login", &self.login).finish()
    }
}

impl Session {
    pub async fn open(login: HostLogin) -> Result<Self> {
        let credential = Credential::find(&login).await?;

        let config = Arc::new(client::Config {
            inactivity_timeout: Some(IDLE_LIMIT),
            ..Default::default()
        });
        let check = HostKeyCheck {
            host: login.host.clone(),
            port: login.port,
            policy: login.unknown_hosts,
            known_hosts: login.known_hosts_path.clone(),
        };

        let mut handle = client::connect(config, (login.host.as_str(), login.port), check)
            .await
            .map_err(|e| Error::Unreachable {
                host: login.address(),
                reason: e.to_string(),
            })?;

        if !sign_in(&mut handle, &login.user, credential).await? {
            return Err(Error::Rejected {
                user: login.user.clone(),
            });
        }
        tracing::debug!(host = %login.host, user = %login.user, "ssh session open");

        Ok(Self { login, handle })
    }

    /// Run `command`, optionally feeding `input` on stdin, and wait for it
    /// to exit within the configured command timeout.
    async fn run(&self, command: &str, input: Option<&[u8]>) -> Result<CommandOutput> {
        let limit = self.login.command_timeout;
        tokio::time::timeout(limit, self.run_to_exit(command, input))
            .await
            .map_err(|_| Error::TimedOut(limit))?
    }

    async fn run_to_exit(&self, command: &str, input: Option<&[u8]>) -> Result<CommandOutput> {
        tracing::debug!(host = %self.login.host, "remote: {}", command);
        let channel_err = |what: &str, e: russh::Error| Error::Channel(format!("{what}: {e}"));

        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| channel_err("open", e))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| channel_err("exec", e))?;
        if let Some(input) = input {
            channel
                .data(input)
                .await
                .map_err(|e| channel_err("stdin", e))?;
            channel.eof().await.map_err(|e| channel_err("stdin eof", e))?;
        }

        let mut collected = Collected::default();
        while let Some(msg) = channel.wait().await {
            if collected.absorb(msg) {
                break;
            }
        }
        collected.finish()
    }
}

async fn sign_in(
    handle: &mut Handle<HostKeyCheck>,
    user: &str,
    credential: Credential,
) -> Result<bool> {
    match credential {
        Credential::Key(key) => {
            let hash = handle.best_supported_rsa_hash().await?.flatten();
            let auth = handle
                .authenticate_publickey(user, PrivateKeyWithHashAlg::new(key, hash))
                .await?;
            Ok(auth.success())
        }
        Credential::Agent(mut agent) => {
            let identities = agent
                .request_identities()
                .await
                .map_err(|e| Error::NoCredentials(format!("agent: {e}")))?;
            for identity in identities {
                let auth = handle
                    .authenticate_publickey_with(user, identity, None, &mut agent)
                    .await;
                if auth.is_ok_and(|auth| auth.success()) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

/// Output gathered from one exec channel.
#[derive(Default)]
struct Collected {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    status: Option<u32>,
    eof: bool,
}

impl Collected {
    /// Take one channel message. True once nothing more is expected.
    fn absorb(&mut self, msg: ChannelMsg) -> bool {
        match msg {
            ChannelMsg::Data { data } => self.stdout.extend_from_slice(&data),
            ChannelMsg::ExtendedData { data, ext: 1 } => self.stderr.extend_from_slice(&data),
            ChannelMsg::ExitStatus { exit_status } => self.status = Some(exit_status),
            ChannelMsg::Eof => self.eof = true,
            ChannelMsg::Close => return true,
            _ => {}
        }
        self.eof && self.status.is_some()
    }

    fn finish(self) -> Result<CommandOutput> {
        let exit_code = self.status.ok_or(Error::Dropped)?;
        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&self.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&self.stderr).into_owned(),
        })
    }
}

#[async_trait]
impl RemoteShell for Session {
    async fn exec(&self, command: &str) -> Result<CommandOutput> {
        self.run(command, None).await
    }

    async fn exec_with_stdin(&self, command: &str, input: &[u8]) -> Result<CommandOutput> {
        self.run(command, Some(input)).await
    }

    async fn disconnect(self: Box<Self>) -> Result<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "deploy finished", "en")
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_follows_settings() {
        let settings = SshSettings {
            user: "ubuntu".to_string(),
            port: 2222,
            key_path: Some(PathBuf::from("/keys/app.pem")),
            ..SshSettings::default()
        };
        let login = HostLogin::new("203.0.113.10", &settings);
        assert_eq!(login.address(), "203.0.113.10:2222");
        assert_eq!(login.user, "ubuntu");
        assert_eq!(login.unknown_hosts, HostKeyPolicy::Learn);
        assert_eq!(login.key_path, Some(PathBuf::from("/keys/app.pem")));

        let strict = SshSettings {
            trust_first_connection: false,
            ..SshSettings::default()
        };
        assert_eq!(
            HostLogin::new("h", &strict).unknown_hosts,
            HostKeyPolicy::Reject
        );
    }

    #[test]
    fn collected_output_needs_an_exit_status() {
        let mut out = Collected::default();
        assert!(!out.absorb(ChannelMsg::Eof));
        assert!(out.absorb(ChannelMsg::Close));
        assert!(matches!(out.finish(), Err(Error::Dropped)));
    }

    #[test]
    fn collected_output_ends_at_eof_and_status() {
        let mut out = Collected::default();
        assert!(!out.absorb(ChannelMsg::ExitStatus { exit_status: 3 }));
        assert!(out.absorb(ChannelMsg::Eof));
        assert_eq!(out.finish().unwrap().exit_code, 3);
    }
}
