// ABOUTME: SSH connection settings for provisioned hosts.
// ABOUTME: The host itself comes from provisioning; everything else is configured here.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct SshSettings {
    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Private key used to log in. Falls back to the agent, then ~/.ssh defaults.
    #[serde(default)]
    pub key_path: Option<PathBuf>,

    /// Name of the EC2 key pair attached to new instances.
    #[serde(default)]
    pub key_name: Option<String>,

    /// Freshly provisioned hosts are never in known_hosts, so this defaults to on.
    #[serde(default = "default_trust_first_connection")]
    pub trust_first_connection: bool,

    #[serde(default)]
    pub known_hosts_path: Option<PathBuf>,

    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,
}

fn default_user() -> String {
    "ec2-user".to_string()
}

fn default_port() -> u16 {
    22
}

fn default_trust_first_connection() -> bool {
    true
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(300)
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            user: default_user(),
            port: default_port(),
            key_path: None,
            key_name: None,
            trust_first_connection: default_trust_first_connection(),
            known_hosts_path: None,
            command_timeout: default_command_timeout(),
        }
    }
}
