// ABOUTME: Configuration types and parsing for autodeploy.yml.
// ABOUTME: Handles YAML parsing, discovery, defaults, and env var indirection.

mod env_value;
mod init;
mod ssh;
mod timeouts;

pub use env_value::{EnvValue, resolve_env_map};
pub use init::init_config;
pub use ssh::SshSettings;
pub use timeouts::StageTimeouts;

use crate::decision::DEFAULT_REGION;
use crate::error::{Error, Result};
use crate::patch::ConflictPolicy;
use crate::retry::RetryPolicy;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const CONFIG_FILENAME: &str = "autodeploy.yml";
pub const CONFIG_FILENAME_ALT: &str = "autodeploy.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".autodeploy/config.yml";

/// Default location of job records and terraform workdirs, relative to the
/// directory the config was discovered in.
pub const DEFAULT_STATE_DIR: &str = ".autodeploy";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default)]
    pub terraform: TerraformConfig,

    #[serde(default)]
    pub aws: AwsConfig,

    #[serde(default)]
    pub ssh: SshSettings,

    #[serde(default)]
    pub timeouts: StageTimeouts,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub logs: LogsConfig,

    #[serde(default)]
    pub patch: PatchConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TerraformConfig {
    #[serde(default = "default_terraform_binary")]
    pub binary: String,

    /// Extra environment for every terraform invocation (credentials, plugin cache).
    #[serde(default)]
    pub env: HashMap<String, EnvValue>,
}

impl Default for TerraformConfig {
    fn default() -> Self {
        Self {
            binary: default_terraform_binary(),
            env: HashMap::new(),
        }
    }
}

fn default_terraform_binary() -> String {
    "terraform".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AwsConfig {
    #[serde(default = "default_aws_binary")]
    pub binary: String,

    #[serde(default)]
    pub profile: Option<String>,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            binary: default_aws_binary(),
            profile: None,
        }
    }
}

fn default_aws_binary() -> String {
    "aws".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogsConfig {
    /// Maximum events kept per job. Oldest are evicted first; unbounded if unset.
    #[serde(default)]
    pub cap: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatchConfig {
    #[serde(default)]
    pub on_conflict: ConflictPolicy,

    /// Additional variables written to the application's `.env`.
    #[serde(default)]
    pub env: HashMap<String, EnvValue>,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_DIR)
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            region: default_region(),
            terraform: TerraformConfig::default(),
            aws: AwsConfig::default(),
            ssh: SshSettings::default(),
            timeouts: StageTimeouts::default(),
            retry: RetryPolicy::default(),
            logs: LogsConfig::default(),
            patch: PatchConfig::default(),
        }
    }
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        // Relative state dirs are anchored next to the project, not the cwd.
        let base = match path.parent() {
            Some(parent) if parent.ends_with(".autodeploy") => parent.parent(),
            other => other,
        };
        if let Some(base) = base {
            config.anchor(base);
        }
        Ok(config)
    }

    /// Find the config file in `dir`, or fall back to defaults anchored there.
    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                tracing::debug!("using config {}", path.display());
                return Self::load(path);
            }
        }

        tracing::debug!("no config in {}, using defaults", dir.display());
        let mut config = Config::default();
        config.anchor(dir);
        Ok(config)
    }

    /// Like [`Config::discover`], but a missing file is an error.
    pub fn discover_required(dir: &Path) -> Result<Self> {
        let found = [CONFIG_FILENAME, CONFIG_FILENAME_ALT, CONFIG_FILENAME_DIR]
            .iter()
            .any(|name| dir.join(name).exists());
        if !found {
            return Err(Error::ConfigNotFound(dir.to_path_buf()));
        }
        Self::discover(dir)
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.state_dir.join("jobs")
    }

    fn anchor(&mut self, base: &Path) {
        if self.state_dir.is_relative() {
            self.state_dir = base.join(&self.state_dir);
        }
    }

    fn validate(&self) -> Result<()> {
        if self.region.trim().is_empty() {
            return Err(Error::InvalidConfig("region must not be empty".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.logs.cap == Some(0) {
            return Err(Error::InvalidConfig("logs.cap must be positive".to_string()));
        }
        Ok(())
    }
}
