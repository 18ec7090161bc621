// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Creates autodeploy.yml template files.

use std::path::Path;

use crate::error::{Error, Result};

use super::{CONFIG_FILENAME, Config, DEFAULT_STATE_DIR};

pub fn init_config(dir: &Path, region: Option<&str>, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let region = region.unwrap_or(crate::decision::DEFAULT_REGION);
    let yaml = generate_template_yaml(region);

    // Parse what we are about to write so a bad --region never reaches disk.
    Config::from_yaml(&yaml)?;
    std::fs::write(&config_path, yaml)?;

    Ok(())
}

fn generate_template_yaml(region: &str) -> String {
    format!(
        r#"region: {region}
state_dir: {DEFAULT_STATE_DIR}

ssh:
  user: ec2-user
  # key_path: ~/.ssh/autodeploy.pem
  # key_name: autodeploy
  # New instances are unknown hosts; disable to require known_hosts entries.
  trust_first_connection: true

timeouts:
  deciding: 30s
  provisioning: 30m
  patching: 2m
  deploying: 20m

retry:
  max_attempts: 5
  initial_delay: 2s
  max_delay: 1m

# logs:
#   cap: 10000

patch:
  # reject | override | keep-existing
  on_conflict: reject
  # env:
  #   SECRET_KEY:
  #     env: APP_SECRET_KEY
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_round_trips_through_parser() {
        let config = Config::from_yaml(&generate_template_yaml("eu-west-1")).unwrap();
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.retry.max_attempts, 5);
    }
}
