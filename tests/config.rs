// ABOUTME: Integration tests for configuration parsing and validation.
// ABOUTME: Tests YAML parsing, discovery, defaults, and env var indirection.

use autodeploy::config::*;
use autodeploy::patch::ConflictPolicy;
use std::collections::HashMap;
use std::time::Duration;

mod parsing {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.terraform.binary, "terraform");
        assert_eq!(config.aws.binary, "aws");
        assert_eq!(config.ssh.user, "ec2-user");
        assert_eq!(config.ssh.port, 22);
        assert!(config.ssh.trust_first_connection);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.timeouts, StageTimeouts::default());
        assert!(config.logs.cap.is_none());
        assert_eq!(config.patch.on_conflict, ConflictPolicy::Reject);
    }

    #[test]
    fn parse_full_config() {
        let yaml = r#"
region: eu-west-1
state_dir: /var/lib/autodeploy

terraform:
  binary: /usr/local/bin/terraform
  env:
    TF_PLUGIN_CACHE_DIR: /tmp/plugins

aws:
  profile: deploy

ssh:
  user: ubuntu
  port: 2222
  key_name: ops
  trust_first_connection: false
  command_timeout: 90s

timeouts:
  deciding: 5s
  provisioning: 45m
  patching: 1m
  deploying: 10m

retry:
  max_attempts: 3
  initial_delay: 500ms
  max_delay: 10s

logs:
  cap: 500

patch:
  on_conflict: keep-existing
  env:
    SECRET_KEY:
      env: APP_SECRET
      default: dev-only
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.jobs_dir(), std::path::Path::new("/var/lib/autodeploy/jobs"));
        assert_eq!(config.terraform.binary, "/usr/local/bin/terraform");
        assert_eq!(config.aws.profile.as_deref(), Some("deploy"));
        assert_eq!(config.ssh.user, "ubuntu");
        assert_eq!(config.ssh.port, 2222);
        assert_eq!(config.ssh.key_name.as_deref(), Some("ops"));
        assert!(!config.ssh.trust_first_connection);
        assert_eq!(config.ssh.command_timeout, Duration::from_secs(90));
        assert_eq!(config.timeouts.provisioning, Duration::from_secs(45 * 60));
        assert_eq!(config.retry.initial_delay, Duration::from_millis(500));
        assert_eq!(config.logs.cap, Some(500));
        assert_eq!(config.patch.on_conflict, ConflictPolicy::KeepExisting);
        assert_eq!(
            config.patch.env.get("SECRET_KEY"),
            Some(&EnvValue::FromEnv {
                var: "APP_SECRET".to_string(),
                default: Some("dev-only".to_string()),
            })
        );
    }

    #[test]
    fn empty_region_is_rejected() {
        let err = Config::from_yaml("region: \"  \"\n").unwrap_err();
        assert!(err.to_string().contains("region"));
    }

    #[test]
    fn zero_retry_attempts_is_rejected() {
        let err = Config::from_yaml("retry:\n  max_attempts: 0\n").unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn malformed_duration_is_rejected() {
        assert!(Config::from_yaml("timeouts:\n  deciding: soon\n").is_err());
    }
}

mod timeouts {
    use super::*;
    use autodeploy::job::Stage;

    #[test]
    fn only_working_stages_are_bounded() {
        let timeouts = StageTimeouts::uniform(Duration::from_secs(3));
        for stage in [Stage::Deciding, Stage::Provisioning, Stage::Patching, Stage::Deploying] {
            assert_eq!(timeouts.for_stage(stage), Some(Duration::from_secs(3)));
        }
        for stage in [Stage::Received, Stage::Succeeded, Stage::Failed] {
            assert_eq!(timeouts.for_stage(stage), None);
        }
    }
}

mod discovery {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults_anchored_at_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.state_dir, dir.path().join(DEFAULT_STATE_DIR));
    }

    #[test]
    fn discover_required_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::discover_required(dir.path()).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn relative_state_dir_is_anchored_next_to_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILENAME), "state_dir: state\n").unwrap();
        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.jobs_dir(), dir.path().join("state").join("jobs"));
    }

    #[test]
    fn config_in_dot_directory_anchors_at_project_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".autodeploy")).unwrap();
        std::fs::write(dir.path().join(CONFIG_FILENAME_DIR), "region: ap-south-1\n").unwrap();
        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.region, "ap-south-1");
        assert_eq!(config.state_dir, dir.path().join(DEFAULT_STATE_DIR));
    }
}

mod init {
    use super::*;

    #[test]
    fn init_writes_a_config_that_parses() {
        let dir = tempfile::tempdir().unwrap();
        init_config(dir.path(), Some("eu-central-1"), false).unwrap();
        let config = Config::load(&dir.path().join(CONFIG_FILENAME)).unwrap();
        assert_eq!(config.region, "eu-central-1");
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        init_config(dir.path(), None, false).unwrap();
        assert!(init_config(dir.path(), None, false).is_err());
        init_config(dir.path(), Some("us-west-2"), true).unwrap();
    }
}

mod env_values {
    use super::*;

    #[test]
    fn literal_resolves_to_itself() {
        let value = EnvValue::Literal("x".to_string());
        assert_eq!(value.resolve().unwrap(), "x");
    }

    #[test]
    fn reference_reads_the_environment() {
        temp_env::with_var("AUTODEPLOY_TEST_SECRET", Some("s3cret"), || {
            let value = EnvValue::FromEnv {
                var: "AUTODEPLOY_TEST_SECRET".to_string(),
                default: None,
            };
            assert_eq!(value.resolve().unwrap(), "s3cret");
        });
    }

    #[test]
    fn missing_reference_uses_default_or_fails() {
        temp_env::with_var_unset("AUTODEPLOY_TEST_UNSET", || {
            let with_default = EnvValue::FromEnv {
                var: "AUTODEPLOY_TEST_UNSET".to_string(),
                default: Some("fallback".to_string()),
            };
            assert_eq!(with_default.resolve().unwrap(), "fallback");

            let without = EnvValue::FromEnv {
                var: "AUTODEPLOY_TEST_UNSET".to_string(),
                default: None,
            };
            let err = without.resolve().unwrap_err();
            assert!(err.to_string().contains("AUTODEPLOY_TEST_UNSET"));
        });
    }

    #[test]
    fn resolved_map_is_sorted() {
        let mut map = HashMap::new();
        map.insert("B".to_string(), EnvValue::Literal("2".to_string()));
        map.insert("A".to_string(), EnvValue::Literal("1".to_string()));
        let resolved = resolve_env_map(&map).unwrap();
        let keys: Vec<_> = resolved.keys().cloned().collect();
        assert_eq!(keys, vec!["A", "B"]);
    }
}
