// ABOUTME: Deploys to a provisioned Lambda function through the AWS CLI.
// ABOUTME: Stages the bundle locally, uploads it, and tags the configuration with the job id.

use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};

use super::aws::AwsCli;
use super::error::{DeployError, DeployStep};
use super::target::{DeployTarget, PortStatus, ProbeStatus};
use crate::decision::Runtime;
use crate::patch::PreparedSource;
use crate::process::Invocation;
use crate::types::{FunctionName, JobId};

/// Environment variable that records which job configured the function.
pub const JOB_MARKER: &str = "AUTODEPLOY_JOB";

const BUNDLE_FILE: &str = "bundle.zip";

#[derive(Debug)]
pub struct FunctionTarget {
    job: JobId,
    function: FunctionName,
    url: Option<String>,
    runtime: Runtime,
    /// Holds `src/` (the staged tree) and the zipped bundle.
    staging: PathBuf,
    aws: AwsCli,
}

impl FunctionTarget {
    pub fn new(
        job: JobId,
        function: FunctionName,
        url: Option<String>,
        runtime: Runtime,
        staging: impl Into<PathBuf>,
        aws: AwsCli,
    ) -> Self {
        Self {
            job,
            function,
            url,
            runtime,
            staging: staging.into(),
            aws,
        }
    }

    fn source_dir(&self) -> PathBuf {
        self.staging.join("src")
    }

    fn bundle_path(&self) -> PathBuf {
        self.staging.join(BUNDLE_FILE)
    }

    async fn local(&self, step: DeployStep, invocation: Invocation) -> Result<(), DeployError> {
        let what = invocation.display();
        let output = self
            .aws
            .run_local(&invocation)
            .await
            .map_err(|e| DeployError::io(step, e))?;
        if output.success() {
            Ok(())
        } else {
            Err(DeployError::command(step, &what, &output))
        }
    }

    async fn call_aws(&self, step: DeployStep, args: Vec<String>) -> Result<String, DeployError> {
        let what = format!("aws {}", args.iter().take(2).cloned().collect::<Vec<_>>().join(" "));
        let output = self
            .aws
            .run(args)
            .await
            .map_err(|e| DeployError::io(step, e))?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(DeployError::command(step, &what, &output))
        }
    }

    fn dependency_install(&self, dir: &Path) -> Option<Invocation> {
        match self.runtime {
            Runtime::Python311 if dir.join("requirements.txt").exists() => Some(
                Invocation::new("pip")
                    .args(["install", "--quiet", "-r", "requirements.txt", "-t", "."])
                    .cwd(dir),
            ),
            Runtime::Nodejs18 if dir.join("package.json").exists() => {
                Some(Invocation::new("npm").args(["install", "--omit=dev"]).cwd(dir))
            }
            _ => None,
        }
    }
}

#[async_trait]
impl DeployTarget for FunctionTarget {
    fn describe(&self) -> String {
        format!("function {}", self.function)
    }

    async fn transfer(&self, source: &PreparedSource) -> Result<(), DeployError> {
        let dir = self.source_dir();
        let tree = source.tree.clone();
        tokio::task::spawn_blocking(move || {
            if dir.exists() {
                std::fs::remove_dir_all(&dir)?;
            }
            std::fs::create_dir_all(&dir)?;
            tree.write_to(&dir)
        })
        .await
        .map_err(|e| DeployError::new(DeployStep::Transfer, e.to_string()))?
        .map_err(|e| DeployError::io(DeployStep::Transfer, e))
    }

    async fn install(&self) -> Result<(), DeployError> {
        let dir = self.source_dir();
        if let Some(invocation) = self.dependency_install(&dir) {
            self.local(DeployStep::Install, invocation).await?;
        }

        let bundle = self.bundle_path();
        if bundle.exists() {
            std::fs::remove_file(&bundle).map_err(|e| DeployError::io(DeployStep::Install, e))?;
        }
        self.local(
            DeployStep::Install,
            Invocation::new("zip")
                .args(["-q", "-r"])
                .arg(bundle.to_string_lossy())
                .arg(".")
                .cwd(&dir),
        )
        .await?;

        self.call_aws(
            DeployStep::Install,
            vec![
                "lambda".to_string(),
                "update-function-code".to_string(),
                "--function-name".to_string(),
                self.function.to_string(),
                "--zip-file".to_string(),
                format!("fileb://{}", bundle.display()),
            ],
        )
        .await?;
        Ok(())
    }

    /// Running once the configuration carries this job's marker.
    async fn probe(&self) -> Result<ProbeStatus, DeployError> {
        let stdout = self
            .call_aws(
                DeployStep::Probe,
                vec![
                    "lambda".to_string(),
                    "get-function-configuration".to_string(),
                    "--function-name".to_string(),
                    self.function.to_string(),
                    "--output".to_string(),
                    "json".to_string(),
                ],
            )
            .await?;
        let config: serde_json::Value = serde_json::from_str(&stdout)
            .map_err(|e| DeployError::new(DeployStep::Probe, e.to_string()))?;

        let marker = config
            .pointer(&format!("/Environment/Variables/{JOB_MARKER}"))
            .and_then(|v| v.as_str());
        let ready = config.get("State").and_then(|v| v.as_str()) != Some("Failed");

        if ready && marker == Some(self.job.to_string().as_str()) {
            Ok(ProbeStatus::Running)
        } else {
            Ok(ProbeStatus::Stopped)
        }
    }

    async fn start(&self, source: &PreparedSource) -> Result<(), DeployError> {
        let mut variables = source.env.clone();
        variables.insert(JOB_MARKER.to_string(), self.job.to_string());
        let environment = json!({ "Variables": variables }).to_string();

        self.call_aws(
            DeployStep::Start,
            vec![
                "lambda".to_string(),
                "update-function-configuration".to_string(),
                "--function-name".to_string(),
                self.function.to_string(),
                "--environment".to_string(),
                environment,
            ],
        )
        .await?;
        Ok(())
    }

    async fn open_port(&self, _port: u16) -> Result<PortStatus, DeployError> {
        Ok(PortStatus::NotRequired)
    }

    fn public_url(&self) -> Result<String, DeployError> {
        self.url
            .clone()
            .ok_or_else(|| DeployError::new(DeployStep::Publish, "function has no URL"))
    }

    async fn close(self: Box<Self>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::SourceTree;
    use crate::process::{CommandOutput, CommandRunner};
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Invocation>>,
        stdout: Mutex<String>,
    }

    #[async_trait]
    impl CommandRunner for Recorder {
        async fn run(&self, invocation: &Invocation) -> std::io::Result<CommandOutput> {
            self.seen.lock().push(invocation.clone());
            Ok(CommandOutput {
                exit_code: 0,
                stdout: self.stdout.lock().clone(),
                stderr: String::new(),
            })
        }
    }

    fn target(dir: &Path, job: JobId, runner: Arc<Recorder>) -> FunctionTarget {
        FunctionTarget::new(
            job,
            FunctionName::new("shop-api"),
            Some("https://abc.lambda-url.us-east-1.on.aws/".to_string()),
            Runtime::Python311,
            dir,
            AwsCli::new("aws", "us-east-1", None, runner),
        )
    }

    fn prepared() -> PreparedSource {
        PreparedSource {
            tree: SourceTree::from_files([
                ("app.py", "def handler(event, ctx): pass\n"),
                ("requirements.txt", "requests\n"),
            ]),
            env: BTreeMap::from([("API_MODE".to_string(), "prod".to_string())]),
            changes: vec![],
        }
    }

    #[tokio::test]
    async fn install_bundles_and_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(Recorder::default());
        let target = target(dir.path(), JobId::new(), runner.clone());

        target.transfer(&prepared()).await.unwrap();
        assert!(dir.path().join("src/app.py").exists());

        target.install().await.unwrap();
        let programs: Vec<_> = runner.seen.lock().iter().map(|i| i.program.clone()).collect();
        assert_eq!(programs, vec!["pip", "zip", "aws"]);
        let upload = runner.seen.lock()[2].display();
        assert!(upload.contains("update-function-code --function-name shop-api"));
    }

    #[tokio::test]
    async fn probe_recognises_own_marker() {
        let dir = tempfile::tempdir().unwrap();
        let job = JobId::new();
        let runner = Arc::new(Recorder::default());
        let target = target(dir.path(), job, runner.clone());

        *runner.stdout.lock() =
            json!({ "State": "Active", "Environment": { "Variables": { (JOB_MARKER): job.to_string() } } })
                .to_string();
        assert_eq!(target.probe().await.unwrap(), ProbeStatus::Running);

        *runner.stdout.lock() = json!({ "State": "Active" }).to_string();
        assert_eq!(target.probe().await.unwrap(), ProbeStatus::Stopped);
    }

    #[tokio::test]
    async fn start_sets_environment_with_marker() {
        let dir = tempfile::tempdir().unwrap();
        let job = JobId::new();
        let runner = Arc::new(Recorder::default());
        let target = target(dir.path(), job, runner.clone());

        target.start(&prepared()).await.unwrap();
        let seen = runner.seen.lock();
        let env_arg = seen[0]
            .args
            .iter()
            .skip_while(|a| a.as_str() != "--environment")
            .nth(1)
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(env_arg).unwrap();
        assert_eq!(parsed["Variables"]["API_MODE"], "prod");
        assert_eq!(parsed["Variables"][JOB_MARKER], job.to_string());
    }

    #[tokio::test]
    async fn no_firewall_rule_needed() {
        let dir = tempfile::tempdir().unwrap();
        let target = target(dir.path(), JobId::new(), Arc::new(Recorder::default()));
        assert_eq!(target.open_port(8080).await.unwrap(), PortStatus::NotRequired);
    }
}
