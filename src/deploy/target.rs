// ABOUTME: The seam between the executor and a concrete deployment target.
// ABOUTME: Hosts (systemd or Docker over SSH) and functions implement the same sub-steps.

use async_trait::async_trait;
use std::sync::Arc;

use super::aws::AwsCli;
use super::error::{DeployError, DeployStep};
use super::firewall::Firewall;
use super::function::FunctionTarget;
use super::host::{HostMode, HostTarget, Launch};
use crate::config::SshSettings;
use crate::decision::{InfrastructureDecision, Shape};
use crate::facts::DeploymentRequest;
use crate::logbus::StageLog;
use crate::patch::PreparedSource;
use crate::provision::ProvisionedEnvironment;
use crate::retry::RetryPolicy;
use crate::ssh::{HostLogin, Session};

/// Whether the service is already up on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortStatus {
    Opened,
    AlreadyOpen,
    /// The target is reachable without a firewall rule (function URLs).
    NotRequired,
}

/// One provisioned target. Transfer and install must be safe to repeat.
#[async_trait]
pub trait DeployTarget: Send + Sync {
    /// Short description for log lines.
    fn describe(&self) -> String;

    async fn transfer(&self, source: &PreparedSource) -> Result<(), DeployError>;

    async fn install(&self) -> Result<(), DeployError>;

    async fn probe(&self) -> Result<ProbeStatus, DeployError>;

    async fn start(&self, source: &PreparedSource) -> Result<(), DeployError>;

    async fn open_port(&self, port: u16) -> Result<PortStatus, DeployError>;

    fn public_url(&self) -> Result<String, DeployError>;

    /// Release connections. Never fails the deployment.
    async fn close(self: Box<Self>);
}

/// Builds the target for a provisioned environment.
#[async_trait]
pub trait TargetFactory: Send + Sync {
    async fn target(
        &self,
        request: &DeploymentRequest,
        decision: &InfrastructureDecision,
        env: &ProvisionedEnvironment,
        log: &StageLog,
    ) -> Result<Box<dyn DeployTarget>, DeployError>;
}

/// Connects to real provisioned resources: SSH for hosts, the AWS CLI for functions.
pub struct CloudTargets {
    ssh: SshSettings,
    aws: AwsCli,
    firewall: Arc<dyn Firewall>,
    connect_retry: RetryPolicy,
}

impl CloudTargets {
    pub fn new(
        ssh: SshSettings,
        aws: AwsCli,
        firewall: Arc<dyn Firewall>,
        connect_retry: RetryPolicy,
    ) -> Self {
        Self {
            ssh,
            aws,
            firewall,
            connect_retry,
        }
    }

    async fn connect(&self, host: &str, log: &StageLog) -> Result<Session, DeployError> {
        log.info(format!("connecting to {host}"));
        let login = HostLogin::new(host, &self.ssh);
        self.connect_retry
            .run(
                "ssh connect",
                |attempt| {
                    if attempt > 1 {
                        log.info(format!("waiting for ssh on {host} (attempt {attempt})"));
                    }
                    Session::open(login.clone())
                },
                crate::ssh::Error::is_transient,
            )
            .await
            .map_err(|e| DeployError::ssh(DeployStep::Connect, e))
    }
}

#[async_trait]
impl TargetFactory for CloudTargets {
    async fn target(
        &self,
        request: &DeploymentRequest,
        decision: &InfrastructureDecision,
        env: &ProvisionedEnvironment,
        log: &StageLog,
    ) -> Result<Box<dyn DeployTarget>, DeployError> {
        let mode = match decision.shape {
            Shape::Serverless => {
                let function = env.function.clone().ok_or_else(|| {
                    DeployError::new(DeployStep::Connect, "environment has no function name")
                })?;
                let staging = env.workdir.with_file_name("bundle");
                return Ok(Box::new(FunctionTarget::new(
                    log.job(),
                    function,
                    env.function_url.clone(),
                    decision.params.runtime,
                    staging,
                    self.aws.clone(),
                )));
            }
            Shape::Container => HostMode::Docker,
            Shape::VirtualMachine => HostMode::Systemd,
        };

        let host = env.public_host.clone().ok_or_else(|| {
            DeployError::new(DeployStep::Connect, "environment has no public host")
        })?;
        let session = self.connect(&host, log).await?;

        let launch = Launch {
            app: request.app_name(),
            mode,
            runtime: decision.params.runtime,
            entry_point: request.analysis.entry_point.clone(),
            start_command: request.analysis.start_command.clone(),
            ports: decision.params.ports.clone(),
        };
        Ok(Box::new(HostTarget::new(
            Box::new(session),
            host,
            launch,
            env.security_group.clone(),
            Arc::clone(&self.firewall),
        )))
    }
}
