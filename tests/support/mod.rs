// ABOUTME: Test support utilities.
// ABOUTME: Provides fake provisioners, targets, and fixtures for pipeline tests.

#![allow(dead_code)]

use async_trait::async_trait;
use autodeploy::config::StageTimeouts;
use autodeploy::decision::{DecisionEngine, InfrastructureDecision};
use autodeploy::deploy::{
    DeployError, DeployStep, DeployTarget, Executor, PortStatus, ProbeStatus, TargetFactory,
};
use autodeploy::facts::DeploymentRequest;
use autodeploy::job::{MemoryStore, Orchestrator, Stage, Stages};
use autodeploy::logbus::{LogBus, StageLog};
use autodeploy::patch::{PreparedSource, Preparer};
use autodeploy::provision::{
    ProvisionError, ProvisionedEnvironment, Provisioner, ResourceHandle, outputs,
};
use autodeploy::retry::RetryPolicy;
use autodeploy::types::{AppName, JobId};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use std::time::Duration;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("autodeploy=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// A repository with a single Flask entry point.
pub fn flask_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("app.py"),
        "app.run(host=\"127.0.0.1\", port=5000)\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("requirements.txt"), "flask\n").unwrap();
    dir
}

/// Request for a Dockerfile-based service in `repo`.
pub fn container_request(repo: &Path) -> DeploymentRequest {
    DeploymentRequest::from_yaml(&format!(
        "repository: {}\napp_name: shop\nanalysis:\n  has_dockerfile: true\n  declared_ports: [5000]\n",
        repo.display()
    ))
    .unwrap()
}

/// Request that no rule can classify.
pub fn unresolvable_request(repo: &Path) -> DeploymentRequest {
    DeploymentRequest::from_yaml(&format!("repository: {}\n", repo.display())).unwrap()
}

pub fn stage_log(stage: Stage) -> (Arc<LogBus>, StageLog) {
    let bus = Arc::new(LogBus::new(None));
    let log = StageLog::new(Arc::clone(&bus), JobId::new(), stage);
    (bus, log)
}

pub fn host_environment() -> ProvisionedEnvironment {
    let mut out = BTreeMap::new();
    out.insert(outputs::PUBLIC_HOST.to_string(), "203.0.113.10".to_string());
    out.insert(outputs::SECURITY_GROUP_ID.to_string(), "sg-0abc".to_string());
    out.insert(outputs::INSTANCE_ID.to_string(), "i-0123".to_string());
    ProvisionedEnvironment::from_outputs(
        "aws-container",
        PathBuf::from("/tmp/autodeploy-test/terraform"),
        out,
        vec![
            ResourceHandle::new("aws_security_group.app", "sg-0abc"),
            ResourceHandle::new("aws_instance.app", "i-0123"),
        ],
    )
}

/// What the fake provisioner does when called.
#[derive(Debug, Clone)]
pub enum ProvisionPlan {
    Succeed,
    /// Fail after creating these resources.
    FailAfter(Vec<ResourceHandle>),
    /// Never finish; `observe` reports these resources.
    Hang(Vec<ResourceHandle>),
}

#[derive(Debug)]
pub struct FakeProvisioner {
    plan: ProvisionPlan,
    delay: Duration,
    pub calls: Mutex<u32>,
}

impl FakeProvisioner {
    pub fn new(plan: ProvisionPlan) -> Self {
        Self {
            plan,
            delay: Duration::ZERO,
            calls: Mutex::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock()
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn provision(
        &self,
        _job: JobId,
        _app: &AppName,
        _decision: &InfrastructureDecision,
        log: &StageLog,
    ) -> Result<ProvisionedEnvironment, ProvisionError> {
        *self.calls.lock() += 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.plan {
            ProvisionPlan::Succeed => {
                log.info("provisioned host 203.0.113.10");
                Ok(host_environment())
            }
            ProvisionPlan::FailAfter(created) => Err(ProvisionError::Backend {
                source: autodeploy::provision::BackendError::structural(
                    "terraform apply",
                    "InvalidAMIID.NotFound",
                ),
                created: created.clone(),
            }),
            ProvisionPlan::Hang(_) => std::future::pending().await,
        }
    }

    async fn observe(&self, _job: JobId) -> Vec<ResourceHandle> {
        match &self.plan {
            ProvisionPlan::Hang(found) | ProvisionPlan::FailAfter(found) => found.clone(),
            ProvisionPlan::Succeed => host_environment().resources,
        }
    }
}

/// Everything the fake target was asked to do.
#[derive(Debug, Default)]
pub struct TargetCalls {
    pub transfers: u32,
    pub installs: u32,
    pub probes: u32,
    pub starts: u32,
    pub ports: Vec<u16>,
    pub transferred: Option<PreparedSource>,
    pub closed: bool,
}

/// Behaviour knobs for the fake target.
#[derive(Debug, Clone, Default)]
pub struct TargetScript {
    /// The service is already up before anything is started.
    pub already_running: bool,
    /// Number of transfer attempts that fail before one succeeds.
    pub flaky_transfers: u32,
    /// Install always fails with this output.
    pub install_failure: Option<String>,
    /// Block in install until the test drops the job.
    pub hang_install: bool,
    /// Port already allowed by the firewall.
    pub open_ports: Vec<u16>,
}

pub struct FakeTarget {
    script: TargetScript,
    calls: Arc<Mutex<TargetCalls>>,
}

impl FakeTarget {
    pub fn new(script: TargetScript) -> (Self, Arc<Mutex<TargetCalls>>) {
        let calls = Arc::new(Mutex::new(TargetCalls::default()));
        (
            Self {
                script,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

#[async_trait]
impl DeployTarget for FakeTarget {
    fn describe(&self) -> String {
        "fake host".to_string()
    }

    async fn transfer(&self, source: &PreparedSource) -> Result<(), DeployError> {
        let mut calls = self.calls.lock();
        calls.transfers += 1;
        if calls.transfers <= self.script.flaky_transfers {
            return Err(DeployError::new(DeployStep::Transfer, "connection reset"));
        }
        calls.transferred = Some(source.clone());
        Ok(())
    }

    async fn install(&self) -> Result<(), DeployError> {
        self.calls.lock().installs += 1;
        if self.script.hang_install {
            std::future::pending::<()>().await;
        }
        match &self.script.install_failure {
            Some(output) => Err(DeployError {
                step: DeployStep::Install,
                message: "pip install exited with status 1".to_string(),
                output: Some(output.clone()),
            }),
            None => Ok(()),
        }
    }

    async fn probe(&self) -> Result<ProbeStatus, DeployError> {
        let mut calls = self.calls.lock();
        calls.probes += 1;
        if self.script.already_running || calls.starts > 0 {
            Ok(ProbeStatus::Running)
        } else {
            Ok(ProbeStatus::Stopped)
        }
    }

    async fn start(&self, _source: &PreparedSource) -> Result<(), DeployError> {
        self.calls.lock().starts += 1;
        Ok(())
    }

    async fn open_port(&self, port: u16) -> Result<PortStatus, DeployError> {
        self.calls.lock().ports.push(port);
        if self.script.open_ports.contains(&port) {
            Ok(PortStatus::AlreadyOpen)
        } else {
            Ok(PortStatus::Opened)
        }
    }

    fn public_url(&self) -> Result<String, DeployError> {
        Ok("http://203.0.113.10:5000".to_string())
    }

    async fn close(self: Box<Self>) {
        self.calls.lock().closed = true;
    }
}

/// Hands out one [`FakeTarget`] per job, all sharing one call record.
pub struct FakeTargets {
    script: TargetScript,
    pub calls: Arc<Mutex<TargetCalls>>,
}

impl FakeTargets {
    pub fn new(script: TargetScript) -> Self {
        Self {
            script,
            calls: Arc::new(Mutex::new(TargetCalls::default())),
        }
    }
}

#[async_trait]
impl TargetFactory for FakeTargets {
    async fn target(
        &self,
        _request: &DeploymentRequest,
        _decision: &InfrastructureDecision,
        _env: &ProvisionedEnvironment,
        _log: &StageLog,
    ) -> Result<Box<dyn DeployTarget>, DeployError> {
        Ok(Box::new(FakeTarget {
            script: self.script.clone(),
            calls: Arc::clone(&self.calls),
        }))
    }
}

pub fn stages(provisioner: Arc<dyn Provisioner>, targets: Arc<dyn TargetFactory>) -> Stages {
    Stages {
        engine: DecisionEngine::default(),
        provisioner,
        preparer: Preparer::default(),
        executor: Executor::new(RetryPolicy::immediate(3)),
        targets,
    }
}

pub fn orchestrator(
    provisioner: Arc<dyn Provisioner>,
    targets: Arc<dyn TargetFactory>,
    store: Arc<MemoryStore>,
    timeouts: StageTimeouts,
) -> Orchestrator {
    init_tracing();
    Orchestrator::new(stages(provisioner, targets), store, timeouts, None)
}

/// Like [`orchestrator`], but each job keeps at most `cap` log events.
pub fn capped_orchestrator(
    provisioner: Arc<dyn Provisioner>,
    targets: Arc<dyn TargetFactory>,
    store: Arc<MemoryStore>,
    cap: usize,
) -> Orchestrator {
    init_tracing();
    Orchestrator::new(
        stages(provisioner, targets),
        store,
        StageTimeouts::default(),
        Some(cap),
    )
}
