// ABOUTME: Job registry and per-job driver tasks.
// ABOUTME: Callers submit, query, stream, and cancel; only the owning task mutates a job.

use futures::Stream;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

use super::pipeline::Pipeline;
use super::record::{JobRecord, JobSnapshot};
use super::state::{Failure, FailureCause};
use super::status::Stage;
use super::store::{FileStore, JobStore};
use crate::config::{Config, StageTimeouts, resolve_env_map};
use crate::decision::DecisionEngine;
use crate::deploy::{AwsCli, AwsSecurityGroups, CloudTargets, Executor, TargetFactory};
use crate::error::{Error, Result};
use crate::facts::DeploymentRequest;
use crate::logbus::{LogBus, LogEvent, StageLog};
use crate::patch::Preparer;
use crate::process::{CommandRunner, SystemRunner};
use crate::provision::{
    Provisioner, ProvisioningDriver, ResourceHandle, TerraformCli, TerraformTemplates,
};
use crate::types::JobId;

/// Pending commands per job. Only cancel requests travel here.
const COMMAND_CAPACITY: usize = 8;

/// The components a job runs through.
pub struct Stages {
    pub engine: DecisionEngine,
    pub provisioner: Arc<dyn Provisioner>,
    pub preparer: Preparer,
    pub executor: Executor,
    pub targets: Arc<dyn TargetFactory>,
}

impl Stages {
    /// Real collaborators: terraform, the AWS CLI, and SSH.
    pub fn from_config(config: &Config) -> Result<Self> {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);

        let backend = TerraformCli::new(
            config.terraform.binary.clone(),
            resolve_env_map(&config.terraform.env)?,
            Arc::clone(&runner),
        );
        let provisioner = ProvisioningDriver::new(
            config.jobs_dir(),
            Arc::new(TerraformTemplates),
            Arc::new(backend),
            config.retry.clone(),
        )
        .key_name(config.ssh.key_name.clone());

        let aws = AwsCli::from_config(config, runner);
        let targets = CloudTargets::new(
            config.ssh.clone(),
            aws.clone(),
            Arc::new(AwsSecurityGroups::new(aws)),
            config.retry.clone(),
        );

        Ok(Self {
            engine: DecisionEngine::new(config.region.clone()),
            provisioner: Arc::new(provisioner),
            preparer: Preparer::from_config(&config.patch)?,
            executor: Executor::new(config.retry.clone()),
            targets: Arc::new(targets),
        })
    }
}

/// Result of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Stopped before any infrastructure was created.
    Cancelled,
    /// Infrastructure may exist; the job stops after its current stage and
    /// is flagged for external teardown.
    MarkedForTeardown,
    AlreadyTerminal,
}

enum JobCommand {
    Cancel { reply: oneshot::Sender<CancelOutcome> },
}

struct JobHandle {
    snapshot: watch::Receiver<JobSnapshot>,
    bus: Arc<LogBus>,
    commands: Option<mpsc::Sender<JobCommand>>,
}

pub struct Orchestrator {
    stages: Arc<Stages>,
    store: Arc<dyn JobStore>,
    timeouts: StageTimeouts,
    log_cap: Option<usize>,
    jobs: RwLock<HashMap<JobId, JobHandle>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("timeouts", &self.timeouts)
            .field("log_cap", &self.log_cap)
            .field("jobs", &self.jobs.read().len())
            .finish()
    }
}

impl Orchestrator {
    pub fn new(
        stages: Stages,
        store: Arc<dyn JobStore>,
        timeouts: StageTimeouts,
        log_cap: Option<usize>,
    ) -> Self {
        Self {
            stages: Arc::new(stages),
            store,
            timeouts,
            log_cap,
            jobs: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            Stages::from_config(config)?,
            Arc::new(FileStore::new(config.jobs_dir())),
            config.timeouts.clone(),
            config.logs.cap,
        ))
    }

    /// Register the job and start driving it. Returns immediately.
    pub fn submit(&self, request: DeploymentRequest) -> JobId {
        let id = JobId::new();
        let record = JobRecord::new(id, request);
        let bus = Arc::new(LogBus::new(self.log_cap));
        let (snapshot_tx, snapshot_rx) = watch::channel(record.snapshot());
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);

        StageLog::new(Arc::clone(&bus), id, Stage::Received).info(format!(
            "received request for {}",
            record.request.repository.display()
        ));
        persist(self.store.as_ref(), &record, &bus);

        self.jobs.write().insert(
            id,
            JobHandle {
                snapshot: snapshot_rx,
                bus: Arc::clone(&bus),
                commands: Some(command_tx),
            },
        );

        let runner = JobRunner {
            record,
            bus,
            snapshot: snapshot_tx,
            commands: command_rx,
            stages: Arc::clone(&self.stages),
            store: Arc::clone(&self.store),
            timeouts: self.timeouts.clone(),
            abort: false,
        };
        tokio::spawn(runner.run());

        tracing::debug!(job = %id, "job submitted");
        id
    }

    pub fn query(&self, id: JobId) -> Result<JobSnapshot> {
        let jobs = self.jobs.read();
        let handle = jobs.get(&id).ok_or(Error::UnknownJob(id))?;
        Ok(handle.snapshot.borrow().clone())
    }

    /// Every known job, oldest first.
    pub fn jobs(&self) -> Vec<JobSnapshot> {
        let mut all: Vec<_> = self
            .jobs
            .read()
            .values()
            .map(|handle| handle.snapshot.borrow().clone())
            .collect();
        all.sort_by_key(|snap| snap.created_at);
        all
    }

    /// Backlog then live events; ends once the job is terminal.
    pub fn stream(&self, id: JobId) -> Result<impl Stream<Item = LogEvent> + Send + 'static> {
        let jobs = self.jobs.read();
        let handle = jobs.get(&id).ok_or(Error::UnknownJob(id))?;
        Ok(handle.bus.subscribe())
    }

    /// Resolve once the job reaches a terminal stage.
    pub async fn wait(&self, id: JobId) -> Result<JobSnapshot> {
        let mut rx = {
            let jobs = self.jobs.read();
            jobs.get(&id).ok_or(Error::UnknownJob(id))?.snapshot.clone()
        };
        if rx.wait_for(JobSnapshot::is_terminal).await.is_err() {
            tracing::debug!(job = %id, "job driver exited before reaching a terminal stage");
        }
        let snapshot = rx.borrow().clone();
        Ok(snapshot)
    }

    pub async fn cancel(&self, id: JobId) -> Result<CancelOutcome> {
        let commands = {
            let jobs = self.jobs.read();
            let handle = jobs.get(&id).ok_or(Error::UnknownJob(id))?;
            if handle.snapshot.borrow().is_terminal() {
                return Ok(CancelOutcome::AlreadyTerminal);
            }
            handle.commands.clone()
        };
        let Some(commands) = commands else {
            return Ok(CancelOutcome::AlreadyTerminal);
        };

        let (reply, outcome) = oneshot::channel();
        if commands.send(JobCommand::Cancel { reply }).await.is_err() {
            return Ok(CancelOutcome::AlreadyTerminal);
        }
        // A dropped reply means the driver finished first.
        Ok(outcome.await.unwrap_or(CancelOutcome::AlreadyTerminal))
    }

    /// Drop a terminal job from the registry and the store.
    pub fn forget(&self, id: JobId) -> Result<()> {
        let mut jobs = self.jobs.write();
        let handle = jobs.get(&id).ok_or(Error::UnknownJob(id))?;
        if !handle.snapshot.borrow().is_terminal() {
            return Err(Error::JobActive(id));
        }
        jobs.remove(&id);
        drop(jobs);
        self.store.remove(id)
    }

    /// Load persisted jobs. Jobs that were still running when the process
    /// stopped are failed as interrupted, with their known resources. Once
    /// provisioning had begun, the provisioner is asked what actually exists.
    pub async fn restore(&self) -> Result<usize> {
        let stored = self.store.list()?;
        let mut restored = 0;

        for job in stored {
            let id = job.record.id;
            if self.jobs.read().contains_key(&id) {
                continue;
            }

            let mut record = job.record;
            let bus = Arc::new(LogBus::restore(job.log, self.log_cap, false));

            if !record.is_terminal() {
                let mut resources = record.resources();
                if !record.stage.allows_abort() {
                    for found in self.stages.provisioner.observe(id).await {
                        if !resources.contains(&found) {
                            resources.push(found);
                        }
                    }
                }
                let failure = Failure::new(
                    record.stage,
                    FailureCause::Interrupted,
                    "the process driving this job stopped before it finished",
                )
                .with_resources(resources);
                let line = failure.to_string();
                if record.fail(failure).is_ok() {
                    StageLog::new(Arc::clone(&bus), id, Stage::Failed).error(line);
                    persist(self.store.as_ref(), &record, &bus);
                }
            }
            bus.close();

            let (_, snapshot_rx) = watch::channel(record.snapshot());
            self.jobs.write().insert(
                id,
                JobHandle {
                    snapshot: snapshot_rx,
                    bus,
                    commands: None,
                },
            );
            restored += 1;
        }

        tracing::debug!("restored {} jobs", restored);
        Ok(restored)
    }
}

fn persist(store: &dyn JobStore, record: &JobRecord, bus: &LogBus) {
    if let Err(e) = store.save(record, &bus.snapshot()) {
        tracing::warn!(job = %record.id, "failed to persist job: {}", e);
    }
}

/// Why a stage stopped without producing a result.
enum Interrupt {
    TimedOut(Duration),
    Aborted,
}

/// Owns one job for its whole life.
struct JobRunner {
    record: JobRecord,
    bus: Arc<LogBus>,
    snapshot: watch::Sender<JobSnapshot>,
    commands: mpsc::Receiver<JobCommand>,
    stages: Arc<Stages>,
    store: Arc<dyn JobStore>,
    timeouts: StageTimeouts,
    /// Cancel arrived while the job could still be aborted in place.
    abort: bool,
}

impl JobRunner {
    async fn run(mut self) {
        let outcome = self.drive().await;

        let result = match outcome {
            Ok(url) => self.record.succeed(url.clone()).map(|()| {
                self.log(Stage::Succeeded)
                    .info(format!("deployment succeeded: {url}"));
            }),
            Err(failure) => {
                let line = failure.to_string();
                self.record.fail(failure).map(|()| {
                    self.log(Stage::Failed).error(line);
                })
            }
        };
        if let Err(e) = result {
            tracing::error!(job = %self.record.id, "could not record outcome: {}", e);
        }

        persist(self.store.as_ref(), &self.record, &self.bus);
        self.bus.close();
        self.publish();
        // Dropping `commands` here answers any queued cancel with AlreadyTerminal.
    }

    async fn drive(&mut self) -> std::result::Result<String, Failure> {
        let job = self.record.id;
        let stages = Arc::clone(&self.stages);
        let pipeline = Pipeline::new(job, self.record.request.clone());

        self.enter(Stage::Deciding)?;
        let log = self.log(Stage::Deciding);
        let decided = match self
            .run_stage(Stage::Deciding, async { pipeline.decide(&stages.engine, &log) })
            .await
        {
            Ok(result) => result?,
            Err(interrupt) => return Err(self.interrupted(Stage::Deciding, interrupt, Vec::new())),
        };
        self.record.decision = Some(decided.decision().clone());

        self.enter(Stage::Provisioning)?;
        let log = self.log(Stage::Provisioning);
        let provisioned = match self
            .run_stage(Stage::Provisioning, async {
                decided.provision(stages.provisioner.as_ref(), &log).await
            })
            .await
        {
            Ok(result) => result?,
            Err(interrupt) => {
                let resources = stages.provisioner.observe(job).await;
                return Err(self.interrupted(Stage::Provisioning, interrupt, resources));
            }
        };
        self.record.environment = Some(provisioned.environment().clone());
        let resources = provisioned.environment().resources.clone();

        self.enter(Stage::Patching)?;
        let log = self.log(Stage::Patching);
        let patched = match self
            .run_stage(Stage::Patching, async {
                provisioned.patch(&stages.preparer, &log).await
            })
            .await
        {
            Ok(result) => result?,
            Err(interrupt) => return Err(self.interrupted(Stage::Patching, interrupt, resources)),
        };

        self.enter(Stage::Deploying)?;
        let log = self.log(Stage::Deploying);
        let deployed = match self
            .run_stage(Stage::Deploying, async {
                patched
                    .deploy(&stages.executor, stages.targets.as_ref(), &log)
                    .await
            })
            .await
        {
            Ok(result) => result?,
            Err(interrupt) => return Err(self.interrupted(Stage::Deploying, interrupt, resources)),
        };

        Ok(deployed.url().to_string())
    }

    /// Stage boundary: honour pending cancels, then advance and persist.
    fn enter(&mut self, stage: Stage) -> std::result::Result<(), Failure> {
        while let Ok(command) = self.commands.try_recv() {
            self.handle(command);
        }

        let current = self.record.stage;
        if self.abort {
            return Err(Failure::new(current, FailureCause::Cancelled, "cancelled by request"));
        }
        if self.record.teardown_requested {
            return Err(Failure::new(
                current,
                FailureCause::Cancelled,
                "cancelled after provisioning began; marked for teardown",
            )
            .with_resources(self.record.resources()));
        }

        self.record.advance(stage).map_err(|e| {
            Failure::new(current, FailureCause::Interrupted, e.to_string())
        })?;
        self.log(stage).info(format!("entered {stage}"));
        persist(self.store.as_ref(), &self.record, &self.bus);
        self.publish();
        Ok(())
    }

    /// Run one stage's work against its timeout, answering commands meanwhile.
    async fn run_stage<T, F>(&mut self, stage: Stage, work: F) -> std::result::Result<T, Interrupt>
    where
        F: Future<Output = T>,
    {
        let limit = self.timeouts.for_stage(stage);
        let deadline = async {
            match limit {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(work);
        tokio::pin!(deadline);

        let mut inbox_open = true;
        loop {
            tokio::select! {
                biased;
                command = self.commands.recv(), if inbox_open => match command {
                    Some(command) => {
                        self.handle(command);
                        if self.abort {
                            return Err(Interrupt::Aborted);
                        }
                    }
                    None => inbox_open = false,
                },
                out = &mut work => return Ok(out),
                () = &mut deadline => {
                    return Err(Interrupt::TimedOut(limit.unwrap_or_default()));
                }
            }
        }
    }

    fn handle(&mut self, command: JobCommand) {
        match command {
            JobCommand::Cancel { reply } => {
                let outcome = if self.record.stage.allows_abort() {
                    self.abort = true;
                    self.log(self.record.stage).warn("cancel requested, stopping");
                    CancelOutcome::Cancelled
                } else {
                    if !self.record.teardown_requested {
                        self.record.teardown_requested = true;
                        self.log(self.record.stage).warn(
                            "cancel requested after provisioning began; \
                             marked for teardown, stopping after this stage",
                        );
                        self.publish();
                    }
                    CancelOutcome::MarkedForTeardown
                };
                let _ = reply.send(outcome);
            }
        }
    }

    fn interrupted(
        &self,
        stage: Stage,
        interrupt: Interrupt,
        resources: Vec<ResourceHandle>,
    ) -> Failure {
        match interrupt {
            Interrupt::TimedOut(limit) => Failure::new(
                stage,
                FailureCause::StageTimeout,
                format!("{stage} exceeded its {limit:?} limit"),
            )
            .with_resources(resources),
            Interrupt::Aborted => {
                Failure::new(stage, FailureCause::Cancelled, "cancelled by request")
                    .with_resources(resources)
            }
        }
    }

    fn log(&self, stage: Stage) -> StageLog {
        StageLog::new(Arc::clone(&self.bus), self.record.id, stage)
    }

    fn publish(&self) {
        self.snapshot.send_replace(self.record.snapshot());
    }
}
