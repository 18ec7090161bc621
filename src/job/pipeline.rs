// ABOUTME: Type-state pipeline: each transition consumes the previous stage.
// ABOUTME: Component errors become a structured Failure carrying stage, cause, and resources.

use crate::decision::{DecisionEngine, InfrastructureDecision};
use crate::deploy::{Executor, TargetFactory};
use crate::facts::DeploymentRequest;
use crate::logbus::StageLog;
use crate::patch::{PatchError, PreparedSource, Preparer};
use crate::provision::{ProvisionErrorKind, ProvisionedEnvironment, Provisioner, describe_resources};
use crate::types::JobId;

use super::state::{Failure, FailureCause};
use super::status::Stage;

/// Nothing decided yet.
/// Available actions: `decide()`
#[derive(Debug)]
pub struct Received;

/// Shape chosen.
/// Available actions: `provision()`
#[derive(Debug)]
pub struct Decided {
    decision: InfrastructureDecision,
}

/// Infrastructure exists.
/// Available actions: `patch()`
#[derive(Debug)]
pub struct Provisioned {
    decision: InfrastructureDecision,
    env: ProvisionedEnvironment,
}

/// Source adapted to the environment.
/// Available actions: `deploy()`
#[derive(Debug)]
pub struct Patched {
    decision: InfrastructureDecision,
    env: ProvisionedEnvironment,
    prepared: PreparedSource,
}

/// Service running.
#[derive(Debug)]
pub struct Deployed {
    env: ProvisionedEnvironment,
    url: String,
}

/// A job's progress, parameterized by the stage it has completed.
#[derive(Debug)]
pub struct Pipeline<S> {
    job: JobId,
    request: DeploymentRequest,
    state: S,
}

impl<S> Pipeline<S> {
    pub fn job(&self) -> JobId {
        self.job
    }

    pub fn request(&self) -> &DeploymentRequest {
        &self.request
    }

    fn transition<T>(self, state: T) -> Pipeline<T> {
        Pipeline {
            job: self.job,
            request: self.request,
            state,
        }
    }
}

impl Pipeline<Received> {
    pub fn new(job: JobId, request: DeploymentRequest) -> Self {
        Pipeline {
            job,
            request,
            state: Received,
        }
    }

    pub fn decide(
        self,
        engine: &DecisionEngine,
        log: &StageLog,
    ) -> Result<Pipeline<Decided>, Failure> {
        let decision = engine.decide(&self.request).map_err(|e| {
            Failure::new(Stage::Deciding, FailureCause::UnresolvableShape, e.to_string())
        })?;

        log.info(format!(
            "chose {} (rule: {}) in {}",
            decision.shape, decision.rule, decision.params.region
        ));
        for note in &decision.notes {
            log.info(note.clone());
        }

        Ok(self.transition(Decided { decision }))
    }
}

impl Pipeline<Decided> {
    pub fn decision(&self) -> &InfrastructureDecision {
        &self.state.decision
    }

    #[must_use = "pipeline state must be used"]
    pub async fn provision(
        self,
        provisioner: &dyn Provisioner,
        log: &StageLog,
    ) -> Result<Pipeline<Provisioned>, Failure> {
        let app = self.request.app_name();
        let env = match provisioner
            .provision(self.job, &app, &self.state.decision, log)
            .await
        {
            Ok(env) => env,
            Err(e) => {
                let cause = match e.kind() {
                    ProvisionErrorKind::PartialProvision => FailureCause::PartialProvision,
                    _ => FailureCause::ProvisionFailure,
                };
                let resources = e.created().to_vec();
                return Err(Failure::new(Stage::Provisioning, cause, e.to_string())
                    .with_resources(resources));
            }
        };

        let decision = self.state.decision.clone();
        Ok(self.transition(Provisioned { decision, env }))
    }
}

impl Pipeline<Provisioned> {
    pub fn decision(&self) -> &InfrastructureDecision {
        &self.state.decision
    }

    pub fn environment(&self) -> &ProvisionedEnvironment {
        &self.state.env
    }

    #[must_use = "pipeline state must be used"]
    pub async fn patch(
        self,
        preparer: &Preparer,
        log: &StageLog,
    ) -> Result<Pipeline<Patched>, Failure> {
        let prepared = preparer
            .prepare_repository(&self.request.repository, &self.state.decision, &self.state.env)
            .await
            .map_err(|e| {
                let cause = match e {
                    PatchError::Conflict { .. } => FailureCause::PatchConflict,
                    PatchError::Load { .. } | PatchError::Task(_) => FailureCause::SourceUnreadable,
                };
                Failure::new(Stage::Patching, cause, e.to_string())
                    .with_resources(self.state.env.resources.clone())
            })?;

        if prepared.changes.is_empty() {
            log.info("source needed no changes");
        }
        for change in &prepared.changes {
            log.info(change.clone());
        }

        let Provisioned { decision, env } = self.state;
        Ok(Pipeline {
            job: self.job,
            request: self.request,
            state: Patched {
                decision,
                env,
                prepared,
            },
        })
    }
}

impl Pipeline<Patched> {
    pub fn environment(&self) -> &ProvisionedEnvironment {
        &self.state.env
    }

    pub fn prepared(&self) -> &PreparedSource {
        &self.state.prepared
    }

    #[must_use = "pipeline state must be used"]
    pub async fn deploy(
        self,
        executor: &Executor,
        targets: &dyn TargetFactory,
        log: &StageLog,
    ) -> Result<Pipeline<Deployed>, Failure> {
        let Patched {
            decision,
            env,
            prepared,
        } = &self.state;

        let failed = |e: crate::deploy::DeployError| {
            Failure::new(Stage::Deploying, FailureCause::DeploymentFailed, e.report())
                .with_resources(env.resources.clone())
        };

        let target = targets
            .target(&self.request, decision, env, log)
            .await
            .map_err(failed)?;
        let result = executor
            .run(target.as_ref(), prepared, &decision.params.ports, log)
            .await;
        target.close().await;
        let url = result.map_err(|e| {
            if !env.resources.is_empty() {
                log.warn(format!(
                    "resources left in place: {}",
                    describe_resources(&env.resources)
                ));
            }
            failed(e)
        })?;

        let Patched { env, .. } = self.state;
        Ok(Pipeline {
            job: self.job,
            request: self.request,
            state: Deployed { env, url },
        })
    }
}

impl Pipeline<Deployed> {
    pub fn url(&self) -> &str {
        &self.state.url
    }

    pub fn environment(&self) -> &ProvisionedEnvironment {
        &self.state.env
    }
}
