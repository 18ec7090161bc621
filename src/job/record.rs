// ABOUTME: The job aggregate: request, decision, environment, stage history, outcome.
// ABOUTME: Mutated only by the task driving the job; snapshots are handed to observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{Failure, JobOutcome};
use super::status::{Stage, TransitionError};
use crate::decision::InfrastructureDecision;
use crate::facts::DeploymentRequest;
use crate::provision::{ProvisionedEnvironment, ResourceHandle};
use crate::types::JobId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEntry {
    pub stage: Stage,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub stage: Stage,
    pub history: Vec<StageEntry>,
    pub request: DeploymentRequest,
    #[serde(default)]
    pub decision: Option<InfrastructureDecision>,
    #[serde(default)]
    pub environment: Option<ProvisionedEnvironment>,
    #[serde(default)]
    pub outcome: Option<JobOutcome>,
    /// Cancel arrived after provisioning began.
    #[serde(default)]
    pub teardown_requested: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(id: JobId, request: DeploymentRequest) -> Self {
        let now = Utc::now();
        Self {
            id,
            stage: Stage::Received,
            history: vec![StageEntry {
                stage: Stage::Received,
                at: now,
            }],
            request,
            decision: None,
            environment: None,
            outcome: None,
            teardown_requested: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move one step along the forward path.
    pub fn advance(&mut self, to: Stage) -> Result<(), TransitionError> {
        if to == Stage::Failed || !self.stage.can_transition_to(to) {
            return Err(TransitionError {
                from: self.stage,
                to,
            });
        }
        self.enter(to);
        Ok(())
    }

    pub fn succeed(&mut self, url: impl Into<String>) -> Result<(), TransitionError> {
        self.advance(Stage::Succeeded)?;
        self.outcome = Some(JobOutcome::Succeeded { url: url.into() });
        Ok(())
    }

    pub fn fail(&mut self, failure: Failure) -> Result<(), TransitionError> {
        if !self.stage.can_transition_to(Stage::Failed) {
            return Err(TransitionError {
                from: self.stage,
                to: Stage::Failed,
            });
        }
        self.enter(Stage::Failed);
        self.outcome = Some(JobOutcome::Failed(failure));
        Ok(())
    }

    fn enter(&mut self, stage: Stage) {
        let now = Utc::now();
        self.stage = stage;
        self.history.push(StageEntry { stage, at: now });
        self.updated_at = now;
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Resources that exist for this job, as best known.
    pub fn resources(&self) -> Vec<ResourceHandle> {
        match self.outcome.as_ref().and_then(JobOutcome::failure) {
            Some(failure) if !failure.resources.is_empty() => failure.resources.clone(),
            _ => self
                .environment
                .as_ref()
                .map(|env| env.resources.clone())
                .unwrap_or_default(),
        }
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            stage: self.stage,
            stages: self.history.iter().map(|entry| entry.stage).collect(),
            url: self.outcome.as_ref().and_then(JobOutcome::url).map(str::to_string),
            failure: self.outcome.as_ref().and_then(JobOutcome::failure).cloned(),
            decision: self.decision.clone(),
            teardown_requested: self.teardown_requested,
            resources: self.resources(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Read-only view of a job, safe to hand to any observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub stage: Stage,
    /// Every stage entered so far, in order.
    pub stages: Vec<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<InfrastructureDecision>,
    pub teardown_requested: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceHandle>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::FailureCause;

    fn record() -> JobRecord {
        let request = DeploymentRequest::from_yaml("repository: /srv/app\n").unwrap();
        JobRecord::new(JobId::new(), request)
    }

    #[test]
    fn advances_in_order() {
        let mut job = record();
        for stage in &Stage::PATH[1..5] {
            job.advance(*stage).unwrap();
        }
        job.succeed("http://54.1.2.3:8080").unwrap();

        let snap = job.snapshot();
        assert_eq!(snap.stages, Stage::PATH.to_vec());
        assert_eq!(snap.url.as_deref(), Some("http://54.1.2.3:8080"));
    }

    #[test]
    fn rejects_skipped_stage() {
        let mut job = record();
        let err = job.advance(Stage::Provisioning).unwrap_err();
        assert_eq!(err.from, Stage::Received);
        assert_eq!(job.stage, Stage::Received);
    }

    #[test]
    fn failed_is_terminal() {
        let mut job = record();
        job.advance(Stage::Deciding).unwrap();
        job.fail(Failure::new(
            Stage::Deciding,
            FailureCause::UnresolvableShape,
            "nothing to run",
        ))
        .unwrap();

        assert!(job.is_terminal());
        assert!(job.advance(Stage::Provisioning).is_err());
        assert!(
            job.fail(Failure::new(Stage::Failed, FailureCause::Cancelled, "again"))
                .is_err()
        );
        assert_eq!(job.snapshot().stages, vec![Stage::Received, Stage::Deciding, Stage::Failed]);
    }

    #[test]
    fn advance_cannot_fail_a_job() {
        let mut job = record();
        assert!(job.advance(Stage::Failed).is_err());
    }
}
