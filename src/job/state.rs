// ABOUTME: Structured job outcomes: success with a URL, or failure with stage and cause.
// ABOUTME: Failures carry the resources that may need manual cleanup.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::status::Stage;
use crate::provision::{ResourceHandle, describe_resources};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureCause {
    UnresolvableShape,
    ProvisionFailure,
    PartialProvision,
    PatchConflict,
    /// The repository could not be read for patching.
    SourceUnreadable,
    DeploymentFailed,
    StageTimeout,
    Cancelled,
    Interrupted,
}

impl FailureCause {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureCause::UnresolvableShape => "UnresolvableShape",
            FailureCause::ProvisionFailure => "ProvisionFailure",
            FailureCause::PartialProvision => "PartialProvision",
            FailureCause::PatchConflict => "PatchConflict",
            FailureCause::SourceUnreadable => "SourceUnreadable",
            FailureCause::DeploymentFailed => "DeploymentFailed",
            FailureCause::StageTimeout => "StageTimeout",
            FailureCause::Cancelled => "Cancelled",
            FailureCause::Interrupted => "Interrupted",
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a job stopped. What query and stream consumers see, never a raw error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Stage that was running when the job failed.
    pub stage: Stage,
    pub cause: FailureCause,
    pub detail: String,
    /// Resources that exist and may need manual cleanup.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceHandle>,
}

impl Failure {
    pub fn new(stage: Stage, cause: FailureCause, detail: impl Into<String>) -> Self {
        Self {
            stage,
            cause,
            detail: detail.into(),
            resources: Vec::new(),
        }
    }

    pub fn with_resources(mut self, resources: Vec<ResourceHandle>) -> Self {
        self.resources = resources;
        self
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} during {}: {}", self.cause, self.stage, self.detail)?;
        if !self.resources.is_empty() {
            write!(
                f,
                " (may need manual cleanup: {})",
                describe_resources(&self.resources)
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum JobOutcome {
    Succeeded { url: String },
    Failed(Failure),
}

impl JobOutcome {
    pub fn url(&self) -> Option<&str> {
        match self {
            JobOutcome::Succeeded { url } => Some(url),
            JobOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            JobOutcome::Failed(failure) => Some(failure),
            JobOutcome::Succeeded { .. } => None,
        }
    }
}
