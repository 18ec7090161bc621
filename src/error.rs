// ABOUTME: Application-wide error types for autodeploy.
// ABOUTME: Uses thiserror; stage-level failures live in their own modules.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::{JobId, ParseJobIdError};

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown job: {0}")]
    UnknownJob(JobId),

    #[error(transparent)]
    InvalidJobId(#[from] ParseJobIdError),

    #[error("job {0} is still running")]
    JobActive(JobId),

    #[error("job store error: {0}")]
    Store(String),

    #[error("decision failed: {0}")]
    Decision(#[from] crate::decision::DecisionError),

    #[error("template generation failed: {0}")]
    Provision(#[from] crate::provision::ProvisionError),

    #[error("deployment {job} failed: {detail}")]
    JobFailed { job: JobId, detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
