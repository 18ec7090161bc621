// ABOUTME: Provisioning error types with SNAFU pattern.
// ABOUTME: Carries the resources observed after a failed apply for partial-provision reports.

use chrono::{DateTime, Utc};
use snafu::Snafu;
use std::path::PathBuf;

use super::backend::BackendError;
use super::environment::{ResourceHandle, describe_resources};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProvisionError {
    #[snafu(display("failed to prepare {}: {source}", path.display()))]
    Workdir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("template rendering failed: {message}"))]
    Template { message: String },

    #[snafu(display(
        "another apply is running in {} ({holder}, pid {pid}, since {started_at})",
        path.display()
    ))]
    LockHeld {
        path: PathBuf,
        holder: String,
        pid: u32,
        started_at: DateTime<Utc>,
    },

    #[snafu(display("{}", describe_backend_failure(source, created)))]
    Backend {
        source: BackendError,
        created: Vec<ResourceHandle>,
    },
}

fn describe_backend_failure(source: &BackendError, created: &[ResourceHandle]) -> String {
    if created.is_empty() {
        source.to_string()
    } else {
        format!(
            "{source}; resources left behind: {}",
            describe_resources(created)
        )
    }
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionErrorKind {
    /// Local setup failed before anything reached the provider.
    Setup,
    /// Another apply holds this job's workdir.
    LockHeld,
    /// The apply failed and nothing was left behind.
    ProvisionFailure,
    /// The apply failed after creating some resources.
    PartialProvision,
}

impl ProvisionError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> ProvisionErrorKind {
        match self {
            ProvisionError::Workdir { .. } | ProvisionError::Template { .. } => {
                ProvisionErrorKind::Setup
            }
            ProvisionError::LockHeld { .. } => ProvisionErrorKind::LockHeld,
            ProvisionError::Backend { created, .. } if created.is_empty() => {
                ProvisionErrorKind::ProvisionFailure
            }
            ProvisionError::Backend { .. } => ProvisionErrorKind::PartialProvision,
        }
    }

    /// Resources observed in the provider when the error happened.
    pub fn created(&self) -> &[ResourceHandle] {
        match self {
            ProvisionError::Backend { created, .. } => created,
            _ => &[],
        }
    }
}
