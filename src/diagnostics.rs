// ABOUTME: Diagnostics accumulator for non-fatal findings after a deployment.
// ABOUTME: Collects warnings that shouldn't fail a command but should be shown to users.

use crate::job::JobSnapshot;
use crate::logbus::{LogEvent, Severity};
use crate::provision::describe_resources;

/// Collects non-fatal warnings during deployment operations.
#[derive(Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    /// Warnings worth repeating once a job has finished.
    pub fn from_job(snapshot: &JobSnapshot, log: &[LogEvent]) -> Self {
        let mut diag = Self::default();
        for event in log.iter().filter(|e| e.severity == Severity::Warn) {
            diag.warn(Warning::stage_warning(format!("[{}] {}", event.stage, event.line)));
        }
        let needs_cleanup = snapshot.teardown_requested
            || snapshot.failure.as_ref().is_some_and(|f| !f.resources.is_empty());
        if needs_cleanup && !snapshot.resources.is_empty() {
            diag.warn(Warning::teardown_required(format!(
                "resources may need manual cleanup: {}",
                describe_resources(&snapshot.resources)
            )));
        }
        diag
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A non-fatal warning collected during deployment.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn teardown_required(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::TeardownRequired,
            message: message.into(),
        }
    }

    pub fn stage_warning(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::StageWarning,
            message: message.into(),
        }
    }
}

/// Categories of warnings that can occur during deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Provisioned resources are left for external teardown.
    TeardownRequired,
    /// A stage logged a warning but carried on.
    StageWarning,
}
