// ABOUTME: Error types for code preparation.
// ABOUTME: Conflicts are surfaced to the job; they are never silently overwritten.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// The source already sets a variable we need to inject, to something else.
    #[error("{file} already defines {}", describe_conflicts(.conflicts))]
    Conflict {
        file: PathBuf,
        conflicts: Vec<Conflict>,
    },

    #[error("failed to read {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    #[error("code preparation task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub variable: String,
    pub existing: String,
    pub injected: String,
}

fn describe_conflicts(conflicts: &[Conflict]) -> String {
    conflicts
        .iter()
        .map(|c| format!("{}={:?} (wanted {:?})", c.variable, c.existing, c.injected))
        .collect::<Vec<_>>()
        .join(", ")
}
