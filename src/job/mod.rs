// ABOUTME: Job state machine: stages, outcomes, the type-state pipeline, and the registry.
// ABOUTME: One task drives each job; everything else observes through snapshots and logs.

mod orchestrator;
mod pipeline;
mod record;
mod state;
mod status;
mod store;

pub use orchestrator::{CancelOutcome, Orchestrator, Stages};
pub use pipeline::{Decided, Deployed, Patched, Pipeline, Provisioned, Received};
pub use record::{JobRecord, JobSnapshot, StageEntry};
pub use state::{Failure, FailureCause, JobOutcome};
pub use status::{Stage, TransitionError};
pub use store::{FileStore, JOB_FILE, JobStore, MemoryStore, StoredJob};
