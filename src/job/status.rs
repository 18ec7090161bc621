// ABOUTME: Job stages in their fixed forward order, plus the absorbing Failed state.
// ABOUTME: Transition rules live here so every caller checks them the same way.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Received,
    Deciding,
    Provisioning,
    Patching,
    Deploying,
    Succeeded,
    Failed,
}

impl Stage {
    /// The forward path, in order.
    pub const PATH: [Stage; 6] = [
        Stage::Received,
        Stage::Deciding,
        Stage::Provisioning,
        Stage::Patching,
        Stage::Deploying,
        Stage::Succeeded,
    ];

    /// Next stage on the forward path. `None` for terminal stages.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Received => Some(Stage::Deciding),
            Stage::Deciding => Some(Stage::Provisioning),
            Stage::Provisioning => Some(Stage::Patching),
            Stage::Patching => Some(Stage::Deploying),
            Stage::Deploying => Some(Stage::Succeeded),
            Stage::Succeeded | Stage::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Succeeded | Stage::Failed)
    }

    /// Failed is reachable from any non-terminal stage; otherwise only `next()`.
    pub fn can_transition_to(self, to: Stage) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == Stage::Failed || self.next() == Some(to)
    }

    /// Whether a cancel request can still abort in place. Once provisioning
    /// starts, cancellation becomes a teardown mark.
    pub fn allows_abort(self) -> bool {
        matches!(self, Stage::Received | Stage::Deciding)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Deciding => "deciding",
            Stage::Provisioning => "provisioning",
            Stage::Patching => "patching",
            Stage::Deploying => "deploying",
            Stage::Succeeded => "succeeded",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid stage transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: Stage,
    pub to: Stage,
}
