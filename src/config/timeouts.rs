// ABOUTME: Independent per-stage time bounds for the deployment pipeline.
// ABOUTME: Exceeding one fails the job with a stage timeout.

use serde::Deserialize;
use std::time::Duration;

use crate::job::Stage;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StageTimeouts {
    #[serde(default = "default_deciding", with = "humantime_serde")]
    pub deciding: Duration,

    #[serde(default = "default_provisioning", with = "humantime_serde")]
    pub provisioning: Duration,

    #[serde(default = "default_patching", with = "humantime_serde")]
    pub patching: Duration,

    #[serde(default = "default_deploying", with = "humantime_serde")]
    pub deploying: Duration,
}

fn default_deciding() -> Duration {
    Duration::from_secs(30)
}

fn default_provisioning() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_patching() -> Duration {
    Duration::from_secs(2 * 60)
}

fn default_deploying() -> Duration {
    Duration::from_secs(20 * 60)
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            deciding: default_deciding(),
            provisioning: default_provisioning(),
            patching: default_patching(),
            deploying: default_deploying(),
        }
    }
}

impl StageTimeouts {
    /// Same bound for every stage. Handy in tests.
    pub fn uniform(limit: Duration) -> Self {
        Self {
            deciding: limit,
            provisioning: limit,
            patching: limit,
            deploying: limit,
        }
    }

    /// Bound for an active stage; `None` for stages that do no work.
    pub fn for_stage(&self, stage: Stage) -> Option<Duration> {
        match stage {
            Stage::Deciding => Some(self.deciding),
            Stage::Provisioning => Some(self.provisioning),
            Stage::Patching => Some(self.patching),
            Stage::Deploying => Some(self.deploying),
            Stage::Received | Stage::Succeeded | Stage::Failed => None,
        }
    }
}
