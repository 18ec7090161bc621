// ABOUTME: Deployment executor: ships prepared code to a provisioned target and starts it.
// ABOUTME: Exports the target trait, the executor, and the host/function/firewall implementations.

mod aws;
mod error;
mod executor;
mod firewall;
mod function;
mod host;
mod target;

pub use aws::AwsCli;
pub use error::{DeployError, DeployStep};
pub use executor::Executor;
pub use firewall::{AwsSecurityGroups, Firewall};
pub use function::{FunctionTarget, JOB_MARKER};
pub use host::{HostMode, HostTarget, Launch, archive};
pub use target::{CloudTargets, DeployTarget, PortStatus, ProbeStatus, TargetFactory};
