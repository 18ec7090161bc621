// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Uses phantom types to prevent resource handle confusion at compile time.

mod app_name;
mod id;
mod job_id;

pub use app_name::{AppName, AppNameError};
pub use id::{FunctionName, Id, InstanceId, SecurityGroupId};
pub use job_id::{JobId, ParseJobIdError};
