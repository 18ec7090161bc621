// ABOUTME: Command module aggregator for the autodeploy CLI.
// ABOUTME: Re-exports plan, deploy, status, and logs command handlers.

mod deploy;
mod plan;
mod status;

pub use deploy::deploy;
pub use plan::plan;
pub use status::{logs, status};
