// ABOUTME: AWS CLI invocations with region and profile applied.
// ABOUTME: Shared by the security group firewall and the function target.

use std::sync::Arc;

use crate::config::Config;
use crate::process::{CommandOutput, CommandRunner, Invocation};

#[derive(Clone)]
pub struct AwsCli {
    binary: String,
    region: String,
    profile: Option<String>,
    runner: Arc<dyn CommandRunner>,
}

impl std::fmt::Debug for AwsCli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCli")
            .field("binary", &self.binary)
            .field("region", &self.region)
            .field("profile", &self.profile)
            .finish()
    }
}

impl AwsCli {
    pub fn new(
        binary: impl Into<String>,
        region: impl Into<String>,
        profile: Option<String>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            binary: binary.into(),
            region: region.into(),
            profile,
            runner,
        }
    }

    pub fn from_config(config: &Config, runner: Arc<dyn CommandRunner>) -> Self {
        Self::new(
            config.aws.binary.clone(),
            config.region.clone(),
            config.aws.profile.clone(),
            runner,
        )
    }

    pub fn invocation<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut invocation = Invocation::new(&self.binary)
            .args(args)
            .args(["--region", self.region.as_str()]);
        if let Some(profile) = &self.profile {
            invocation = invocation.args(["--profile", profile.as_str()]);
        }
        invocation
    }

    pub async fn run<I, S>(&self, args: I) -> std::io::Result<CommandOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.runner.run(&self.invocation(args)).await
    }

    /// Run an arbitrary local program through the same runner.
    pub async fn run_local(&self, invocation: &Invocation) -> std::io::Result<CommandOutput> {
        self.runner.run(invocation).await
    }
}
