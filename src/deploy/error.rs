// ABOUTME: Error type for deployment sub-steps.
// ABOUTME: Carries the step that failed and the last captured command output.

use std::fmt;

use crate::process::CommandOutput;

/// Sub-steps of a deployment, in the order the executor runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployStep {
    Connect,
    Transfer,
    Install,
    Probe,
    Start,
    OpenPort,
    Publish,
}

impl fmt::Display for DeployStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeployStep::Connect => "connect",
            DeployStep::Transfer => "transfer",
            DeployStep::Install => "install",
            DeployStep::Probe => "probe",
            DeployStep::Start => "start",
            DeployStep::OpenPort => "open port",
            DeployStep::Publish => "publish",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{step} failed: {message}")]
pub struct DeployError {
    pub step: DeployStep,
    pub message: String,
    /// Last output captured from the failing command, if any.
    pub output: Option<String>,
}

impl DeployError {
    pub fn new(step: DeployStep, message: impl Into<String>) -> Self {
        Self {
            step,
            message: message.into(),
            output: None,
        }
    }

    /// A command that ran but exited non-zero.
    pub fn command(step: DeployStep, what: &str, output: &CommandOutput) -> Self {
        Self {
            step,
            message: format!("{what} exited with status {}", output.exit_code),
            output: Some(output.diagnostic().to_string()).filter(|o| !o.is_empty()),
        }
    }

    pub fn ssh(step: DeployStep, err: crate::ssh::Error) -> Self {
        Self::new(step, err.to_string())
    }

    pub fn io(step: DeployStep, err: std::io::Error) -> Self {
        Self::new(step, err.to_string())
    }

    /// Message plus captured output, for failure reports.
    pub fn report(&self) -> String {
        match &self.output {
            Some(output) => format!("{self}\n{output}"),
            None => self.to_string(),
        }
    }
}
