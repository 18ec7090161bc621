// ABOUTME: Opens inbound ports on the provisioned security group.
// ABOUTME: Uses the AWS CLI; an existing identical rule counts as open.

use async_trait::async_trait;

use super::aws::AwsCli;
use super::error::{DeployError, DeployStep};
use super::target::PortStatus;
use crate::types::SecurityGroupId;

const DUPLICATE_RULE: &str = "InvalidPermission.Duplicate";

#[async_trait]
pub trait Firewall: Send + Sync {
    async fn open(&self, group: &SecurityGroupId, port: u16) -> Result<PortStatus, DeployError>;
}

pub struct AwsSecurityGroups {
    aws: AwsCli,
}

impl AwsSecurityGroups {
    pub fn new(aws: AwsCli) -> Self {
        Self { aws }
    }
}

#[async_trait]
impl Firewall for AwsSecurityGroups {
    async fn open(&self, group: &SecurityGroupId, port: u16) -> Result<PortStatus, DeployError> {
        let port = port.to_string();
        let output = self
            .aws
            .run([
                "ec2",
                "authorize-security-group-ingress",
                "--group-id",
                group.as_str(),
                "--protocol",
                "tcp",
                "--port",
                port.as_str(),
                "--cidr",
                "0.0.0.0/0",
            ])
            .await
            .map_err(|e| DeployError::io(DeployStep::OpenPort, e))?;

        if output.success() {
            Ok(PortStatus::Opened)
        } else if output.stderr.contains(DUPLICATE_RULE) {
            Ok(PortStatus::AlreadyOpen)
        } else {
            Err(DeployError::command(
                DeployStep::OpenPort,
                "authorize-security-group-ingress",
                &output,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{CommandOutput, CommandRunner, Invocation};
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct Scripted {
        output: CommandOutput,
        seen: Mutex<Vec<Invocation>>,
    }

    #[async_trait]
    impl CommandRunner for Scripted {
        async fn run(&self, invocation: &Invocation) -> std::io::Result<CommandOutput> {
            self.seen.lock().push(invocation.clone());
            Ok(self.output.clone())
        }
    }

    fn firewall(output: CommandOutput) -> (AwsSecurityGroups, Arc<Scripted>) {
        let runner = Arc::new(Scripted {
            output,
            seen: Mutex::new(Vec::new()),
        });
        let fw = AwsSecurityGroups::new(AwsCli::new("aws", "us-east-1", None, runner.clone()));
        (fw, runner)
    }

    #[tokio::test]
    async fn opens_port_on_group() {
        let (fw, runner) = firewall(CommandOutput::default());
        let status = fw.open(&SecurityGroupId::new("sg-0abc"), 5000).await.unwrap();
        assert_eq!(status, PortStatus::Opened);

        let seen = runner.seen.lock();
        let args = &seen[0].args;
        assert!(args.windows(2).any(|w| w == ["--group-id", "sg-0abc"]));
        assert!(args.windows(2).any(|w| w == ["--port", "5000"]));
    }

    #[tokio::test]
    async fn duplicate_rule_is_already_open() {
        let (fw, _) = firewall(CommandOutput {
            exit_code: 254,
            stdout: String::new(),
            stderr: "An error occurred (InvalidPermission.Duplicate) when calling the AuthorizeSecurityGroupIngress operation".to_string(),
        });
        let status = fw.open(&SecurityGroupId::new("sg-0abc"), 80).await.unwrap();
        assert_eq!(status, PortStatus::AlreadyOpen);
    }

    #[tokio::test]
    async fn other_errors_fail() {
        let (fw, _) = firewall(CommandOutput {
            exit_code: 254,
            stdout: String::new(),
            stderr: "An error occurred (InvalidGroup.NotFound)".to_string(),
        });
        let err = fw.open(&SecurityGroupId::new("sg-gone"), 80).await.unwrap_err();
        assert_eq!(err.step, DeployStep::OpenPort);
        assert!(err.output.unwrap().contains("InvalidGroup.NotFound"));
    }
}
