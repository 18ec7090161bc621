// ABOUTME: Provisioned environment: live handles produced by an infrastructure apply.
// ABOUTME: Owned by the job for its lifetime and reported on failure for manual cleanup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::types::{FunctionName, InstanceId, SecurityGroupId};

/// One resource known to exist in the provider, e.g. `aws_security_group.app` / `sg-0abc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHandle {
    pub address: String,
    pub id: String,
}

impl ResourceHandle {
    pub fn new(address: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.address, self.id)
    }
}

/// Render a handle list for failure messages.
pub fn describe_resources(resources: &[ResourceHandle]) -> String {
    resources
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Terraform output names the templates agree on.
pub mod outputs {
    pub const PUBLIC_HOST: &str = "public_host";
    pub const SECURITY_GROUP_ID: &str = "security_group_id";
    pub const INSTANCE_ID: &str = "instance_id";
    pub const FUNCTION_NAME: &str = "function_name";
    pub const FUNCTION_URL: &str = "function_url";
    pub const DATABASE_ENDPOINT: &str = "database_endpoint";
    pub const DATABASE_URL: &str = "database_url";
    pub const CACHE_ENDPOINT: &str = "cache_endpoint";
    pub const QUEUE_URL: &str = "queue_url";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedEnvironment {
    pub template_id: String,
    pub public_host: Option<String>,
    pub security_group: Option<SecurityGroupId>,
    pub instance: Option<InstanceId>,
    pub function: Option<FunctionName>,
    pub function_url: Option<String>,
    pub database_endpoint: Option<String>,
    pub database_url: Option<String>,
    pub cache_endpoint: Option<String>,
    pub queue_url: Option<String>,
    /// Every output, including the ones mapped to fields above.
    pub outputs: BTreeMap<String, String>,
    pub resources: Vec<ResourceHandle>,
    pub workdir: PathBuf,
}

impl ProvisionedEnvironment {
    pub fn from_outputs(
        template_id: impl Into<String>,
        workdir: PathBuf,
        outputs: BTreeMap<String, String>,
        resources: Vec<ResourceHandle>,
    ) -> Self {
        let get = |key: &str| {
            outputs
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            template_id: template_id.into(),
            public_host: get(outputs::PUBLIC_HOST),
            security_group: get(outputs::SECURITY_GROUP_ID).map(SecurityGroupId::new),
            instance: get(outputs::INSTANCE_ID).map(InstanceId::new),
            function: get(outputs::FUNCTION_NAME).map(FunctionName::new),
            function_url: get(outputs::FUNCTION_URL),
            database_endpoint: get(outputs::DATABASE_ENDPOINT),
            database_url: get(outputs::DATABASE_URL),
            cache_endpoint: get(outputs::CACHE_ENDPOINT),
            queue_url: get(outputs::QUEUE_URL),
            outputs,
            resources,
            workdir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_outputs_and_ignores_blanks() {
        let mut out = BTreeMap::new();
        out.insert(outputs::PUBLIC_HOST.to_string(), "54.1.2.3".to_string());
        out.insert(outputs::SECURITY_GROUP_ID.to_string(), "sg-0abc".to_string());
        out.insert(outputs::DATABASE_ENDPOINT.to_string(), "".to_string());
        out.insert("extra".to_string(), "kept".to_string());

        let env = ProvisionedEnvironment::from_outputs("aws-vm", PathBuf::from("/tmp"), out, vec![]);
        assert_eq!(env.public_host.as_deref(), Some("54.1.2.3"));
        assert_eq!(env.security_group.unwrap().as_str(), "sg-0abc");
        assert!(env.database_endpoint.is_none());
        assert_eq!(env.outputs.get("extra").map(String::as_str), Some("kept"));
    }

    #[test]
    fn describes_resources_for_reports() {
        let list = vec![
            ResourceHandle::new("aws_security_group.app", "sg-0abc"),
            ResourceHandle::new("aws_instance.app", "i-1"),
        ];
        assert_eq!(
            describe_resources(&list),
            "aws_security_group.app (sg-0abc), aws_instance.app (i-1)"
        );
    }
}
