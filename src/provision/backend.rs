// ABOUTME: Infrastructure apply backend: init, apply, outputs, and resource observation.
// ABOUTME: TerraformCli drives the terraform binary and classifies its failures.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use super::environment::ResourceHandle;
use crate::process::{CommandRunner, Invocation};

/// Substrings (lowercased) that mark a provider error as worth retrying.
const TRANSIENT_MARKERS: &[&str] = &[
    "throttl",
    "rate exceeded",
    "requestlimitexceeded",
    "too many requests",
    "slow down",
    "eventual consistency",
    "service unavailable",
    "internal error",
    "timeout",
    "timed out",
    "connection reset",
    "try again",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("terraform {operation} failed: {message}")]
pub struct BackendError {
    pub operation: String,
    pub message: String,
    pub transient: bool,
}

impl BackendError {
    /// Classify by message. Anything unrecognised is structural and not retried.
    pub fn classify(operation: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        let transient = TRANSIENT_MARKERS.iter().any(|m| lower.contains(m));
        Self {
            operation: operation.into(),
            message,
            transient,
        }
    }

    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
            transient: true,
        }
    }

    pub fn structural(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
            transient: false,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }
}

#[async_trait]
pub trait InfraBackend: Send + Sync {
    async fn init(&self, workdir: &Path) -> Result<(), BackendError>;

    async fn apply(&self, workdir: &Path) -> Result<(), BackendError>;

    async fn outputs(&self, workdir: &Path) -> Result<BTreeMap<String, String>, BackendError>;

    /// Resources present in state right now. Used after failures and timeouts.
    async fn observe(&self, workdir: &Path) -> Result<Vec<ResourceHandle>, BackendError>;
}

pub struct TerraformCli {
    binary: String,
    env: BTreeMap<String, String>,
    runner: Arc<dyn CommandRunner>,
}

impl std::fmt::Debug for TerraformCli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerraformCli")
            .field("binary", &self.binary)
            .finish()
    }
}

impl TerraformCli {
    pub fn new(
        binary: impl Into<String>,
        env: BTreeMap<String, String>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            binary: binary.into(),
            env,
            runner,
        }
    }

    async fn terraform(
        &self,
        operation: &str,
        workdir: &Path,
        args: &[&str],
    ) -> Result<String, BackendError> {
        let mut invocation = Invocation::new(&self.binary)
            .args(args.iter().copied())
            .cwd(workdir)
            .env("TF_IN_AUTOMATION", "1");
        for (key, value) in &self.env {
            invocation = invocation.env(key, value);
        }

        let output = self
            .runner
            .run(&invocation)
            .await
            .map_err(|e| BackendError::structural(operation, format!("cannot run {}: {e}", self.binary)))?;

        if output.success() {
            Ok(output.stdout)
        } else {
            Err(BackendError::classify(operation, output.diagnostic()))
        }
    }
}

#[async_trait]
impl InfraBackend for TerraformCli {
    async fn init(&self, workdir: &Path) -> Result<(), BackendError> {
        self.terraform("init", workdir, &["init", "-input=false", "-no-color"])
            .await
            .map(|_| ())
    }

    async fn apply(&self, workdir: &Path) -> Result<(), BackendError> {
        self.terraform(
            "apply",
            workdir,
            &["apply", "-auto-approve", "-input=false", "-no-color"],
        )
        .await
        .map(|_| ())
    }

    async fn outputs(&self, workdir: &Path) -> Result<BTreeMap<String, String>, BackendError> {
        let stdout = self
            .terraform("output", workdir, &["output", "-json", "-no-color"])
            .await?;
        parse_outputs(&stdout).map_err(|e| BackendError::structural("output", e))
    }

    async fn observe(&self, workdir: &Path) -> Result<Vec<ResourceHandle>, BackendError> {
        let stdout = self
            .terraform("show", workdir, &["show", "-json", "-no-color"])
            .await?;
        parse_state(&stdout).map_err(|e| BackendError::structural("show", e))
    }
}

/// Flatten `terraform output -json` (`{"name": {"value": ...}}`) into strings.
pub fn parse_outputs(json: &str) -> Result<BTreeMap<String, String>, String> {
    if json.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let raw: BTreeMap<String, Value> =
        serde_json::from_str(json).map_err(|e| format!("unreadable outputs: {e}"))?;

    Ok(raw
        .into_iter()
        .filter_map(|(name, entry)| {
            let value = match entry.get("value")? {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some((name, value))
        })
        .collect())
}

/// Managed resources in `terraform show -json`, including child modules.
pub fn parse_state(json: &str) -> Result<Vec<ResourceHandle>, String> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    let state: Value = serde_json::from_str(json).map_err(|e| format!("unreadable state: {e}"))?;

    let mut found = Vec::new();
    if let Some(root) = state.get("values").and_then(|v| v.get("root_module")) {
        collect_module(root, &mut found);
    }
    Ok(found)
}

fn collect_module(module: &Value, found: &mut Vec<ResourceHandle>) {
    for resource in module
        .get("resources")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        // Data sources are reads, not billable resources.
        if resource.get("mode").and_then(Value::as_str) == Some("data") {
            continue;
        }
        let address = resource.get("address").and_then(Value::as_str);
        let id = resource
            .get("values")
            .and_then(|v| v.get("id"))
            .and_then(Value::as_str);
        if let (Some(address), Some(id)) = (address, id) {
            found.push(ResourceHandle::new(address, id));
        }
    }

    for child in module
        .get("child_modules")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        collect_module(child, found);
    }
}
