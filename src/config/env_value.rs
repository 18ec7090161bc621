// ABOUTME: Configured values that may come from the operator's environment.
// ABOUTME: Used for terraform credentials and extra variables injected into deployed apps.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

/// Either written inline, or `{ env: NAME, default: ... }`, read when a job starts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Literal(String),
    FromEnv {
        #[serde(rename = "env")]
        var: String,
        #[serde(default)]
        default: Option<String>,
    },
}

impl EnvValue {
    /// `None` when the variable is unset and has no default.
    pub fn lookup(&self) -> Option<String> {
        match self {
            EnvValue::Literal(value) => Some(value.clone()),
            EnvValue::FromEnv { var, default } => std::env::var(var).ok().or_else(|| default.clone()),
        }
    }

    pub fn resolve(&self) -> Result<String> {
        match self {
            EnvValue::Literal(value) => Ok(value.clone()),
            EnvValue::FromEnv { var, .. } => {
                self.lookup().ok_or_else(|| Error::MissingEnvVar(var.clone()))
            }
        }
    }
}

pub fn resolve_env_map(map: &HashMap<String, EnvValue>) -> Result<BTreeMap<String, String>> {
    let mut resolved = BTreeMap::new();
    for (key, value) in map {
        let value = value.resolve()?;
        tracing::trace!(key, "resolved configured variable");
        resolved.insert(key.clone(), value);
    }
    Ok(resolved)
}
