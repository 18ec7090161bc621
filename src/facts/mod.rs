// ABOUTME: Typed deployment intent and repository analysis facts.
// ABOUTME: Produced by external extraction/analysis; consumed read-only by the pipeline.

mod database;

pub use database::DatabaseEngine;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::AppName;

/// One incoming deployment request. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    /// Local checkout of the repository to deploy.
    pub repository: PathBuf,

    /// The raw natural-language message, kept for audit.
    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub app_name: Option<AppName>,

    #[serde(default)]
    pub intent: IntentFacts,

    #[serde(default)]
    pub analysis: RepoAnalysis,
}

/// Fields extracted from the free-text message. Any subset may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentFacts {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub framework: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    /// Shape explicitly asked for in the message ("deploy this as a lambda").
    #[serde(default)]
    pub preference: Option<ShapePreference>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShapePreference {
    #[serde(alias = "lambda", alias = "function")]
    Serverless,
    #[serde(alias = "docker", alias = "ecs", alias = "containers")]
    Container,
    #[serde(alias = "vm", alias = "ec2", alias = "virtual-machine", alias = "server")]
    VirtualMachine,
}

/// Static facts about the repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoAnalysis {
    #[serde(default)]
    pub has_dockerfile: bool,

    #[serde(default)]
    pub entry_point: Option<PathBuf>,

    #[serde(default)]
    pub declared_ports: Vec<u16>,

    #[serde(default)]
    pub dependency_manifest: Option<ManifestKind>,

    #[serde(default)]
    pub needs_gpu: bool,

    #[serde(default)]
    pub has_static_frontend: bool,

    #[serde(default)]
    pub cache: Option<String>,

    #[serde(default)]
    pub queue: Option<String>,

    /// Dependencies too large or too slow to cold-start for a function runtime.
    #[serde(default)]
    pub heavy_dependencies: Vec<String>,

    #[serde(default)]
    pub start_command: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManifestKind {
    #[serde(alias = "requirements.txt")]
    Requirements,
    #[serde(alias = "Pipfile")]
    Pipfile,
    #[serde(alias = "pyproject.toml")]
    Pyproject,
    #[serde(alias = "package.json")]
    PackageJson,
}

impl ManifestKind {
    pub fn is_python(&self) -> bool {
        !matches!(self, ManifestKind::PackageJson)
    }
}

impl DeploymentRequest {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut request = Self::from_yaml(&content)?;

        // Relative repository paths are relative to the request file.
        if request.repository.is_relative()
            && let Some(parent) = path.parent()
        {
            request.repository = parent.join(&request.repository);
        }
        Ok(request)
    }

    /// Name used for every resource created for this request.
    pub fn app_name(&self) -> AppName {
        if let Some(name) = &self.app_name {
            return name.clone();
        }
        let dir = self
            .repository
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        AppName::derive(&dir)
    }

    pub fn database(&self) -> Option<DatabaseEngine> {
        self.intent.database.as_deref().map(DatabaseEngine::parse)
    }

    pub fn framework(&self) -> Option<String> {
        self.intent.framework.as_ref().map(|f| f.trim().to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_request() {
        let yaml = r#"
repository: ./hello
message: deploy this flask app on aws
intent:
  provider: AWS
  framework: flask
analysis:
  entry_point: app.py
  declared_ports: [5000]
  dependency_manifest: requirements.txt
"#;
        let request = DeploymentRequest::from_yaml(yaml).unwrap();
        assert_eq!(request.intent.framework.as_deref(), Some("flask"));
        assert_eq!(request.analysis.declared_ports, vec![5000]);
        assert_eq!(
            request.analysis.dependency_manifest,
            Some(ManifestKind::Requirements)
        );
        assert!(!request.analysis.has_dockerfile);
        assert_eq!(request.app_name().as_str(), "hello");
    }

    #[test]
    fn preference_accepts_aliases() {
        let p: ShapePreference = serde_yaml::from_str("lambda").unwrap();
        assert_eq!(p, ShapePreference::Serverless);
        let p: ShapePreference = serde_yaml::from_str("ec2").unwrap();
        assert_eq!(p, ShapePreference::VirtualMachine);
    }

    #[test]
    fn explicit_app_name_wins() {
        let yaml = "repository: /tmp/Some_Repo\napp_name: shop\n";
        let request = DeploymentRequest::from_yaml(yaml).unwrap();
        assert_eq!(request.app_name().as_str(), "shop");
    }
}
