// ABOUTME: Infrastructure decision engine: facts in, infrastructure shape out.
// ABOUTME: Pure and deterministic; precedence lives in an ordered rule table.

mod error;
mod rules;

pub use error::DecisionError;
pub use rules::{RULES, Rule};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::facts::DeploymentRequest;

pub const DEFAULT_REGION: &str = "us-east-1";

/// Port assumed for host shapes when the repository declares none.
pub const DEFAULT_APP_PORT: u16 = 8080;

/// Where the application will run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Shape {
    Serverless,
    Container,
    VirtualMachine,
}

impl Shape {
    /// Shapes whose code runs on a host we reach over SSH.
    pub fn is_host(&self) -> bool {
        !matches!(self, Shape::Serverless)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Serverless => write!(f, "serverless"),
            Shape::Container => write!(f, "container"),
            Shape::VirtualMachine => write!(f, "virtual-machine"),
        }
    }
}

/// Compute/memory tier for the chosen shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SizeTier {
    Instance { instance_type: String },
    Function { memory_mb: u32 },
}

/// Language runtime of the deployed application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Runtime {
    #[serde(rename = "python3.11")]
    Python311,
    #[serde(rename = "nodejs18.x")]
    Nodejs18,
    #[serde(rename = "custom")]
    Custom,
}

impl Runtime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Runtime::Python311 => "python3.11",
            Runtime::Nodejs18 => "nodejs18.x",
            Runtime::Custom => "custom",
        }
    }
}

/// Shape-specific provisioning parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeParams {
    pub region: String,
    pub runtime: Runtime,
    pub size: SizeTier,
    /// Ports the service listens on. Empty for functions without a listener.
    pub ports: Vec<u16>,
    pub database: Option<String>,
    pub cache: Option<String>,
    pub queue: Option<String>,
    pub needs_gpu: bool,
}

impl ShapeParams {
    pub fn primary_port(&self) -> Option<u16> {
        self.ports.first().copied()
    }
}

/// Output of the decision engine, embedded in the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfrastructureDecision {
    pub shape: Shape,
    pub params: ShapeParams,
    /// Name of the rule that matched.
    pub rule: String,
    /// Human-readable explanation of the choice.
    pub notes: Vec<String>,
}

/// Evaluates [`RULES`] top to bottom; the first matching rule wins.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    region: String,
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_REGION)
    }
}

impl DecisionEngine {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn decide(
        &self,
        request: &DeploymentRequest,
    ) -> Result<InfrastructureDecision, DecisionError> {
        if let Some(provider) = request.intent.provider.as_deref()
            && !provider.trim().eq_ignore_ascii_case("aws")
        {
            return Err(DecisionError::UnsupportedProvider(provider.trim().to_string()));
        }

        // Nothing to run: no explicit shape can fix that.
        if request.analysis.entry_point.is_none() && !request.analysis.has_dockerfile {
            return Err(DecisionError::UnresolvableShape {
                reason: "repository has neither an entry point nor a Dockerfile".to_string(),
            });
        }

        let rule = RULES
            .iter()
            .find(|rule| (rule.applies)(request))
            .ok_or_else(|| DecisionError::UnresolvableShape {
                reason: "no rule matched the repository facts".to_string(),
            })?;

        tracing::debug!(rule = rule.name, shape = %rule.shape, "decision rule matched");

        let mut notes = vec![rule.note.to_string()];
        let params = (rule.params)(request, &self.region, &mut notes);

        Ok(InfrastructureDecision {
            shape: rule.shape,
            params,
            rule: rule.name.to_string(),
            notes,
        })
    }
}
