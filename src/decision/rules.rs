// ABOUTME: Ordered rule table for infrastructure shape selection.
// ABOUTME: Each entry pairs a predicate with a shape and a parameter builder.

use std::collections::BTreeSet;
use std::path::Path;

use super::{DEFAULT_APP_PORT, Runtime, Shape, ShapeParams, SizeTier};
use crate::facts::{DeploymentRequest, ShapePreference};

pub type Predicate = fn(&DeploymentRequest) -> bool;
pub type ParamBuilder = fn(&DeploymentRequest, &str, &mut Vec<String>) -> ShapeParams;

/// One row of the decision table.
pub struct Rule {
    pub name: &'static str,
    pub applies: Predicate,
    pub shape: Shape,
    pub params: ParamBuilder,
    pub note: &'static str,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .finish()
    }
}

/// Highest precedence first. Predicates are written to be meaningful on
/// their own; the order only settles requests that match several rows.
pub const RULES: &[Rule] = &[
    Rule {
        name: "explicit-serverless",
        applies: prefers_serverless,
        shape: Shape::Serverless,
        params: function_params,
        note: "serverless explicitly requested",
    },
    Rule {
        name: "explicit-container",
        applies: prefers_container,
        shape: Shape::Container,
        params: host_params,
        note: "containers explicitly requested",
    },
    Rule {
        name: "explicit-vm",
        applies: prefers_vm,
        shape: Shape::VirtualMachine,
        params: host_params,
        note: "virtual machine explicitly requested",
    },
    Rule {
        name: "dockerfile-with-port",
        applies: has_dockerfile_with_port,
        shape: Shape::Container,
        params: host_params,
        note: "Dockerfile with an exposed port",
    },
    Rule {
        name: "gpu",
        applies: needs_gpu,
        shape: Shape::VirtualMachine,
        params: host_params,
        note: "GPU libraries detected",
    },
    Rule {
        name: "persistent-services",
        applies: needs_persistent_services,
        shape: Shape::VirtualMachine,
        params: host_params,
        note: "stateful service needs a persistent network connection",
    },
    Rule {
        name: "static-frontend",
        applies: has_static_frontend,
        shape: Shape::VirtualMachine,
        params: host_params,
        note: "static frontend served alongside the backend",
    },
    Rule {
        name: "single-handler",
        applies: is_single_handler,
        shape: Shape::Serverless,
        params: function_params,
        note: "single lightweight entry point without containerization",
    },
    Rule {
        name: "dockerfile",
        applies: has_dockerfile,
        shape: Shape::Container,
        params: host_params,
        note: "Dockerfile present",
    },
    Rule {
        name: "uncontainerized",
        applies: is_uncontainerized,
        shape: Shape::VirtualMachine,
        params: host_params,
        note: "no containerization artifacts",
    },
];

fn prefers_serverless(r: &DeploymentRequest) -> bool {
    r.intent.preference == Some(ShapePreference::Serverless)
}

fn prefers_container(r: &DeploymentRequest) -> bool {
    r.intent.preference == Some(ShapePreference::Container)
}

fn prefers_vm(r: &DeploymentRequest) -> bool {
    r.intent.preference == Some(ShapePreference::VirtualMachine)
}

fn has_dockerfile_with_port(r: &DeploymentRequest) -> bool {
    r.analysis.has_dockerfile && !r.analysis.declared_ports.is_empty()
}

fn has_dockerfile(r: &DeploymentRequest) -> bool {
    r.analysis.has_dockerfile
}

fn needs_gpu(r: &DeploymentRequest) -> bool {
    r.analysis.needs_gpu
}

fn has_static_frontend(r: &DeploymentRequest) -> bool {
    r.analysis.has_static_frontend
}

fn is_uncontainerized(r: &DeploymentRequest) -> bool {
    !r.analysis.has_dockerfile && r.analysis.entry_point.is_some()
}

fn needs_persistent_services(r: &DeploymentRequest) -> bool {
    r.database()
        .is_some_and(|db| db.needs_persistent_connection())
        || r.analysis.queue.is_some()
        || r.analysis.cache.is_some()
}

fn is_single_handler(r: &DeploymentRequest) -> bool {
    let analysis = &r.analysis;
    analysis.entry_point.is_some()
        && !analysis.has_dockerfile
        && analysis.declared_ports.len() <= 1
        && analysis.heavy_dependencies.is_empty()
        && !analysis.needs_gpu
        && !needs_persistent_services(r)
}

fn function_params(r: &DeploymentRequest, region: &str, notes: &mut Vec<String>) -> ShapeParams {
    let mut params = common_params(r, region, notes);
    params.size = SizeTier::Function { memory_mb: 512 };
    params.ports = r.analysis.declared_ports.clone();
    params
}

fn host_params(r: &DeploymentRequest, region: &str, notes: &mut Vec<String>) -> ShapeParams {
    let mut params = common_params(r, region, notes);
    if r.analysis.needs_gpu {
        params.size = SizeTier::Instance {
            instance_type: "g4dn.xlarge".to_string(),
        };
    }
    if params.ports.is_empty() {
        notes.push(format!("no declared port, assuming {DEFAULT_APP_PORT}"));
        params.ports.push(DEFAULT_APP_PORT);
    }
    params
}

fn common_params(r: &DeploymentRequest, region: &str, notes: &mut Vec<String>) -> ShapeParams {
    let database = r.database().and_then(|db| {
        let service = db.managed_service()?;
        notes.push(format!("database {db} provisioned as {service}"));
        Some(service.to_string())
    });

    let cache = r.analysis.cache.as_deref().map(|cache| {
        if cache.eq_ignore_ascii_case("redis") {
            "elasticache-redis".to_string()
        } else {
            cache.to_lowercase()
        }
    });

    // Every queue hint maps onto SQS on AWS.
    let queue = r.analysis.queue.as_ref().map(|_| "sqs".to_string());

    // Declaration order matters: the first port is the public one.
    let mut seen = BTreeSet::new();
    let mut ports = r.analysis.declared_ports.clone();
    ports.retain(|port| seen.insert(*port));

    ShapeParams {
        region: region.to_string(),
        runtime: runtime_for(r),
        size: SizeTier::Instance {
            instance_type: "t3.small".to_string(),
        },
        ports,
        database,
        cache,
        queue,
        needs_gpu: r.analysis.needs_gpu,
    }
}

fn runtime_for(r: &DeploymentRequest) -> Runtime {
    if let Some(framework) = r.framework() {
        match framework.as_str() {
            "flask" | "django" | "fastapi" => return Runtime::Python311,
            "express" | "node" | "node.js" | "nodejs" | "koa" | "nestjs" => {
                return Runtime::Nodejs18;
            }
            _ => {}
        }
    }

    if let Some(manifest) = r.analysis.dependency_manifest {
        return if manifest.is_python() {
            Runtime::Python311
        } else {
            Runtime::Nodejs18
        };
    }

    match r
        .analysis
        .entry_point
        .as_deref()
        .and_then(Path::extension)
        .and_then(|e| e.to_str())
    {
        Some("py") => Runtime::Python311,
        Some("js") | Some("mjs") | Some("ts") => Runtime::Nodejs18,
        _ => Runtime::Custom,
    }
}
