// ABOUTME: Plan command implementation.
// ABOUTME: Runs the decision engine (and optionally template generation) without side effects.

use autodeploy::config::Config;
use autodeploy::decision::DecisionEngine;
use autodeploy::error::Result;
use autodeploy::facts::DeploymentRequest;
use autodeploy::output::Output;
use autodeploy::provision::{TemplateContext, TemplateGenerator, TerraformTemplates};
use autodeploy::types::JobId;
use std::path::Path;

pub fn plan(config: &Config, request: &Path, template: bool, output: &Output) -> Result<()> {
    let request = DeploymentRequest::load(request)?;
    let decision = DecisionEngine::new(config.region.clone()).decide(&request)?;
    output.decision(&decision);

    if template {
        let ctx = TemplateContext {
            job: JobId::new(),
            app: request.app_name(),
            key_name: config.ssh.key_name.clone(),
            handler: None,
        };
        let rendered = TerraformTemplates.render(&decision, &ctx)?;
        output.progress(&format!("\n# template: {}", rendered.id));
        output.progress(&rendered.main_tf);
    }
    Ok(())
}
