// ABOUTME: Provisioning driver: turns an infrastructure decision into live cloud resources.
// ABOUTME: Template generation and apply are traits; Terraform is the default for both.

mod backend;
mod driver;
mod environment;
mod error;
mod lock;
mod template;

pub use backend::{BackendError, InfraBackend, TerraformCli, parse_outputs, parse_state};
pub use driver::{Provisioner, ProvisioningDriver};
pub use environment::{ProvisionedEnvironment, ResourceHandle, describe_resources, outputs};
pub use error::{ProvisionError, ProvisionErrorKind};
pub use lock::{ApplyLock, LockInfo};
pub use template::{
    MAIN_FILE, RenderedTemplate, TemplateContext, TemplateGenerator, TerraformTemplates, VARS_FILE,
};
