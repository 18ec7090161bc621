// ABOUTME: Provisioning driver: render, init, apply, and read back a job's infrastructure.
// ABOUTME: Retries transient backend errors and reports observed resources on failure.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::backend::{BackendError, InfraBackend};
use super::environment::{ProvisionedEnvironment, ResourceHandle, describe_resources};
use super::error::ProvisionError;
use super::lock::ApplyLock;
use super::template::{RenderedTemplate, TemplateContext, TemplateGenerator};
use crate::decision::InfrastructureDecision;
use crate::logbus::StageLog;
use crate::retry::RetryPolicy;
use crate::types::{AppName, JobId};

/// What the job pipeline needs from provisioning.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision(
        &self,
        job: JobId,
        app: &AppName,
        decision: &InfrastructureDecision,
        log: &StageLog,
    ) -> Result<ProvisionedEnvironment, ProvisionError>;

    /// Best-effort list of resources that currently exist for `job`.
    async fn observe(&self, job: JobId) -> Vec<ResourceHandle>;
}

pub struct ProvisioningDriver {
    jobs_dir: PathBuf,
    templates: Arc<dyn TemplateGenerator>,
    backend: Arc<dyn InfraBackend>,
    retry: RetryPolicy,
    key_name: Option<String>,
}

impl std::fmt::Debug for ProvisioningDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningDriver")
            .field("jobs_dir", &self.jobs_dir)
            .field("retry", &self.retry)
            .finish()
    }
}

impl ProvisioningDriver {
    pub fn new(
        jobs_dir: impl Into<PathBuf>,
        templates: Arc<dyn TemplateGenerator>,
        backend: Arc<dyn InfraBackend>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            jobs_dir: jobs_dir.into(),
            templates,
            backend,
            retry,
            key_name: None,
        }
    }

    pub fn key_name(mut self, key_name: Option<String>) -> Self {
        self.key_name = key_name;
        self
    }

    /// `<jobs_dir>/<job>/terraform`
    pub fn workdir(&self, job: JobId) -> PathBuf {
        self.jobs_dir.join(job.to_string()).join("terraform")
    }

    /// Create the workdir, take its apply lock, and write the template.
    /// Runs on the blocking pool.
    async fn set_up(
        &self,
        workdir: &Path,
        job: JobId,
        rendered: RenderedTemplate,
    ) -> Result<ApplyLock, ProvisionError> {
        let dir = workdir.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<ApplyLock, ProvisionError> {
            std::fs::create_dir_all(&dir).map_err(|source| ProvisionError::Workdir {
                path: dir.clone(),
                source,
            })?;
            let lock = ApplyLock::acquire(&dir, job)?;
            rendered.write_to(&dir)?;
            Ok(lock)
        })
        .await
        .map_err(|e| ProvisionError::Workdir {
            path: workdir.to_path_buf(),
            source: std::io::Error::other(e),
        })?
    }

    async fn release(lock: ApplyLock) {
        if let Err(e) = tokio::task::spawn_blocking(move || drop(lock)).await {
            tracing::warn!("apply lock release task failed: {}", e);
        }
    }

    async fn apply_in(
        &self,
        dir: &Path,
        template_id: String,
        log: &StageLog,
    ) -> Result<ProvisionedEnvironment, ProvisionError> {
        let backend = &self.backend;

        let init = self
            .retry
            .run("terraform init", move |_| backend.init(dir), |e: &BackendError| e.is_transient())
            .await;
        if let Err(source) = init {
            return Err(ProvisionError::Backend {
                source,
                created: Vec::new(),
            });
        }

        log.info("applying infrastructure");
        let applied = self
            .retry
            .run(
                "terraform apply",
                move |attempt| {
                    if attempt > 1 {
                        log.warn(format!("retrying apply (attempt {attempt})"));
                    }
                    backend.apply(dir)
                },
                |e: &BackendError| e.is_transient(),
            )
            .await;

        if let Err(source) = applied {
            let created = self.observe_in(dir).await;
            if !created.is_empty() {
                log.error(format!(
                    "apply failed after creating: {}",
                    describe_resources(&created)
                ));
            }
            return Err(ProvisionError::Backend { source, created });
        }

        let outputs = match self
            .retry
            .run("terraform output", move |_| backend.outputs(dir), |e: &BackendError| e.is_transient())
            .await
        {
            Ok(outputs) => outputs,
            Err(source) => {
                let created = self.observe_in(dir).await;
                return Err(ProvisionError::Backend { source, created });
            }
        };

        let resources = self.observe_in(dir).await;
        let env =
            ProvisionedEnvironment::from_outputs(template_id, dir.to_path_buf(), outputs, resources);

        match (&env.public_host, &env.function_url) {
            (Some(host), _) => log.info(format!("provisioned host {host}")),
            (None, Some(url)) => log.info(format!("provisioned function at {url}")),
            (None, None) => log.warn("apply produced no public endpoint"),
        }
        log.info(format!("{} resources under management", env.resources.len()));

        Ok(env)
    }

    async fn observe_in(&self, workdir: &Path) -> Vec<ResourceHandle> {
        match self.backend.observe(workdir).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("could not list resources in {}: {}", workdir.display(), e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl Provisioner for ProvisioningDriver {
    async fn provision(
        &self,
        job: JobId,
        app: &AppName,
        decision: &InfrastructureDecision,
        log: &StageLog,
    ) -> Result<ProvisionedEnvironment, ProvisionError> {
        let workdir = self.workdir(job);
        let ctx = TemplateContext {
            job,
            app: app.clone(),
            key_name: self.key_name.clone(),
            handler: None,
        };
        let rendered = self.templates.render(decision, &ctx)?;
        let template_id = rendered.id.clone();

        let lock = self.set_up(&workdir, job, rendered).await?;
        log.info(format!("generated template {template_id} in {}", workdir.display()));

        let result = self.apply_in(&workdir, template_id, log).await;
        Self::release(lock).await;
        result
    }

    async fn observe(&self, job: JobId) -> Vec<ResourceHandle> {
        let workdir = self.workdir(job);
        if !tokio::fs::try_exists(&workdir).await.unwrap_or(false) {
            return Vec::new();
        }
        self.observe_in(&workdir).await
    }
}
