// ABOUTME: Drives a target through transfer, install, start, and port opening.
// ABOUTME: Never starts a duplicate: probes for a running instance before every start.

use std::future::Future;

use super::error::{DeployError, DeployStep};
use super::target::{DeployTarget, PortStatus, ProbeStatus};
use crate::logbus::StageLog;
use crate::patch::PreparedSource;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Default)]
pub struct Executor {
    retry: RetryPolicy,
}

impl Executor {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// Deploy `source` to `target` and return the public URL.
    pub async fn run(
        &self,
        target: &dyn DeployTarget,
        source: &PreparedSource,
        ports: &[u16],
        log: &StageLog,
    ) -> Result<String, DeployError> {
        log.info(format!(
            "transfer started: {} files to {}",
            source.tree.len(),
            target.describe()
        ));
        self.repeatable(DeployStep::Transfer, || target.transfer(source))
            .await?;
        log.info("transfer completed");

        log.info("install started");
        self.repeatable(DeployStep::Install, || target.install())
            .await?;
        log.info("install completed");

        match self.probe(target, log).await {
            ProbeStatus::Running => {
                log.info("service already running, skipping start");
            }
            ProbeStatus::Stopped => {
                self.start(target, source, log).await?;
                log.info("process started");
            }
        }

        for &port in ports {
            let status = self
                .repeatable(DeployStep::OpenPort, || target.open_port(port))
                .await?;
            match status {
                PortStatus::Opened => log.info(format!("port {port} opened")),
                PortStatus::AlreadyOpen => log.info(format!("port {port} already open")),
                PortStatus::NotRequired => {
                    log.info(format!("port {port} needs no firewall rule"))
                }
            }
        }

        let url = target.public_url()?;
        log.info(format!("service available at {url}"));
        Ok(url)
    }

    /// Steps that are safe to repeat: retried on any error.
    async fn repeatable<T, F, Fut>(&self, step: DeployStep, mut op: F) -> Result<T, DeployError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DeployError>>,
    {
        self.retry
            .run(&step.to_string(), move |_| op(), |_: &DeployError| true)
            .await
    }

    /// A failed probe counts as stopped.
    async fn probe(&self, target: &dyn DeployTarget, log: &StageLog) -> ProbeStatus {
        match target.probe().await {
            Ok(status) => status,
            Err(e) => {
                log.warn(format!("probe failed, assuming not running: {e}"));
                ProbeStatus::Stopped
            }
        }
    }

    /// Start, re-probing before each retry in case a failed attempt left the
    /// service running.
    async fn start(
        &self,
        target: &dyn DeployTarget,
        source: &PreparedSource,
        log: &StageLog,
    ) -> Result<(), DeployError> {
        let max = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let err = match target.start(source).await {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };
            if attempt >= max {
                return Err(err);
            }

            log.warn(format!("start attempt {attempt}/{max} failed: {err}"));
            tokio::time::sleep(self.retry.delay_after(attempt)).await;
            attempt += 1;

            if self.probe(target, log).await == ProbeStatus::Running {
                log.info("previous start attempt left the service running");
                return Ok(());
            }
        }
    }
}
