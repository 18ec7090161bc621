// ABOUTME: Deploy command implementation.
// ABOUTME: Submits the request, streams the job log, and turns Ctrl-C into a cancel request.

use autodeploy::config::Config;
use autodeploy::diagnostics::Diagnostics;
use autodeploy::error::{Error, Result};
use autodeploy::facts::DeploymentRequest;
use autodeploy::job::{CancelOutcome, Orchestrator};
use autodeploy::output::Output;
use futures::StreamExt;
use std::path::Path;

pub async fn deploy(config: Config, request: &Path, mut output: Output) -> Result<()> {
    let request = DeploymentRequest::load(request)?;
    let orchestrator = Orchestrator::from_config(&config)?;

    output.start_timer();
    let id = orchestrator.submit(request);
    output.progress(&format!("Job {id}"));

    let mut events = Box::pin(orchestrator.stream(id)?);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancel_sent = false;
    let mut log = Vec::new();

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(event) => {
                    output.event(&event);
                    log.push(event);
                }
                None => break,
            },
            signal = &mut ctrl_c, if !cancel_sent => {
                cancel_sent = true;
                if let Err(e) = signal {
                    tracing::warn!("failed to listen for Ctrl-C: {}", e);
                    continue;
                }
                match orchestrator.cancel(id).await? {
                    CancelOutcome::Cancelled => output.progress("Cancelling..."),
                    CancelOutcome::MarkedForTeardown => output.progress(
                        "Infrastructure is being created; the job will stop after the current stage",
                    ),
                    CancelOutcome::AlreadyTerminal => {}
                }
            }
        }
    }

    let snapshot = orchestrator.wait(id).await?;
    for warning in Diagnostics::from_job(&snapshot, &log).warnings() {
        output.warning(&warning.message);
    }

    match (&snapshot.url, &snapshot.failure) {
        (Some(url), _) => {
            output.success(&format!("Deployed to {url}"));
            Ok(())
        }
        (None, Some(failure)) => Err(Error::JobFailed {
            job: id,
            detail: failure.to_string(),
        }),
        (None, None) => Err(Error::JobFailed {
            job: id,
            detail: format!("job stopped in stage {}", snapshot.stage),
        }),
    }
}
