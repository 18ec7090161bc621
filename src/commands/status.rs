// ABOUTME: Status and logs commands.
// ABOUTME: Read persisted job records directly; they never touch a running job.

use autodeploy::config::Config;
use autodeploy::error::{Error, Result};
use autodeploy::job::{FileStore, JobStore, StoredJob};
use autodeploy::output::Output;
use autodeploy::types::JobId;

fn load(config: &Config, job: &str) -> Result<StoredJob> {
    let id: JobId = job.parse()?;
    FileStore::new(config.jobs_dir())
        .load(id)?
        .ok_or(Error::UnknownJob(id))
}

pub fn status(config: &Config, job: &str, output: &Output) -> Result<()> {
    let stored = load(config, job)?;
    output.snapshot(&stored.record.snapshot());
    Ok(())
}

pub fn logs(config: &Config, job: &str, output: &Output) -> Result<()> {
    let stored = load(config, job)?;
    for event in &stored.log {
        output.event(event);
    }
    Ok(())
}
