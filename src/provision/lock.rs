// ABOUTME: Apply lock preventing two concurrent infrastructure applies on one job's workdir.
// ABOUTME: Uses atomic create-new of a lock file holding host, pid, and start time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::error::ProvisionError;
use crate::types::JobId;

const LOCK_FILENAME: &str = ".apply.lock";

/// Information about who holds an apply lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    /// Process ID of the lock holder.
    pub pid: u32,
    /// When the lock was acquired.
    pub started_at: DateTime<Utc>,
    pub job: JobId,
}

impl LockInfo {
    pub fn new(job: JobId) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            job,
        }
    }

    /// Locks older than an hour are assumed abandoned.
    pub fn is_stale(&self) -> bool {
        let age = Utc::now() - self.started_at;
        age.num_hours() >= 1
    }
}

/// A held apply lock. Released on drop.
#[derive(Debug)]
pub struct ApplyLock {
    path: PathBuf,
}

impl ApplyLock {
    pub fn path_in(workdir: &Path) -> PathBuf {
        workdir.join(LOCK_FILENAME)
    }

    /// Take the lock for `workdir`. Stale or unreadable locks are broken with a warning.
    /// Does blocking file IO.
    pub fn acquire(workdir: &Path, job: JobId) -> Result<Self, ProvisionError> {
        let path = Self::path_in(workdir);
        let info = LockInfo::new(job);

        match Self::try_create(&path, &info) {
            Ok(()) => return Ok(Self { path }),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(source) => return Err(ProvisionError::Workdir { path, source }),
        }

        match std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str::<LockInfo>(&raw).ok())
        {
            Some(existing) if !existing.is_stale() => {
                return Err(ProvisionError::LockHeld {
                    path,
                    holder: existing.holder,
                    pid: existing.pid,
                    started_at: existing.started_at,
                });
            }
            Some(existing) => tracing::warn!(
                "breaking stale apply lock held by {} (pid {}) since {}",
                existing.holder,
                existing.pid,
                existing.started_at
            ),
            None => tracing::warn!("apply lock at {} is unreadable, breaking it", path.display()),
        }

        let _ = std::fs::remove_file(&path);
        match Self::try_create(&path, &info) {
            Ok(()) => Ok(Self { path }),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(ProvisionError::LockHeld {
                path,
                holder: "unknown".to_string(),
                pid: 0,
                started_at: Utc::now(),
            }),
            Err(source) => Err(ProvisionError::Workdir { path, source }),
        }
    }

    fn try_create(path: &Path, info: &LockInfo) -> std::io::Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let json = serde_json::to_string(info).map_err(std::io::Error::other)?;
        file.write_all(json.as_bytes())
    }
}

impl Drop for ApplyLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("failed to release apply lock {}: {}", self.path.display(), e);
        }
    }
}
