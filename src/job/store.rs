// ABOUTME: Durable job records: the record and its full log, keyed by job id.
// ABOUTME: FileStore writes <jobs_dir>/<id>/job.json atomically; MemoryStore is for tests.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::record::JobRecord;
use crate::error::{Error, Result};
use crate::logbus::LogEvent;
use crate::types::JobId;

pub const JOB_FILE: &str = "job.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredJob {
    pub record: JobRecord,
    #[serde(default)]
    pub log: Vec<LogEvent>,
}

pub trait JobStore: Send + Sync {
    fn save(&self, record: &JobRecord, log: &[LogEvent]) -> Result<()>;

    fn load(&self, id: JobId) -> Result<Option<StoredJob>>;

    /// Every stored job, oldest first.
    fn list(&self) -> Result<Vec<StoredJob>>;

    /// Forget the record. Infrastructure state next to it is left alone.
    fn remove(&self, id: JobId) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileStore {
    jobs_dir: PathBuf,
}

impl FileStore {
    pub fn new(jobs_dir: impl Into<PathBuf>) -> Self {
        Self {
            jobs_dir: jobs_dir.into(),
        }
    }

    pub fn path(&self, id: JobId) -> PathBuf {
        self.jobs_dir.join(id.to_string()).join(JOB_FILE)
    }

    fn read(path: &Path) -> Result<StoredJob> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl JobStore for FileStore {
    fn save(&self, record: &JobRecord, log: &[LogEvent]) -> Result<()> {
        let path = self.path(record.id);
        let dir = path
            .parent()
            .ok_or_else(|| Error::Store(format!("no parent for {}", path.display())))?;
        std::fs::create_dir_all(dir)?;

        let stored = StoredJob {
            record: record.clone(),
            log: log.to_vec(),
        };
        let json = serde_json::to_vec_pretty(&stored)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    fn load(&self, id: JobId) -> Result<Option<StoredJob>> {
        let path = self.path(id);
        if !path.exists() {
            return Ok(None);
        }
        Self::read(&path).map(Some)
    }

    fn list(&self) -> Result<Vec<StoredJob>> {
        if !self.jobs_dir.exists() {
            return Ok(Vec::new());
        }

        let mut jobs = Vec::new();
        for entry in std::fs::read_dir(&self.jobs_dir)? {
            let path = entry?.path().join(JOB_FILE);
            if !path.is_file() {
                continue;
            }
            match Self::read(&path) {
                Ok(job) => jobs.push(job),
                Err(e) => tracing::warn!("skipping unreadable job record {}: {}", path.display(), e),
            }
        }
        jobs.sort_by_key(|job| job.record.created_at);
        Ok(jobs)
    }

    fn remove(&self, id: JobId) -> Result<()> {
        match std::fs::remove_file(self.path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    jobs: Mutex<BTreeMap<JobId, StoredJob>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryStore {
    fn save(&self, record: &JobRecord, log: &[LogEvent]) -> Result<()> {
        self.jobs.lock().insert(
            record.id,
            StoredJob {
                record: record.clone(),
                log: log.to_vec(),
            },
        );
        Ok(())
    }

    fn load(&self, id: JobId) -> Result<Option<StoredJob>> {
        Ok(self.jobs.lock().get(&id).cloned())
    }

    fn list(&self) -> Result<Vec<StoredJob>> {
        let mut jobs: Vec<_> = self.jobs.lock().values().cloned().collect();
        jobs.sort_by_key(|job| job.record.created_at);
        Ok(jobs)
    }

    fn remove(&self, id: JobId) -> Result<()> {
        self.jobs.lock().remove(&id);
        Ok(())
    }
}
