//! Resumable progress for long batch jobs.
//!
//! A checkpoint records which units (documents) are done and which failed.
//! Jobs save it after every group of units, so a crash loses at most one
//! group; on restart [`Checkpoint::pending`] filters out finished work.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::StableId;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub job: String,
    pub processed: BTreeSet<StableId>,
    /// Failed unit -> last error message.
    pub failed: BTreeMap<StableId, String>,
    pub succeeded: usize,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    pub fn new(job: impl Into<String>) -> Self {
        Self { job: job.into(), ..Self::default() }
    }

    /// Load a checkpoint, or start fresh when none exists yet.
    pub async fn load_or_new(path: &Path, job: &str) -> Result<Self> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let cp: Checkpoint = serde_json::from_slice(&bytes)?;
                tracing::info!(
                    path = %path.display(),
                    processed = cp.processed.len(),
                    failed = cp.failed.len(),
                    "resuming from checkpoint"
                );
                Ok(cp)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new(job)),
            Err(e) => Err(e.into()),
        }
    }

    /// Write via a temp file and rename so a crash never leaves a torn file.
    pub async fn save(&mut self, path: &Path) -> Result<()> {
        self.updated_at = Some(Utc::now());
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = tmp_path(path);
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(self)?).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    pub fn record_success(&mut self, id: StableId) {
        self.failed.remove(&id);
        if self.processed.insert(id) {
            self.succeeded += 1;
        }
    }

    /// Failed units count as processed so a resumed run does not retry them forever;
    /// use [`Checkpoint::retry_failed`] to requeue.
    pub fn record_failure(&mut self, id: StableId, error: impl Into<String>) {
        self.processed.insert(id);
        self.failed.insert(id, error.into());
    }

    pub fn retry_failed(&mut self) {
        for id in self.failed.keys() {
            self.processed.remove(id);
        }
        self.failed.clear();
    }

    pub fn is_done(&self, id: StableId) -> bool {
        self.processed.contains(&id)
    }

    pub fn pending<'a, I>(&'a self, ids: I) -> impl Iterator<Item = StableId> + 'a
    where
        I: IntoIterator<Item = StableId>,
        I::IntoIter: 'a,
    {
        ids.into_iter().filter(move |id| !self.is_done(*id))
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
