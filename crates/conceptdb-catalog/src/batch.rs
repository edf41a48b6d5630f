//! Checkpointed forward-attribution batch job.
//!
//! Documents are processed in groups of `checkpoint_every`. Each document's
//! extraction goes through the shared [`CallPolicy`]; a document whose
//! extraction still fails after the retries is recorded as failed and the
//! batch moves on. After every group the chunk table is committed (when it
//! changed) and the checkpoint saved, so a crash loses at most one group.
//! Once all groups are done, concept `chunk_ids` are rebuilt from the
//! updated chunks.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{info, instrument, warn};

use conceptdb_core::checkpoint::Checkpoint;
use conceptdb_core::config::{expand_path, BatchSettings};
use conceptdb_core::policy::CallPolicy;
use conceptdb_core::store::{scan_complete, RecordStore, StagedWrite};
use conceptdb_core::traits::ConceptExtractor;
use conceptdb_core::{Chunk, Concept, Document, Result, StableId};

use crate::attribution::{assign_to_chunks, chunk_index, fold_chunk_ids, resolve_extraction};
use crate::cache::ConceptIdCache;
use crate::verify::{verify_chunks, VerificationReport};

pub const JOB_NAME: &str = "forward-attribution";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForwardReport {
    pub documents: usize,
    /// Already processed by an earlier run.
    pub skipped: usize,
    pub succeeded: usize,
    /// Documents that failed in this run, with the last error.
    pub failed: Vec<(StableId, String)>,
    pub chunks_updated: usize,
    /// Concepts whose `chunk_ids` changed.
    pub concepts_updated: usize,
    /// Extracted names that matched no known concept.
    pub dropped_names: usize,
    pub verification: VerificationReport,
    pub dry_run: bool,
}

pub struct ForwardAttributionJob<'a, S: RecordStore, E: ConceptExtractor> {
    store: &'a S,
    extractor: &'a E,
    cache: &'a ConceptIdCache,
    policy: CallPolicy,
    checkpoint_path: PathBuf,
    checkpoint_every: usize,
    scan_cap: usize,
    dry_run: bool,
    retry_failed: bool,
    progress: bool,
}

impl<'a, S: RecordStore, E: ConceptExtractor> ForwardAttributionJob<'a, S, E> {
    pub fn new(store: &'a S, extractor: &'a E, cache: &'a ConceptIdCache, batch: &BatchSettings, scan_cap: usize) -> Self {
        Self {
            store,
            extractor,
            cache,
            policy: CallPolicy::from_settings(batch),
            checkpoint_path: expand_path(&batch.checkpoint_path),
            checkpoint_every: batch.checkpoint_every.max(1),
            scan_cap,
            dry_run: false,
            retry_failed: false,
            progress: false,
        }
    }

    pub fn with_policy(mut self, policy: CallPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_checkpoint_path(mut self, path: impl AsRef<Path>) -> Self {
        self.checkpoint_path = path.as_ref().to_path_buf();
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Requeue documents an earlier run recorded as failed.
    pub fn retry_failed(mut self, retry: bool) -> Self {
        self.retry_failed = retry;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents ({percent}%) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
        );
        pb
    }

    /// Bring concept `chunk_ids` in line with the attributed chunks.
    async fn fold_concepts(&self, chunks: &[Chunk]) -> Result<usize> {
        let concept_table = self.store.table::<Concept>().await?;
        let mut concepts = scan_complete(concept_table.as_ref(), self.scan_cap).await?;
        let updated = fold_chunk_ids(&mut concepts, &chunk_index(chunks));
        if updated > 0 && !self.dry_run {
            let mut staged = StagedWrite::new();
            staged.stage_all(concepts);
            staged.commit(concept_table.as_ref()).await?;
        }
        Ok(updated)
    }

    #[instrument(skip(self), fields(job = JOB_NAME, dry_run = self.dry_run))]
    pub async fn run(&self) -> Result<ForwardReport> {
        if !self.cache.is_initialized() {
            self.cache.initialize(self.store).await?;
        }
        let vocabulary = self.cache.vocabulary()?;

        let mut documents = scan_complete(self.store.table::<Document>().await?.as_ref(), self.scan_cap).await?;
        documents.sort_by_key(|d| d.id);
        let chunk_table = self.store.table::<Chunk>().await?;
        let mut chunks = scan_complete(chunk_table.as_ref(), self.scan_cap).await?;
        let mut by_document: HashMap<StableId, Vec<usize>> = HashMap::new();
        for (i, chunk) in chunks.iter().enumerate() {
            by_document.entry(chunk.document_id).or_default().push(i);
        }
        for positions in by_document.values_mut() {
            positions.sort_by_key(|i| chunks[*i].chunk_index);
        }

        let mut checkpoint = Checkpoint::load_or_new(&self.checkpoint_path, JOB_NAME).await?;
        if self.retry_failed && !checkpoint.failed.is_empty() {
            info!(failed = checkpoint.failed.len(), "requeueing failed documents");
            checkpoint.retry_failed();
        }
        let pending: Vec<&Document> = documents.iter().filter(|d| !checkpoint.is_done(d.id)).collect();
        let skipped = documents.len() - pending.len();
        info!(documents = documents.len(), pending = pending.len(), skipped, "forward attribution starting");

        let pb = self.progress_bar(pending.len());
        let mut succeeded = 0;
        let mut failed = Vec::new();
        let mut chunks_updated = 0;
        let mut dropped_names = 0;
        let mut touched: BTreeSet<usize> = BTreeSet::new();

        for group in pending.chunks(self.checkpoint_every) {
            let mut group_changed = 0;
            for doc in group {
                let positions = by_document.get(&doc.id).cloned().unwrap_or_default();
                let text = positions
                    .iter()
                    .map(|i| chunks[*i].text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n");
                let outcome = self
                    .policy
                    .run("extract", || {
                        self.extractor.extract(&doc.source_path, &text, Some(vocabulary.as_slice()))
                    })
                    .await;
                match outcome {
                    Ok(extraction) => {
                        let resolved = resolve_extraction(&extraction, self.cache)?;
                        dropped_names += resolved.dropped.len();
                        let mut doc_chunks: Vec<Chunk> = positions.iter().map(|i| chunks[*i].clone()).collect();
                        group_changed += assign_to_chunks(&mut doc_chunks, &resolved.by_page);
                        for (i, chunk) in positions.iter().zip(doc_chunks) {
                            chunks[*i] = chunk;
                        }
                        touched.extend(positions);
                        checkpoint.record_success(doc.id);
                        succeeded += 1;
                    }
                    Err(err) => {
                        warn!(document = %doc.source_path, error = %err, "document failed; continuing");
                        checkpoint.record_failure(doc.id, err.to_string());
                        failed.push((doc.id, err.to_string()));
                    }
                }
                pb.inc(1);
            }

            if group_changed > 0 && !self.dry_run {
                let mut staged = StagedWrite::new();
                staged.stage_all(chunks.iter().cloned());
                staged.commit(chunk_table.as_ref()).await?;
            }
            chunks_updated += group_changed;
            if !self.dry_run {
                checkpoint.save(&self.checkpoint_path).await?;
            }
        }
        pb.finish_with_message("done");

        let concepts_updated = if chunks_updated > 0 { self.fold_concepts(&chunks).await? } else { 0 };

        let attributed: Vec<Chunk> = touched.iter().map(|i| chunks[*i].clone()).collect();
        let verification = verify_chunks(&attributed, self.cache)?;
        if !failed.is_empty() {
            warn!(failed = failed.len(), "some documents failed; rerun with retry enabled to requeue them");
        }
        info!(
            succeeded,
            failed = failed.len(),
            chunks_updated,
            concepts_updated,
            dropped_names,
            "forward attribution finished"
        );
        Ok(ForwardReport {
            documents: documents.len(),
            skipped,
            succeeded,
            failed,
            chunks_updated,
            concepts_updated,
            dropped_names,
            verification,
            dry_run: self.dry_run,
        })
    }
}
