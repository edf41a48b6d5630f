//! Rebuilds derived name/title arrays from canonical ID arrays.
//!
//! Name maps come from one full scan of each source table. A record is
//! rewritten only when a recomputed array differs from the stored one as an
//! unordered set, so a second pass over unchanged IDs writes nothing.
//! IDs with no matching name are dropped from the output and counted.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use conceptdb_core::store::{scan_complete, RecordStore, StagedWrite};
use conceptdb_core::{Category, Chunk, Concept, Document, Record, Result, StableId, TableKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub table: TableKind,
    pub scanned: usize,
    pub updated: usize,
    /// ID-array elements that had no name and were dropped.
    pub unresolved: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub dry_run: bool,
    pub tables: Vec<TableReport>,
}

impl ReconcileReport {
    pub fn updated_count(&self) -> usize {
        self.tables.iter().map(|t| t.updated).sum()
    }

    pub fn unresolved_count(&self) -> usize {
        self.tables.iter().map(|t| t.unresolved).sum()
    }
}

/// Order-insensitive comparison of a stored derived array with a recomputed one.
pub fn same_set(stored: &[String], computed: &[String]) -> bool {
    stored.iter().collect::<BTreeSet<_>>() == computed.iter().collect::<BTreeSet<_>>()
}

/// Map IDs through `names`, dropping (and counting) the unresolved ones.
pub fn resolve(ids: &[StableId], names: &HashMap<StableId, String>, unresolved: &mut usize) -> Vec<String> {
    ids.iter()
        .filter_map(|id| {
            let name = names.get(id).cloned();
            if name.is_none() {
                *unresolved += 1;
                debug!(id, "unresolved reference dropped");
            }
            name
        })
        .collect()
}

/// Overwrite `field` when `computed` differs from it as a set.
fn apply(field: &mut Vec<String>, computed: Vec<String>) -> bool {
    if same_set(field, &computed) {
        false
    } else {
        *field = computed;
        true
    }
}

struct NameMaps {
    concepts: HashMap<StableId, String>,
    categories: HashMap<StableId, String>,
    titles: HashMap<StableId, String>,
}

pub struct Reconciler<'a, S: RecordStore> {
    store: &'a S,
    scan_cap: usize,
}

impl<'a, S: RecordStore> Reconciler<'a, S> {
    pub fn new(store: &'a S, scan_cap: usize) -> Self {
        Self { store, scan_cap }
    }

    async fn scan<R: Record>(&self) -> Result<Vec<R>> {
        let table = self.store.table::<R>().await?;
        scan_complete(table.as_ref(), self.scan_cap).await
    }

    /// Reconcile `tables` (all four when `None`). Dry runs compute the report
    /// without writing.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, tables: Option<&[TableKind]>, dry_run: bool) -> Result<ReconcileReport> {
        let selected: Vec<TableKind> = tables.map_or_else(|| TableKind::ALL.to_vec(), <[TableKind]>::to_vec);

        let concepts: Vec<Concept> = self.scan().await?;
        let categories: Vec<Category> = self.scan().await?;
        let documents: Vec<Document> = self.scan().await?;
        let maps = NameMaps {
            concepts: concepts.iter().map(|c| (c.id, c.name.clone())).collect(),
            categories: categories.iter().map(|c| (c.id, c.name.clone())).collect(),
            titles: documents.iter().map(|d| (d.id, d.title().to_string())).collect(),
        };

        let mut report = ReconcileReport { dry_run, tables: Vec::new() };
        for kind in TableKind::ALL.into_iter().filter(|k| selected.contains(k)) {
            let table_report = match kind {
                TableKind::Chunks => {
                    let chunks: Vec<Chunk> = self.scan().await?;
                    self.rewrite(kind, chunks, dry_run, |c, unresolved| {
                        let concept_names = resolve(&c.concept_ids, &maps.concepts, unresolved);
                        let category_names = resolve(&c.category_ids, &maps.categories, unresolved);
                        apply(&mut c.concept_names, concept_names) | apply(&mut c.category_names, category_names)
                    })
                    .await?
                }
                TableKind::Documents => {
                    self.rewrite(kind, documents.clone(), dry_run, |d, unresolved| {
                        let concept_names = resolve(&d.concept_ids, &maps.concepts, unresolved);
                        let category_names = resolve(&d.category_ids, &maps.categories, unresolved);
                        apply(&mut d.concept_names, concept_names) | apply(&mut d.category_names, category_names)
                    })
                    .await?
                }
                TableKind::Concepts => {
                    self.rewrite(kind, concepts.clone(), dry_run, |c, unresolved| {
                        let titles = resolve(&c.document_ids, &maps.titles, unresolved);
                        let related = resolve(&c.related_concept_ids, &maps.concepts, unresolved);
                        apply(&mut c.catalog_titles, titles) | apply(&mut c.related_concept_names, related)
                    })
                    .await?
                }
                TableKind::Categories => {
                    self.rewrite(kind, categories.clone(), dry_run, |c, unresolved| {
                        let related = resolve(&c.related_category_ids, &maps.categories, unresolved);
                        apply(&mut c.related_category_names, related)
                    })
                    .await?
                }
            };
            report.tables.push(table_report);
        }

        info!(
            dry_run,
            updated = report.updated_count(),
            unresolved = report.unresolved_count(),
            "reconciliation finished"
        );
        Ok(report)
    }

    /// Apply `fix` to every record and, if anything changed, replace the table.
    async fn rewrite<R, F>(&self, kind: TableKind, mut records: Vec<R>, dry_run: bool, mut fix: F) -> Result<TableReport>
    where
        R: Record,
        F: FnMut(&mut R, &mut usize) -> bool,
    {
        let mut updated = 0;
        let mut unresolved = 0;
        for record in &mut records {
            if fix(record, &mut unresolved) {
                updated += 1;
                debug!(table = kind.table_name(), id = record.id(), "derived fields changed");
            }
        }
        if unresolved > 0 {
            warn!(table = kind.table_name(), unresolved, "dropped unresolved references");
        }
        let scanned = records.len();
        if updated > 0 && !dry_run {
            let mut staged = StagedWrite::new();
            staged.stage_all(records);
            let table = self.store.table::<R>().await?;
            staged.commit(table.as_ref()).await?;
        }
        info!(table = kind.table_name(), scanned, updated, dry_run, "table reconciled");
        Ok(TableReport { table: kind, scanned, updated, unresolved })
    }
}
