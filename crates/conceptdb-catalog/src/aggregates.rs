//! Category aggregates recomputed from scratch.
//!
//! Concepts carry no category of their own; a concept belongs to every
//! category of every document it appears in (either side of the
//! document/concept link counts).

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use tracing::{info, instrument};

use conceptdb_core::store::{scan_complete, RecordStore, StagedWrite};
use conceptdb_core::{Category, Chunk, Concept, Document, Record, Result, StableId};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateReport {
    pub categories: usize,
    pub updated: usize,
    pub dry_run: bool,
}

#[derive(Debug, Default)]
struct Membership {
    documents: HashMap<StableId, usize>,
    chunks: HashMap<StableId, usize>,
    concepts: HashMap<StableId, BTreeSet<StableId>>,
}

fn count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

impl Membership {
    fn build(documents: &[Document], chunks: &[Chunk], concepts: &[Concept]) -> Self {
        let mut m = Membership::default();
        let doc_categories: HashMap<StableId, &[StableId]> =
            documents.iter().map(|d| (d.id, d.category_ids.as_slice())).collect();

        for d in documents {
            for cat in unique(&d.category_ids) {
                *m.documents.entry(cat).or_default() += 1;
                m.concepts.entry(cat).or_default().extend(d.concept_ids.iter().copied());
            }
        }
        for c in chunks {
            // Chunks without their own categories inherit their document's.
            let cats = if c.category_ids.is_empty() {
                doc_categories.get(&c.document_id).copied().unwrap_or_default()
            } else {
                c.category_ids.as_slice()
            };
            for cat in unique(cats) {
                *m.chunks.entry(cat).or_default() += 1;
            }
        }
        for concept in concepts {
            for doc in &concept.document_ids {
                for cat in doc_categories.get(doc).copied().unwrap_or_default() {
                    m.concepts.entry(*cat).or_default().insert(concept.id);
                }
            }
        }
        m
    }

    fn apply(&self, category: &mut Category) -> bool {
        let documents = count(self.documents.get(&category.id).copied().unwrap_or_default());
        let chunks = count(self.chunks.get(&category.id).copied().unwrap_or_default());
        let concepts = count(self.concepts.get(&category.id).map_or(0, BTreeSet::len));
        let changed = (category.document_count, category.chunk_count, category.concept_count)
            != (documents, chunks, concepts);
        category.document_count = documents;
        category.chunk_count = chunks;
        category.concept_count = concepts;
        changed
    }
}

fn unique(ids: &[StableId]) -> BTreeSet<StableId> {
    ids.iter().copied().collect()
}

pub struct AggregateRecompute<'a, S: RecordStore> {
    store: &'a S,
    scan_cap: usize,
}

impl<'a, S: RecordStore> AggregateRecompute<'a, S> {
    pub fn new(store: &'a S, scan_cap: usize) -> Self {
        Self { store, scan_cap }
    }

    async fn scan<R: Record>(&self) -> Result<Vec<R>> {
        let table = self.store.table::<R>().await?;
        scan_complete(table.as_ref(), self.scan_cap).await
    }

    async fn membership(&self) -> Result<Membership> {
        let documents: Vec<Document> = self.scan().await?;
        let chunks: Vec<Chunk> = self.scan().await?;
        let concepts: Vec<Concept> = self.scan().await?;
        Ok(Membership::build(&documents, &chunks, &concepts))
    }

    /// Recompute document, chunk and concept counts of every category.
    #[instrument(skip(self))]
    pub async fn run(&self, dry_run: bool) -> Result<AggregateReport> {
        let membership = self.membership().await?;
        let mut categories: Vec<Category> = self.scan().await?;
        let updated = categories.iter_mut().map(|c| membership.apply(c)).filter(|changed| *changed).count();
        if updated > 0 && !dry_run {
            let mut staged = StagedWrite::new();
            staged.stage_all(categories.iter().cloned());
            staged.commit(self.store.table::<Category>().await?.as_ref()).await?;
        }
        info!(categories = categories.len(), updated, dry_run, "category aggregates recomputed");
        Ok(AggregateReport { categories: categories.len(), updated, dry_run })
    }

    /// Concepts that appear in at least one document of `category_id`, sorted.
    pub async fn concepts_in_category(&self, category_id: StableId) -> Result<Vec<StableId>> {
        let membership = self.membership().await?;
        Ok(membership
            .concepts
            .get(&category_id)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_counts_through_documents() {
        let se = Category::new("software engineering");
        let mut doc = Document::new("/b/ddd.pdf", "");
        doc.category_ids = vec![se.id, se.id];
        let mut chunk = Chunk::new("/b/ddd.pdf", 0, "x");
        chunk.category_ids.clear();
        let mut observer = Concept::new("observer");
        observer.document_ids = vec![doc.id];
        doc.concept_ids = vec![Concept::new("visitor").id];

        let m = Membership::build(&[doc], &[chunk], &[observer]);
        let mut cat = se.clone();
        assert!(m.apply(&mut cat));
        assert_eq!((cat.document_count, cat.chunk_count, cat.concept_count), (1, 1, 2));
        assert!(!m.apply(&mut cat));
    }
}
