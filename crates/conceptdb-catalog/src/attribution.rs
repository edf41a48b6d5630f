//! Concept-to-chunk attribution.
//!
//! Reverse attribution rebuilds each concept's `chunk_ids` from the chunks
//! that reference it. Forward attribution takes an extraction result
//! (concept names with page numbers), resolves the names strictly against
//! the concept cache and assigns the per-page concept sets to chunks.
//! Names the cache does not know are dropped; no new IDs are ever minted.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use conceptdb_core::store::{scan_complete, RecordStore, StagedWrite};
use conceptdb_core::traits::ExtractionResult;
use conceptdb_core::{Chunk, Concept, Result, StableId};

use crate::cache::ConceptIdCache;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReverseReport {
    pub chunks_scanned: usize,
    pub concepts_updated: usize,
    /// Concept IDs referenced by chunks but absent from the concept table.
    pub unknown_concepts: usize,
    pub dry_run: bool,
}

/// Concept -> chunk index built from the chunks' `concept_ids`.
pub fn chunk_index(chunks: &[Chunk]) -> BTreeMap<StableId, BTreeSet<StableId>> {
    let mut index: BTreeMap<StableId, BTreeSet<StableId>> = BTreeMap::new();
    for chunk in chunks {
        for concept in &chunk.concept_ids {
            index.entry(*concept).or_default().insert(chunk.id);
        }
    }
    index
}

/// Set every concept's `chunk_ids` to its entry in `index`. Returns the
/// number of concepts whose set changed.
pub fn fold_chunk_ids(concepts: &mut [Concept], index: &BTreeMap<StableId, BTreeSet<StableId>>) -> usize {
    let mut updated = 0;
    for concept in concepts.iter_mut() {
        let rebuilt: Vec<StableId> = index
            .get(&concept.id)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        let stored: BTreeSet<StableId> = concept.chunk_ids.iter().copied().collect();
        if stored != rebuilt.iter().copied().collect::<BTreeSet<_>>() {
            debug!(concept = %concept.name, before = stored.len(), after = rebuilt.len(), "chunk ids rebuilt");
            concept.chunk_ids = rebuilt;
            updated += 1;
        }
    }
    updated
}

/// Rebuild `Concept::chunk_ids` from chunk `concept_ids`.
#[instrument(skip(store))]
pub async fn reverse_attribution<S: RecordStore>(store: &S, scan_cap: usize, dry_run: bool) -> Result<ReverseReport> {
    let chunks = scan_complete(store.table::<Chunk>().await?.as_ref(), scan_cap).await?;
    let concepts_table = store.table::<Concept>().await?;
    let mut concepts = scan_complete(concepts_table.as_ref(), scan_cap).await?;
    let index = chunk_index(&chunks);

    let known: HashSet<StableId> = concepts.iter().map(|c| c.id).collect();
    let unknown_concepts = index.keys().filter(|id| !known.contains(id)).count();
    if unknown_concepts > 0 {
        warn!(unknown_concepts, "chunks reference concepts missing from the concept table");
    }

    let concepts_updated = fold_chunk_ids(&mut concepts, &index);
    if concepts_updated > 0 && !dry_run {
        let mut staged = StagedWrite::new();
        staged.stage_all(concepts);
        staged.commit(concepts_table.as_ref()).await?;
    }
    info!(chunks = chunks.len(), concepts_updated, dry_run, "reverse attribution finished");
    Ok(ReverseReport {
        chunks_scanned: chunks.len(),
        concepts_updated,
        unknown_concepts,
        dry_run,
    })
}

/// An extraction result resolved against the known concept vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedConcepts {
    /// Page number -> concepts occurring on it.
    pub by_page: BTreeMap<i32, BTreeSet<StableId>>,
    /// Every resolved concept, paged or not.
    pub all: BTreeSet<StableId>,
    /// Names with no exact (case-insensitive) match.
    pub dropped: Vec<String>,
}

pub fn resolve_extraction(extraction: &ExtractionResult, cache: &ConceptIdCache) -> Result<ResolvedConcepts> {
    cache.ensure_initialized()?;
    let mut resolved = ResolvedConcepts::default();
    for concept in &extraction.concepts {
        let Some(id) = cache.get_id(&concept.name)? else {
            resolved.dropped.push(concept.name.clone());
            continue;
        };
        resolved.all.insert(id);
        for page in &concept.pages {
            resolved.by_page.entry(*page).or_default().insert(id);
        }
    }
    if !resolved.dropped.is_empty() {
        debug!(dropped = resolved.dropped.len(), "unknown concept names dropped");
    }
    Ok(resolved)
}

/// Give every chunk on a page with resolved concepts that page's concept set.
/// Chunks on other pages keep what they had. Returns the number of chunks
/// whose `concept_ids` changed.
pub fn assign_to_chunks(chunks: &mut [Chunk], by_page: &BTreeMap<i32, BTreeSet<StableId>>) -> usize {
    let mut changed = 0;
    for chunk in chunks.iter_mut() {
        if let Some(ids) = by_page.get(&chunk.page_number) {
            let next: Vec<StableId> = ids.iter().copied().collect();
            if chunk.concept_ids != next {
                chunk.concept_ids = next;
                changed += 1;
            }
        }
    }
    changed
}
