//! Query classification by length and concept-vocabulary overlap.

use serde::Serialize;
use tracing::{debug, warn};

use conceptdb_catalog::ConceptIdCache;
use conceptdb_core::config::BoostSettings;
use conceptdb_core::identity::normalize;

use crate::scoring::tokenize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuerySituation {
    SingleTermNoConcept,
    SingleTermConcept,
    MultiTermNoConcept,
    MultiTermWeakConcept,
    MultiTermStrongConcept,
}

impl QuerySituation {
    pub const ALL: [QuerySituation; 5] = [
        QuerySituation::SingleTermNoConcept,
        QuerySituation::SingleTermConcept,
        QuerySituation::MultiTermNoConcept,
        QuerySituation::MultiTermWeakConcept,
        QuerySituation::MultiTermStrongConcept,
    ];

    /// Multiplier applied to the expansion weight.
    pub fn boost(self, boosts: &BoostSettings) -> f32 {
        match self {
            QuerySituation::SingleTermNoConcept => boosts.single_term_no_concept,
            QuerySituation::SingleTermConcept => boosts.single_term_concept,
            QuerySituation::MultiTermNoConcept => boosts.multi_term_no_concept,
            QuerySituation::MultiTermWeakConcept => boosts.multi_term_weak_concept,
            QuerySituation::MultiTermStrongConcept => boosts.multi_term_strong_concept,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryAnalysis {
    pub terms: Vec<String>,
    /// Terms that name a known concept.
    pub concept_terms: Vec<String>,
    /// Share of terms covered by known concepts, in [0, 1].
    pub overlap: f32,
    pub situation: QuerySituation,
}

pub struct QueryAnalyzer {
    strong_overlap: f32,
}

impl QueryAnalyzer {
    pub fn new(strong_overlap: f32) -> Self {
        Self { strong_overlap }
    }

    /// Classify `query`. An uninitialized cache is treated as "no concept
    /// overlap" rather than an error.
    pub fn analyze(&self, query: &str, cache: &ConceptIdCache) -> QueryAnalysis {
        let terms = tokenize(query);
        let (concept_terms, whole_query_is_concept) = match concept_overlap(query, &terms, cache) {
            Ok(found) => found,
            Err(err) => {
                warn!(error = %err, "concept cache unavailable; analyzing without concept overlap");
                (Vec::new(), false)
            }
        };
        let overlap = if terms.is_empty() {
            0.0
        } else if whole_query_is_concept {
            1.0
        } else {
            ratio(concept_terms.len(), terms.len())
        };
        let situation = match (terms.len() > 1, overlap > 0.0) {
            (false, false) => QuerySituation::SingleTermNoConcept,
            (false, true) => QuerySituation::SingleTermConcept,
            (true, false) => QuerySituation::MultiTermNoConcept,
            (true, true) if overlap >= self.strong_overlap => QuerySituation::MultiTermStrongConcept,
            (true, true) => QuerySituation::MultiTermWeakConcept,
        };
        debug!(?situation, overlap, terms = terms.len(), "query analyzed");
        QueryAnalysis { terms, concept_terms, overlap, situation }
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(part: usize, whole: usize) -> f32 {
    part as f32 / whole as f32
}

fn concept_overlap(
    query: &str,
    terms: &[String],
    cache: &ConceptIdCache,
) -> conceptdb_core::Result<(Vec<String>, bool)> {
    let whole = cache.get_id(&normalize(query))?.is_some();
    let mut hits = Vec::new();
    for term in terms {
        if cache.get_id(term)?.is_some() {
            hits.push(term.clone());
        }
    }
    Ok((hits, whole))
}

#[cfg(test)]
mod tests {
    use super::*;
    use conceptdb_core::Concept;

    fn cache() -> ConceptIdCache {
        let cache = ConceptIdCache::new();
        cache.load(&[Concept::new("observer"), Concept::new("dependency injection"), Concept::new("testing")]);
        cache
    }

    #[test]
    fn classifies_by_length_and_overlap() {
        let analyzer = QueryAnalyzer::new(0.5);
        let cache = cache();
        let situation = |q: &str| analyzer.analyze(q, &cache).situation;
        assert_eq!(situation("observer"), QuerySituation::SingleTermConcept);
        assert_eq!(situation("kafka"), QuerySituation::SingleTermNoConcept);
        assert_eq!(situation("event streaming platforms"), QuerySituation::MultiTermNoConcept);
        assert_eq!(situation("observer in event loops"), QuerySituation::MultiTermWeakConcept);
        assert_eq!(situation("observer testing"), QuerySituation::MultiTermStrongConcept);
        assert_eq!(situation("Dependency Injection"), QuerySituation::MultiTermStrongConcept);
    }

    #[test]
    fn uninitialized_cache_degrades() {
        let analysis = QueryAnalyzer::new(0.5).analyze("observer", &ConceptIdCache::new());
        assert_eq!(analysis.situation, QuerySituation::SingleTermNoConcept);
        assert!(analysis.concept_terms.is_empty());
    }
}
