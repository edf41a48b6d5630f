//! Text-level verification of concept attributions.
//!
//! A pair verifies when the concept's normalized name occurs in the chunk
//! text, or when the name has several tokens and each of them occurs. The
//! resulting rate is a quality signal only; attributions are never removed
//! because they fail it.

use serde::Serialize;
use tracing::info;

use conceptdb_core::identity::normalize;
use conceptdb_core::{Chunk, Result, StableId};

use crate::cache::ConceptIdCache;

/// Failure samples kept in a report.
const MAX_FAILURE_SAMPLES: usize = 50;

#[derive(Debug, Clone, Copy)]
pub struct AttributedPair<'a> {
    pub concept_id: StableId,
    pub concept_name: &'a str,
    pub chunk_id: StableId,
    pub chunk_text: &'a str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationReport {
    pub checked: usize,
    pub verified: usize,
    /// `verified / checked`; 1.0 when nothing was checked.
    pub rate: f64,
    /// Sample of (concept, chunk) pairs that failed.
    pub failures: Vec<(StableId, StableId)>,
}

fn tokens(s: &str) -> Vec<&str> {
    s.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).collect()
}

pub fn verify_pair(concept_name: &str, chunk_text: &str) -> bool {
    let name = normalize(concept_name);
    if name.is_empty() {
        return false;
    }
    let text = chunk_text.to_lowercase();
    if text.contains(&name) {
        return true;
    }
    let parts = tokens(&name);
    parts.len() > 1 && parts.iter().all(|t| text.contains(t))
}

pub fn verify_pairs<'a, I>(pairs: I) -> VerificationReport
where
    I: IntoIterator<Item = AttributedPair<'a>>,
{
    let mut checked = 0;
    let mut verified = 0;
    let mut failures = Vec::new();
    for pair in pairs {
        checked += 1;
        if verify_pair(pair.concept_name, pair.chunk_text) {
            verified += 1;
        } else if failures.len() < MAX_FAILURE_SAMPLES {
            failures.push((pair.concept_id, pair.chunk_id));
        }
    }
    let rate = if checked == 0 { 1.0 } else { verified as f64 / checked as f64 };
    VerificationReport { checked, verified, rate, failures }
}

/// Verify every (concept, chunk) pair present on `chunks`. Concept IDs the
/// cache cannot name are skipped.
pub fn verify_chunks(chunks: &[Chunk], cache: &ConceptIdCache) -> Result<VerificationReport> {
    let mut named = Vec::new();
    for chunk in chunks {
        for id in &chunk.concept_ids {
            if let Some(name) = cache.get_name(*id)? {
                named.push((*id, name, chunk.id, chunk.text.as_str()));
            }
        }
    }
    let report = verify_pairs(named.iter().map(|(concept_id, name, chunk_id, text)| AttributedPair {
        concept_id: *concept_id,
        concept_name: name,
        chunk_id: *chunk_id,
        chunk_text: text,
    }));
    info!(
        checked = report.checked,
        verified = report.verified,
        rate = report.rate,
        "attribution verification"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conceptdb_core::Concept;

    #[test]
    fn substring_or_all_tokens() {
        assert!(verify_pair("Observer Pattern", "the observer pattern decouples"));
        assert!(verify_pair("dependency injection", "inject a dependency; injection happens at startup"));
        assert!(!verify_pair("dependency injection", "the dependency graph"));
        assert!(!verify_pair("visitor", "double dispatch"));
        assert!(!verify_pair("  ", "anything"));
    }

    #[test]
    fn report_counts_and_rate() {
        let cache = ConceptIdCache::new();
        let observer = Concept::new("observer");
        let visitor = Concept::new("visitor");
        cache.load(&[observer.clone(), visitor.clone()]);
        let mut chunk = Chunk::new("a.pdf", 0, "An Observer subscribes to a subject.");
        chunk.concept_ids = vec![observer.id, visitor.id, 12345];
        let report = verify_chunks(&[chunk.clone()], &cache).expect("init");
        assert_eq!(report.checked, 2);
        assert_eq!(report.verified, 1);
        assert!((report.rate - 0.5).abs() < 1e-9);
        assert_eq!(report.failures, vec![(visitor.id, chunk.id)]);
    }

    #[test]
    fn empty_input_rates_one() {
        let report = verify_pairs(Vec::new());
        assert_eq!(report.checked, 0);
        assert!((report.rate - 1.0).abs() < f64::EPSILON);
    }
}
