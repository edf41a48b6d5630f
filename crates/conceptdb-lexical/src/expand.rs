//! Relation walk that turns query terms into weighted expansion terms.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use tracing::debug;

use conceptdb_core::config::ExpansionSettings;

use crate::network::{display_lemma, Synset};
use crate::strategy::SenseStrategy;

pub const SYNONYM_FACTOR: f32 = 1.0;
pub const HYPERNYM_FACTOR: f32 = 0.8;
pub const HYPONYM_FACTOR: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpansionParams {
    /// New terms one source term may contribute.
    pub max_synonyms_per_term: usize,
    /// Relation hops walked from the chosen sense; 0 disables expansion.
    pub max_depth: usize,
    /// Weight multiplier per hop beyond the first.
    pub depth_decay: f32,
}

impl Default for ExpansionParams {
    fn default() -> Self {
        Self::from(&ExpansionSettings::default())
    }
}

impl From<&ExpansionSettings> for ExpansionParams {
    fn from(s: &ExpansionSettings) -> Self {
        Self {
            max_synonyms_per_term: s.max_synonyms_per_term,
            max_depth: s.max_depth,
            depth_decay: s.depth_decay,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExpandedQuery {
    /// Lowercased, deduplicated query terms; weight 1.0 each.
    pub original_terms: Vec<String>,
    /// Every term (original and expanded) with its weight.
    pub weights: BTreeMap<String, f32>,
}

impl ExpandedQuery {
    /// Original terms only.
    pub fn unexpanded(terms: &[String]) -> Self {
        let original_terms = normalize_terms(terms);
        let weights = original_terms.iter().map(|t| (t.clone(), 1.0)).collect();
        Self { original_terms, weights }
    }

    pub fn weight(&self, term: &str) -> f32 {
        self.weights.get(term).copied().unwrap_or(0.0)
    }

    pub fn is_original(&self, term: &str) -> bool {
        self.original_terms.iter().any(|t| t == term)
    }

    /// Terms added by expansion, with weights.
    pub fn expansion_terms(&self) -> impl Iterator<Item = (&str, f32)> + '_ {
        self.weights
            .iter()
            .filter(|(t, _)| !self.is_original(t))
            .map(|(t, w)| (t.as_str(), *w))
    }

    pub fn expansion_weight_total(&self) -> f32 {
        self.expansion_terms().map(|(_, w)| w).sum()
    }
}

/// Lowercase, trim and dedupe in first-seen order.
pub fn normalize_terms(terms: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    terms
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

fn sense_key(sense: &Synset) -> String {
    if sense.id.is_empty() {
        sense.words.join(",")
    } else {
        sense.id.clone()
    }
}

fn decay_at(depth: usize, decay: f32) -> f32 {
    decay.powi(i32::try_from(depth.saturating_sub(1)).unwrap_or(i32::MAX))
}

/// Walk synonym, hypernym and hyponym relations outward from each term's
/// selected sense. A term reached more than once keeps its best weight.
pub fn expand<S: SenseStrategy + ?Sized>(strategy: &S, terms: &[String], params: &ExpansionParams) -> ExpandedQuery {
    let mut query = ExpandedQuery::unexpanded(terms);
    if params.max_depth == 0 || params.max_synonyms_per_term == 0 {
        return query;
    }
    let original = query.original_terms.clone();

    for term in &original {
        let Some(sense) = strategy.get_contextual_synset(term, &original) else {
            continue;
        };
        let mut added = 0;
        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier = vec![sense];

        'walk: for depth in 1..=params.max_depth {
            let decay = decay_at(depth, params.depth_decay);
            let mut next = Vec::new();
            for sense in frontier {
                if !visited.insert(sense_key(&sense)) {
                    continue;
                }
                let related = sense
                    .synonyms_of(term)
                    .map(|w| (w, SYNONYM_FACTOR))
                    .chain(sense.hypernyms.iter().map(|w| (w.as_str(), HYPERNYM_FACTOR)))
                    .chain(sense.hyponyms.iter().map(|w| (w.as_str(), HYPONYM_FACTOR)));
                for (lemma, factor) in related {
                    let candidate = display_lemma(lemma);
                    if candidate.is_empty() || original.contains(&candidate) {
                        continue;
                    }
                    let weight = factor * decay;
                    if let Some(existing) = query.weights.get_mut(&candidate) {
                        *existing = existing.max(weight);
                    } else {
                        if added >= params.max_synonyms_per_term {
                            break 'walk;
                        }
                        query.weights.insert(candidate, weight);
                        added += 1;
                    }
                    if depth < params.max_depth {
                        if let Some(primary) = strategy.network().synsets(lemma).into_iter().next() {
                            next.push(primary);
                        }
                    }
                }
            }
            frontier = next;
        }
        debug!(term = %term, strategy = strategy.name(), added, "term expanded");
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn original_terms_are_normalized_once() {
        let q = ExpandedQuery::unexpanded(&["Car".into(), " car ".into(), "".into(), "Engine".into()]);
        assert_eq!(q.original_terms, vec!["car".to_string(), "engine".to_string()]);
        assert!((q.weight("car") - 1.0).abs() < f32::EPSILON);
        assert_eq!(q.expansion_terms().count(), 0);
    }

    #[test]
    fn decay_starts_at_second_hop() {
        assert!((decay_at(1, 0.5) - 1.0).abs() < f32::EPSILON);
        assert!((decay_at(3, 0.5) - 0.25).abs() < f32::EPSILON);
    }
}
