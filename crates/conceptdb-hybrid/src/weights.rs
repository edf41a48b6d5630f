//! Component weights and situation boosts.

use serde::Serialize;

use conceptdb_core::config::{RankingSettings, WeightSettings};

use crate::analyzer::QuerySituation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    Documents,
    Chunks,
}

impl SearchKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "document" | "documents" | "catalog" => Some(SearchKind::Documents),
            "chunk" | "chunks" => Some(SearchKind::Chunks),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComponentWeights {
    pub vector: f32,
    pub lexical: f32,
    pub title: f32,
    pub expansion: f32,
}

impl From<WeightSettings> for ComponentWeights {
    fn from(w: WeightSettings) -> Self {
        Self {
            vector: w.vector,
            lexical: w.lexical,
            title: w.title,
            expansion: w.expansion,
        }
    }
}

impl ComponentWeights {
    /// Base weights for `kind`. Chunks have no title component.
    pub fn base(kind: SearchKind, ranking: &RankingSettings) -> Self {
        match kind {
            SearchKind::Documents => Self::from(ranking.document_weights),
            SearchKind::Chunks => Self {
                title: 0.0,
                ..Self::from(ranking.chunk_weights)
            },
        }
    }

    /// Weights for a query in `situation`: base weights with the expansion
    /// weight multiplied by the situation's boost, renormalized to sum to 1.
    pub fn for_query(kind: SearchKind, situation: QuerySituation, ranking: &RankingSettings) -> Self {
        Self::base(kind, ranking).boosted(situation.boost(&ranking.boosts))
    }

    pub fn boosted(self, boost: f32) -> Self {
        Self {
            expansion: self.expansion * boost.max(0.0),
            ..self
        }
        .normalized()
    }

    pub fn sum(&self) -> f32 {
        self.vector + self.lexical + self.title + self.expansion
    }

    /// Rescale to sum to 1. All-zero weights fall back to vector only.
    pub fn normalized(self) -> Self {
        let sum = self.sum();
        if !sum.is_finite() || sum <= 0.0 {
            return Self { vector: 1.0, lexical: 0.0, title: 0.0, expansion: 0.0 };
        }
        Self {
            vector: self.vector / sum,
            lexical: self.lexical / sum,
            title: self.title / sum,
            expansion: self.expansion / sum,
        }
    }

    pub fn combine(&self, vector: f32, lexical: f32, title: f32, expansion: f32) -> f32 {
        self.vector * vector + self.lexical * lexical + self.title * title + self.expansion * expansion
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boost_shifts_weight_toward_expansion() {
        let ranking = RankingSettings::default();
        let plain = ComponentWeights::base(SearchKind::Chunks, &ranking);
        let boosted = ComponentWeights::for_query(SearchKind::Chunks, QuerySituation::SingleTermNoConcept, &ranking);
        assert!(boosted.expansion > plain.expansion);
        assert!(boosted.vector < plain.vector);
        assert!(boosted.title.abs() < f32::EPSILON);
        // 0.2 * 1.6 = 0.32 against 0.8 of vector + lexical.
        assert!((boosted.expansion - 0.32 / 1.12).abs() < 1e-6);
    }

    #[test]
    fn zero_weights_fall_back_to_vector() {
        let w = ComponentWeights { vector: 0.0, lexical: 0.0, title: 0.0, expansion: 1.0 }.boosted(0.0);
        assert!((w.vector - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn kinds_parse() {
        assert_eq!(SearchKind::parse("Chunks"), Some(SearchKind::Chunks));
        assert_eq!(SearchKind::parse("catalog"), Some(SearchKind::Documents));
        assert_eq!(SearchKind::parse("pages"), None);
    }
}
