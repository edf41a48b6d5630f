//! Candidate retrieval and final ranking.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument};

use conceptdb_catalog::ConceptIdCache;
use conceptdb_core::config::RankingSettings;
use conceptdb_core::store::{RecordStore, Scored};
use conceptdb_core::traits::Embedder;
use conceptdb_core::{Chunk, Document, Error, Record, Result, StableId};
use conceptdb_lexical::{ExpandedQuery, ExpansionParams, SenseStrategy};

use crate::analyzer::{QueryAnalysis, QueryAnalyzer, QuerySituation};
use crate::scoring::{bm25_scores, expansion_score, title_score, tokenize, vector_score};
use crate::weights::{ComponentWeights, SearchKind};

const LABEL_CHARS: usize = 80;

/// A record fetched for ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: StableId,
    pub label: String,
    /// Documents only.
    pub title: Option<String>,
    pub text: String,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub vector: f32,
    pub lexical: f32,
    pub title: f32,
    pub expansion: f32,
    pub weights: ComponentWeights,
    pub situation: QuerySituation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    pub id: StableId,
    pub label: String,
    pub score: f32,
    pub breakdown: ScoreBreakdown,
}

/// Records the engine can rank.
pub trait Rankable: Record {
    fn into_candidate(self, distance: f32) -> Candidate;
}

impl Rankable for Document {
    fn into_candidate(self, distance: f32) -> Candidate {
        let title = self.title().to_string();
        Candidate {
            id: self.id,
            label: title.clone(),
            title: Some(title),
            text: self.text,
            distance,
        }
    }
}

impl Rankable for Chunk {
    fn into_candidate(self, distance: f32) -> Candidate {
        Candidate {
            id: self.id,
            label: self.text.chars().take(LABEL_CHARS).collect(),
            title: None,
            text: self.text,
            distance,
        }
    }
}

/// Descending score, then ascending id.
pub fn compare_results(a: &RankedResult, b: &RankedResult) -> Ordering {
    b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id))
}

/// Score and order `candidates`. Duplicate ids keep their nearest vector hit.
pub fn rank(
    candidates: Vec<Candidate>,
    analysis: &QueryAnalysis,
    expanded: &ExpandedQuery,
    weights: ComponentWeights,
    limit: usize,
) -> Vec<RankedResult> {
    let mut unique: HashMap<StableId, Candidate> = HashMap::new();
    for candidate in candidates {
        match unique.get(&candidate.id) {
            Some(existing) if existing.distance <= candidate.distance => {}
            _ => {
                unique.insert(candidate.id, candidate);
            }
        }
    }
    let candidates: Vec<Candidate> = unique.into_values().collect();

    let token_sets: Vec<Vec<String>> = candidates
        .iter()
        .map(|c| match &c.title {
            Some(title) => tokenize(&format!("{title} {}", c.text)),
            None => tokenize(&c.text),
        })
        .collect();
    let lexical = bm25_scores(&analysis.terms, &token_sets);

    let mut results: Vec<RankedResult> = candidates
        .into_iter()
        .zip(token_sets.iter().zip(lexical))
        .map(|(candidate, (tokens, lexical))| {
            let vector = vector_score(candidate.distance);
            let title = candidate.title.as_deref().map_or(0.0, |t| title_score(&analysis.terms, t));
            let expansion = expansion_score(expanded, tokens);
            RankedResult {
                id: candidate.id,
                label: candidate.label,
                score: weights.combine(vector, lexical, title, expansion),
                breakdown: ScoreBreakdown {
                    vector,
                    lexical,
                    title,
                    expansion,
                    weights,
                    situation: analysis.situation,
                },
            }
        })
        .collect();
    results.sort_by(compare_results);
    results.truncate(limit);
    results
}

pub struct HybridSearchEngine<S: RecordStore> {
    store: S,
    embedder: Box<dyn Embedder>,
    strategy: Box<dyn SenseStrategy>,
    cache: Arc<ConceptIdCache>,
    analyzer: QueryAnalyzer,
    ranking: RankingSettings,
    expansion: ExpansionParams,
}

impl<S: RecordStore> HybridSearchEngine<S> {
    pub fn new(
        store: S,
        embedder: Box<dyn Embedder>,
        strategy: Box<dyn SenseStrategy>,
        cache: Arc<ConceptIdCache>,
        ranking: RankingSettings,
        expansion: ExpansionParams,
    ) -> Self {
        Self {
            store,
            embedder,
            strategy,
            cache,
            analyzer: QueryAnalyzer::new(ranking.strong_overlap),
            ranking,
            expansion,
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Classify and expand `query` without touching the store.
    pub fn prepare(&self, query: &str) -> (QueryAnalysis, ExpandedQuery) {
        let analysis = self.analyzer.analyze(query, &self.cache);
        let expanded = self.strategy.expand_query(&analysis.terms, &self.expansion);
        (analysis, expanded)
    }

    async fn candidates<R: Rankable>(&self, vector: &[f32], k: usize) -> Result<Vec<Candidate>> {
        let hits: Vec<Scored<R>> = self.store.table::<R>().await?.vector_search(vector, k).await?;
        Ok(hits.into_iter().map(|s| s.record.into_candidate(s.distance)).collect())
    }

    #[instrument(skip(self), fields(strategy = self.strategy.name()))]
    pub async fn search(&self, query: &str, kind: SearchKind, limit: usize) -> Result<Vec<RankedResult>> {
        let (analysis, expanded) = self.prepare(query);
        if analysis.terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let weights = ComponentWeights::for_query(kind, analysis.situation, &self.ranking);
        debug!(?weights, expansion_terms = expanded.expansion_terms().count(), "weights chosen");

        let vector = self.embedder.embed(query).map_err(|e| Error::ExternalCall {
            operation: "embed".to_string(),
            attempts: 1,
            message: format!("{e:#}"),
        })?;
        let k = limit.saturating_mul(self.ranking.candidate_multiplier.max(1));
        let candidates = match kind {
            SearchKind::Documents => self.candidates::<Document>(&vector, k).await?,
            SearchKind::Chunks => self.candidates::<Chunk>(&vector, k).await?,
        };
        let fetched = candidates.len();
        let results = rank(candidates, &analysis, &expanded, weights, limit);
        info!(?kind, situation = ?analysis.situation, fetched, returned = results.len(), "search finished");
        Ok(results)
    }
}
