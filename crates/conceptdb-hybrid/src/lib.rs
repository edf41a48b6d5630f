//! Hybrid ranking: vector similarity, BM25, title match and expanded-term
//! coverage combined with per-situation boosted weights.

pub mod analyzer;
pub mod engine;
pub mod scoring;
pub mod weights;

pub use analyzer::{QueryAnalysis, QueryAnalyzer, QuerySituation};
pub use engine::{rank, Candidate, HybridSearchEngine, RankedResult, ScoreBreakdown};
pub use weights::{ComponentWeights, SearchKind};
