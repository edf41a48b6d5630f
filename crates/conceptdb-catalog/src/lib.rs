//! Catalog maintenance: ID caches, derived-field reconciliation, category
//! aggregates and concept attribution.

pub mod aggregates;
pub mod attribution;
pub mod batch;
pub mod cache;
pub mod extractor;
pub mod reconcile;
pub mod verify;

pub use aggregates::{AggregateRecompute, AggregateReport};
pub use attribution::{reverse_attribution, ResolvedConcepts, ReverseReport};
pub use batch::{ForwardAttributionJob, ForwardReport};
pub use cache::{CacheStats, CategoryIdCache, ConceptIdCache, IdCache};
pub use extractor::JsonExtractor;
pub use reconcile::{ReconcileReport, Reconciler, TableReport};
pub use verify::{verify_chunks, VerificationReport};
