pub mod checkpoint;
pub mod config;
pub mod error;
pub mod identity;
pub mod policy;
pub mod row;
pub mod store;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use identity::{stable_id, IdAllocator};
pub use store::{scan_complete, Predicate, RecordStore, Scored, StagedWrite, Table};
pub use types::{Category, Chunk, Concept, Document, Named, Record, StableId, TableKind, SENTINEL_ID};
