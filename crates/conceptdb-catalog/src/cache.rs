//! Bidirectional ID <-> name lookup caches.
//!
//! A cache is an explicitly constructed service: callers own an instance
//! and pass references around. State is an immutable snapshot behind a
//! lock; `initialize` and `refresh` build the next snapshot completely
//! before swapping it in, so readers never observe a half-loaded map.
//! After `clear()` every lookup fails with [`Error::NotInitialized`] until
//! the next load.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use conceptdb_core::identity::normalize;
use conceptdb_core::store::{RecordStore, DEFAULT_SCAN_CAP};
use conceptdb_core::{Category, Concept, Error, Named, Result, StableId, TableKind};

/// Fixed per-entry overhead used by the memory estimate (two hash-map
/// slots plus string headers).
const ENTRY_OVERHEAD_BYTES: usize = 96;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub count: usize,
    pub memory_estimate: usize,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug)]
struct Snapshot {
    by_id: HashMap<StableId, String>,
    by_name: HashMap<String, StableId>,
    last_updated: DateTime<Utc>,
    memory_estimate: usize,
}

impl Snapshot {
    fn build<R: Named>(records: &[R]) -> Self {
        let mut by_id = HashMap::with_capacity(records.len());
        let mut by_name = HashMap::with_capacity(records.len());
        let mut memory_estimate = 0;
        for r in records {
            by_id.insert(r.id(), r.name().to_string());
            by_name.insert(normalize(r.name()), r.id());
            memory_estimate += 2 * r.name().len() + ENTRY_OVERHEAD_BYTES;
        }
        // Canonical names win over aliases.
        for r in records {
            for alias in r.aliases() {
                let key = normalize(alias);
                if !by_name.contains_key(&key) {
                    memory_estimate += key.len() + ENTRY_OVERHEAD_BYTES / 2;
                    by_name.insert(key, r.id());
                }
            }
        }
        Self {
            by_id,
            by_name,
            last_updated: Utc::now(),
            memory_estimate,
        }
    }
}

pub struct IdCache<R: Named> {
    state: RwLock<Option<Arc<Snapshot>>>,
    _record: PhantomData<fn() -> R>,
}

pub type ConceptIdCache = IdCache<Concept>;
pub type CategoryIdCache = IdCache<Category>;

impl<R: Named> Default for IdCache<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Named> IdCache<R> {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(None),
            _record: PhantomData,
        }
    }

    fn label() -> &'static str {
        match R::KIND {
            TableKind::Concepts => "concept",
            TableKind::Categories => "category",
            TableKind::Documents => "document",
            TableKind::Chunks => "chunk",
        }
    }

    fn snapshot(&self) -> Result<Arc<Snapshot>> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(Error::NotInitialized(Self::label()))
    }

    fn swap(&self, next: Snapshot) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(next));
    }

    /// Load from an in-hand record set.
    pub fn load(&self, records: &[R]) -> CacheStats {
        let snapshot = Snapshot::build(records);
        let stats = CacheStats {
            count: snapshot.by_id.len(),
            memory_estimate: snapshot.memory_estimate,
            last_updated: snapshot.last_updated,
        };
        self.swap(snapshot);
        stats
    }

    /// One full scan of the backing table.
    #[instrument(skip_all, fields(cache = Self::label()))]
    pub async fn initialize<S: RecordStore>(&self, store: &S) -> Result<CacheStats> {
        let table = store.table::<R>().await?;
        let records = table.query_all(DEFAULT_SCAN_CAP).await?;
        let stats = self.load(&records);
        info!(count = stats.count, "cache initialized");
        Ok(stats)
    }

    /// Full reload that keeps serving the previous snapshot until the new one is ready.
    pub async fn refresh<S: RecordStore>(&self, store: &S) -> Result<CacheStats> {
        let previous = self.snapshot().map(|s| s.by_id.len()).ok();
        let stats = self.initialize(store).await?;
        if let Some(previous) = previous {
            info!(cache = Self::label(), previous, current = stats.count, "cache refreshed");
        }
        Ok(stats)
    }

    pub fn clear(&self) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// [`Error::NotInitialized`] unless a snapshot is loaded.
    pub fn ensure_initialized(&self) -> Result<()> {
        self.snapshot().map(|_| ())
    }

    pub fn is_initialized(&self) -> bool {
        self.snapshot().is_ok()
    }

    /// Case-insensitive lookup of a name or alias.
    pub fn get_id(&self, name: &str) -> Result<Option<StableId>> {
        Ok(self.snapshot()?.by_name.get(&normalize(name)).copied())
    }

    pub fn get_name(&self, id: StableId) -> Result<Option<String>> {
        Ok(self.snapshot()?.by_id.get(&id).cloned())
    }

    /// Resolve names, dropping the ones not in the cache.
    pub fn get_ids<'a, I>(&self, names: I) -> Result<Vec<StableId>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let snap = self.snapshot()?;
        Ok(names
            .into_iter()
            .filter_map(|n| snap.by_name.get(&normalize(n)).copied())
            .collect())
    }

    /// Resolve IDs, dropping the ones not in the cache.
    pub fn get_names(&self, ids: &[StableId]) -> Result<Vec<String>> {
        let snap = self.snapshot()?;
        let mut missing = 0usize;
        let names = ids
            .iter()
            .filter_map(|id| {
                let name = snap.by_id.get(id).cloned();
                missing += usize::from(name.is_none());
                name
            })
            .collect();
        if missing > 0 {
            warn!(cache = Self::label(), missing, "unresolved ids dropped");
        }
        Ok(names)
    }

    /// Every canonical name, sorted.
    pub fn vocabulary(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.snapshot()?.by_id.values().cloned().collect();
        names.sort();
        Ok(names)
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let snap = self.snapshot()?;
        Ok(CacheStats {
            count: snap.by_id.len(),
            memory_estimate: snap.memory_estimate,
            last_updated: snap.last_updated,
        })
    }
}
