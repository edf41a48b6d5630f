//! In-memory [`RecordStore`] implementation for tests and dry runs.
//!
//! Tables are `Vec<Row>` behind `std::sync::RwLock`, stored in the same
//! encoded form a persistent backend would hold, so reads go through the
//! normal decode path. Vector search is brute-force cosine distance.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use conceptdb_core::row::Row;
use conceptdb_core::store::{Predicate, RecordStore, Scored, Table, DEFAULT_SCAN_CAP};
use conceptdb_core::{Error, Record, Result};

use crate::codec::encode_row;

type Tables = Arc<RwLock<HashMap<String, Vec<Row>>>>;

#[derive(Clone)]
pub struct InMemoryStore {
    tables: Tables,
    sentinel: bool,
    scan_cap: usize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_sentinel(true)
    }

    /// `sentinel` controls whether empty ID arrays are stored as `[0]`.
    pub fn with_sentinel(sentinel: bool) -> Self {
        Self {
            tables: Arc::new(RwLock::new(HashMap::new())),
            sentinel,
            scan_cap: DEFAULT_SCAN_CAP,
        }
    }

    /// Store raw rows as-is, bypassing record encoding. Lets tests seed
    /// legacy shapes (JSON-string arrays, missing derived columns).
    pub fn insert_rows(&self, table: &str, rows: Vec<Row>) {
        write(&self.tables).entry(table.to_string()).or_default().extend(rows);
    }

    /// Raw stored rows of a table.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        read(&self.tables).get(table).cloned().unwrap_or_default()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn read(tables: &Tables) -> RwLockReadGuard<'_, HashMap<String, Vec<Row>>> {
    tables.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(tables: &Tables) -> RwLockWriteGuard<'_, HashMap<String, Vec<Row>>> {
    tables.write().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 1.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        1.0
    } else {
        1.0 - dot / (mag_a * mag_b)
    }
}

struct MemoryTable<R> {
    name: String,
    tables: Tables,
    sentinel: bool,
    scan_cap: usize,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> MemoryTable<R> {
    fn encode(&self, record: &R) -> Row {
        encode_row(&record.to_row(), R::columns(), self.sentinel)
    }

    fn snapshot(&self) -> Vec<Row> {
        read(&self.tables).get(&self.name).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl<R: Record> Table<R> for MemoryTable<R> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn count(&self) -> Result<usize> {
        Ok(read(&self.tables).get(&self.name).map_or(0, Vec::len))
    }

    async fn query_all(&self, limit: usize) -> Result<Vec<R>> {
        self.snapshot()
            .iter()
            .take(limit.min(self.scan_cap))
            .map(R::from_row)
            .collect()
    }

    async fn query_where(&self, predicate: &Predicate) -> Result<Vec<R>> {
        self.snapshot()
            .iter()
            .filter(|row| predicate.matches(row))
            .take(self.scan_cap)
            .map(R::from_row)
            .collect()
    }

    async fn vector_search(&self, vector: &[f32], k: usize) -> Result<Vec<Scored<R>>> {
        let mut hits = Vec::new();
        for row in &self.snapshot() {
            let record = R::from_row(row)?;
            if record.vector().is_empty() {
                continue;
            }
            let distance = cosine_distance(vector, record.vector());
            hits.push(Scored { record, distance });
        }
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.record.id().cmp(&b.record.id())));
        hits.truncate(k);
        Ok(hits)
    }

    async fn insert(&self, records: Vec<R>) -> Result<()> {
        let rows: Vec<Row> = records.iter().map(|r| self.encode(r)).collect();
        write(&self.tables).entry(self.name.clone()).or_default().extend(rows);
        Ok(())
    }

    async fn delete_where(&self, predicate: &Predicate) -> Result<usize> {
        let mut tables = write(&self.tables);
        let rows = tables.entry(self.name.clone()).or_default();
        let before = rows.len();
        rows.retain(|row| !predicate.matches(row));
        Ok(before - rows.len())
    }

    async fn replace_all(&self, records: Vec<R>) -> Result<()> {
        let rows: Vec<Row> = records.iter().map(|r| self.encode(r)).collect();
        write(&self.tables).insert(self.name.clone(), rows);
        Ok(())
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn table_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = read(&self.tables).keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn open_table<R: Record>(&self, name: &str) -> Result<Arc<dyn Table<R>>> {
        write(&self.tables).entry(name.to_string()).or_default();
        Ok(Arc::new(MemoryTable::<R> {
            name: name.to_string(),
            tables: Arc::clone(&self.tables),
            sentinel: self.sentinel,
            scan_cap: self.scan_cap,
            _record: PhantomData,
        }))
    }

    async fn drop_table(&self, name: &str) -> Result<()> {
        write(&self.tables)
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("table '{name}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_distance_bounds() {
        assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
        assert!((cosine_distance(&[], &[]) - 1.0).abs() < 1e-6);
    }
}
