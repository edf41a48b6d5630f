//! Record store abstraction.
//!
//! The [`RecordStore`] trait opens named tables; a [`Table`] offers full
//! scans, predicate filters, nearest-neighbour search and whole-table
//! replacement. There is no in-place update: writers stage a complete record
//! set with [`StagedWrite`] and commit it in one `replace_all`.
//!
//! Replace-all is not safe against concurrent writers on the same table.
//! Batch passes are expected to run one at a time.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::row::{Row, Value};
use crate::types::{Record, StableId};

/// Default cap for full-table materialization in batch passes.
pub const DEFAULT_SCAN_CAP: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    IdIn(Vec<StableId>),
    Eq { column: &'static str, value: Value },
    /// ID-array column contains `id`.
    Contains { column: &'static str, id: StableId },
    And(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    pub fn and(self, other: Predicate) -> Predicate {
        Predicate::And(Box::new(self), Box::new(other))
    }

    /// Evaluate against a row; used by backends without a query engine.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Predicate::IdIn(ids) => row.id("id").is_some_and(|id| ids.contains(&id)),
            Predicate::Eq { column, value } => match value {
                Value::Id(v) => row.id(column) == Some(*v),
                Value::Int(v) => row.int(column) == *v,
                Value::Text(v) => row.text(column) == *v,
                other => row.get(column) == Some(other),
            },
            Predicate::Contains { column, id } => row.id_list(column).contains(id),
            Predicate::And(a, b) => a.matches(row) && b.matches(row),
        }
    }

    /// Render as a SQL filter expression (DataFusion dialect).
    pub fn to_sql(&self) -> String {
        match self {
            Predicate::IdIn(ids) if ids.is_empty() => "false".to_string(),
            Predicate::IdIn(ids) => {
                let list = ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
                format!("id IN ({list})")
            }
            Predicate::Eq { column, value } => format!("{column} = {}", sql_literal(value)),
            Predicate::Contains { column, id } => format!("array_has({column}, {id})"),
            Predicate::And(a, b) => format!("({}) AND ({})", a.to_sql(), b.to_sql()),
        }
    }
}

fn sql_literal(value: &Value) -> String {
    match value {
        Value::Id(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        _ => "NULL".to_string(),
    }
}

/// A record with its distance from a query vector (smaller is closer).
#[derive(Debug, Clone)]
pub struct Scored<R> {
    pub record: R,
    pub distance: f32,
}

#[async_trait]
pub trait Table<R: Record>: Send + Sync {
    fn name(&self) -> &str;

    async fn count(&self) -> Result<usize>;

    async fn query_all(&self, limit: usize) -> Result<Vec<R>>;

    async fn query_where(&self, predicate: &Predicate) -> Result<Vec<R>>;

    /// Nearest neighbours by cosine distance, ascending.
    async fn vector_search(&self, vector: &[f32], k: usize) -> Result<Vec<Scored<R>>>;

    async fn insert(&self, records: Vec<R>) -> Result<()>;

    /// Returns the number of deleted rows.
    async fn delete_where(&self, predicate: &Predicate) -> Result<usize>;

    /// Atomically swap the table contents for `records`.
    async fn replace_all(&self, records: Vec<R>) -> Result<()>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn table_names(&self) -> Result<Vec<String>>;

    async fn open_table<R: Record>(&self, name: &str) -> Result<Arc<dyn Table<R>>>;

    async fn drop_table(&self, name: &str) -> Result<()>;

    /// Open the table a record kind lives in by default.
    async fn table<R: Record>(&self) -> Result<Arc<dyn Table<R>>> {
        self.open_table::<R>(R::KIND.table_name()).await
    }
}

/// Full scan for passes that rewrite the table they read. Fails with
/// [`Error::ScanTruncated`] instead of returning a partial record set.
pub async fn scan_complete<R: Record>(table: &dyn Table<R>, cap: usize) -> Result<Vec<R>> {
    let records = table.query_all(cap).await?;
    let rows = table.count().await?;
    if rows > records.len() {
        return Err(Error::ScanTruncated {
            table: table.name().to_string(),
            rows,
            cap: cap.min(records.len()),
        });
    }
    Ok(records)
}

/// Stage-then-commit helper for whole-table rewrites.
#[derive(Debug, Clone)]
pub struct StagedWrite<R: Record> {
    staged: Vec<R>,
}

impl<R: Record> Default for StagedWrite<R> {
    fn default() -> Self {
        Self { staged: Vec::new() }
    }
}

impl<R: Record> StagedWrite<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&mut self, record: R) {
        self.staged.push(record);
    }

    pub fn stage_all(&mut self, records: impl IntoIterator<Item = R>) {
        self.staged.extend(records);
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.staged.len());
        for r in &self.staged {
            if !seen.insert(r.id()) {
                return Err(Error::Store(format!(
                    "staged {} set holds duplicate id {}",
                    R::KIND.table_name(),
                    r.id()
                )));
            }
        }
        Ok(())
    }

    /// Validate the staged set and swap it into `table`; returns the row count.
    pub async fn commit(self, table: &dyn Table<R>) -> Result<usize> {
        self.validate()?;
        let n = self.staged.len();
        table.replace_all(self.staged).await?;
        tracing::debug!(table = table.name(), rows = n, "committed staged write");
        Ok(n)
    }
}
