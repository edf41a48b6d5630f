//! LanceDB connection, table housekeeping and the Lance-backed [`Table`].
//!
//! Tables are created on first open with the schema their record kind
//! declares. Whole-table replacement is a single merge-insert keyed on `id`
//! that also deletes rows missing from the new set, so readers see either
//! the old version or the new one.

use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

use arrow_array::{RecordBatch, RecordBatchIterator, RecordBatchReader};
use arrow_schema::{ArrowError, Schema, SchemaRef};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::table::NewColumnTransform;
use lancedb::{connect, Connection, DistanceType};
use tracing::{debug, info, instrument};

use conceptdb_core::config::{expand_path, StoreSettings};
use conceptdb_core::store::{Predicate, RecordStore, Scored, Table};
use conceptdb_core::{Error, Record, Result};

use crate::codec::{batch_to_rows, distances, records_to_batch};
use crate::schema::{build_schema, incompatible_columns, missing_derived_fields};

pub async fn open_db(uri: &str) -> Result<Connection> {
    connect(uri).execute().await.map_err(Error::store)
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: SchemaRef) -> Result<()> {
    let names = conn.table_names().execute().await.map_err(Error::store)?;
    if names.iter().any(|n| n == name) {
        return Ok(());
    }
    // create empty table with 0 rows
    let batches: Vec<std::result::Result<RecordBatch, ArrowError>> = Vec::new();
    let reader: Box<dyn RecordBatchReader + Send> = Box::new(RecordBatchIterator::new(batches, schema));
    conn.create_table(name, reader).execute().await.map_err(Error::store)?;
    info!(table = name, "created table");
    Ok(())
}

fn reader_for(batch: RecordBatch) -> Box<dyn RecordBatchReader + Send> {
    let schema = batch.schema();
    Box::new(RecordBatchIterator::new(vec![Ok(batch)], schema))
}

pub struct LanceTable<R> {
    name: String,
    table: lancedb::Table,
    schema: SchemaRef,
    dim: i32,
    sentinel: bool,
    scan_cap: usize,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> LanceTable<R> {
    fn error(&self, err: impl std::fmt::Display) -> Error {
        Error::Store(format!("{}: {err}", self.name))
    }

    fn decode(batches: &[RecordBatch]) -> Result<Vec<R>> {
        batches
            .iter()
            .flat_map(batch_to_rows)
            .map(|row| R::from_row(&row))
            .collect()
    }

    /// Batches always carry every column, so derived columns an older table
    /// lacks are added (all null) before the first write.
    async fn prepare_write(&self) -> Result<()> {
        let actual = self.table.schema().await.map_err(|e| self.error(e))?;
        let bad = incompatible_columns(R::columns(), &actual, self.dim);
        if !bad.is_empty() {
            return Err(Error::SchemaMismatch {
                table: self.name.clone(),
                detail: format!("cannot write; stored columns differ: {}", bad.join(", ")),
            });
        }
        let missing = missing_derived_fields(R::columns(), &actual, self.dim);
        if missing.is_empty() {
            return Ok(());
        }
        let names: Vec<String> = missing.iter().map(|f| f.name().clone()).collect();
        self.table
            .add_columns(NewColumnTransform::AllNulls(Arc::new(Schema::new(missing))), None)
            .await
            .map_err(|e| self.error(e))?;
        info!(table = %self.name, columns = ?names, "added derived columns");
        Ok(())
    }
}

#[async_trait]
impl<R: Record> Table<R> for LanceTable<R> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn count(&self) -> Result<usize> {
        self.table.count_rows(None).await.map_err(|e| self.error(e))
    }

    async fn query_all(&self, limit: usize) -> Result<Vec<R>> {
        let stream = self
            .table
            .query()
            .limit(limit.min(self.scan_cap))
            .execute()
            .await
            .map_err(|e| self.error(e))?;
        Self::decode(&stream.try_collect::<Vec<_>>().await.map_err(|e| self.error(e))?)
    }

    async fn query_where(&self, predicate: &Predicate) -> Result<Vec<R>> {
        let filter = predicate.to_sql();
        debug!(table = %self.name, %filter, "query");
        let stream = self
            .table
            .query()
            .only_if(filter)
            .limit(self.scan_cap)
            .execute()
            .await
            .map_err(|e| self.error(e))?;
        Self::decode(&stream.try_collect::<Vec<_>>().await.map_err(|e| self.error(e))?)
    }

    async fn vector_search(&self, vector: &[f32], k: usize) -> Result<Vec<Scored<R>>> {
        if k == 0 || self.count().await? == 0 {
            return Ok(Vec::new());
        }
        let stream = self
            .table
            .vector_search(vector.to_vec())
            .map_err(|e| self.error(e))?
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .map_err(|e| self.error(e))?;
        let mut hits = Vec::new();
        for batch in stream.try_collect::<Vec<_>>().await.map_err(|e| self.error(e))? {
            let dist = distances(&batch).unwrap_or_else(|| vec![f32::MAX; batch.num_rows()]);
            for (row, distance) in batch_to_rows(&batch).iter().zip(dist) {
                hits.push(Scored { record: R::from_row(row)?, distance });
            }
        }
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(hits)
    }

    async fn insert(&self, records: Vec<R>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.prepare_write().await?;
        let batch = records_to_batch(&records, self.schema.clone(), self.dim, self.sentinel)?;
        self.table.add(reader_for(batch)).execute().await.map_err(|e| self.error(e))?;
        Ok(())
    }

    async fn delete_where(&self, predicate: &Predicate) -> Result<usize> {
        let before = self.count().await?;
        self.table.delete(&predicate.to_sql()).await.map_err(|e| self.error(e))?;
        let after = self.count().await?;
        Ok(before.saturating_sub(after))
    }

    #[instrument(skip(self, records), fields(table = %self.name, rows = records.len()))]
    async fn replace_all(&self, records: Vec<R>) -> Result<()> {
        self.prepare_write().await?;
        if records.is_empty() {
            self.table.delete("true").await.map_err(|e| self.error(e))?;
            return Ok(());
        }
        let batch = records_to_batch(&records, self.schema.clone(), self.dim, self.sentinel)?;
        // Upsert by id and drop everything the new set does not mention.
        let mut mi = self.table.merge_insert(&["id"]);
        mi.when_matched_update_all(None)
            .when_not_matched_insert_all()
            .when_not_matched_by_source_delete(None);
        mi.execute(reader_for(batch)).await.map_err(|e| self.error(e))?;
        Ok(())
    }
}

/// Local LanceDB directory holding the record tables.
pub struct LanceStore {
    conn: Connection,
    root: PathBuf,
    dim: i32,
    sentinel: bool,
    scan_cap: usize,
}

impl LanceStore {
    pub async fn open(settings: &StoreSettings) -> Result<Self> {
        let root = expand_path(&settings.uri);
        tokio::fs::create_dir_all(&root).await?;
        let conn = open_db(&root.to_string_lossy()).await?;
        let dim = i32::try_from(settings.dimension)
            .map_err(|_| Error::InvalidConfig(format!("store.dimension {} is too large", settings.dimension)))?;
        info!(uri = %root.display(), dim, "opened record store");
        Ok(Self {
            conn,
            root,
            dim,
            sentinel: settings.empty_array_sentinel,
            scan_cap: settings.scan_cap,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[async_trait]
impl RecordStore for LanceStore {
    async fn table_names(&self) -> Result<Vec<String>> {
        self.conn.table_names().execute().await.map_err(Error::store)
    }

    async fn open_table<R: Record>(&self, name: &str) -> Result<Arc<dyn Table<R>>> {
        let schema = build_schema(R::columns(), self.dim);
        ensure_table(&self.conn, name, schema.clone()).await?;
        let table = self.conn.open_table(name).execute().await.map_err(Error::store)?;
        Ok(Arc::new(LanceTable::<R> {
            name: name.to_string(),
            table,
            schema,
            dim: self.dim,
            sentinel: self.sentinel,
            scan_cap: self.scan_cap,
            _record: PhantomData,
        }))
    }

    /// Removes the table's dataset directory; the store is always local.
    async fn drop_table(&self, name: &str) -> Result<()> {
        let path = self.root.join(format!("{name}.lance"));
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => {
                info!(table = name, "dropped table");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound(format!("table '{name}'"))),
            Err(e) => Err(e.into()),
        }
    }
}
