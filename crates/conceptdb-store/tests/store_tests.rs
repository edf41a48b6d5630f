use conceptdb_core::config::StoreSettings;
use conceptdb_core::row::{Row, Value};
use conceptdb_core::store::{scan_complete, Predicate, RecordStore, StagedWrite};
use arrow_array::{RecordBatchIterator, RecordBatchReader};
use conceptdb_core::{stable_id, Chunk, Concept, Error, Record, TableKind};
use conceptdb_store::codec::records_to_batch;
use conceptdb_store::schema::build_schema;
use conceptdb_store::{InMemoryStore, LanceStore};
use tempfile::TempDir;

fn chunk(source: &str, idx: u32, concepts: &[u32], vector: Vec<f32>) -> Chunk {
    let mut c = Chunk::new(source, idx, format!("{source} chunk {idx}"));
    c.concept_ids = concepts.to_vec();
    c.vector = vector;
    c
}

#[tokio::test]
async fn memory_staged_write_replaces_whole_table() {
    let store = InMemoryStore::new();
    let table = store.table::<Concept>().await.expect("open");
    table.insert(vec![Concept::new("stale")]).await.expect("insert");

    let mut staged = StagedWrite::new();
    staged.stage_all(vec![Concept::new("observer"), Concept::new("visitor")]);
    assert_eq!(staged.commit(table.as_ref()).await.expect("commit"), 2);

    let names: Vec<String> = table.query_all(100).await.expect("scan").into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["observer".to_string(), "visitor".to_string()]);
}

#[tokio::test]
async fn memory_duplicate_stage_leaves_table_untouched() {
    let store = InMemoryStore::new();
    let table = store.table::<Concept>().await.expect("open");
    table.insert(vec![Concept::new("kept")]).await.expect("insert");

    let mut staged = StagedWrite::new();
    staged.stage(Concept::new("Observer"));
    staged.stage(Concept::new("observer"));
    assert!(staged.commit(table.as_ref()).await.is_err());
    assert_eq!(table.count().await.expect("count"), 1);
}

#[tokio::test]
async fn memory_predicates_and_vector_search() {
    let store = InMemoryStore::new();
    let table = store.table::<Chunk>().await.expect("open");
    table
        .insert(vec![
            chunk("a.pdf", 0, &[5], vec![1.0, 0.0]),
            chunk("a.pdf", 1, &[5, 6], vec![0.6, 0.8]),
            chunk("b.pdf", 0, &[], vec![0.0, 1.0]),
        ])
        .await
        .expect("insert");

    let with_six = table.query_where(&Predicate::Contains { column: "concept_ids", id: 6 }).await.expect("q");
    assert_eq!(with_six.len(), 1);
    assert_eq!(with_six[0].chunk_index, 1);

    let in_a = table
        .query_where(&Predicate::Eq { column: "catalog_id", value: Value::Id(stable_id("a.pdf")) })
        .await
        .expect("q");
    assert_eq!(in_a.len(), 2);

    let hits = table.vector_search(&[1.0, 0.0], 2).await.expect("search");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].record.id, stable_id("a.pdf#0"));
    assert!(hits[0].distance <= hits[1].distance);

    let removed = table
        .delete_where(&Predicate::Eq { column: "catalog_id", value: Value::Id(stable_id("b.pdf")) })
        .await
        .expect("delete");
    assert_eq!(removed, 1);
    assert_eq!(table.count().await.expect("count"), 2);
}

#[tokio::test]
async fn memory_stores_empty_arrays_as_sentinel() {
    let store = InMemoryStore::new();
    let table = store.table::<Chunk>().await.expect("open");
    table.insert(vec![chunk("a.pdf", 0, &[], vec![])]).await.expect("insert");

    let raw = store.rows(TableKind::Chunks.table_name());
    assert_eq!(raw[0].get("concept_ids"), Some(&Value::IdList(vec![0])));
    let back = table.query_all(10).await.expect("scan");
    assert!(back[0].concept_ids.is_empty());
}

#[tokio::test]
async fn memory_decodes_legacy_json_rows() {
    let store = InMemoryStore::new();
    let id = stable_id("observer");
    store.insert_rows(
        "concepts",
        vec![Row::new()
            .with("id", Value::Text(id.to_string()))
            .with("name", Value::Text("observer".into()))
            .with("catalog_ids", Value::Text("[11, 12]".into()))
            .with("chunk_ids", Value::Text("[0]".into()))],
    );
    let concepts = store.table::<Concept>().await.expect("open").query_all(10).await.expect("decode");
    assert_eq!(concepts[0].id, id);
    assert_eq!(concepts[0].document_ids, vec![11, 12]);
    assert!(concepts[0].chunk_ids.is_empty());
    assert!(concepts[0].catalog_titles.is_empty());
}

#[tokio::test]
async fn memory_row_without_id_is_schema_mismatch() {
    let store = InMemoryStore::new();
    store.insert_rows("concepts", vec![Row::new().with("name", Value::Text("orphan".into()))]);
    let err = store.table::<Concept>().await.expect("open").query_all(10).await.expect_err("no id");
    assert!(matches!(err, Error::SchemaMismatch { .. }));
}

#[tokio::test]
async fn memory_drop_table() {
    let store = InMemoryStore::new();
    store.table::<Concept>().await.expect("open");
    assert_eq!(store.table_names().await.expect("names"), vec!["concepts".to_string()]);
    store.drop_table("concepts").await.expect("drop");
    assert!(matches!(store.drop_table("concepts").await, Err(Error::NotFound(_))));
}

fn lance_settings(tmp: &TempDir) -> StoreSettings {
    StoreSettings {
        uri: tmp.path().to_string_lossy().to_string(),
        dimension: 2,
        ..StoreSettings::default()
    }
}

#[tokio::test]
async fn lance_replace_query_and_search() {
    let tmp = TempDir::new().expect("tmp");
    let store = LanceStore::open(&lance_settings(&tmp)).await.expect("open store");
    let table = store.table::<Chunk>().await.expect("open table");
    assert_eq!(table.count().await.expect("count"), 0);

    let rows = vec![
        chunk("a.pdf", 0, &[5], vec![1.0, 0.0]),
        chunk("a.pdf", 1, &[], vec![0.6, 0.8]),
        chunk("b.pdf", 0, &[7], vec![0.0, 1.0]),
    ];
    table.replace_all(rows.clone()).await.expect("replace");
    assert_eq!(table.count().await.expect("count"), 3);

    let mut all = table.query_all(10).await.expect("scan");
    all.sort_by_key(|c| c.id);
    let mut expected = rows.clone();
    expected.sort_by_key(|c| c.id);
    assert_eq!(all, expected);

    let picked = table.query_where(&Predicate::IdIn(vec![rows[2].id])).await.expect("where");
    assert_eq!(picked.len(), 1);
    assert_eq!(picked[0].concept_ids, vec![7]);

    let hits = table.vector_search(&[1.0, 0.0], 3).await.expect("search");
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].record.id, rows[0].id);
    assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));

    // Second replace drops rows missing from the new set.
    table.replace_all(vec![rows[1].clone()]).await.expect("replace again");
    let left = table.query_all(10).await.expect("scan");
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, rows[1].id);
    assert!(left[0].concept_ids.is_empty());
}

#[tokio::test]
async fn lance_insert_delete_and_drop() {
    let tmp = TempDir::new().expect("tmp");
    let store = LanceStore::open(&lance_settings(&tmp)).await.expect("open store");
    let table = store.table::<Concept>().await.expect("open table");
    table
        .insert(vec![Concept::new("observer"), Concept::new("visitor")])
        .await
        .expect("insert");
    let removed = table
        .delete_where(&Predicate::IdIn(vec![stable_id("visitor")]))
        .await
        .expect("delete");
    assert_eq!(removed, 1);
    assert_eq!(table.count().await.expect("count"), 1);

    assert!(store.table_names().await.expect("names").contains(&"concepts".to_string()));
    store.drop_table("concepts").await.expect("drop");
    assert!(!store.table_names().await.expect("names").contains(&"concepts".to_string()));
}

#[tokio::test]
async fn lance_write_adds_derived_columns_missing_from_older_tables() {
    let tmp = TempDir::new().expect("tmp");
    let store = LanceStore::open(&lance_settings(&tmp)).await.expect("open store");

    // A concepts table written before `catalog_titles` existed.
    let mut observer = Concept::new("observer");
    observer.document_ids = vec![stable_id("/books/gof.pdf")];
    let full = records_to_batch(&[observer.clone()], build_schema(Concept::columns(), 2), 2, true).expect("batch");
    let keep: Vec<usize> = full
        .schema()
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| f.name() != "catalog_titles")
        .map(|(i, _)| i)
        .collect();
    let older = full.project(&keep).expect("project");
    let schema = older.schema();
    let reader: Box<dyn RecordBatchReader + Send> = Box::new(RecordBatchIterator::new(vec![Ok(older)], schema));
    store
        .connection()
        .create_table("concepts", reader)
        .execute()
        .await
        .expect("create older table");

    let table = store.table::<Concept>().await.expect("open table");
    let read = table.query_all(10).await.expect("scan");
    assert_eq!(read.len(), 1);
    assert!(read[0].catalog_titles.is_empty());
    assert_eq!(read[0].document_ids, observer.document_ids);

    let mut updated = read[0].clone();
    updated.catalog_titles = vec!["Gang of Four".to_string()];
    let mut staged = StagedWrite::new();
    staged.stage_all(vec![updated, Concept::new("visitor")]);
    assert_eq!(staged.commit(table.as_ref()).await.expect("commit"), 2);

    let mut after = table.query_all(10).await.expect("scan");
    after.sort_by_key(|c| c.name.clone());
    assert_eq!(after.len(), 2);
    assert_eq!(after[0].name, "observer");
    assert_eq!(after[0].catalog_titles, vec!["Gang of Four".to_string()]);
    assert!(after[1].catalog_titles.is_empty());

    let columns = store.connection().open_table("concepts").execute().await.expect("reopen");
    let stored = columns.schema().await.expect("schema");
    assert!(stored.field_with_name("catalog_titles").is_ok());
}

#[tokio::test]
async fn memory_full_scan_rejects_truncated_reads() {
    let store = InMemoryStore::new();
    let table = store.table::<Concept>().await.expect("open");
    table
        .insert(vec![Concept::new("observer"), Concept::new("visitor"), Concept::new("singleton")])
        .await
        .expect("insert");

    let err = scan_complete(table.as_ref(), 2).await.expect_err("three rows, cap two");
    assert!(matches!(err, Error::ScanTruncated { rows: 3, cap: 2, .. }));
    assert_eq!(scan_complete(table.as_ref(), 3).await.expect("fits").len(), 3);
}
