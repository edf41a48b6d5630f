//! Domain records: catalog documents, chunks, concepts and categories.
//!
//! Relationships are ID arrays. The `*_names` / `*_titles` fields are
//! derived caches of those arrays, owned by the reconciler.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identity::{chunk_key, stable_id};
use crate::row::{ColumnDef, ColumnKind, Row, Value};

pub type StableId = u32;

/// Placeholder for "no id" in stores that cannot hold empty arrays.
pub const SENTINEL_ID: StableId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Documents,
    Chunks,
    Concepts,
    Categories,
}

impl TableKind {
    pub const ALL: [TableKind; 4] = [
        TableKind::Documents,
        TableKind::Chunks,
        TableKind::Concepts,
        TableKind::Categories,
    ];

    pub fn table_name(self) -> &'static str {
        match self {
            TableKind::Documents => "catalog",
            TableKind::Chunks => "chunks",
            TableKind::Concepts => "concepts",
            TableKind::Categories => "categories",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "documents" | "document" | "catalog" => Some(TableKind::Documents),
            "chunks" | "chunk" => Some(TableKind::Chunks),
            "concepts" | "concept" => Some(TableKind::Concepts),
            "categories" | "category" => Some(TableKind::Categories),
            _ => None,
        }
    }
}

/// A record kind that can cross the store boundary.
pub trait Record: Clone + Send + Sync + 'static {
    const KIND: TableKind;

    fn columns() -> &'static [ColumnDef];
    fn id(&self) -> StableId;
    fn vector(&self) -> &[f32];
    fn to_row(&self) -> Row;
    /// The single normalization point for data read from storage.
    fn from_row(row: &Row) -> Result<Self>;
}

/// Records whose identity is the stable id of their name.
pub trait Named: Record {
    fn name(&self) -> &str;

    fn aliases(&self) -> &[String] {
        &[]
    }
}

fn require_id(row: &Row, table: TableKind) -> Result<StableId> {
    row.id("id").ok_or_else(|| Error::SchemaMismatch {
        table: table.table_name().to_string(),
        detail: "row has no usable 'id' column".to_string(),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: StableId,
    pub source_path: String,
    pub content_hash: String,
    /// Preview / summary text.
    pub text: String,
    pub vector: Vec<f32>,
    pub category_ids: Vec<StableId>,
    pub concept_ids: Vec<StableId>,
    pub category_names: Vec<String>,
    pub concept_names: Vec<String>,
    pub author: String,
    pub year: String,
    pub publisher: String,
    pub isbn: String,
}

impl Document {
    pub fn new(source_path: impl Into<String>, text: impl Into<String>) -> Self {
        let source_path = source_path.into();
        Self {
            id: stable_id(&source_path),
            source_path,
            text: text.into(),
            ..Self::default()
        }
    }

    /// Display title, used by title matching and concept catalog titles.
    pub fn title(&self) -> &str {
        &self.source_path
    }
}

const DOCUMENT_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("id", ColumnKind::Id),
    ColumnDef::new("source", ColumnKind::Text),
    ColumnDef::new("hash", ColumnKind::Text),
    ColumnDef::new("text", ColumnKind::Text),
    ColumnDef::new("vector", ColumnKind::Vector),
    ColumnDef::new("category_ids", ColumnKind::IdList),
    ColumnDef::new("concept_ids", ColumnKind::IdList),
    ColumnDef::derived("category_names", ColumnKind::TextList),
    ColumnDef::derived("concept_names", ColumnKind::TextList),
    ColumnDef::new("author", ColumnKind::Text),
    ColumnDef::new("year", ColumnKind::Text),
    ColumnDef::new("publisher", ColumnKind::Text),
    ColumnDef::new("isbn", ColumnKind::Text),
];

impl Record for Document {
    const KIND: TableKind = TableKind::Documents;

    fn columns() -> &'static [ColumnDef] {
        DOCUMENT_COLUMNS
    }

    fn id(&self) -> StableId {
        self.id
    }

    fn vector(&self) -> &[f32] {
        &self.vector
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", Value::Id(self.id))
            .with("source", Value::Text(self.source_path.clone()))
            .with("hash", Value::Text(self.content_hash.clone()))
            .with("text", Value::Text(self.text.clone()))
            .with("vector", Value::Vector(self.vector.clone()))
            .with("category_ids", Value::IdList(self.category_ids.clone()))
            .with("concept_ids", Value::IdList(self.concept_ids.clone()))
            .with("category_names", Value::TextList(self.category_names.clone()))
            .with("concept_names", Value::TextList(self.concept_names.clone()))
            .with("author", Value::Text(self.author.clone()))
            .with("year", Value::Text(self.year.clone()))
            .with("publisher", Value::Text(self.publisher.clone()))
            .with("isbn", Value::Text(self.isbn.clone()))
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: require_id(row, Self::KIND)?,
            source_path: row.text("source"),
            content_hash: row.text("hash"),
            text: row.text("text"),
            vector: row.vector("vector"),
            category_ids: row.id_list("category_ids"),
            concept_ids: row.id_list("concept_ids"),
            category_names: row.text_list("category_names"),
            concept_names: row.text_list("concept_names"),
            author: row.text("author"),
            year: row.text("year"),
            publisher: row.text("publisher"),
            isbn: row.text("isbn"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: StableId,
    pub document_id: StableId,
    pub text: String,
    pub vector: Vec<f32>,
    pub concept_ids: Vec<StableId>,
    pub category_ids: Vec<StableId>,
    pub concept_names: Vec<String>,
    pub category_names: Vec<String>,
    pub page_number: i32,
    pub chunk_index: i32,
}

impl Chunk {
    pub fn new(source_path: &str, chunk_index: u32, text: impl Into<String>) -> Self {
        Self {
            id: stable_id(&chunk_key(source_path, chunk_index)),
            document_id: stable_id(source_path),
            text: text.into(),
            chunk_index: i32::try_from(chunk_index).unwrap_or(i32::MAX),
            ..Self::default()
        }
    }
}

const CHUNK_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("id", ColumnKind::Id),
    ColumnDef::new("catalog_id", ColumnKind::Id),
    ColumnDef::new("text", ColumnKind::Text),
    ColumnDef::new("vector", ColumnKind::Vector),
    ColumnDef::new("concept_ids", ColumnKind::IdList),
    ColumnDef::new("category_ids", ColumnKind::IdList),
    ColumnDef::derived("concept_names", ColumnKind::TextList),
    ColumnDef::derived("category_names", ColumnKind::TextList),
    ColumnDef::new("page_number", ColumnKind::Int),
    ColumnDef::new("chunk_index", ColumnKind::Int),
];

impl Record for Chunk {
    const KIND: TableKind = TableKind::Chunks;

    fn columns() -> &'static [ColumnDef] {
        CHUNK_COLUMNS
    }

    fn id(&self) -> StableId {
        self.id
    }

    fn vector(&self) -> &[f32] {
        &self.vector
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", Value::Id(self.id))
            .with("catalog_id", Value::Id(self.document_id))
            .with("text", Value::Text(self.text.clone()))
            .with("vector", Value::Vector(self.vector.clone()))
            .with("concept_ids", Value::IdList(self.concept_ids.clone()))
            .with("category_ids", Value::IdList(self.category_ids.clone()))
            .with("concept_names", Value::TextList(self.concept_names.clone()))
            .with("category_names", Value::TextList(self.category_names.clone()))
            .with("page_number", Value::Int(self.page_number))
            .with("chunk_index", Value::Int(self.chunk_index))
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: require_id(row, Self::KIND)?,
            document_id: row.id("catalog_id").unwrap_or(SENTINEL_ID),
            text: row.text("text"),
            vector: row.vector("vector"),
            concept_ids: row.id_list("concept_ids"),
            category_ids: row.id_list("category_ids"),
            concept_names: row.text_list("concept_names"),
            category_names: row.text_list("category_names"),
            page_number: row.int("page_number"),
            chunk_index: row.int("chunk_index"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub id: StableId,
    pub name: String,
    pub summary: String,
    pub document_ids: Vec<StableId>,
    pub chunk_ids: Vec<StableId>,
    pub related_concept_ids: Vec<StableId>,
    pub synonyms: Vec<String>,
    pub broader_terms: Vec<String>,
    pub narrower_terms: Vec<String>,
    pub weight: f32,
    pub vector: Vec<f32>,
    pub catalog_titles: Vec<String>,
    pub related_concept_names: Vec<String>,
}

impl Concept {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: stable_id(&name),
            name,
            ..Self::default()
        }
    }
}

const CONCEPT_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("id", ColumnKind::Id),
    ColumnDef::new("name", ColumnKind::Text),
    ColumnDef::new("summary", ColumnKind::Text),
    ColumnDef::new("catalog_ids", ColumnKind::IdList),
    ColumnDef::new("chunk_ids", ColumnKind::IdList),
    ColumnDef::new("related_concept_ids", ColumnKind::IdList),
    ColumnDef::new("synonyms", ColumnKind::TextList),
    ColumnDef::new("broader_terms", ColumnKind::TextList),
    ColumnDef::new("narrower_terms", ColumnKind::TextList),
    ColumnDef::new("weight", ColumnKind::Float),
    ColumnDef::new("vector", ColumnKind::Vector),
    ColumnDef::derived("catalog_titles", ColumnKind::TextList),
    ColumnDef::derived("related_concepts", ColumnKind::TextList),
];

impl Record for Concept {
    const KIND: TableKind = TableKind::Concepts;

    fn columns() -> &'static [ColumnDef] {
        CONCEPT_COLUMNS
    }

    fn id(&self) -> StableId {
        self.id
    }

    fn vector(&self) -> &[f32] {
        &self.vector
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", Value::Id(self.id))
            .with("name", Value::Text(self.name.clone()))
            .with("summary", Value::Text(self.summary.clone()))
            .with("catalog_ids", Value::IdList(self.document_ids.clone()))
            .with("chunk_ids", Value::IdList(self.chunk_ids.clone()))
            .with("related_concept_ids", Value::IdList(self.related_concept_ids.clone()))
            .with("synonyms", Value::TextList(self.synonyms.clone()))
            .with("broader_terms", Value::TextList(self.broader_terms.clone()))
            .with("narrower_terms", Value::TextList(self.narrower_terms.clone()))
            .with("weight", Value::Float(self.weight))
            .with("vector", Value::Vector(self.vector.clone()))
            .with("catalog_titles", Value::TextList(self.catalog_titles.clone()))
            .with("related_concepts", Value::TextList(self.related_concept_names.clone()))
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: require_id(row, Self::KIND)?,
            name: row.text("name"),
            summary: row.text("summary"),
            document_ids: row.id_list("catalog_ids"),
            chunk_ids: row.id_list("chunk_ids"),
            related_concept_ids: row.id_list("related_concept_ids"),
            synonyms: row.text_list("synonyms"),
            broader_terms: row.text_list("broader_terms"),
            narrower_terms: row.text_list("narrower_terms"),
            weight: row.float("weight"),
            vector: row.vector("vector"),
            catalog_titles: row.text_list("catalog_titles"),
            related_concept_names: row.text_list("related_concepts"),
        })
    }
}

impl Named for Concept {
    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: StableId,
    pub name: String,
    pub description: String,
    pub parent_category_id: Option<StableId>,
    pub aliases: Vec<String>,
    pub related_category_ids: Vec<StableId>,
    pub related_category_names: Vec<String>,
    pub document_count: i32,
    pub chunk_count: i32,
    pub concept_count: i32,
    pub vector: Vec<f32>,
}

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: stable_id(&name),
            name,
            ..Self::default()
        }
    }
}

const CATEGORY_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("id", ColumnKind::Id),
    ColumnDef::new("category", ColumnKind::Text),
    ColumnDef::new("description", ColumnKind::Text),
    ColumnDef::new("parent_category_id", ColumnKind::OptId),
    ColumnDef::new("aliases", ColumnKind::TextList),
    ColumnDef::new("related_categories", ColumnKind::IdList),
    ColumnDef::derived("related_category_names", ColumnKind::TextList),
    ColumnDef::derived("document_count", ColumnKind::Int),
    ColumnDef::derived("chunk_count", ColumnKind::Int),
    ColumnDef::derived("concept_count", ColumnKind::Int),
    ColumnDef::new("vector", ColumnKind::Vector),
];

impl Record for Category {
    const KIND: TableKind = TableKind::Categories;

    fn columns() -> &'static [ColumnDef] {
        CATEGORY_COLUMNS
    }

    fn id(&self) -> StableId {
        self.id
    }

    fn vector(&self) -> &[f32] {
        &self.vector
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", Value::Id(self.id))
            .with("category", Value::Text(self.name.clone()))
            .with("description", Value::Text(self.description.clone()))
            .with(
                "parent_category_id",
                self.parent_category_id.map_or(Value::Null, Value::Id),
            )
            .with("aliases", Value::TextList(self.aliases.clone()))
            .with("related_categories", Value::IdList(self.related_category_ids.clone()))
            .with(
                "related_category_names",
                Value::TextList(self.related_category_names.clone()),
            )
            .with("document_count", Value::Int(self.document_count))
            .with("chunk_count", Value::Int(self.chunk_count))
            .with("concept_count", Value::Int(self.concept_count))
            .with("vector", Value::Vector(self.vector.clone()))
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: require_id(row, Self::KIND)?,
            name: row.text("category"),
            description: row.text("description"),
            parent_category_id: row.opt_id("parent_category_id"),
            aliases: row.text_list("aliases"),
            related_category_ids: row.id_list("related_categories"),
            related_category_names: row.text_list("related_category_names"),
            document_count: row.int("document_count"),
            chunk_count: row.int("chunk_count"),
            concept_count: row.int("concept_count"),
            vector: row.vector("vector"),
        })
    }
}

impl Named for Category {
    fn name(&self) -> &str {
        &self.name
    }

    fn aliases(&self) -> &[String] {
        &self.aliases
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_records_derive_id_from_name() {
        assert_eq!(Concept::new("Dependency Injection").id, stable_id("dependency injection"));
        assert_eq!(Category::new("Software Engineering").id, stable_id("software engineering"));
    }

    #[test]
    fn chunk_links_to_its_document() {
        let doc = Document::new("/books/ddd.pdf", "");
        let chunk = Chunk::new("/books/ddd.pdf", 3, "text");
        assert_eq!(chunk.document_id, doc.id);
        assert_eq!(chunk.id, stable_id("/books/ddd.pdf#3"));
        assert_eq!(chunk.chunk_index, 3);
    }

    #[test]
    fn sentinel_concept_ids_decode_empty() {
        let mut row = Chunk::new("a.pdf", 0, "x").to_row();
        row.set("concept_ids", Value::IdList(vec![SENTINEL_ID]));
        let chunk = Chunk::from_row(&row).expect("decode");
        assert!(chunk.concept_ids.is_empty());
    }

    #[test]
    fn missing_derived_column_decodes_empty() {
        let mut concept = Concept::new("observer");
        concept.catalog_titles = vec!["a.pdf".into()];
        let full = concept.to_row();
        let mut partial = Row::new();
        for col in full.columns().filter(|c| *c != "catalog_titles") {
            if let Some(v) = full.get(col) {
                partial.set(col, v.clone());
            }
        }
        let decoded = Concept::from_row(&partial).expect("decode");
        assert!(decoded.catalog_titles.is_empty());
        assert_eq!(decoded.name, "observer");
    }

    #[test]
    fn missing_id_is_schema_mismatch() {
        let row = Row::new().with("name", Value::Text("x".into()));
        let err = Concept::from_row(&row).expect_err("no id");
        assert!(matches!(err, Error::SchemaMismatch { .. }));
    }

    #[test]
    fn category_parent_round_trips_through_row() {
        let mut cat = Category::new("Patterns");
        cat.parent_category_id = Some(stable_id("software"));
        let back = Category::from_row(&cat.to_row()).expect("decode");
        assert_eq!(back, cat);
        cat.parent_category_id = None;
        assert_eq!(Category::from_row(&cat.to_row()).expect("decode").parent_category_id, None);
    }

    #[test]
    fn table_kind_parse() {
        assert_eq!(TableKind::parse("Catalog"), Some(TableKind::Documents));
        assert_eq!(TableKind::parse("chunk"), Some(TableKind::Chunks));
        assert_eq!(TableKind::parse("nope"), None);
    }
}
