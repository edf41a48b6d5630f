use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema, SchemaRef};
use conceptdb_core::row::{ColumnDef, ColumnKind};

fn item(data_type: DataType) -> Arc<Field> {
    Arc::new(Field::new("item", data_type, true))
}

pub fn column_type(kind: ColumnKind, dim: i32) -> DataType {
    match kind {
        ColumnKind::Id | ColumnKind::OptId => DataType::UInt32,
        ColumnKind::Int => DataType::Int32,
        ColumnKind::Float => DataType::Float32,
        ColumnKind::Text => DataType::Utf8,
        ColumnKind::IdList => DataType::List(item(DataType::UInt32)),
        ColumnKind::TextList => DataType::List(item(DataType::Utf8)),
        ColumnKind::Vector => DataType::FixedSizeList(item(DataType::Float32), dim),
    }
}

/// Arrow schema for a record kind. Only the key is non-nullable; vectors may
/// be absent until embeddings are backfilled.
pub fn build_schema(columns: &[ColumnDef], dim: i32) -> SchemaRef {
    Arc::new(Schema::new(
        columns
            .iter()
            .map(|c| {
                let nullable = !matches!(c.kind, ColumnKind::Id);
                Field::new(c.name, column_type(c.kind, dim), nullable)
            })
            .collect::<Vec<_>>(),
    ))
}

/// Names of `expected` columns whose type in `actual` differs or which are
/// missing altogether. Derived columns may be absent.
pub fn incompatible_columns(columns: &[ColumnDef], actual: &Schema, dim: i32) -> Vec<String> {
    columns
        .iter()
        .filter_map(|c| match actual.field_with_name(c.name) {
            Ok(field) if *field.data_type() == column_type(c.kind, dim) => None,
            Ok(field) => Some(format!("{} ({})", c.name, field.data_type())),
            Err(_) if c.derived => None,
            Err(_) => Some(format!("{} (missing)", c.name)),
        })
        .collect()
}

/// Fields for derived `columns` that `actual` lacks, typed as [`build_schema`]
/// would declare them.
pub fn missing_derived_fields(columns: &[ColumnDef], actual: &Schema, dim: i32) -> Vec<Field> {
    columns
        .iter()
        .filter(|c| c.derived && actual.field_with_name(c.name).is_err())
        .map(|c| Field::new(c.name, column_type(c.kind, dim), true))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use conceptdb_core::{Chunk, Concept, Record};

    #[test]
    fn chunk_schema_shapes() {
        let schema = build_schema(Chunk::columns(), 8);
        let id = schema.field_with_name("id").expect("id");
        assert!(!id.is_nullable());
        assert_eq!(id.data_type(), &DataType::UInt32);
        let concepts = schema.field_with_name("concept_ids").expect("concept_ids");
        assert_eq!(concepts.data_type(), &DataType::List(item(DataType::UInt32)));
        let vector = schema.field_with_name("vector").expect("vector");
        assert_eq!(vector.data_type(), &DataType::FixedSizeList(item(DataType::Float32), 8));
    }

    #[test]
    fn missing_derived_column_is_compatible() {
        let full = build_schema(Concept::columns(), 4);
        let trimmed = Schema::new(
            full.fields()
                .iter()
                .filter(|f| f.name() != "catalog_titles")
                .cloned()
                .collect::<Vec<_>>(),
        );
        assert!(incompatible_columns(Concept::columns(), &trimmed, 4).is_empty());
        let bad = incompatible_columns(Concept::columns(), &trimmed, 16);
        assert_eq!(bad.len(), 1);
        assert!(bad[0].starts_with("vector "));

        let missing = missing_derived_fields(Concept::columns(), &trimmed, 4);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].name(), "catalog_titles");
        assert_eq!(missing[0].data_type(), &DataType::List(item(DataType::Utf8)));
        assert!(missing_derived_fields(Concept::columns(), &full, 4).is_empty());
    }
}
