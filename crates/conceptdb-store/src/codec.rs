//! Conversion between [`Row`]s and Arrow record batches.
//!
//! Encoding is strict: every declared column is written with the declared
//! type. Decoding is tolerant: whatever Arrow type a column arrived in is
//! mapped to the closest [`Value`] and the record's `from_row` sorts it out.

use std::sync::Arc;

use arrow_array::builder::{ListBuilder, StringBuilder};
use arrow_array::cast::AsArray;
use arrow_array::types::{
    Float32Type, Float64Type, Int32Type, Int64Type, UInt32Type, UInt64Type,
};
use arrow_array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, Int32Array, ListArray, RecordBatch,
    StringArray, UInt32Array,
};
use arrow_schema::{DataType, SchemaRef};
use conceptdb_core::row::{encode_ids, ColumnDef, ColumnKind, Row, Value};
use conceptdb_core::{Error, Record, Result, StableId};

/// Columns produced by the query engine rather than stored.
const ENGINE_COLUMNS: &[&str] = &["_distance", "_score", "_rowid"];

/// Apply the storage encoding of ID arrays to a row.
pub fn encode_row(row: &Row, columns: &[ColumnDef], sentinel: bool) -> Row {
    let mut out = row.clone();
    for c in columns.iter().filter(|c| c.kind == ColumnKind::IdList) {
        out.set(c.name, Value::IdList(encode_ids(&row.id_list(c.name), sentinel)));
    }
    out
}

pub fn records_to_batch<R: Record>(records: &[R], schema: SchemaRef, dim: i32, sentinel: bool) -> Result<RecordBatch> {
    let dim_len = usize::try_from(dim).map_err(Error::store)?;
    let columns = R::columns();
    let rows: Vec<Row> = records.iter().map(Record::to_row).collect();
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(columns.len());
    for c in columns {
        let array: ArrayRef = match c.kind {
            ColumnKind::Id => Arc::new(UInt32Array::from(
                rows.iter().map(|r| r.id(c.name).unwrap_or_default()).collect::<Vec<_>>(),
            )),
            ColumnKind::OptId => Arc::new(UInt32Array::from(
                rows.iter().map(|r| r.opt_id(c.name)).collect::<Vec<_>>(),
            )),
            ColumnKind::Int => Arc::new(Int32Array::from(
                rows.iter().map(|r| r.int(c.name)).collect::<Vec<_>>(),
            )),
            ColumnKind::Float => Arc::new(Float32Array::from(
                rows.iter().map(|r| r.float(c.name)).collect::<Vec<_>>(),
            )),
            ColumnKind::Text => Arc::new(StringArray::from(
                rows.iter().map(|r| r.text(c.name)).collect::<Vec<_>>(),
            )),
            ColumnKind::IdList => Arc::new(ListArray::from_iter_primitive::<UInt32Type, _, _>(
                rows.iter().map(|r| {
                    Some(encode_ids(&r.id_list(c.name), sentinel).into_iter().map(Some).collect::<Vec<_>>())
                }),
            )),
            ColumnKind::TextList => {
                let mut builder = ListBuilder::new(StringBuilder::new());
                for r in &rows {
                    for s in r.text_list(c.name) {
                        builder.values().append_value(s);
                    }
                    builder.append(true);
                }
                Arc::new(builder.finish())
            }
            ColumnKind::Vector => {
                let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(rows.len());
                for r in &rows {
                    let v = r.vector(c.name);
                    if v.is_empty() {
                        vectors.push(None);
                    } else if v.len() == dim_len {
                        vectors.push(Some(v.into_iter().map(Some).collect()));
                    } else {
                        return Err(Error::SchemaMismatch {
                            table: R::KIND.table_name().to_string(),
                            detail: format!(
                                "row {} has a {}-dim '{}', table expects {dim}",
                                r.id("id").unwrap_or_default(),
                                v.len(),
                                c.name
                            ),
                        });
                    }
                }
                Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, dim))
            }
        };
        arrays.push(array);
    }
    RecordBatch::try_new(schema, arrays).map_err(Error::store)
}

pub fn batch_to_rows(batch: &RecordBatch) -> Vec<Row> {
    let schema = batch.schema();
    let mut rows = vec![Row::new(); batch.num_rows()];
    for (field, array) in schema.fields().iter().zip(batch.columns()) {
        if ENGINE_COLUMNS.contains(&field.name().as_str()) {
            continue;
        }
        for (i, row) in rows.iter_mut().enumerate() {
            row.set(field.name(), cell(array, i));
        }
    }
    rows
}

/// The `_distance` column of a vector search result, if present.
pub fn distances(batch: &RecordBatch) -> Option<Vec<f32>> {
    let col = batch.column_by_name("_distance")?;
    match col.data_type() {
        DataType::Float32 => Some(col.as_primitive::<Float32Type>().iter().map(|d| d.unwrap_or(f32::MAX)).collect()),
        DataType::Float64 => Some(
            col.as_primitive::<Float64Type>()
                .iter()
                .map(|d| d.map_or(f32::MAX, |d| d as f32))
                .collect(),
        ),
        _ => None,
    }
}

fn cell(array: &ArrayRef, i: usize) -> Value {
    if array.is_null(i) {
        return Value::Null;
    }
    match array.data_type() {
        DataType::UInt32 => Value::Id(array.as_primitive::<UInt32Type>().value(i)),
        DataType::UInt64 => u32::try_from(array.as_primitive::<UInt64Type>().value(i)).map_or(Value::Null, Value::Id),
        DataType::Int32 => Value::Int(array.as_primitive::<Int32Type>().value(i)),
        DataType::Int64 => i32::try_from(array.as_primitive::<Int64Type>().value(i)).map_or(Value::Null, Value::Int),
        DataType::Float32 => Value::Float(array.as_primitive::<Float32Type>().value(i)),
        DataType::Float64 => Value::Float(array.as_primitive::<Float64Type>().value(i) as f32),
        DataType::Utf8 => Value::Text(array.as_string::<i32>().value(i).to_string()),
        DataType::LargeUtf8 => Value::Text(array.as_string::<i64>().value(i).to_string()),
        DataType::List(_) => list_cell(&array.as_list::<i32>().value(i)),
        DataType::LargeList(_) => list_cell(&array.as_list::<i64>().value(i)),
        DataType::FixedSizeList(_, _) => {
            float_values(&array.as_fixed_size_list().value(i)).map_or(Value::Null, Value::Vector)
        }
        _ => Value::Null,
    }
}

fn list_cell(values: &ArrayRef) -> Value {
    match values.data_type() {
        DataType::Utf8 => Value::TextList(values.as_string::<i32>().iter().flatten().map(str::to_string).collect()),
        DataType::LargeUtf8 => Value::TextList(values.as_string::<i64>().iter().flatten().map(str::to_string).collect()),
        _ => id_values(values).map_or(Value::Null, Value::IdList),
    }
}

fn whole_id(v: f64) -> Option<StableId> {
    (v >= 0.0 && v <= f64::from(u32::MAX) && v.fract() == 0.0).then_some(v as StableId)
}

fn id_values(values: &ArrayRef) -> Option<Vec<StableId>> {
    let ids = match values.data_type() {
        DataType::UInt32 => values.as_primitive::<UInt32Type>().iter().flatten().collect(),
        DataType::UInt64 => values
            .as_primitive::<UInt64Type>()
            .iter()
            .flatten()
            .filter_map(|v| u32::try_from(v).ok())
            .collect(),
        DataType::Int32 => values
            .as_primitive::<Int32Type>()
            .iter()
            .flatten()
            .filter_map(|v| u32::try_from(v).ok())
            .collect(),
        DataType::Int64 => values
            .as_primitive::<Int64Type>()
            .iter()
            .flatten()
            .filter_map(|v| u32::try_from(v).ok())
            .collect(),
        DataType::Float64 => values.as_primitive::<Float64Type>().iter().flatten().filter_map(whole_id).collect(),
        DataType::Float32 => values
            .as_primitive::<Float32Type>()
            .iter()
            .flatten()
            .filter_map(|v| whole_id(f64::from(v)))
            .collect(),
        _ => return None,
    };
    Some(ids)
}

fn float_values(values: &ArrayRef) -> Option<Vec<f32>> {
    match values.data_type() {
        DataType::Float32 => Some(values.as_primitive::<Float32Type>().iter().map(Option::unwrap_or_default).collect()),
        DataType::Float64 => Some(
            values
                .as_primitive::<Float64Type>()
                .iter()
                .map(|v| v.unwrap_or_default() as f32)
                .collect(),
        ),
        _ => None,
    }
}
