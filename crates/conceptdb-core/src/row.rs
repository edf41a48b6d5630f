//! Column-typed rows: the shape records take at the store boundary.
//!
//! Backends only ever see [`Row`]s and [`ColumnDef`]s. Each record kind
//! converts to and from rows exactly once, so normalization of the various
//! encodings an ID array may arrive in lives in this module and nowhere else.

use std::collections::BTreeMap;

use crate::types::{StableId, SENTINEL_ID};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Non-null `u32` key.
    Id,
    /// Nullable `u32` reference.
    OptId,
    Int,
    Float,
    Text,
    IdList,
    TextList,
    Vector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub kind: ColumnKind,
    /// Derived columns are recomputable; a row missing one is decoded with an
    /// empty value and picked up by the next reconciliation pass.
    pub derived: bool,
}

impl ColumnDef {
    pub const fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self { name, kind, derived: false }
    }

    pub const fn derived(name: &'static str, kind: ColumnKind) -> Self {
        Self { name, kind, derived: true }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Id(StableId),
    Int(i32),
    Float(f32),
    Text(String),
    IdList(Vec<StableId>),
    TextList(Vec<String>),
    Vector(Vec<f32>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: Value) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: &str, value: Value) {
        self.values.insert(column.to_string(), value);
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn id(&self, column: &str) -> Option<StableId> {
        match self.get(column)? {
            Value::Id(v) => Some(*v),
            Value::Int(v) => u32::try_from(*v).ok(),
            Value::Float(v) if *v >= 0.0 && v.fract() == 0.0 => Some(*v as u32),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn opt_id(&self, column: &str) -> Option<StableId> {
        self.id(column).filter(|id| *id != SENTINEL_ID)
    }

    pub fn int(&self, column: &str) -> i32 {
        match self.get(column) {
            Some(Value::Int(v)) => *v,
            Some(Value::Id(v)) => i32::try_from(*v).unwrap_or(i32::MAX),
            Some(Value::Float(v)) => *v as i32,
            Some(Value::Text(s)) => s.trim().parse().unwrap_or_default(),
            _ => 0,
        }
    }

    pub fn float(&self, column: &str) -> f32 {
        match self.get(column) {
            Some(Value::Float(v)) => *v,
            Some(Value::Int(v)) => *v as f32,
            Some(Value::Id(v)) => *v as f32,
            _ => 0.0,
        }
    }

    pub fn text(&self, column: &str) -> String {
        match self.get(column) {
            Some(Value::Text(s)) => s.clone(),
            Some(Value::Id(v)) => v.to_string(),
            Some(Value::Int(v)) => v.to_string(),
            _ => String::new(),
        }
    }

    /// ID array with every tolerated encoding folded into one canonical form:
    /// native lists, JSON strings (`"[1,2]"`), comma lists, and the `[0]`
    /// placeholder for "empty" all decode to a plain `Vec` without sentinels.
    pub fn id_list(&self, column: &str) -> Vec<StableId> {
        let raw = match self.get(column) {
            Some(Value::IdList(ids)) => ids.clone(),
            Some(Value::Id(id)) => vec![*id],
            Some(Value::Text(s)) => parse_id_text(s),
            Some(Value::TextList(items)) => items.iter().filter_map(|s| s.trim().parse().ok()).collect(),
            _ => Vec::new(),
        };
        decode_ids(raw)
    }

    pub fn text_list(&self, column: &str) -> Vec<String> {
        match self.get(column) {
            Some(Value::TextList(items)) => items.clone(),
            Some(Value::Text(s)) => parse_text_list(s),
            _ => Vec::new(),
        }
    }

    pub fn vector(&self, column: &str) -> Vec<f32> {
        match self.get(column) {
            Some(Value::Vector(v)) => v.clone(),
            _ => Vec::new(),
        }
    }
}

fn parse_id_text(s: &str) -> Vec<StableId> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if let Ok(ids) = serde_json::from_str::<Vec<f64>>(trimmed) {
        return ids
            .into_iter()
            .filter(|v| *v >= 0.0 && *v <= f64::from(u32::MAX))
            .map(|v| v as StableId)
            .collect();
    }
    trimmed
        .trim_matches(|c| c == '[' || c == ']')
        .split(',')
        .filter_map(|p| p.trim().parse().ok())
        .collect()
}

fn parse_text_list(s: &str) -> Vec<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    serde_json::from_str::<Vec<String>>(trimmed).unwrap_or_else(|_| vec![trimmed.to_string()])
}

/// Strip sentinel entries from an ID array read from storage.
pub fn decode_ids(ids: Vec<StableId>) -> Vec<StableId> {
    ids.into_iter().filter(|id| *id != SENTINEL_ID).collect()
}

/// Encode an ID array for a store that cannot persist empty arrays.
pub fn encode_ids(ids: &[StableId], sentinel_for_empty: bool) -> Vec<StableId> {
    if ids.is_empty() && sentinel_for_empty {
        vec![SENTINEL_ID]
    } else {
        ids.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_list_accepts_every_encoding() {
        let row = Row::new()
            .with("native", Value::IdList(vec![3, 1]))
            .with("json", Value::Text("[3, 1]".into()))
            .with("floats", Value::Text("[3.0,1.0]".into()))
            .with("csv", Value::Text("3,1".into()))
            .with("sentinel", Value::IdList(vec![0]))
            .with("empty_json", Value::Text("[]".into()));
        for col in ["native", "json", "floats", "csv"] {
            assert_eq!(row.id_list(col), vec![3, 1], "column {col}");
        }
        assert!(row.id_list("sentinel").is_empty());
        assert!(row.id_list("empty_json").is_empty());
        assert!(row.id_list("missing").is_empty());
    }

    #[test]
    fn encode_uses_sentinel_only_when_asked() {
        assert_eq!(encode_ids(&[], true), vec![SENTINEL_ID]);
        assert!(encode_ids(&[], false).is_empty());
        assert_eq!(encode_ids(&[4, 5], true), vec![4, 5]);
    }

    #[test]
    fn text_list_from_json_string() {
        let row = Row::new().with("names", Value::Text(r#"["a","b"]"#.into()));
        assert_eq!(row.text_list("names"), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn opt_id_treats_sentinel_as_none() {
        let row = Row::new().with("parent", Value::Id(0)).with("other", Value::Null);
        assert_eq!(row.opt_id("parent"), None);
        assert_eq!(row.opt_id("other"), None);
    }
}
