use std::collections::HashSet;

use conceptdb_core::identity::{normalize, stable_id_avoiding};
use conceptdb_core::row::Value;
use conceptdb_core::{stable_id, Chunk, Concept, IdAllocator, Record};

#[test]
fn equal_ids_only_for_equal_normalized_names() {
    let names = [
        "Clean Code",
        "clean code ",
        "Clean Architecture",
        "Domain-Driven Design",
        "domain driven design",
        "Refactoring",
    ];
    let mut alloc = IdAllocator::new();
    let ids = alloc.assign_all(names.iter().copied());
    for a in &names {
        for b in &names {
            let same = normalize(a) == normalize(b);
            assert_eq!(ids[&normalize(a)] == ids[&normalize(b)], same, "{a:?} vs {b:?}");
        }
    }
}

#[test]
fn clean_architecture_avoids_clean_code_slot() {
    // "Clean Code" already owns the slot "Clean Architecture" would hash to.
    let x = stable_id("Clean Architecture");
    let taken = HashSet::from([x]);
    let first = stable_id_avoiding("Clean Architecture", &taken);
    assert_ne!(first, x);
    assert_eq!(stable_id_avoiding("Clean Architecture", &taken), first);
}

#[test]
fn empty_concept_array_in_every_legacy_shape_decodes_empty() {
    let base = Chunk::new("/books/a.pdf", 0, "text").to_row();
    for raw in [
        Value::IdList(vec![0]),
        Value::IdList(vec![]),
        Value::Text("[0]".into()),
        Value::Text("[]".into()),
        Value::Null,
    ] {
        let mut row = base.clone();
        row.set("concept_ids", raw.clone());
        let chunk = Chunk::from_row(&row).expect("decode");
        assert!(chunk.concept_ids.is_empty(), "{raw:?}");
    }
}

#[test]
fn concept_row_round_trip_keeps_canonical_ids() {
    let mut c = Concept::new("Observer Pattern");
    c.document_ids = vec![11, 12];
    c.chunk_ids = vec![101];
    c.related_concept_ids = vec![stable_id("publish subscribe")];
    c.weight = 3.0;
    let back = Concept::from_row(&c.to_row()).expect("decode");
    assert_eq!(back, c);
}
