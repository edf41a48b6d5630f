use conceptdb_embed::{get_default_embedder, HashEmbedder, Embedder};

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[test]
fn hashed_embedder_shapes_and_determinism() {
    let embedder = get_default_embedder(384).expect("embedder");
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), 384);

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    for (a, b) in v1.iter().zip(v2.iter()) {
        assert!((a - b).abs() <= 1e-6);
    }
}

#[test]
fn shared_vocabulary_is_closer() {
    let e = HashEmbedder::new(256);
    let q = e.embed("observer pattern").expect("q");
    let near = e.embed("The Observer pattern notifies subscribers").expect("near");
    let far = e.embed("sourdough bread fermentation").expect("far");
    assert!(cosine(&q, &near) > cosine(&q, &far));
}

#[test]
fn zero_dimension_is_rejected() {
    assert!(get_default_embedder(0).is_err());
}
