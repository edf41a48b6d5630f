//! Deterministic hashed embeddings.
//!
//! Every lower-cased alphanumeric token is hashed with xxHash64 into one of
//! `dim` buckets and the bag is L2-normalized. Texts that share vocabulary
//! land near each other, which is all the ranking engine needs for a query
//! vector when no neural model is configured.

use std::hash::{Hash, Hasher};

use anyhow::{bail, Result};
use twox_hash::XxHash64;

pub use conceptdb_core::traits::Embedder;

/// Longest input considered, in tokens.
pub const MAX_TOKENS: usize = 512;

pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        let lowered = text.to_lowercase();
        let tokens = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .take(MAX_TOKENS);
        for (i, token) in tokens.enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            let val = ((h >> 32) as u32) as f32 / u32::MAX as f32;
            v[idx] += val + (i % 3) as f32 * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

impl Embedder for HashEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        MAX_TOKENS
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

pub fn get_default_embedder(dim: usize) -> Result<Box<dyn Embedder>> {
    if dim == 0 {
        bail!("embedding dimension must be > 0");
    }
    tracing::debug!(dim, "using hashed embedder");
    Ok(Box::new(HashEmbedder::new(dim)))
}
