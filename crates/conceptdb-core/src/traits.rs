use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
    }
}

/// One concept occurrence reported by the extraction service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedConcept {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub pages: Vec<i32>,
    #[serde(default)]
    pub confidence: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    #[serde(default)]
    pub concepts: Vec<ExtractedConcept>,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// Concept extraction boundary. Implementations call out to a remote
/// service; failures are retried by the caller's call policy.
#[async_trait]
pub trait ConceptExtractor: Send + Sync {
    async fn extract(
        &self,
        document_key: &str,
        text: &str,
        vocabulary: Option<&[String]>,
    ) -> anyhow::Result<ExtractionResult>;
}
