//! File-backed concept extraction.
//!
//! Extraction itself runs elsewhere; its structured output is dropped into a
//! directory as one JSON file per document, named either after the
//! document's stable ID or after the source file stem.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;

use conceptdb_core::stable_id;
use conceptdb_core::traits::{ConceptExtractor, ExtractionResult};

pub struct JsonExtractor {
    dir: PathBuf,
}

impl JsonExtractor {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn candidates(&self, document_key: &str) -> Vec<PathBuf> {
        let mut paths = vec![self.dir.join(format!("{}.json", stable_id(document_key)))];
        if let Some(stem) = Path::new(document_key).file_stem() {
            let mut name = stem.to_os_string();
            name.push(".json");
            paths.push(self.dir.join(name));
        }
        paths
    }
}

#[async_trait]
impl ConceptExtractor for JsonExtractor {
    async fn extract(
        &self,
        document_key: &str,
        _text: &str,
        _vocabulary: Option<&[String]>,
    ) -> Result<ExtractionResult> {
        for path in self.candidates(document_key) {
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    return serde_json::from_slice(&bytes)
                        .with_context(|| format!("parsing extraction {}", path.display()));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
            }
        }
        Err(anyhow!("no extraction file for '{document_key}' in {}", self.dir.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_by_id_then_by_stem() {
        let dir = tempfile::tempdir().expect("tmp");
        let by_id = dir.path().join(format!("{}.json", stable_id("/books/ddd.pdf")));
        std::fs::write(&by_id, r#"{"concepts":[{"name":"aggregate","type":"thematic","pages":[3]}]}"#).expect("write");
        std::fs::write(dir.path().join("gof.json"), r#"{"concepts":[],"categories":["patterns"]}"#).expect("write");

        let extractor = JsonExtractor::new(dir.path());
        let ddd = extractor.extract("/books/ddd.pdf", "", None).await.expect("by id");
        assert_eq!(ddd.concepts[0].name, "aggregate");
        assert_eq!(ddd.concepts[0].pages, vec![3]);
        assert_eq!(ddd.concepts[0].kind, "thematic");
        let gof = extractor.extract("/books/gof.pdf", "", None).await.expect("by stem");
        assert_eq!(gof.categories, vec!["patterns".to_string()]);
        assert!(extractor.extract("/books/missing.pdf", "", None).await.is_err());
    }
}
