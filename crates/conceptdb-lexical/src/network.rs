//! Word -> sense lookup.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use conceptdb_core::Result;

/// One sense of a word. Lemmas use `_` for spaces (`design_pattern`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Synset {
    #[serde(default)]
    pub id: String,
    /// Lemmas sharing this sense; all of them are synonyms of each other.
    pub words: Vec<String>,
    #[serde(default)]
    pub gloss: String,
    #[serde(default)]
    pub pos: String,
    #[serde(default)]
    pub hypernyms: Vec<String>,
    #[serde(default)]
    pub hyponyms: Vec<String>,
}

impl Synset {
    /// Lemmas of this sense other than `word`.
    pub fn synonyms_of<'a>(&'a self, word: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        let key = lookup_key(word);
        self.words.iter().map(String::as_str).filter(move |w| lookup_key(w) != key)
    }
}

/// Lexicon key: lowercase with `_` for whitespace.
pub fn lookup_key(word: &str) -> String {
    word.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join("_")
}

/// Render a lemma as query text.
pub fn display_lemma(lemma: &str) -> String {
    lemma.trim().to_lowercase().replace('_', " ")
}

/// Senses of a word, most frequent first. Unknown words have none.
pub trait LexicalNetwork: Send + Sync {
    fn synsets(&self, word: &str) -> Vec<Synset>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryLexicon {
    entries: HashMap<String, Vec<Synset>>,
}

impl InMemoryLexicon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `{word: [synset, ...]}` JSON export.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: HashMap<String, Vec<Synset>> = serde_json::from_str(json)?;
        let mut lexicon = Self::new();
        for (word, senses) in raw {
            lexicon.insert(&word, senses);
        }
        Ok(lexicon)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        let lexicon = Self::from_json(&json)?;
        info!(path = %path.display(), words = lexicon.len(), "lexicon loaded");
        Ok(lexicon)
    }

    pub fn insert(&mut self, word: &str, senses: Vec<Synset>) {
        self.entries.entry(lookup_key(word)).or_default().extend(senses);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl LexicalNetwork for InMemoryLexicon {
    fn synsets(&self, word: &str) -> Vec<Synset> {
        self.entries.get(&lookup_key(word)).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_and_lemmas() {
        assert_eq!(lookup_key("  Design Pattern "), "design_pattern");
        assert_eq!(display_lemma("Design_Pattern"), "design pattern");
    }

    #[test]
    fn json_lookup_is_case_insensitive() {
        let lexicon = InMemoryLexicon::from_json(
            r#"{"Car": [{"id": "car.n.01", "words": ["car", "auto", "automobile"], "pos": "n",
                         "hypernyms": ["motor_vehicle"]}]}"#,
        )
        .expect("parse");
        let senses = lexicon.synsets("CAR");
        assert_eq!(senses.len(), 1);
        assert_eq!(senses[0].synonyms_of("car").collect::<Vec<_>>(), vec!["auto", "automobile"]);
        assert!(lexicon.synsets("bicycle").is_empty());
    }
}
