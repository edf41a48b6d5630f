//! Lexical-network query expansion.
//!
//! A [`LexicalNetwork`] maps words to senses; a [`SenseStrategy`] chooses
//! which sense a query word means and expands the query through that
//! sense's synonyms, hypernyms and hyponyms.

pub mod expand;
pub mod network;
pub mod strategy;

pub use expand::{ExpandedQuery, ExpansionParams};
pub use network::{InMemoryLexicon, LexicalNetwork, Synset};
pub use strategy::{strategy_for, ContextAwareStrategy, FirstSynsetStrategy, SenseStrategy};
