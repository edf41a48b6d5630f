//! Sense selection strategies.
//!
//! A strategy picks one sense per query word; expansion then walks that
//! sense's relations. The ranking engine only sees [`SenseStrategy`], so the
//! strategy can be swapped from configuration.

use std::collections::HashSet;
use std::sync::Arc;

use conceptdb_core::config::StrategyKind;
use conceptdb_core::{Error, Result};

use crate::expand::{expand, ExpandedQuery, ExpansionParams};
use crate::network::{LexicalNetwork, Synset};

pub trait SenseStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn network(&self) -> &dyn LexicalNetwork;

    /// The sense of `word` to use given the other `query_terms`.
    fn get_contextual_synset(&self, word: &str, query_terms: &[String]) -> Option<Synset>;

    fn expand_query(&self, terms: &[String], params: &ExpansionParams) -> ExpandedQuery {
        expand(self, terms, params)
    }
}

/// Always the primary (most frequent) sense.
pub struct FirstSynsetStrategy {
    network: Arc<dyn LexicalNetwork>,
}

impl FirstSynsetStrategy {
    pub fn new(network: Arc<dyn LexicalNetwork>) -> Self {
        Self { network }
    }
}

impl SenseStrategy for FirstSynsetStrategy {
    fn name(&self) -> &'static str {
        "first"
    }

    fn network(&self) -> &dyn LexicalNetwork {
        self.network.as_ref()
    }

    fn get_contextual_synset(&self, word: &str, _query_terms: &[String]) -> Option<Synset> {
        self.network.synsets(word).into_iter().next()
    }
}

/// Picks the sense whose gloss and related words overlap most with the rest
/// of the query. Ties, including zero overlap, go to the earlier sense.
pub struct ContextAwareStrategy {
    network: Arc<dyn LexicalNetwork>,
}

impl ContextAwareStrategy {
    pub fn new(network: Arc<dyn LexicalNetwork>) -> Self {
        Self { network }
    }
}

fn stem(token: &str) -> &str {
    match token.strip_suffix('s') {
        Some(base) if base.len() > 2 && !base.ends_with('s') => base,
        _ => token,
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| stem(&t.to_lowercase()).to_string())
}

fn sense_tokens(sense: &Synset) -> HashSet<String> {
    let mut bag: HashSet<String> = tokens(&sense.gloss).collect();
    for lemma in sense.words.iter().chain(&sense.hypernyms).chain(&sense.hyponyms) {
        bag.extend(tokens(lemma));
    }
    bag
}

/// Number of context tokens found in the sense's bag of words.
pub fn overlap_score(sense: &Synset, context: &HashSet<String>) -> usize {
    let bag = sense_tokens(sense);
    context.iter().filter(|t| bag.contains(*t)).count()
}

impl SenseStrategy for ContextAwareStrategy {
    fn name(&self) -> &'static str {
        "context"
    }

    fn network(&self) -> &dyn LexicalNetwork {
        self.network.as_ref()
    }

    fn get_contextual_synset(&self, word: &str, query_terms: &[String]) -> Option<Synset> {
        let senses = self.network.synsets(word);
        let own: HashSet<String> = tokens(word).collect();
        let context: HashSet<String> = query_terms
            .iter()
            .flat_map(|t| tokens(t))
            .filter(|t| !own.contains(t))
            .collect();
        if senses.len() < 2 || context.is_empty() {
            return senses.into_iter().next();
        }
        let mut best: Option<(usize, Synset)> = None;
        for sense in senses {
            let score = overlap_score(&sense, &context);
            match &best {
                Some((top, _)) if score <= *top => {}
                _ => best = Some((score, sense)),
            }
        }
        best.map(|(_, sense)| sense)
    }
}

/// Build the strategy named in configuration, see [`StrategyKind::NAMES`].
pub fn strategy_for(name: &str, network: Arc<dyn LexicalNetwork>) -> Result<Box<dyn SenseStrategy>> {
    match StrategyKind::parse(name) {
        Some(StrategyKind::First) => Ok(Box::new(FirstSynsetStrategy::new(network))),
        Some(StrategyKind::Context) => Ok(Box::new(ContextAwareStrategy::new(network))),
        None => Err(Error::InvalidConfig(format!("unknown expansion strategy '{name}'"))),
    }
}
