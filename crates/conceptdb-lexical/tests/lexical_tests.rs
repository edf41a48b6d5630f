use std::sync::Arc;

use conceptdb_lexical::{
    ContextAwareStrategy, ExpandedQuery, ExpansionParams, FirstSynsetStrategy, InMemoryLexicon, LexicalNetwork,
    SenseStrategy,
};

const SAMPLE: &str = include_str!("../data/lexicon.sample.json");

fn network() -> Arc<dyn LexicalNetwork> {
    Arc::new(InMemoryLexicon::from_json(SAMPLE).expect("sample lexicon"))
}

fn terms(words: &[&str]) -> Vec<String> {
    words.iter().map(ToString::to_string).collect()
}

fn close(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-5
}

#[test]
fn context_picks_the_software_sense_of_decorator() {
    let network = network();
    let context = terms(&["software", "design", "pattern"]);
    let first = FirstSynsetStrategy::new(Arc::clone(&network))
        .get_contextual_synset("decorator", &context)
        .expect("known word");
    let contextual = ContextAwareStrategy::new(network)
        .get_contextual_synset("decorator", &context)
        .expect("known word");
    assert_eq!(first.id, "decorator.n.01");
    assert_eq!(contextual.id, "decorator.n.02");
    assert_ne!(first, contextual);
}

#[test]
fn context_without_overlap_falls_back_to_primary() {
    let strategy = ContextAwareStrategy::new(network());
    let sense = strategy
        .get_contextual_synset("decorator", &terms(&["kitchen", "paint"]))
        .expect("known word");
    assert_eq!(sense.id, "decorator.n.01");
    assert!(strategy.get_contextual_synset("zebra", &[]).is_none());
}

#[test]
fn expansion_weights_decay_with_relation_and_depth() {
    let strategy = ContextAwareStrategy::new(network());
    let query = terms(&["decorator", "software", "design", "pattern"]);
    let params = ExpansionParams { max_synonyms_per_term: 5, max_depth: 2, depth_decay: 0.6 };
    let expanded = strategy.expand_query(&query, &params);

    assert_eq!(expanded.original_terms, query);
    for term in &query {
        assert!(close(expanded.weight(term), 1.0));
    }
    assert!(close(expanded.weight("decorator pattern"), 1.0));
    assert!(close(expanded.weight("wrapper"), 1.0));
    assert!(close(expanded.weight("design pattern"), 0.8));
    assert!(close(expanded.weight("solution"), 0.8 * 0.6));
    assert!(close(expanded.weight("observer pattern"), 0.7 * 0.6));
    assert!(close(expanded.weight("interior decorator"), 0.0));
    assert_eq!(expanded.expansion_terms().count(), 5);
}

#[test]
fn first_sense_expands_the_other_meaning() {
    let strategy = FirstSynsetStrategy::new(network());
    let expanded = strategy.expand_query(&terms(&["decorator", "software"]), &ExpansionParams::default());
    assert!(expanded.weight("interior decorator") > 0.0);
    assert!(close(expanded.weight("specialist"), 0.8));
    assert!(close(expanded.weight("wrapper"), 0.0));
}

#[test]
fn breadth_is_capped_per_source_term() {
    let strategy = FirstSynsetStrategy::new(network());
    let params = ExpansionParams { max_synonyms_per_term: 2, max_depth: 1, depth_decay: 0.6 };
    let expanded = strategy.expand_query(&terms(&["car"]), &params);
    let added: Vec<&str> = expanded.expansion_terms().map(|(t, _)| t).collect();
    assert_eq!(added, vec!["auto", "automobile"]);
}

#[test]
fn second_hop_reaches_hypernym_relations() {
    let strategy = FirstSynsetStrategy::new(network());
    let params = ExpansionParams { max_synonyms_per_term: 20, max_depth: 2, depth_decay: 0.5 };
    let expanded = strategy.expand_query(&terms(&["car"]), &params);
    assert!(close(expanded.weight("motor vehicle"), 0.8));
    assert!(close(expanded.weight("cab"), 0.7));
    assert!(close(expanded.weight("automotive vehicle"), 0.5));
    assert!(close(expanded.weight("self-propelled vehicle"), 0.4));
    assert!(close(expanded.weight("truck"), 0.35));
    assert!(close(expanded.weight("car"), 1.0));
}

#[test]
fn zero_depth_and_unknown_words_leave_query_unexpanded() {
    let strategy = ContextAwareStrategy::new(network());
    let none = ExpansionParams { max_depth: 0, ..ExpansionParams::default() };
    let query = terms(&["car"]);
    assert_eq!(strategy.expand_query(&query, &none), ExpandedQuery::unexpanded(&query));

    let unknown = terms(&["zebra", "Quagga"]);
    let expanded = strategy.expand_query(&unknown, &ExpansionParams::default());
    assert_eq!(expanded, ExpandedQuery::unexpanded(&unknown));
    assert!(close(expanded.expansion_weight_total(), 0.0));
}

#[tokio::test]
async fn lexicon_loads_from_disk() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = dir.path().join("lexicon.json");
    std::fs::write(&path, SAMPLE).expect("write");
    let lexicon = InMemoryLexicon::load(&path).await.expect("load");
    assert_eq!(lexicon.len(), 5);
    assert_eq!(lexicon.synsets("Design Pattern").len(), 1);
}
