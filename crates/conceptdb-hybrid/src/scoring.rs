//! Per-candidate component scores, each in [0, 1].

use std::collections::{HashMap, HashSet};

use conceptdb_lexical::ExpandedQuery;

pub const BM25_K1: f32 = 1.2;
pub const BM25_B: f32 = 0.75;

pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Tokens joined by single spaces and padded, so phrase lookups can use
/// `contains(" a b ")` without matching inside words.
fn padded(tokens: &[String]) -> String {
    format!(" {} ", tokens.join(" "))
}

fn contains_phrase(padded_text: &str, phrase: &str) -> bool {
    let tokens = tokenize(phrase);
    !tokens.is_empty() && padded_text.contains(&padded(&tokens))
}

#[allow(clippy::cast_precision_loss)]
fn as_f32(n: usize) -> f32 {
    n as f32
}

/// BM25 over the candidate set, scaled so the best candidate scores 1.0.
pub fn bm25_scores(terms: &[String], documents: &[Vec<String>]) -> Vec<f32> {
    if documents.is_empty() || terms.is_empty() {
        return vec![0.0; documents.len()];
    }
    let n = as_f32(documents.len());
    let avg_len = (as_f32(documents.iter().map(Vec::len).sum::<usize>()) / n).max(1.0);
    let unique_terms: HashSet<&String> = terms.iter().collect();

    let mut idf: HashMap<&String, f32> = HashMap::new();
    for term in &unique_terms {
        let df = as_f32(documents.iter().filter(|d| d.contains(*term)).count());
        idf.insert(*term, (1.0 + (n - df + 0.5) / (df + 0.5)).ln());
    }

    let raw: Vec<f32> = documents
        .iter()
        .map(|doc| {
            let len = as_f32(doc.len());
            unique_terms
                .iter()
                .map(|term| {
                    let count = doc.iter().filter(|t| *t == *term).count();
                    if count == 0 {
                        return 0.0;
                    }
                    let tf = as_f32(count);
                    let norm = BM25_K1 * (1.0 - BM25_B + BM25_B * len / avg_len);
                    idf[term] * tf * (BM25_K1 + 1.0) / (tf + norm)
                })
                .sum()
        })
        .collect();

    let best = raw.iter().copied().fold(0.0_f32, f32::max);
    if best <= 0.0 {
        return vec![0.0; documents.len()];
    }
    raw.into_iter().map(|s| s / best).collect()
}

/// Cosine distance in [0, 2] mapped to a similarity in [0, 1].
pub fn vector_score(distance: f32) -> f32 {
    if distance.is_finite() {
        (1.0 - distance).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// 1.0 when the whole query occurs in the title, else the share of query
/// terms that do.
pub fn title_score(terms: &[String], title: &str) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }
    let title_tokens = tokenize(title);
    let haystack = padded(&title_tokens);
    if haystack.contains(&padded(terms)) {
        return 1.0;
    }
    let hits = terms.iter().filter(|t| title_tokens.contains(t)).count();
    as_f32(hits) / as_f32(terms.len())
}

/// Expansion weight found in `tokens` over the total expansion weight.
pub fn expansion_score(expanded: &ExpandedQuery, tokens: &[String]) -> f32 {
    let total = expanded.expansion_weight_total();
    if total <= 0.0 {
        return 0.0;
    }
    let haystack = padded(tokens);
    let found: f32 = expanded
        .expansion_terms()
        .filter(|(term, _)| contains_phrase(&haystack, term))
        .map(|(_, w)| w)
        .sum();
    (found / total).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<String> {
        tokenize(s)
    }

    #[test]
    fn bm25_prefers_rare_terms_and_scales_to_one() {
        let docs = vec![
            toks("the observer pattern notifies observers"),
            toks("the visitor pattern"),
            toks("nothing here at all"),
        ];
        let scores = bm25_scores(&toks("observer pattern"), &docs);
        assert!((scores[0] - 1.0).abs() < 1e-6);
        assert!(scores[1] > 0.0 && scores[1] < scores[0]);
        assert!(scores[2].abs() < f32::EPSILON);
        assert_eq!(bm25_scores(&toks("absent"), &docs), vec![0.0; 3]);
    }

    #[test]
    fn vector_and_title_scores() {
        assert!((vector_score(0.25) - 0.75).abs() < f32::EPSILON);
        assert!(vector_score(1.7).abs() < f32::EPSILON);
        assert!(vector_score(f32::NAN).abs() < f32::EPSILON);
        assert!((title_score(&toks("clean architecture"), "/books/Clean Architecture.pdf") - 1.0).abs() < f32::EPSILON);
        assert!((title_score(&toks("architecture patterns"), "Clean Architecture") - 0.5).abs() < f32::EPSILON);
        assert!(title_score(&[], "anything").abs() < f32::EPSILON);
    }

    #[test]
    fn expansion_counts_phrases_by_weight() {
        let mut expanded = ExpandedQuery::unexpanded(&["car".to_string()]);
        expanded.weights.insert("motor vehicle".into(), 0.8);
        expanded.weights.insert("auto".into(), 1.0);
        expanded.weights.insert("cab".into(), 0.2);
        let score = expansion_score(&expanded, &toks("a motor vehicle and a cabinet"));
        assert!((score - 0.4).abs() < 1e-6);
        assert!(expansion_score(&ExpandedQuery::unexpanded(&[]), &toks("car")).abs() < f32::EPSILON);
    }
}
