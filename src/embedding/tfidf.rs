//! TF-IDF embedding backend (spec §4.2, default).
//!
//! Vocabulary and IDF are built fresh per optimization pass (spec §5:
//! "computed once per (W, fold) and not shared across tasks — cheap to
//! rebuild; avoids lock contention").

use super::{l2_normalize, EmbeddingBackend, EmbeddingMatrix};
use std::collections::HashMap;

/// Default TF-IDF backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct TfIdfBackend;

impl EmbeddingBackend for TfIdfBackend {
    fn embed(&self, token_lists: &[Vec<String>]) -> EmbeddingMatrix {
        embed_tfidf(token_lists)
    }
}

/// Build L2-normalized TF-IDF rows over `token_lists` (one list per
/// request, already deduplicated for vocabulary purposes by the caller —
/// term frequency itself uses the raw, non-deduplicated counts the caller
/// supplies in the same lists; see `tokenizer::tokenize_raw`).
#[must_use]
pub fn embed_tfidf(token_lists: &[Vec<String>]) -> EmbeddingMatrix {
    let n = token_lists.len();

    // Document frequency: number of requests containing each token at
    // least once (membership, not count).
    let mut doc_freq: HashMap<&str, usize> = HashMap::new();
    for tokens in token_lists {
        let mut seen = std::collections::HashSet::new();
        for t in tokens {
            if seen.insert(t.as_str()) {
                *doc_freq.entry(t.as_str()).or_insert(0) += 1;
            }
        }
    }

    // Vocabulary: token -> column index, insertion order stable across
    // runs because it only depends on the input order (spec §5 determinism).
    let mut vocab: HashMap<&str, usize> = HashMap::new();
    for tokens in token_lists {
        for t in tokens {
            let next = vocab.len();
            vocab.entry(t.as_str()).or_insert(next);
        }
    }

    let idf: HashMap<&str, f64> = vocab
        .keys()
        .map(|&t| {
            let df = *doc_freq.get(t).unwrap_or(&0) as f64;
            let value = ((1.0 + n as f64) / (1.0 + df)).ln() + 1.0;
            (t, value)
        })
        .collect();

    let dim = vocab.len();
    let mut rows = Vec::with_capacity(n);

    for tokens in token_lists {
        let mut row = vec![0.0f32; dim];
        let mut tf: HashMap<&str, usize> = HashMap::new();
        for t in tokens {
            *tf.entry(t.as_str()).or_insert(0) += 1;
        }
        for (term, count) in tf {
            if let (Some(&col), Some(&idf_value)) = (vocab.get(term), idf.get(term)) {
                row[col] = (count as f64 * idf_value) as f32;
            }
        }
        l2_normalize(&mut row);
        rows.push(row);
    }

    EmbeddingMatrix::new(rows)
}

/// Whether a vocabulary built from `token_lists` would be empty — the
/// `EmbeddingDegenerate` condition (spec §7).
#[must_use]
pub fn vocabulary_is_empty(token_lists: &[Vec<String>]) -> bool {
    token_lists.iter().all(std::vec::Vec::is_empty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_l2_normalized() {
        let lists = vec![
            vec!["a".to_string(), "a".to_string(), "b".to_string()],
            vec!["b".to_string(), "c".to_string()],
        ];
        let m = embed_tfidf(&lists);
        for i in 0..m.len() {
            let norm: f32 = (0..m.row(i).len()).map(|j| m.row(i)[j] * m.row(i)[j]).sum();
            assert!(norm < 1e-6 || (norm - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn empty_token_request_yields_zero_row() {
        let lists = vec![vec!["a".to_string()], vec![]];
        let m = embed_tfidf(&lists);
        assert!(m.is_zero_row(1));
    }

    #[test]
    fn identical_requests_are_maximally_similar() {
        let tokens = vec!["api".to_string(), "weather".to_string(), "today".to_string()];
        let lists = vec![tokens.clone(), tokens];
        let m = embed_tfidf(&lists);
        assert!((m.cosine(0, 1) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn disjoint_vocabularies_are_dissimilar() {
        let lists = vec![
            vec!["weather".to_string(), "forecast".to_string()],
            vec!["stocks".to_string(), "ticker".to_string()],
        ];
        let m = embed_tfidf(&lists);
        assert!(m.cosine(0, 1).abs() < 1e-6);
    }

    #[test]
    fn vocabulary_empty_detection() {
        assert!(vocabulary_is_empty(&[vec![], vec![]]));
        assert!(!vocabulary_is_empty(&[vec![], vec!["x".to_string()]]));
    }
}
