//! In-memory Okapi BM25 over a collection's lexical corpus.
//!
//! The model is rebuilt from the full corpus on every query; there is no
//! cache to invalidate when the corpus file changes underneath us.

use std::collections::HashMap;

const K1: f64 = 1.2;
const B: f64 = 0.75;

/// Corpus/query tokenizer: lowercase, every non `[a-zA-Z0-9]` character is a
/// separator. Indexing and scoring must tokenize identically for the ranking
/// to be valid.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_string())
        .collect()
}

pub struct Bm25Model {
    doc_lens: Vec<usize>,
    avg_len: f64,
    /// term -> (document index, term frequency)
    postings: HashMap<String, Vec<(usize, u32)>>,
    doc_count: usize,
}

impl Bm25Model {
    /// Build term statistics for `documents`; scoring indexes align with the
    /// slice passed here.
    pub fn fit(documents: &[String]) -> Self {
        let mut doc_lens = Vec::with_capacity(documents.len());
        let mut postings: HashMap<String, Vec<(usize, u32)>> = HashMap::new();
        let mut total_tokens = 0usize;

        for (doc, text) in documents.iter().enumerate() {
            let tokens = tokenize(text);
            doc_lens.push(tokens.len());
            total_tokens += tokens.len();

            let mut term_freqs: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *term_freqs.entry(token).or_insert(0) += 1;
            }
            for (term, freq) in term_freqs {
                postings.entry(term).or_default().push((doc, freq));
            }
        }

        let doc_count = documents.len();
        let avg_len = if doc_count > 0 { total_tokens as f64 / doc_count as f64 } else { 0.0 };
        Self { doc_lens, avg_len, postings, doc_count }
    }

    pub fn is_empty(&self) -> bool {
        self.doc_count == 0
    }

    /// Score every fitted document against `query`. Documents sharing no
    /// term with the query score zero.
    pub fn score_all(&self, query: &str) -> Vec<f64> {
        let mut scores = vec![0.0; self.doc_count];
        if self.doc_count == 0 || self.avg_len <= 0.0 {
            return scores;
        }
        for token in tokenize(query) {
            let Some(postings) = self.postings.get(&token) else { continue };
            let n = postings.len() as f64;
            let idf = ((self.doc_count as f64 - n + 0.5) / (n + 0.5) + 1.0).ln();
            for &(doc, tf) in postings {
                let tf = tf as f64;
                let len_norm = 1.0 - B + B * (self.doc_lens[doc] as f64 / self.avg_len);
                scores[doc] += idf * (tf * (K1 + 1.0)) / (tf + K1 * len_norm);
            }
        }
        scores
    }

    /// Rank documents with positive scores, best first, truncated to `top_k`.
    pub fn rank(&self, query: &str, top_k: usize) -> Vec<(usize, f64)> {
        let mut ranked: Vec<(usize, f64)> = self
            .score_all(query)
            .into_iter()
            .enumerate()
            .filter(|(_, score)| *score > 0.0)
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(top_k);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn tokenize_lowercases_and_splits_on_non_alphanumerics() {
        assert_eq!(tokenize("Hello, World! A-1"), vec!["hello", "world", "a", "1"]);
        assert_eq!(tokenize("...!!!"), Vec::<String>::new());
        assert_eq!(tokenize(""), Vec::<String>::new());
    }

    #[test]
    fn single_character_tokens_survive() {
        // The tokenizer has no minimum token length.
        assert_eq!(tokenize("a b c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn best_lexical_match_ranks_first() {
        let model = Bm25Model::fit(&corpus(&[
            "The quick brown fox jumps over the lazy dog",
            "The lazy cat sleeps all day",
            "Quick brown cats are rare",
        ]));
        let ranked = model.rank("lazy cat", 10);
        assert!(!ranked.is_empty());
        assert_eq!(ranked[0].0, 1);
    }

    #[test]
    fn documents_without_query_terms_are_dropped() {
        let model = Bm25Model::fit(&corpus(&["alpha beta", "gamma delta", "alpha gamma"]));
        let ranked = model.rank("alpha", 10);
        let docs: Vec<usize> = ranked.iter().map(|(d, _)| *d).collect();
        assert!(docs.contains(&0));
        assert!(docs.contains(&2));
        assert!(!docs.contains(&1));
        for (_, score) in ranked {
            assert!(score > 0.0);
        }
    }

    #[test]
    fn empty_corpus_and_empty_query_score_nothing() {
        let empty = Bm25Model::fit(&[]);
        assert!(empty.is_empty());
        assert!(empty.rank("anything", 5).is_empty());

        let model = Bm25Model::fit(&corpus(&["some text"]));
        assert!(model.rank("", 5).is_empty());
        assert!(model.rank("!!!", 5).is_empty());
    }

    #[test]
    fn rank_truncates_to_top_k() {
        let docs: Vec<String> = (0..20).map(|i| format!("shared term document {i}")).collect();
        let model = Bm25Model::fit(&docs);
        assert_eq!(model.rank("shared", 5).len(), 5);
    }
}
