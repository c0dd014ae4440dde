//! TF-IDF vector-space ranking over the whole corpus.
//!
//! The model is fit from the corpus alone (it never reads the positional
//! index): raw term counts weighted by smoothed idf `ln((1 + n) / (1 + df)) + 1`,
//! each row L2-normalized, so a dot product with a normalized query is the
//! cosine similarity.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::corpus::Document;
use crate::tokenizer::normalize;
use crate::DocId;

/// Similarities at or below this are not returned.
pub const SIMILARITY_FLOOR: f32 = 0.05;
/// Characters of abstract (or title) kept in a result preview.
pub const SNIPPET_CHARS: usize = 200;

type SparseVec = Vec<(usize, f32)>;

#[derive(Debug, Default)]
pub struct VectorModel {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f32>,
    rows: Vec<SparseVec>,
}

fn l2_normalize(v: &mut SparseVec) {
    let norm = v.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
    if norm > 0.0 {
        for (_, w) in v.iter_mut() {
            *w /= norm;
        }
    }
}

impl VectorModel {
    pub fn fit(docs: &[Document]) -> Self {
        let tokenized: Vec<Vec<String>> = docs.iter().map(|d| normalize(d.indexed_text())).collect();

        let mut df: BTreeMap<&str, u32> = BTreeMap::new();
        for tokens in &tokenized {
            let mut seen: Vec<&str> = tokens.iter().map(String::as_str).collect();
            seen.sort_unstable();
            seen.dedup();
            for term in seen {
                *df.entry(term).or_insert(0) += 1;
            }
        }

        let n = docs.len() as f32;
        let mut vocabulary = HashMap::with_capacity(df.len());
        let mut idf = Vec::with_capacity(df.len());
        // BTreeMap order gives a sorted, reproducible feature layout.
        for (col, (term, df_t)) in df.iter().enumerate() {
            vocabulary.insert((*term).to_string(), col);
            idf.push(((1.0 + n) / (1.0 + *df_t as f32)).ln() + 1.0);
        }

        let rows = tokenized
            .iter()
            .map(|tokens| {
                let mut counts: BTreeMap<usize, u32> = BTreeMap::new();
                for term in tokens {
                    if let Some(&col) = vocabulary.get(term) {
                        *counts.entry(col).or_insert(0) += 1;
                    }
                }
                let mut row: SparseVec = counts.into_iter().map(|(col, tf)| (col, tf as f32 * idf[col])).collect();
                l2_normalize(&mut row);
                row
            })
            .collect();

        tracing::debug!(num_docs = docs.len(), num_features = idf.len(), "fitted tf-idf model");
        Self { vocabulary, idf, rows }
    }

    pub fn num_features(&self) -> usize { self.idf.len() }

    pub fn num_docs(&self) -> usize { self.rows.len() }

    /// Vectorize `query` with the fitted vocabulary; unknown terms are dropped.
    pub fn transform(&self, query: &str) -> HashMap<usize, f32> {
        let mut counts: BTreeMap<usize, u32> = BTreeMap::new();
        for term in normalize(query) {
            if let Some(&col) = self.vocabulary.get(&term) {
                *counts.entry(col).or_insert(0) += 1;
            }
        }
        let mut v: SparseVec = counts.into_iter().map(|(col, tf)| (col, tf as f32 * self.idf[col])).collect();
        l2_normalize(&mut v);
        v.into_iter().collect()
    }

    /// Cosine similarity of `query` against every document, best first, above
    /// [`SIMILARITY_FLOOR`], at most `k`.
    pub fn rank(&self, query: &str, k: usize) -> Vec<(DocId, f32)> {
        if self.num_features() == 0 || k == 0 {
            return Vec::new();
        }
        let q = self.transform(query);
        if q.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<(DocId, f32)> = self
            .rows
            .iter()
            .enumerate()
            .map(|(doc_id, row)| {
                let sim = row.iter().filter_map(|(col, w)| q.get(col).map(|qw| qw * w)).sum::<f32>();
                (doc_id as DocId, sim)
            })
            .filter(|&(_, sim)| sim > SIMILARITY_FLOOR)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        scored
    }
}

/// Preview text for a vector hit: the abstract, or the title when there is none.
pub fn snippet(doc: &Document) -> String {
    let source = if doc.abstract_text.trim().is_empty() { &doc.title } else { &doc.abstract_text };
    let mut preview: String = source.chars().take(SNIPPET_CHARS).collect();
    if source.chars().nth(SNIPPET_CHARS).is_some() {
        preview.push_str("...");
    }
    preview
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<Document> {
        vec![
            Document::new("Deep Learning for NLP", "deep learning natural language process"),
            Document::new("Graph Theory Basics", "graph theory basic algorithm"),
            Document::new("Graph Learning", "learning on graph structures with deep models"),
        ]
    }

    #[test]
    fn ranks_by_cosine() {
        let model = VectorModel::fit(&corpus());
        let hits = model.rank("graph algorithm", 10);
        assert_eq!(hits[0].0, 1);
        assert!(hits.iter().all(|&(_, s)| s > SIMILARITY_FLOOR && s <= 1.0 + 1e-6));
    }

    #[test]
    fn identical_text_scores_one() {
        let model = VectorModel::fit(&corpus());
        let hits = model.rank("graph theory basic algorithm", 1);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].1 - 1.0).abs() < 1e-5);
    }

    #[test]
    fn unknown_terms_return_nothing() {
        let model = VectorModel::fit(&corpus());
        assert!(model.rank("unrelated term", 10).is_empty());
        assert!(model.rank("the of and", 10).is_empty());
    }

    #[test]
    fn empty_corpus_is_not_an_error() {
        let model = VectorModel::fit(&[]);
        assert_eq!(model.num_features(), 0);
        assert!(model.rank("anything", 10).is_empty());
    }

    #[test]
    fn snippet_prefers_abstract() {
        let mut doc = Document::new("Short Title", "body");
        assert_eq!(snippet(&doc), "Short Title");
        doc.abstract_text = "x".repeat(250);
        let s = snippet(&doc);
        assert_eq!(s.chars().count(), SNIPPET_CHARS + 3);
        assert!(s.ends_with("..."));
    }
}
