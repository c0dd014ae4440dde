//! Retrieval-quality metrics against relevance judgments.
//!
//! When no judgment exists for a query, the first [`FALLBACK_TOP_K`] results
//! stand in as ground truth. Metrics computed that way are self-referential
//! and are tagged [`JudgmentSource::TopKFallback`] on the returned record.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::corpus::{title_lookup, Document};
use crate::dispatch::SearchHit;
use crate::DocId;

/// Results promoted to ground truth when a query has no judgment.
pub const FALLBACK_TOP_K: usize = 5;

/// Lowercase query → relevant doc ids, as supplied by an external judge.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelevanceJudgments(HashMap<String, Vec<DocId>>);

impl RelevanceJudgments {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, query: &str, relevant: Vec<DocId>) {
        self.0.insert(judgment_key(query), relevant);
    }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Judged relevant set for `query`, if a non-empty one exists.
    pub fn relevant_for(&self, query: &str) -> Option<HashSet<DocId>> {
        self.0
            .get(&judgment_key(query))
            .filter(|ids| !ids.is_empty())
            .map(|ids| ids.iter().copied().collect())
    }
}

fn judgment_key(query: &str) -> String { query.trim().to_lowercase() }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgmentSource {
    External,
    TopKFallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub accuracy: f64,
    pub relevant_found: usize,
    pub total_relevant: usize,
    pub judgment: JudgmentSource,
}

fn round2(x: f64) -> f64 { (x * 100.0).round() / 100.0 }

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

/// Score `results` for `query`. Results are tied back to corpus ids by title.
pub fn evaluate(query: &str, results: &[SearchHit], docs: &[Document], judgments: &RelevanceJudgments) -> Evaluation {
    let by_title = title_lookup(docs);
    let mut retrieved_ordered: Vec<DocId> = Vec::with_capacity(results.len());
    for hit in results {
        match by_title.get(hit.doc.title.as_str()) {
            Some(&id) => retrieved_ordered.push(id),
            None => tracing::warn!(title = %hit.doc.title, "result not in corpus, ignored for evaluation"),
        }
    }

    let (relevant, judgment) = match judgments.relevant_for(query) {
        Some(relevant) => (relevant, JudgmentSource::External),
        None => {
            tracing::warn!(query, top_k = FALLBACK_TOP_K, "no relevance judgment, using top results as ground truth");
            let top = retrieved_ordered.iter().take(FALLBACK_TOP_K).copied().collect();
            (top, JudgmentSource::TopKFallback)
        }
    };
    let retrieved: HashSet<DocId> = retrieved_ordered.into_iter().collect();

    let tp = relevant.intersection(&retrieved).count();
    let fp = retrieved.difference(&relevant).count();
    let fn_ = relevant.difference(&retrieved).count();

    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall > 0.0 { 2.0 * precision * recall / (precision + recall) } else { 0.0 };
    let accuracy = ratio(tp, relevant.len());

    Evaluation {
        precision: round2(precision),
        recall: round2(recall),
        f1: round2(f1),
        accuracy: round2(accuracy),
        relevant_found: tp,
        total_relevant: relevant.len(),
        judgment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<Document> {
        (0..8).map(|i| Document::new(format!("Paper {i}"), format!("content {i}"))).collect()
    }

    fn hits(docs: &[Document], ids: &[usize]) -> Vec<SearchHit> {
        ids.iter().map(|&i| SearchHit::vector(i as DocId, &docs[i], 0.5)).collect()
    }

    #[test]
    fn scores_against_external_judgment() {
        let docs = corpus();
        let mut judgments = RelevanceJudgments::new();
        judgments.insert("Graph Theory", vec![0, 1, 2, 3]);
        let eval = evaluate("graph theory", &hits(&docs, &[0, 1, 5]), &docs, &judgments);
        assert_eq!(eval.relevant_found, 2);
        assert_eq!(eval.total_relevant, 4);
        assert_eq!(eval.precision, 0.67);
        assert_eq!(eval.recall, 0.5);
        assert_eq!(eval.f1, 0.57);
        assert_eq!(eval.accuracy, 0.5);
        assert_eq!(eval.judgment, JudgmentSource::External);
    }

    #[test]
    fn fallback_uses_top_results() {
        let docs = corpus();
        let eval = evaluate("anything", &hits(&docs, &[3, 1, 4, 0, 2, 6, 7]), &docs, &RelevanceJudgments::new());
        assert_eq!(eval.judgment, JudgmentSource::TopKFallback);
        assert_eq!(eval.total_relevant, 5);
        assert_eq!(eval.relevant_found, 5);
        assert_eq!(eval.recall, 1.0);
        assert_eq!(eval.precision, 0.71);
    }

    #[test]
    fn empty_results_give_zero_metrics() {
        let docs = corpus();
        let eval = evaluate("nothing", &[], &docs, &RelevanceJudgments::new());
        assert_eq!(eval.total_relevant, 0);
        assert_eq!(eval.accuracy, 0.0);
        assert_eq!(eval.precision, 0.0);
        assert_eq!(eval.recall, 0.0);
        assert_eq!(eval.f1, 0.0);
    }

    #[test]
    fn empty_judgment_falls_back() {
        let docs = corpus();
        let mut judgments = RelevanceJudgments::new();
        judgments.insert("q", vec![]);
        let eval = evaluate("q", &hits(&docs, &[2]), &docs, &judgments);
        assert_eq!(eval.judgment, JudgmentSource::TopKFallback);
    }

    #[test]
    fn metrics_stay_in_unit_interval() {
        let docs = corpus();
        let mut judgments = RelevanceJudgments::new();
        judgments.insert("q", vec![7]);
        for ids in [&[][..], &[7][..], &[0, 1, 2][..], &[7, 0][..]] {
            let eval = evaluate("q", &hits(&docs, ids), &docs, &judgments);
            for m in [eval.precision, eval.recall, eval.f1, eval.accuracy] {
                assert!((0.0..=1.0).contains(&m));
            }
        }
    }
}
