use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::index::{PositionalIndex, Positions};
use crate::DocId;

/// A document containing the phrase at least once.
#[derive(Debug, Clone, PartialEq)]
pub struct PhraseMatch {
    pub doc_id: DocId,
    /// Number of start positions where every phrase token follows in order.
    pub matches: u32,
    pub score: f32,
}

/// Find documents containing `tokens` at consecutive positions. Tokens must
/// already be normalized. Ranked by score, then ascending doc id.
pub fn phrase_search(index: &PositionalIndex, tokens: &[String], k: usize) -> Vec<PhraseMatch> {
    if tokens.is_empty() || k == 0 {
        return Vec::new();
    }
    let mut postings = Vec::with_capacity(tokens.len());
    for token in tokens {
        match index.posting(token) {
            Some(p) => postings.push(p),
            None => return Vec::new(),
        }
    }

    let mut candidates: BTreeSet<DocId> = postings[0].keys().copied().collect();
    for posting in &postings[1..] {
        candidates.retain(|doc_id| posting.contains_key(doc_id));
        if candidates.is_empty() {
            return Vec::new();
        }
    }

    let mut scored: Vec<PhraseMatch> = Vec::new();
    for doc_id in candidates {
        let lists: Vec<&Positions> = postings.iter().filter_map(|p| p.get(&doc_id)).collect();
        let matches = lists[0]
            .iter()
            .filter(|&&anchor| {
                lists[1..]
                    .iter()
                    .enumerate()
                    .all(|(i, positions)| positions.binary_search(&(anchor + i as u32 + 1)).is_ok())
            })
            .count() as u32;
        if matches > 0 {
            scored.push(PhraseMatch { doc_id, matches, score: matches as f32 / tokens.len() as f32 });
        }
    }

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal).then(a.doc_id.cmp(&b.doc_id)));
    scored.truncate(k);
    tracing::debug!(phrase = ?tokens, hits = scored.len(), "phrase search");
    scored
}
