use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::corpus::{fingerprint, Document};
use crate::tokenizer::tokenize;
use crate::DocId;

/// Token offsets of one term inside one document, ascending.
pub type Positions = Vec<u32>;

/// doc id → positions for a single term.
pub type Posting = BTreeMap<DocId, Positions>;

/// Inverted term → document → positions map. Always rebuilt from a whole corpus.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionalIndex {
    pub postings: BTreeMap<String, Posting>,
    pub num_docs: u32,
    /// Fingerprint of the corpus the postings were built from; doc ids are only valid against it.
    pub corpus_fingerprint: String,
}

impl PositionalIndex {
    pub fn new() -> Self { Self::default() }

    /// Build the index for `docs`; each document's id is its position in the slice.
    pub fn build(docs: &[Document]) -> Self {
        let mut postings: BTreeMap<String, Posting> = BTreeMap::new();
        for (doc_id, doc) in docs.iter().enumerate() {
            let doc_id = doc_id as DocId;
            for (term, pos) in tokenize(doc.indexed_text()) {
                let posting = match postings.entry(term) {
                    Entry::Occupied(e) => e.into_mut(),
                    Entry::Vacant(e) => e.insert(Posting::new()),
                };
                let positions = match posting.entry(doc_id) {
                    Entry::Occupied(e) => e.into_mut(),
                    Entry::Vacant(e) => e.insert(Positions::new()),
                };
                positions.push(pos as u32);
            }
        }
        let index = Self { postings, num_docs: docs.len() as u32, corpus_fingerprint: fingerprint(docs) };
        tracing::info!(num_docs = index.num_docs, num_terms = index.num_terms(), "built positional index");
        index
    }

    pub fn posting(&self, term: &str) -> Option<&Posting> { self.postings.get(term) }

    pub fn num_terms(&self) -> usize { self.postings.len() }

    pub fn is_empty(&self) -> bool { self.postings.is_empty() }
}
