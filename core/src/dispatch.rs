//! Query dispatch: phrase search first when the query looks like a phrase,
//! TF-IDF ranking otherwise or when the phrase finds nothing.

use anyhow::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::corpus::{fingerprint, Document};
use crate::index::PositionalIndex;
use crate::persist::{load_index, save_index, IndexMeta, IndexPaths};
use crate::phrase::phrase_search;
use crate::tokenizer::normalize;
use crate::vector::{snippet, VectorModel};
use crate::DocId;

/// Which strategy produced a result list. Reported to callers as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Phrase,
    Vector,
}

/// A document plus how it scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub doc_id: DocId,
    #[serde(flatten)]
    pub doc: Document,
    pub relevancy_score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phrase_matches: Option<u32>,
}

impl SearchHit {
    pub fn phrase(doc_id: DocId, doc: &Document, score: f32, matches: u32) -> Self {
        Self { doc_id, doc: doc.clone(), relevancy_score: score, snippet: None, phrase_matches: Some(matches) }
    }

    pub fn vector(doc_id: DocId, doc: &Document, score: f32) -> Self {
        Self { doc_id, doc: doc.clone(), relevancy_score: score, snippet: Some(snippet(doc)), phrase_matches: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub mode: SearchMode,
    pub results: Vec<SearchHit>,
}

/// True when the raw query is wrapped in double quotes.
pub fn is_quoted(raw: &str) -> bool {
    let raw = raw.trim();
    raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"')
}

/// A corpus snapshot with its positional index and a lazily fitted vector model.
pub struct SearchEngine {
    paths: IndexPaths,
    docs: Vec<Document>,
    fingerprint: String,
    index: PositionalIndex,
    meta: IndexMeta,
    vectors: Mutex<Option<(String, Arc<VectorModel>)>>,
}

/// Build the index for `docs` and persist it, replacing whatever was on disk.
pub fn build_and_save(paths: &IndexPaths, docs: &[Document]) -> Result<(PositionalIndex, IndexMeta)> {
    let index = PositionalIndex::build(docs);
    let meta = IndexMeta::for_index(&index);
    save_index(paths, &index, &meta)?;
    Ok((index, meta))
}

impl SearchEngine {
    /// Use the persisted index if it was built from this exact corpus, otherwise rebuild it.
    pub fn open(paths: IndexPaths, docs: Vec<Document>) -> Result<Self> {
        let fp = fingerprint(&docs);
        let (index, meta) = match load_index(&paths)? {
            Some((index, meta)) if meta.corpus_fingerprint == fp => {
                tracing::info!(num_docs = meta.num_docs, num_terms = meta.num_terms, "loaded positional index");
                (index, meta)
            }
            Some(_) => {
                tracing::info!("positional index is stale for this corpus, rebuilding");
                build_and_save(&paths, &docs)?
            }
            None => {
                tracing::info!("no positional index on disk, building");
                build_and_save(&paths, &docs)?
            }
        };
        Ok(Self { paths, docs, fingerprint: fp, index, meta, vectors: Mutex::new(None) })
    }

    /// Swap in a new corpus snapshot and rebuild the index wholesale.
    pub fn rebuild(&mut self, docs: Vec<Document>) -> Result<&IndexMeta> {
        let (index, meta) = build_and_save(&self.paths, &docs)?;
        self.fingerprint = meta.corpus_fingerprint.clone();
        self.docs = docs;
        self.index = index;
        self.meta = meta;
        *self.vectors.lock() = None;
        Ok(&self.meta)
    }

    pub fn docs(&self) -> &[Document] { &self.docs }

    pub fn index(&self) -> &PositionalIndex { &self.index }

    pub fn meta(&self) -> &IndexMeta { &self.meta }

    fn vector_model(&self) -> Arc<VectorModel> {
        let mut cached = self.vectors.lock();
        if let Some((fp, model)) = cached.as_ref() {
            if *fp == self.fingerprint {
                return Arc::clone(model);
            }
        }
        let model = Arc::new(VectorModel::fit(&self.docs));
        *cached = Some((self.fingerprint.clone(), Arc::clone(&model)));
        model
    }

    /// Answer `query` with at most `k` results, tagging the strategy used.
    pub fn search(&self, query: &str, k: usize) -> SearchOutcome {
        let tokens = normalize(query);
        if tokens.len() > 1 || (is_quoted(query) && !tokens.is_empty()) {
            let hits = phrase_search(&self.index, &tokens, k);
            if !hits.is_empty() {
                tracing::debug!(query, hits = hits.len(), "dispatched to phrase search");
                let results = hits
                    .into_iter()
                    .filter_map(|h| {
                        self.docs.get(h.doc_id as usize).map(|doc| SearchHit::phrase(h.doc_id, doc, h.score, h.matches))
                    })
                    .collect();
                return SearchOutcome { mode: SearchMode::Phrase, results };
            }
        }

        let model = self.vector_model();
        let results: Vec<SearchHit> = model
            .rank(query, k)
            .into_iter()
            .filter_map(|(doc_id, score)| self.docs.get(doc_id as usize).map(|doc| SearchHit::vector(doc_id, doc, score)))
            .collect();
        tracing::debug!(query, hits = results.len(), "dispatched to vector ranking");
        SearchOutcome { mode: SearchMode::Vector, results }
    }
}
