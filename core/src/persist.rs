use crate::eval::RelevanceJudgments;
use crate::index::PositionalIndex;
use anyhow::{Context, Result};
use bincode;
use serde::{Deserialize, Serialize};
use std::fs::{self, create_dir_all, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub num_docs: u32,
    pub num_terms: usize,
    /// Fingerprint of the corpus snapshot the index was built from.
    pub corpus_fingerprint: String,
    pub created_at: String,
}

impl IndexMeta {
    pub fn for_index(index: &PositionalIndex) -> Self {
        let created_at = time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default();
        Self {
            num_docs: index.num_docs,
            num_terms: index.num_terms(),
            corpus_fingerprint: index.corpus_fingerprint.clone(),
            created_at,
        }
    }
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn positional(&self) -> PathBuf { self.root.join("positional.bin") }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

/// Write `bytes` next to `path` and rename over it, so readers see the old file or the new one.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut f = File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

/// Persist the index and its meta as a full overwrite. Both files carry the
/// corpus fingerprint; `load_index` refuses a pair where they differ.
pub fn save_index(paths: &IndexPaths, index: &PositionalIndex, meta: &IndexMeta) -> Result<()> {
    create_dir_all(&paths.root).with_context(|| format!("creating index dir {}", paths.root.display()))?;
    let bytes = bincode::serialize(index)?;
    write_atomic(&paths.positional(), &bytes)?;
    let json = serde_json::to_string_pretty(meta)?;
    write_atomic(&paths.meta(), json.as_bytes())?;
    tracing::info!(root = %paths.root.display(), bytes = bytes.len(), "saved positional index");
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<Option<IndexMeta>> {
    let path = paths.meta();
    if !path.exists() {
        return Ok(None);
    }
    let mut buf = String::new();
    File::open(&path)
        .with_context(|| format!("opening {}", path.display()))?
        .read_to_string(&mut buf)?;
    let meta = serde_json::from_str(&buf).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(meta))
}

/// Load the persisted index, or `None` when it has never been built or the
/// two files come from different snapshots.
pub fn load_index(paths: &IndexPaths) -> Result<Option<(PositionalIndex, IndexMeta)>> {
    let Some(meta) = load_meta(paths)? else { return Ok(None) };
    let path = paths.positional();
    if !path.exists() {
        return Ok(None);
    }
    let mut buf = Vec::new();
    File::open(&path)
        .with_context(|| format!("opening {}", path.display()))?
        .read_to_end(&mut buf)?;
    let index: PositionalIndex =
        bincode::deserialize(&buf).with_context(|| format!("decoding {}", path.display()))?;
    if index.corpus_fingerprint != meta.corpus_fingerprint {
        tracing::warn!(root = %paths.root.display(), "index and meta disagree on corpus fingerprint, ignoring");
        return Ok(None);
    }
    Ok(Some((index, meta)))
}

/// Read the relevance-judgment mapping. A missing file means no judgments.
pub fn load_judgments<P: AsRef<Path>>(path: P) -> Result<RelevanceJudgments> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no relevance judgments");
        return Ok(RelevanceJudgments::default());
    }
    let f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let judgments = serde_json::from_reader(BufReader::new(f))
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(judgments)
}
