//! Corpus snapshot loading.
//!
//! A corpus is the ordered list of publication records produced by the
//! acquisition side. A document's id is its position in the loaded list, so a
//! reload invalidates every id handed out before it.

use anyhow::{bail, Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::Date;
use walkdir::WalkDir;

use crate::DocId;

lazy_static! {
    static ref YEAR: Regex = Regex::new(r"\b(?:19|20)\d{2}\b").expect("valid regex");
}

/// A crawled publication record. Only `title` is required on input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, rename = "abstract")]
    pub abstract_text: String,
    #[serde(default)]
    pub year: String,
    #[serde(default, deserialize_with = "lenient_year")]
    pub year_only: Option<i32>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub author_profiles: Vec<String>,
    #[serde(default)]
    pub keywords: String,
    #[serde(default)]
    pub fingerprints: String,
    #[serde(default)]
    pub pub_link: String,
    #[serde(default)]
    pub doi: String,
    #[serde(default)]
    pub pdf_link: String,
    #[serde(default)]
    pub last_crawled: String,
}

impl Document {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self { title: title.into(), content: content.into(), ..Self::default() }
    }

    /// Text fed to the normalizer for indexing; falls back to the title when there is no content.
    pub fn indexed_text(&self) -> &str {
        if self.content.trim().is_empty() { &self.title } else { &self.content }
    }
}

// Crawlers emit year_only as a number, a numeric string, "", "N/A" or null.
fn lenient_year<'de, D>(deserializer: D) -> std::result::Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Pull a publication year out of a free-form date string.
pub fn extract_year(raw: &str) -> Option<i32> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let formats = [
        format_description!("[day padding:none] [month repr:short] [year]"),
        format_description!("[day padding:none] [month repr:long] [year]"),
        format_description!("[year]-[month]-[day]"),
        format_description!("[day]/[month]/[year]"),
        format_description!("[month]/[day]/[year]"),
    ];
    for fmt in formats {
        if let Ok(date) = Date::parse(raw, fmt) {
            return Some(date.year());
        }
    }
    if raw.len() == 4 {
        if let Ok(year) = raw.parse() {
            return Some(year);
        }
    }
    YEAR.find(raw).and_then(|m| m.as_str().parse().ok())
}

/// Load the corpus from a JSON array, a single JSON object, a JSONL file, or a
/// directory of those (walked in file-name order).
pub fn load_corpus<P: AsRef<Path>>(path: P) -> Result<Vec<Document>> {
    let path = path.as_ref();
    let mut files: Vec<PathBuf> = Vec::new();
    if path.is_dir() {
        for entry in WalkDir::new(path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
    } else if path.is_file() {
        files.push(path.to_path_buf());
    } else {
        tracing::warn!(path = %path.display(), "corpus not found, starting empty");
    }

    let mut docs = Vec::new();
    for file in files {
        if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            read_jsonl(&file, &mut docs)?;
        } else {
            read_json(&file, &mut docs)?;
        }
    }
    for doc in docs.iter_mut() {
        if doc.year_only.is_none() {
            doc.year_only = extract_year(&doc.year);
        }
    }
    tracing::info!(num_docs = docs.len(), path = %path.display(), "loaded corpus");
    Ok(docs)
}

fn read_jsonl(file: &Path, docs: &mut Vec<Document>) -> Result<()> {
    let f = File::open(file).with_context(|| format!("opening corpus file {}", file.display()))?;
    for (lineno, line) in BufReader::new(f).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let doc: Document = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid document", file.display(), lineno + 1))?;
        docs.push(doc);
    }
    Ok(())
}

fn read_json(file: &Path, docs: &mut Vec<Document>) -> Result<()> {
    let f = File::open(file).with_context(|| format!("opening corpus file {}", file.display()))?;
    let json: serde_json::Value = serde_json::from_reader(BufReader::new(f))
        .with_context(|| format!("parsing corpus file {}", file.display()))?;
    match json {
        serde_json::Value::Array(arr) => {
            for (i, v) in arr.into_iter().enumerate() {
                let doc = serde_json::from_value(v)
                    .with_context(|| format!("{}: invalid document at index {}", file.display(), i))?;
                docs.push(doc);
            }
        }
        serde_json::Value::Object(_) => {
            let doc = serde_json::from_value(json)
                .with_context(|| format!("{}: invalid document", file.display()))?;
            docs.push(doc);
        }
        _ => bail!("{}: expected a document or an array of documents", file.display()),
    }
    Ok(())
}

/// SHA-1 over every title and indexed text, in order. Ties a persisted index to its snapshot.
pub fn fingerprint(docs: &[Document]) -> String {
    let mut hasher = Sha1::new();
    hasher.update((docs.len() as u64).to_le_bytes());
    for doc in docs {
        for field in [doc.title.as_str(), doc.indexed_text()] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
    }
    format!("{:x}", hasher.finalize())
}

/// Title → doc id. Titles are unique within a snapshot; the first occurrence wins otherwise.
pub fn title_lookup(docs: &[Document]) -> HashMap<&str, DocId> {
    let mut map = HashMap::with_capacity(docs.len());
    for (id, doc) in docs.iter().enumerate() {
        map.entry(doc.title.as_str()).or_insert(id as DocId);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_years_from_common_formats() {
        assert_eq!(extract_year("12 Mar 2021"), Some(2021));
        assert_eq!(extract_year("3 September 2019"), Some(2019));
        assert_eq!(extract_year("2018-07-01"), Some(2018));
        assert_eq!(extract_year("31/12/2015"), Some(2015));
        assert_eq!(extract_year("2020"), Some(2020));
        assert_eq!(extract_year("Published Spring 1999 issue"), Some(1999));
        assert_eq!(extract_year(""), None);
        assert_eq!(extract_year("N/A"), None);
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let doc: Document = serde_json::from_str(r#"{"title":"Only a title","year_only":"N/A"}"#).unwrap();
        assert_eq!(doc.content, "");
        assert!(doc.authors.is_empty());
        assert_eq!(doc.year_only, None);
        assert_eq!(doc.indexed_text(), "Only a title");
    }

    #[test]
    fn abstract_keeps_wire_name() {
        let doc: Document = serde_json::from_str(r#"{"title":"t","abstract":"summary","year_only":2022}"#).unwrap();
        assert_eq!(doc.abstract_text, "summary");
        assert_eq!(doc.year_only, Some(2022));
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["abstract"], "summary");
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = vec![Document::new("A", "alpha beta")];
        let b = vec![Document::new("A", "alpha gamma")];
        assert_eq!(fingerprint(&a), fingerprint(&a.clone()));
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }
}
