//! Core data model shared by indexing and retrieval
//!
//! `ChunkRecord` is the persisted metadata entry. Its serialized field names
//! (`paperTitle`, `yearPublished`, `chunk_index_in_doc`) are part of the artifact format.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title used when a document carries none
pub const UNKNOWN_TITLE: &str = "Unknown Title";

/// Grouping key for chunks whose document has no identifier
pub const UNKNOWN_DOI: &str = "Unknown DOI";

const CHUNK_NAMESPACE: Uuid = Uuid::from_u128(0x5c1e_a7d2_93b4_4f0e_8a61_2d7f_44c9_b013);

/// Input document, one row of the document table
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Document {
    #[serde(default, alias = "Doi")]
    pub doi: Option<String>,

    #[serde(default, alias = "Title")]
    pub title: Option<String>,

    #[serde(default, alias = "Source")]
    pub source: Option<String>,

    #[serde(default, alias = "Year_Published", alias = "yearPublished")]
    pub year_published: Option<i32>,

    #[serde(default, alias = "Full_Text")]
    pub full_text: Option<String>,

    #[serde(default, alias = "Reference")]
    pub reference: Option<String>,

    #[serde(default, alias = "Download_URL")]
    pub download_url: Option<String>,
}

impl Document {
    /// Document identifier, ignoring blank values
    pub fn doi(&self) -> Option<&str> {
        non_blank(self.doi.as_deref())
    }

    pub fn title(&self) -> &str {
        non_blank(self.title.as_deref()).unwrap_or(UNKNOWN_TITLE)
    }

    pub fn source(&self) -> &str {
        self.source.as_deref().unwrap_or_default()
    }

    pub fn year(&self) -> i32 {
        self.year_published.unwrap_or(0)
    }

    pub fn text(&self) -> &str {
        self.full_text.as_deref().unwrap_or_default()
    }

    /// Identifier used in logs and chunk ids: the DOI, or the title when absent
    pub fn key(&self) -> &str {
        self.doi().unwrap_or_else(|| self.title())
    }
}

/// One chunk's metadata, position-aligned with the vector index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkRecord {
    pub text: String,

    #[serde(rename = "paperTitle")]
    pub paper_title: String,

    #[serde(default)]
    pub doi: Option<String>,

    #[serde(default)]
    pub source: String,

    #[serde(rename = "yearPublished", default)]
    pub year_published: i32,

    pub chunk_index_in_doc: usize,

    /// Absent in metadata files written before chunk ids existed
    #[serde(rename = "chunkId", default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<Uuid>,
}

impl ChunkRecord {
    /// Build the record for the `ordinal`-th chunk of the document at table row `row`
    pub fn from_document(document: &Document, row: usize, ordinal: usize, text: String) -> Self {
        Self {
            text,
            paper_title: document.title().to_string(),
            doi: document.doi().map(str::to_string),
            source: document.source().to_string(),
            year_published: document.year(),
            chunk_index_in_doc: ordinal,
            chunk_id: Some(chunk_id(document.key(), row, ordinal)),
        }
    }

    pub fn doi(&self) -> Option<&str> {
        non_blank(self.doi.as_deref())
    }

    pub fn token_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Deterministic chunk identifier, stable across rebuilds of the same document set
pub fn chunk_id(document_key: &str, row: usize, ordinal: usize) -> Uuid {
    let name = format!("{}:{}:{}", row, document_key, ordinal);
    Uuid::new_v5(&CHUNK_NAMESPACE, name.as_bytes())
}

/// A chunk returned by a search, with its distance to the query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    #[serde(flatten)]
    pub chunk: ChunkRecord,

    /// Position in the index and metadata list
    pub position: usize,

    /// Squared Euclidean distance (lower = more similar)
    pub distance: f32,

    /// 1-based rank by distance within the list that produced it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<usize>,
}

/// Mapping from a citation index to its source document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CitationEntry {
    /// 1-based citation index
    pub index: usize,
    pub title: String,
    pub doi: Option<String>,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
