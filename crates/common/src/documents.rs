//! Document table loading and download URL lookup
//!
//! The table is a JSON array of documents. It is read once per indexing run
//! and again by the citation step to resolve download links.

use crate::errors::{AppError, Result};
use crate::models::Document;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, warn};

/// Outcome of resolving a download URL for one cited document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlLookup {
    Found(String),
    /// The cited source has no document identifier
    MissingIdentifier,
    /// The identifier is absent from the table, or its row has no URL
    NotInTable,
    /// The table itself could not be read
    LookupFailed,
}

impl UrlLookup {
    pub fn url(&self) -> Option<&str> {
        match self {
            UrlLookup::Found(url) => Some(url),
            _ => None,
        }
    }
}

impl fmt::Display for UrlLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlLookup::Found(url) => f.write_str(url),
            UrlLookup::MissingIdentifier => f.write_str("URL not available (DOI missing)"),
            UrlLookup::NotInTable => f.write_str("URL not available in document table"),
            UrlLookup::LookupFailed => f.write_str("URL lookup failed (Error)"),
        }
    }
}

/// Table row that could not be read as a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    pub row: usize,
    /// DOI or title when the row carries one, else `row {n}`
    pub key: String,
    pub reason: String,
}

/// In-memory document table
#[derive(Debug, Clone, Default)]
pub struct DocumentTable {
    documents: Vec<Document>,
    urls: HashMap<String, Option<String>>,
    rejected: Vec<RejectedRow>,
}

impl DocumentTable {
    pub fn new(documents: Vec<Document>) -> Self {
        let mut urls = HashMap::new();
        for doc in &documents {
            if let Some(doi) = doc.doi() {
                let url = doc
                    .download_url
                    .as_deref()
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .map(str::to_string);
                // First row wins for duplicated identifiers
                urls.entry(doi.to_string()).or_insert(url);
            }
        }
        Self {
            documents,
            urls,
            rejected: Vec::new(),
        }
    }

    /// Load a table from a JSON file.
    ///
    /// Rows are read one by one; a malformed row is skipped and kept in
    /// [`rejected`](Self::rejected). Only an unreadable file or a
    /// top-level value that is not an array fails the load.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AppError::NotFound {
                resource_type: "document table".to_string(),
                id: path.display().to_string(),
            });
        }

        let file = File::open(path).map_err(|e| AppError::artifact(path, e))?;
        let rows: Vec<serde_json::Value> = serde_json::from_reader(BufReader::new(file))?;

        let mut documents = Vec::with_capacity(rows.len());
        let mut rejected = Vec::new();
        for (row, value) in rows.into_iter().enumerate() {
            let key = row_key(&value, row);
            match serde_json::from_value::<Document>(value) {
                Ok(document) => documents.push(document),
                Err(e) => {
                    let err = AppError::InvalidDocument {
                        key: key.clone(),
                        message: format!("row {}: {}", row, e),
                    };
                    warn!(path = %path.display(), row = row, error = %err, "Skipping malformed document row");
                    rejected.push(RejectedRow {
                        row,
                        key,
                        reason: err.to_string(),
                    });
                }
            }
        }

        debug!(
            path = %path.display(),
            documents = documents.len(),
            rejected = rejected.len(),
            "Document table loaded"
        );
        let mut table = Self::new(documents);
        table.rejected = rejected;
        Ok(table)
    }

    /// Rows skipped while loading, in file order
    pub fn rejected(&self) -> &[RejectedRow] {
        &self.rejected
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Resolve the download URL for a document identifier
    pub fn download_url(&self, doi: Option<&str>) -> UrlLookup {
        let Some(doi) = doi.map(str::trim).filter(|d| !d.is_empty()) else {
            return UrlLookup::MissingIdentifier;
        };

        match self.urls.get(doi) {
            Some(Some(url)) => UrlLookup::Found(url.clone()),
            _ => UrlLookup::NotInTable,
        }
    }
}

fn row_key(value: &serde_json::Value, row: usize) -> String {
    ["doi", "Doi", "title", "Title"]
        .iter()
        .filter_map(|field| value.get(*field)?.as_str())
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("row {}", row))
}

/// Resolves download URLs for cited documents
pub trait UrlResolver: Send + Sync {
    fn resolve(&self, doi: Option<&str>) -> UrlLookup;

    /// Resolve a batch of identifiers in order
    fn resolve_all(&self, dois: &[Option<String>]) -> Vec<UrlLookup> {
        dois.iter().map(|d| self.resolve(d.as_deref())).collect()
    }
}

impl UrlResolver for DocumentTable {
    fn resolve(&self, doi: Option<&str>) -> UrlLookup {
        self.download_url(doi)
    }
}

/// Resolver that reads the persisted table on every batch
///
/// A table that cannot be read yields `LookupFailed` for every identifier.
#[derive(Debug, Clone)]
pub struct DocumentTableFile {
    path: std::path::PathBuf,
}

impl DocumentTableFile {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl UrlResolver for DocumentTableFile {
    fn resolve(&self, doi: Option<&str>) -> UrlLookup {
        self.resolve_all(&[doi.map(str::to_string)])
            .pop()
            .unwrap_or(UrlLookup::LookupFailed)
    }

    fn resolve_all(&self, dois: &[Option<String>]) -> Vec<UrlLookup> {
        match DocumentTable::load(&self.path) {
            Ok(table) => table.resolve_all(dois),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Document table unreadable, URLs unavailable");
                dois.iter()
                    .map(|d| match d.as_deref().map(str::trim) {
                        Some(d) if !d.is_empty() => UrlLookup::LookupFailed,
                        _ => UrlLookup::MissingIdentifier,
                    })
                    .collect()
            }
        }
    }
}

/// Derive an artifact base name from a document set name.
///
/// Every character that is not ASCII alphanumeric or whitespace becomes `_`.
pub fn sanitize_base_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c.is_whitespace() { c } else { '_' })
        .collect()
}

/// Base name for the document table at `path`: its sanitized file stem
pub fn base_name_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "documents".to_string());
    sanitize_base_name(&stem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn doc(doi: Option<&str>, url: Option<&str>) -> Document {
        Document {
            doi: doi.map(str::to_string),
            title: Some("T".into()),
            download_url: url.map(str::to_string),
            full_text: Some("text".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_url_lookup_outcomes_are_distinct() {
        let table = DocumentTable::new(vec![
            doc(Some("10.1/a"), Some("https://example.org/a.pdf")),
            doc(Some("10.1/b"), None),
        ]);

        assert_eq!(
            table.download_url(Some("10.1/a")),
            UrlLookup::Found("https://example.org/a.pdf".into())
        );
        assert_eq!(table.download_url(Some(" 10.1/a ")).url(), Some("https://example.org/a.pdf"));
        assert_eq!(table.download_url(Some("10.1/b")), UrlLookup::NotInTable);
        assert_eq!(table.download_url(Some("10.1/zzz")), UrlLookup::NotInTable);
        assert_eq!(table.download_url(None), UrlLookup::MissingIdentifier);

        let rendered: Vec<String> = [
            UrlLookup::MissingIdentifier,
            UrlLookup::NotInTable,
            UrlLookup::LookupFailed,
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        assert_eq!(rendered[0], "URL not available (DOI missing)");
        assert_ne!(rendered[0], rendered[1]);
        assert_ne!(rendered[1], rendered[2]);
    }

    #[test]
    fn test_table_file_missing_reports_lookup_failure() {
        let resolver = DocumentTableFile::new("/nonexistent/papers.json");
        let urls = resolver.resolve_all(&[Some("10.1/a".into()), None]);
        assert_eq!(urls, vec![UrlLookup::LookupFailed, UrlLookup::MissingIdentifier]);
    }

    #[test]
    fn test_load_table_from_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"Doi": "10.1/a", "Title": "A", "Full_Text": "x", "Download_URL": "u"}}]"#
        )
        .unwrap();

        let table = DocumentTable::load(file.path()).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.download_url(Some("10.1/a")).url(), Some("u"));
    }

    #[test]
    fn test_malformed_row_is_skipped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"Doi": "10.1/a", "Title": "A", "Full_Text": "x", "Year_Published": 2021}},
                {{"Doi": "10.1/bad", "Title": "B", "Full_Text": "y", "Year_Published": "2021"}},
                {{"Title": "C", "Full_Text": "z", "Year_Published": 2020.5}},
                {{"Doi": "10.1/d", "Title": "D", "Full_Text": "w", "Download_URL": "u"}}
            ]"#
        )
        .unwrap();

        let table = tokio_test::assert_ok!(DocumentTable::load(file.path()));

        let dois: Vec<Option<&str>> = table.documents().iter().map(Document::doi).collect();
        assert_eq!(dois, vec![Some("10.1/a"), Some("10.1/d")]);
        assert_eq!(table.download_url(Some("10.1/d")).url(), Some("u"));

        let rejected: Vec<(usize, &str)> = table
            .rejected()
            .iter()
            .map(|r| (r.row, r.key.as_str()))
            .collect();
        assert_eq!(rejected, vec![(1, "10.1/bad"), (2, "C")]);
        assert!(table.rejected()[0].reason.starts_with("Invalid document 10.1/bad: row 1:"));
    }

    #[test]
    fn test_non_array_table_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"Doi": "10.1/a"}}"#).unwrap();
        assert!(DocumentTable::load(file.path()).is_err());
    }

    #[test]
    fn test_sanitize_base_name() {
        assert_eq!(sanitize_base_name("deep learning: a survey"), "deep learning_ a survey");
        assert_eq!(sanitize_base_name("c++/rust"), "c___rust");
        assert_eq!(base_name_for(Path::new("/data/graph nets (2020).json")), "graph nets _2020_");
    }
}
