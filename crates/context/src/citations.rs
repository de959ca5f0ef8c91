//! Citation mapping
//!
//! Assigns each unique source in a ranked result list a 1-based citation
//! index in first-seen order, then renders the context handed to the answer
//! generator. Sources are keyed by DOI, or by title when the DOI is missing.

use papertrail_common::documents::{UrlLookup, UrlResolver};
use papertrail_common::models::{CitationEntry, SearchResult, UNKNOWN_TITLE};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Everything the answer step needs from one ranked result list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CitationContext {
    /// Context blocks joined by newlines
    pub context: String,
    /// Title for citation `i` at position `i - 1`
    pub titles: Vec<String>,
    /// Download URL lookup for citation `i` at position `i - 1`
    pub urls: Vec<UrlLookup>,
    pub entries: Vec<CitationEntry>,
}

impl CitationContext {
    pub fn is_empty(&self) -> bool {
        self.context.is_empty()
    }

    pub fn source_count(&self) -> usize {
        self.entries.len()
    }
}

/// Key identifying a result's source: its DOI, else `missing_doi_{title}`.
///
/// A blank title keys on [`UNKNOWN_TITLE`], so all such results share one citation.
pub fn citation_key(result: &SearchResult) -> String {
    match result.chunk.doi() {
        Some(doi) => doi.to_string(),
        None => format!("missing_doi_{}", display_title(result)),
    }
}

/// Map `results` (already in final rank order) to citation indices and context.
///
/// Every result is keyed, so every context block carries an index. Identical
/// input always yields identical numbering.
pub fn assign_citations(results: &[SearchResult], resolver: &dyn UrlResolver) -> CitationContext {
    let mut index_of: HashMap<String, usize> = HashMap::new();
    let mut entries: Vec<CitationEntry> = Vec::new();

    let blocks: Vec<String> = results
        .iter()
        .map(|result| {
            let title = display_title(result);
            let index = *index_of.entry(citation_key(result)).or_insert_with(|| {
                let index = entries.len() + 1;
                entries.push(CitationEntry {
                    index,
                    title: title.to_string(),
                    doi: result.chunk.doi().map(str::to_string),
                });
                index
            });
            format!(
                "[{}] [Source Title: {}]\nChunk Content: {}\n---",
                index, title, result.chunk.text
            )
        })
        .collect();

    let titles: Vec<String> = entries.iter().map(|e| e.title.clone()).collect();
    let dois: Vec<Option<String>> = entries.iter().map(|e| e.doi.clone()).collect();
    let urls = resolver.resolve_all(&dois);

    for (entry, url) in entries.iter().zip(&urls) {
        if url.url().is_none() {
            warn!(citation = entry.index, doi = ?entry.doi, lookup = %url, "Download URL unavailable");
        }
    }
    debug!(results = results.len(), sources = entries.len(), "Citations assigned");

    CitationContext {
        context: blocks.join("\n"),
        titles,
        urls,
        entries,
    }
}

fn display_title(result: &SearchResult) -> &str {
    let title = result.chunk.paper_title.trim();
    if title.is_empty() {
        UNKNOWN_TITLE
    } else {
        title
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use papertrail_common::documents::DocumentTable;
    use papertrail_common::models::{ChunkRecord, Document};

    fn result(doi: Option<&str>, title: &str, text: &str) -> SearchResult {
        SearchResult {
            chunk: ChunkRecord {
                text: text.to_string(),
                paper_title: title.to_string(),
                doi: doi.map(str::to_string),
                source: String::new(),
                year_published: 2022,
                chunk_index_in_doc: 0,
                chunk_id: None,
            },
            position: 0,
            distance: 0.0,
            rank: None,
        }
    }

    fn table() -> DocumentTable {
        DocumentTable::new(vec![
            Document {
                doi: Some("10.1/a".into()),
                download_url: Some("https://example.org/a.pdf".into()),
                ..Default::default()
            },
            Document {
                doi: Some("10.1/b".into()),
                ..Default::default()
            },
        ])
    }

    #[test]
    fn test_first_seen_order() {
        let results = vec![
            result(Some("10.1/b"), "Paper B", "b1"),
            result(Some("10.1/a"), "Paper A", "a1"),
            result(Some("10.1/b"), "Paper B", "b2"),
            result(None, "Untracked", "u1"),
        ];

        let cited = assign_citations(&results, &table());

        assert_eq!(cited.titles, vec!["Paper B", "Paper A", "Untracked"]);
        let indices: Vec<usize> = cited.entries.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(
            cited.context,
            "[1] [Source Title: Paper B]\nChunk Content: b1\n---\n\
             [2] [Source Title: Paper A]\nChunk Content: a1\n---\n\
             [1] [Source Title: Paper B]\nChunk Content: b2\n---\n\
             [3] [Source Title: Untracked]\nChunk Content: u1\n---"
        );
    }

    #[test]
    fn test_url_placeholders_stay_distinct() {
        let results = vec![
            result(Some("10.1/a"), "A", "x"),
            result(Some("10.1/b"), "B", "x"),
            result(Some("10.1/zzz"), "Z", "x"),
            result(None, "N", "x"),
        ];

        let cited = assign_citations(&results, &table());

        assert_eq!(
            cited.urls,
            vec![
                UrlLookup::Found("https://example.org/a.pdf".into()),
                UrlLookup::NotInTable,
                UrlLookup::NotInTable,
                UrlLookup::MissingIdentifier,
            ]
        );
        assert_eq!(cited.urls.len(), cited.titles.len());
    }

    #[test]
    fn test_untitled_result_without_doi_stays_citable() {
        let results = vec![
            result(None, "  ", "orphan text"),
            result(Some("10.1/a"), "A", "a"),
            result(None, "", "second orphan"),
        ];
        let cited = assign_citations(&results, &table());

        assert_eq!(cited.source_count(), 2);
        assert_eq!(citation_key(&results[0]), "missing_doi_Unknown Title");
        assert_eq!(cited.titles, vec!["Unknown Title", "A"]);
        assert_eq!(
            cited.context,
            "[1] [Source Title: Unknown Title]\nChunk Content: orphan text\n---\n\
             [2] [Source Title: A]\nChunk Content: a\n---\n\
             [1] [Source Title: Unknown Title]\nChunk Content: second orphan\n---"
        );
        assert_eq!(
            cited.urls,
            vec![
                UrlLookup::MissingIdentifier,
                UrlLookup::Found("https://example.org/a.pdf".into())
            ]
        );
    }

    #[test]
    fn test_stable_across_runs() {
        let results = vec![
            result(Some("10.1/c"), "C", "1"),
            result(None, "T", "2"),
            result(Some("10.1/a"), "A", "3"),
        ];
        assert_eq!(
            assign_citations(&results, &table()),
            assign_citations(&results, &table())
        );
    }

    #[test]
    fn test_empty_results() {
        let cited = assign_citations(&[], &table());
        assert!(cited.is_empty());
        assert!(cited.titles.is_empty());
        assert!(cited.urls.is_empty());
    }
}
