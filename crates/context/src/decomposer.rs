//! Query decomposition
//!
//! Splits a compound research question into self-contained sub-queries with
//! the generation collaborator. Any failure searches the original question.

use papertrail_common::generation::Generator;
use papertrail_common::metrics;
use regex_lite::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, instrument, warn};

/// Default cap on sub-queries per question
pub const DEFAULT_MAX_SUB_QUERIES: usize = 5;

const DECOMPOSITION_PROMPT: &str = "You split research questions into self-contained sub-questions \
for searching academic papers. Return one sub-question per line, without numbering or commentary. \
If the question asks about a single thing, return it unchanged on one line.";

static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[-*•]+|\(?\d+[.):])\s*").expect("valid list marker pattern"));

pub struct QueryDecomposer {
    generator: Arc<dyn Generator>,
    max_sub_queries: usize,
}

impl QueryDecomposer {
    pub fn new(generator: Arc<dyn Generator>, max_sub_queries: usize) -> Self {
        Self {
            generator,
            max_sub_queries: max_sub_queries.max(1),
        }
    }

    /// Sub-queries for `query`; `[query]` when decomposition fails or yields nothing.
    ///
    /// Extra sub-queries beyond the cap are dropped.
    #[instrument(skip(self))]
    pub async fn decompose(&self, query: &str) -> Vec<String> {
        let prompt = format!(
            "Split the question into at most {} sub-questions.\n\nQuestion: {}",
            self.max_sub_queries, query
        );

        let mut sub_queries = match self.generator.generate(DECOMPOSITION_PROMPT, &prompt).await {
            Ok(response) => parse_sub_queries(&response),
            Err(e) => {
                warn!(error = %e, "Query decomposition failed, searching the original question");
                metrics::increment("decomposition_fallbacks_total");
                return vec![query.to_string()];
            }
        };

        if sub_queries.is_empty() {
            warn!("Query decomposition returned nothing, searching the original question");
            metrics::increment("decomposition_fallbacks_total");
            return vec![query.to_string()];
        }

        if sub_queries.len() > self.max_sub_queries {
            debug!(
                returned = sub_queries.len(),
                kept = self.max_sub_queries,
                "Discarding extra sub-queries"
            );
            sub_queries.truncate(self.max_sub_queries);
        }

        sub_queries
    }
}

/// One sub-query per non-empty line, list markers and wrapping quotes removed
pub fn parse_sub_queries(response: &str) -> Vec<String> {
    response
        .lines()
        .map(|line| {
            let line = line.trim();
            let line = LIST_MARKER.replace(line, "");
            line.trim().trim_matches('"').trim().to_string()
        })
        .filter(|line| !line.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use papertrail_common::errors::{AppError, Result};
    use papertrail_common::generation::StaticGenerator;

    struct DownGenerator;

    #[async_trait]
    impl Generator for DownGenerator {
        async fn generate(&self, _system: &str, _prompt: &str) -> Result<String> {
            Err(AppError::GenerationError {
                message: "503".into(),
            })
        }

        fn model_name(&self) -> &str {
            "down"
        }
    }

    fn decomposer(response: &str) -> QueryDecomposer {
        QueryDecomposer::new(Arc::new(StaticGenerator::new(response)), DEFAULT_MAX_SUB_QUERIES)
    }

    #[tokio::test]
    async fn test_seven_lines_truncated_to_five() {
        let response = (1..=7)
            .map(|i| format!("Question number {}?", i))
            .collect::<Vec<_>>()
            .join("\n");

        let sub_queries = decomposer(&response).decompose("big question").await;

        assert_eq!(sub_queries.len(), 5);
        assert_eq!(sub_queries[0], "Question number 1?");
        assert_eq!(sub_queries[4], "Question number 5?");
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_query() {
        let decomposer = QueryDecomposer::new(Arc::new(DownGenerator), 5);
        assert_eq!(decomposer.decompose("what is HNSW?").await, vec!["what is HNSW?"]);
    }

    #[tokio::test]
    async fn test_blank_response_falls_back_to_query() {
        let sub_queries = decomposer("\n   \n- \n").decompose("what is HNSW?").await;
        assert_eq!(sub_queries, vec!["what is HNSW?"]);
    }

    #[test]
    fn test_parse_strips_list_markers() {
        let parsed = parse_sub_queries(
            "1. How are graphs indexed?\n2) What is recall?\n- Why layers?\n* \"Who proposed HNSW?\"\n\nPlain line",
        );
        assert_eq!(
            parsed,
            vec![
                "How are graphs indexed?",
                "What is recall?",
                "Why layers?",
                "Who proposed HNSW?",
                "Plain line"
            ]
        );
    }

    #[test]
    fn test_parse_keeps_inner_numbers() {
        assert_eq!(
            parse_sub_queries("Effects of COVID-19 in 2020?"),
            vec!["Effects of COVID-19 in 2020?"]
        );
    }
}
