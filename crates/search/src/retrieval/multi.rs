use super::{dedup_results, Retriever};
use futures::future::join_all;
use papertrail_common::errors::Result;
use papertrail_common::models::SearchResult;
use papertrail_common::progress::{ProgressSink, SearchProgress};
use tracing::{instrument, warn};

/// Search every sub-query concurrently, then merge.
///
/// Results are combined only after all searches finish. A failed sub-query is
/// logged and left out; the call fails only when every sub-query failed.
#[instrument(skip(retriever, progress), fields(queries = queries.len()))]
pub async fn retrieve_all<R: Retriever + ?Sized>(
    retriever: &R,
    queries: &[String],
    per_query_k: usize,
    progress: &ProgressSink<SearchProgress>,
) -> Result<Vec<SearchResult>> {
    let outcomes = join_all(queries.iter().map(|q| retriever.search(q, per_query_k))).await;

    let mut merged = Vec::new();
    let mut failures = 0;
    let mut last_error = None;

    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(hits) => {
                progress.emit(SearchProgress::SubQueryDone {
                    index,
                    hits: hits.len(),
                });
                merged.extend(hits);
            }
            Err(e) => {
                warn!(sub_query = %queries[index], error = %e, "Sub-query search failed");
                failures += 1;
                last_error = Some(e);
            }
        }
    }

    if failures == queries.len() {
        if let Some(e) = last_error {
            return Err(e);
        }
    }

    let unique = dedup_results(merged);
    progress.emit(SearchProgress::Merged {
        unique: unique.len(),
    });
    Ok(unique)
}
