//! PaperTrail Search
//!
//! Read-only retrieval against a built artifact set.

pub mod retrieval;

pub use retrieval::{dedup_results, retrieve_all, DedupKey, IndexRetriever, Retriever};
