//! PaperTrail Context Engine
//!
//! Turns a question into a cited answer over a built artifact set:
//! - Query decomposition into sub-queries
//! - Citation mapping with download URL resolution
//! - Answer synthesis constrained to the retrieved context

pub mod citations;
pub mod decomposer;
pub mod engine;
pub mod errors;
pub mod synthesizer;

pub use citations::{assign_citations, citation_key, CitationContext};
pub use decomposer::{parse_sub_queries, QueryDecomposer};
pub use engine::{ResearchAnswer, ResearchAssistant, Retrieval};
pub use errors::{ContextError, ContextResult};
pub use synthesizer::{extract_cited_indices, Answer, AnswerSynthesizer};
