//! Answer synthesis from cited context
//!
//! Provides:
//! - Context-grounded answer generation
//! - Extraction of the citation numbers an answer actually used

use crate::citations::CitationContext;
use papertrail_common::errors::Result;
use papertrail_common::generation::Generator;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};
use tracing::{debug, instrument, warn};

/// System instruction for answer generation
pub const ACADEMIC_WRITER_PROMPT: &str = "You are an expert Academic Writer. \
Answer the question using only the provided context. \
Each context block starts with a citation number such as [1]. \
Cite every claim inline with those numbers, for example [1] or [2][4]. \
If the context does not contain the answer, say so instead of guessing. \
Format the answer in Markdown, using bullet points for lists and **bold** for key terms.";

const NO_RELEVANT_CONTENT: &str =
    "No relevant content was found in the indexed documents for this question.";

static CITATION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d+)\]").expect("valid citation pattern"));

/// Generated answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,

    /// Citation numbers used in the text, ascending
    pub cited: Vec<usize>,

    /// False when no context was available and the generator was not asked
    pub grounded: bool,
}

impl Answer {
    pub fn no_relevant_content() -> Self {
        Self {
            text: NO_RELEVANT_CONTENT.to_string(),
            cited: Vec::new(),
            grounded: false,
        }
    }
}

pub struct AnswerSynthesizer {
    generator: Arc<dyn Generator>,
}

impl AnswerSynthesizer {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// Answer `question` from `citations`.
    ///
    /// Empty context short-circuits to [`Answer::no_relevant_content`].
    #[instrument(skip(self, citations), fields(sources = citations.source_count()))]
    pub async fn answer(&self, question: &str, citations: &CitationContext) -> Result<Answer> {
        if citations.is_empty() {
            return Ok(Answer::no_relevant_content());
        }

        let prompt = build_prompt(question, &citations.context);
        let text = self.generator.generate(ACADEMIC_WRITER_PROMPT, &prompt).await?;

        let cited = extract_cited_indices(&text);
        let unknown: Vec<usize> = cited
            .iter()
            .copied()
            .filter(|&i| i > citations.source_count())
            .collect();
        if !unknown.is_empty() {
            warn!(?unknown, sources = citations.source_count(), "Answer cites sources outside the context");
        }
        debug!(model = self.generator.model_name(), cited = cited.len(), "Answer generated");

        Ok(Answer {
            text,
            cited,
            grounded: true,
        })
    }
}

pub fn build_prompt(question: &str, context: &str) -> String {
    format!("Context:\n{}\n\nQuestion: {}", context, question)
}

/// Distinct citation numbers appearing as `[n]`, ascending
pub fn extract_cited_indices(text: &str) -> Vec<usize> {
    CITATION_MARKER
        .captures_iter(text)
        .filter_map(|cap| cap.get(1)?.as_str().parse::<usize>().ok())
        .filter(|&i| i > 0)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
