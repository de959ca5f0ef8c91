//! Research assistant orchestration
//!
//! question -> sub-queries -> concurrent retrieval -> dedup -> citations -> answer

use crate::citations::{assign_citations, CitationContext};
use crate::decomposer::QueryDecomposer;
use crate::errors::{ContextError, ContextResult};
use crate::synthesizer::{Answer, AnswerSynthesizer};
use papertrail_common::config::RetrievalSettings;
use papertrail_common::documents::{UrlLookup, UrlResolver};
use papertrail_common::generation::Generator;
use papertrail_common::models::{CitationEntry, SearchResult};
use papertrail_common::progress::{ProgressSink, SearchProgress};
use papertrail_search::{retrieve_all, Retriever};
use std::sync::Arc;
use tracing::{info, instrument};

/// Ranked unique chunks with their citation mapping
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub sub_queries: Vec<String>,
    pub results: Vec<SearchResult>,
    pub citations: CitationContext,
}

#[derive(Debug, Clone)]
pub struct ResearchAnswer {
    pub question: String,
    pub sub_queries: Vec<String>,
    pub answer: Answer,
    pub sources: Vec<CitationEntry>,
    /// Download URL per source, aligned with `sources`
    pub urls: Vec<UrlLookup>,
    pub results: Vec<SearchResult>,
}

pub struct ResearchAssistant {
    decomposer: QueryDecomposer,
    retriever: Arc<dyn Retriever>,
    resolver: Arc<dyn UrlResolver>,
    synthesizer: AnswerSynthesizer,
    per_query_k: usize,
    progress: ProgressSink<SearchProgress>,
}

impl ResearchAssistant {
    pub fn new(
        generator: Arc<dyn Generator>,
        retriever: Arc<dyn Retriever>,
        resolver: Arc<dyn UrlResolver>,
        settings: &RetrievalSettings,
    ) -> Self {
        Self {
            decomposer: QueryDecomposer::new(Arc::clone(&generator), settings.max_sub_queries),
            retriever,
            resolver,
            synthesizer: AnswerSynthesizer::new(generator),
            per_query_k: settings.per_query_k.max(1),
            progress: ProgressSink::disabled(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressSink<SearchProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Decompose, search every sub-query, merge and cite
    #[instrument(skip(self))]
    pub async fn retrieve(&self, question: &str) -> ContextResult<Retrieval> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ContextError::EmptyQuestion);
        }

        let sub_queries = self.decomposer.decompose(question).await;
        self.progress.emit(SearchProgress::Decomposed {
            sub_queries: sub_queries.clone(),
        });

        let results = retrieve_all(
            self.retriever.as_ref(),
            &sub_queries,
            self.per_query_k,
            &self.progress,
        )
        .await
        .map_err(ContextError::Retrieval)?;

        let citations = assign_citations(&results, self.resolver.as_ref());
        self.progress.emit(SearchProgress::Cited {
            sources: citations.source_count(),
        });

        info!(
            sub_queries = sub_queries.len(),
            results = results.len(),
            sources = citations.source_count(),
            "Retrieval complete"
        );

        Ok(Retrieval {
            sub_queries,
            results,
            citations,
        })
    }

    /// Full flow ending in a generated, cited answer.
    ///
    /// No hits is a normal outcome answered with [`Answer::no_relevant_content`].
    pub async fn ask(&self, question: &str) -> ContextResult<ResearchAnswer> {
        let retrieval = self.retrieve(question).await?;

        let answer = self
            .synthesizer
            .answer(question.trim(), &retrieval.citations)
            .await
            .map_err(ContextError::Synthesis)?;
        self.progress.emit(SearchProgress::Answered);

        Ok(ResearchAnswer {
            question: question.trim().to_string(),
            sub_queries: retrieval.sub_queries,
            answer,
            sources: retrieval.citations.entries,
            urls: retrieval.citations.urls,
            results: retrieval.results,
        })
    }
}
