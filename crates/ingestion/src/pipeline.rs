//! Index build pipeline
//!
//! documents -> per-document chunking (bounded concurrency, input order kept)
//! -> serial metadata assembly -> HNSW build -> artifact files.
//! A failing document is logged and skipped; only whole-run failures abort.

use crate::chunker::{Chunker, ChunkingConfig, SentenceChunk};
use crate::errors::{IngestionError, IngestionResult};
use crate::grouping::grouper_from_settings;
use chrono::Utc;
use futures::StreamExt;
use papertrail_common::artifacts::{ArtifactManifest, ArtifactPaths, ArtifactSet};
use papertrail_common::config::AppConfig;
use papertrail_common::documents::{sanitize_base_name, DocumentTable, RejectedRow};
use papertrail_common::embeddings::Embedder;
use papertrail_common::errors::Result;
use papertrail_common::index::{HnswIndex, HnswParams, VectorIndex};
use papertrail_common::metrics::record_indexing;
use papertrail_common::models::{ChunkRecord, Document};
use papertrail_common::progress::{ProgressEvent, ProgressSink};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// A chunk's metadata with its embedding, ready for indexing
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub record: ChunkRecord,
    pub embedding: Vec<f32>,
}

/// Index and position-aligned metadata
#[derive(Debug)]
pub struct BuiltIndex {
    pub index: HnswIndex,
    pub metadata: Vec<ChunkRecord>,
}

/// Counts for one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub documents: usize,
    pub indexed: usize,
    pub skipped: usize,
    pub chunks: usize,
}

#[derive(Debug)]
pub enum IndexOutcome {
    Built {
        paths: ArtifactPaths,
        report: PipelineReport,
    },
    /// No chunk survived; nothing written
    Empty { report: PipelineReport },
}

/// Build an index whose position `i` is `chunks[i]`.
///
/// Returns `None` for an empty input instead of an empty index.
pub fn build_index(chunks: Vec<IndexedChunk>, params: &HnswParams) -> Result<Option<BuiltIndex>> {
    if chunks.is_empty() {
        return Ok(None);
    }

    let (metadata, vectors): (Vec<ChunkRecord>, Vec<Vec<f32>>) = chunks
        .into_iter()
        .map(|c| (c.record, c.embedding))
        .unzip();

    let index = HnswIndex::build(&vectors, params)?;
    Ok(Some(BuiltIndex { index, metadata }))
}

pub struct IndexingPipeline {
    chunker: Arc<Chunker>,
    params: HnswParams,
    concurrency: usize,
    progress: ProgressSink<ProgressEvent>,
}

impl IndexingPipeline {
    pub fn new(chunker: Arc<Chunker>, params: HnswParams, concurrency: usize) -> Self {
        Self {
            chunker,
            params,
            concurrency: concurrency.max(1),
            progress: ProgressSink::disabled(),
        }
    }

    /// Pipeline wired from configuration around the given embedder
    pub fn from_config(config: &AppConfig, embedder: Arc<dyn Embedder>) -> Self {
        let chunker = Chunker::new(
            ChunkingConfig::from(&config.chunking),
            embedder,
            grouper_from_settings(&config.chunking),
        );
        Self::new(
            Arc::new(chunker),
            HnswParams::from(&config.index),
            config.chunking.concurrency,
        )
    }

    pub fn with_progress(mut self, progress: ProgressSink<ProgressEvent>) -> Self {
        self.progress = progress;
        self
    }

    /// Chunk every document and assign ordinals, in input order
    #[instrument(skip(self, documents), fields(documents = documents.len()))]
    pub async fn chunk_documents(&self, documents: &[Document]) -> (Vec<IndexedChunk>, PipelineReport) {
        let results: Vec<(usize, Result<Vec<SentenceChunk>>)> =
            futures::stream::iter(documents.iter().enumerate())
                .map(|(row, document)| async move {
                    (row, self.chunker.chunk(document.text()).await)
                })
                .buffered(self.concurrency)
                .collect()
                .await;

        let mut report = PipelineReport {
            documents: documents.len(),
            ..Default::default()
        };
        let mut indexed = Vec::new();

        for (row, result) in results {
            let document = &documents[row];
            let key = document.key().to_string();

            let chunks = match result {
                Ok(chunks) if chunks.is_empty() => {
                    warn!(doc = %key, row = row, "Document has no text, skipping");
                    self.skip(&mut report, key, "empty text".to_string());
                    continue;
                }
                Ok(chunks) => chunks,
                Err(e) => {
                    if e.is_recoverable() {
                        warn!(doc = %key, row = row, error = %e, "Failed to chunk document, skipping");
                    } else {
                        error!(doc = %key, row = row, error = %e, "Failed to chunk document, skipping");
                    }
                    self.skip(&mut report, key, e.to_string());
                    continue;
                }
            };

            report.indexed += 1;
            report.chunks += chunks.len();
            self.progress.emit(ProgressEvent::DocumentChunked {
                key,
                chunks: chunks.len(),
            });

            indexed.extend(chunks.into_iter().enumerate().map(|(ordinal, chunk)| IndexedChunk {
                record: ChunkRecord::from_document(document, row, ordinal, chunk.text),
                embedding: chunk.embedding,
            }));
        }

        (indexed, report)
    }

    /// Chunk and index without touching the filesystem
    pub async fn build(&self, documents: &[Document]) -> IngestionResult<(Option<BuiltIndex>, PipelineReport)> {
        let (chunks, report) = self.chunk_documents(documents).await;
        self.progress.emit(ProgressEvent::Chunked {
            documents: report.indexed,
            chunks: report.chunks,
        });
        if chunks.is_empty() {
            return Ok((None, report));
        }

        self.progress.emit(ProgressEvent::Indexing {
            vectors: chunks.len(),
        });
        let params = self.params;
        let built = tokio::task::spawn_blocking(move || build_index(chunks, &params)).await??;
        Ok((built, report))
    }

    /// Full run: build and persist `{base_name}` artifacts under `directory`
    pub async fn run(
        &self,
        documents: &[Document],
        directory: &Path,
        base_name: &str,
    ) -> IngestionResult<IndexOutcome> {
        self.execute(documents, &[], directory, base_name).await
    }

    /// Full run over a loaded table; rows it rejected are reported as skipped documents
    pub async fn run_table(
        &self,
        table: &DocumentTable,
        directory: &Path,
        base_name: &str,
    ) -> IngestionResult<IndexOutcome> {
        self.execute(table.documents(), table.rejected(), directory, base_name)
            .await
    }

    #[instrument(
        skip(self, documents, rejected),
        fields(documents = documents.len(), rejected = rejected.len(), base = %base_name)
    )]
    async fn execute(
        &self,
        documents: &[Document],
        rejected: &[RejectedRow],
        directory: &Path,
        base_name: &str,
    ) -> IngestionResult<IndexOutcome> {
        let start = Instant::now();
        let base_name = sanitize_base_name(base_name.trim());
        if base_name.is_empty() {
            return Err(IngestionError::IndexBuild("empty artifact base name".to_string()));
        }

        self.progress.emit(ProgressEvent::Started {
            documents: documents.len() + rejected.len(),
        });
        for row in rejected {
            self.progress.emit(ProgressEvent::DocumentSkipped {
                key: row.key.clone(),
                reason: row.reason.clone(),
            });
        }

        let (built, mut report) = self.build(documents).await?;
        report.documents += rejected.len();
        report.skipped += rejected.len();

        let Some(built) = built else {
            warn!(skipped = report.skipped, "No chunks produced, index not written");
            record_indexing(start.elapsed().as_secs_f64(), 0, report.skipped, 0);
            self.progress.emit(ProgressEvent::Empty);
            return Ok(IndexOutcome::Empty { report });
        };

        let manifest = ArtifactManifest {
            base_name: base_name.clone(),
            embedding_model: self.chunker.embedder().model_name().to_string(),
            dimension: built.index.dimension().unwrap_or(0),
            chunk_count: built.metadata.len(),
            document_count: report.indexed,
            index_params: self.params,
            built_at: Utc::now(),
        };
        let set = ArtifactSet::new(built.index, built.metadata, Some(manifest))?;

        let paths = ArtifactPaths::new(directory, &base_name);
        let target = paths.clone();
        tokio::task::spawn_blocking(move || set.save(&target)).await??;
        self.progress.emit(ProgressEvent::Saved {
            base_name: base_name.clone(),
        });

        let elapsed = start.elapsed().as_secs_f64();
        record_indexing(elapsed, report.indexed, report.skipped, report.chunks);
        info!(
            documents = report.indexed,
            skipped = report.skipped,
            chunks = report.chunks,
            elapsed_secs = elapsed,
            "Index built"
        );
        self.progress.emit(ProgressEvent::Finished {
            chunks: report.chunks,
        });

        Ok(IndexOutcome::Built { paths, report })
    }

    fn skip(&self, report: &mut PipelineReport, key: String, reason: String) {
        report.skipped += 1;
        self.progress.emit(ProgressEvent::DocumentSkipped { key, reason });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouping::FixedWindowGrouper;
    use async_trait::async_trait;
    use papertrail_common::embeddings::HashEmbedder;
    use papertrail_common::errors::AppError;
    use tempfile::TempDir;

    /// Fails any batch containing the word POISON and returns short vectors for SHRINK
    struct PickyEmbedder(HashEmbedder);

    #[async_trait]
    impl Embedder for PickyEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.0.embed(text).await
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if texts.iter().any(|t| t.contains("POISON")) {
                return Err(AppError::EmbeddingError {
                    message: "rejected".into(),
                });
            }
            let mut vectors = self.0.embed_batch(texts).await?;
            for (text, vector) in texts.iter().zip(vectors.iter_mut()) {
                if text.contains("SHRINK") {
                    vector.truncate(8);
                }
            }
            Ok(vectors)
        }

        fn model_name(&self) -> &str {
            "picky"
        }

        fn dimension(&self) -> usize {
            self.0.dimension()
        }
    }

    fn pipeline() -> IndexingPipeline {
        let chunker = Chunker::new(
            ChunkingConfig::default(),
            Arc::new(PickyEmbedder(HashEmbedder::new(32))),
            Arc::new(FixedWindowGrouper::new(2)),
        );
        let params = HnswParams {
            m: 8,
            ef_construction: 32,
            ..Default::default()
        };
        IndexingPipeline::new(Arc::new(chunker), params, 2)
    }

    fn doc(doi: Option<&str>, title: &str, text: &str) -> Document {
        Document {
            doi: doi.map(str::to_string),
            title: Some(title.to_string()),
            full_text: Some(text.to_string()),
            ..Default::default()
        }
    }

    fn corpus() -> Vec<Document> {
        vec![
            doc(
                Some("10.1/a"),
                "Graphs",
                "Graphs have nodes. Edges join nodes. Paths follow edges. Trees lack cycles.",
            ),
            doc(Some("10.1/b"), "Blank", "   "),
            doc(None, "Poisoned", "This one contains POISON. It fails."),
            doc(Some("10.1/c"), "Cells", "Cells divide. Membranes enclose cells. Ribosomes build proteins."),
        ]
    }

    #[tokio::test]
    async fn test_chunk_documents_skips_failures_and_keeps_order() {
        let (chunks, report) = pipeline().chunk_documents(&corpus()).await;

        assert_eq!(
            report,
            PipelineReport {
                documents: 4,
                indexed: 2,
                skipped: 2,
                chunks: 4,
            }
        );

        let dois: Vec<Option<&str>> = chunks.iter().map(|c| c.record.doi()).collect();
        assert_eq!(dois, vec![Some("10.1/a"), Some("10.1/a"), Some("10.1/c"), Some("10.1/c")]);
        let ordinals: Vec<usize> = chunks.iter().map(|c| c.record.chunk_index_in_doc).collect();
        assert_eq!(ordinals, vec![0, 1, 0, 1]);
        assert_eq!(chunks[0].record.text, "Graphs have nodes. Edges join nodes.");
    }

    #[tokio::test]
    async fn test_run_writes_artifacts() {
        let dir = TempDir::new().unwrap();
        let (progress, mut events) = ProgressSink::channel();
        let pipeline = pipeline().with_progress(progress);

        let outcome = pipeline
            .run(&corpus(), dir.path(), "papers-v1")
            .await
            .unwrap();

        let IndexOutcome::Built { paths, report } = outcome else {
            panic!("expected a built index");
        };
        assert_eq!(report.chunks, 4);
        assert!(paths.index.ends_with("papers_v1.hnsw"));
        assert!(paths.by_doi.exists());

        let set = ArtifactSet::load(&paths).unwrap();
        assert_eq!(set.len(), 4);
        assert_eq!(set.index.len(), 4);
        let manifest = set.manifest.unwrap();
        assert_eq!(manifest.embedding_model, "picky");
        assert_eq!(manifest.dimension, 32);
        assert_eq!(manifest.document_count, 2);

        let query = set.index.vector(2).unwrap().to_vec();
        let hits = set.index.search(&query, 1).unwrap();
        assert_eq!(hits[0].position, 2);

        drop(pipeline);
        let mut received = Vec::new();
        while let Ok(event) = events.try_recv() {
            received.push(event);
        }
        assert_eq!(received.first(), Some(&ProgressEvent::Started { documents: 4 }));
        assert_eq!(received.last(), Some(&ProgressEvent::Finished { chunks: 4 }));
        let skipped = received
            .iter()
            .filter(|e| matches!(e, ProgressEvent::DocumentSkipped { .. }))
            .count();
        assert_eq!(skipped, 2);
    }

    #[tokio::test]
    async fn test_run_table_reports_rejected_rows() {
        let dir = TempDir::new().unwrap();
        let table_path = dir.path().join("papers.json");
        std::fs::write(
            &table_path,
            r#"[
                {"Doi": "10.1/a", "Title": "Graphs", "Full_Text": "Graphs have nodes. Edges join nodes."},
                {"Doi": "10.1/bad", "Title": "Bad", "Full_Text": "Never read.", "Year_Published": "2021"}
            ]"#,
        )
        .unwrap();
        let table = DocumentTable::load(&table_path).unwrap();

        let (progress, mut events) = ProgressSink::channel();
        let pipeline = pipeline().with_progress(progress);
        let outcome = tokio_test::assert_ok!(pipeline.run_table(&table, dir.path(), "papers").await);

        let IndexOutcome::Built { report, .. } = outcome else {
            panic!("expected a built index");
        };
        assert_eq!(report.documents, 2);
        assert_eq!(report.indexed, 1);
        assert_eq!(report.skipped, 1);

        drop(pipeline);
        let mut received = Vec::new();
        while let Ok(event) = events.try_recv() {
            received.push(event);
        }
        assert_eq!(received[0], ProgressEvent::Started { documents: 2 });
        assert!(matches!(
            &received[1],
            ProgressEvent::DocumentSkipped { key, .. } if key == "10.1/bad"
        ));
    }

    #[tokio::test]
    async fn test_empty_input_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let outcome = pipeline()
            .run(&[doc(Some("x"), "Nothing", "")], dir.path(), "empty")
            .await
            .unwrap();

        assert!(matches!(outcome, IndexOutcome::Empty { ref report } if report.skipped == 1));
        assert!(!ArtifactPaths::new(dir.path(), "empty").index.exists());
    }

    #[tokio::test]
    async fn test_rebuild_is_deterministic() {
        let docs = corpus();
        let (first, _) = pipeline().build(&docs).await.unwrap();
        let (second, _) = pipeline().build(&docs).await.unwrap();

        let (first, second) = (first.unwrap(), second.unwrap());
        assert_eq!(first.metadata, second.metadata);
        assert!(first.metadata.iter().all(|r| r.chunk_id.is_some()));
    }

    #[tokio::test]
    async fn test_wrong_dimension_document_is_skipped() {
        let docs = vec![
            doc(Some("10.1/a"), "Graphs", "Graphs have nodes. Edges join nodes."),
            doc(Some("10.1/s"), "Shrunk", "Vectors SHRINK here. Then more text."),
        ];

        let (built, report) = pipeline().build(&docs).await.unwrap();

        assert_eq!(report.indexed, 1);
        assert_eq!(report.skipped, 1);
        let built = built.unwrap();
        assert!(built.metadata.iter().all(|r| r.doi() == Some("10.1/a")));
        assert_eq!(built.index.dimension(), Some(32));
    }

    #[test]
    fn test_build_index_empty() {
        assert!(build_index(Vec::new(), &HnswParams::default()).unwrap().is_none());
    }
}
