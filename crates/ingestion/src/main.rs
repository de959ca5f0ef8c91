//! PaperTrail Ingest
//!
//! Builds the artifact set for a document table:
//! 1. Loads the document table (JSON array of rows)
//! 2. Chunks and embeds every document
//! 3. Builds the HNSW index
//! 4. Writes `{base}.hnsw`, `{base}_metadata.json`, `{base}_by_doi.json` and the manifest
//!
//! Usage: `ingest <documents.json> [--out DIR]`

use papertrail_common::{
    config::AppConfig,
    documents::{base_name_for, DocumentTable},
    embeddings::create_embedder,
    progress::{ProgressEvent, ProgressSink},
    telemetry, VERSION,
};
use papertrail_ingestion::{IndexOutcome, IndexingPipeline};
use std::path::PathBuf;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = match AppConfig::load_validated() {
        Ok(config) => config,
        Err(e) => {
            telemetry::init_tracing(&Default::default())?;
            tracing::error!(error = %e, "Failed to load configuration");
            return Err(e.into());
        }
    };
    telemetry::init_tracing(&config.observability)?;

    let mut args = std::env::args().skip(1);
    let mut input: Option<PathBuf> = None;
    let mut out: Option<PathBuf> = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--out" => out = args.next().map(PathBuf::from),
            _ => input = Some(PathBuf::from(arg)),
        }
    }
    let Some(input) = input else {
        eprintln!("usage: ingest <documents.json> [--out DIR]");
        std::process::exit(2);
    };

    info!("Starting PaperTrail Ingest v{}", VERSION);
    telemetry::install_metrics_exporter(&config.observability)?;

    let table = DocumentTable::load(&input)?;
    let base = base_name_for(&input);
    let directory = out.unwrap_or_else(|| config.artifacts.directory.clone());
    info!(documents = table.len(), base = %base, directory = %directory.display(), "Document table loaded");
    if !table.rejected().is_empty() {
        warn!(rows = table.rejected().len(), "Malformed document rows will be skipped");
    }

    let embedder = create_embedder(&config.embedding)?;
    info!(model = embedder.model_name(), dimension = embedder.dimension(), "Embedder ready");

    let (progress, mut events) = ProgressSink::channel();
    let reporter = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match &event {
                ProgressEvent::DocumentChunked { .. } | ProgressEvent::DocumentSkipped { .. } => {
                    debug!(?event, "Progress")
                }
                _ => info!(?event, "Progress"),
            }
        }
    });

    let pipeline = IndexingPipeline::from_config(&config, embedder).with_progress(progress);
    let outcome = pipeline.run_table(&table, &directory, &base).await?;
    drop(pipeline);
    reporter.await?;

    match outcome {
        IndexOutcome::Built { paths, report } => {
            info!(
                index = %paths.index.display(),
                documents = report.indexed,
                skipped = report.skipped,
                chunks = report.chunks,
                "Ingestion complete"
            );
            println!("{}", paths.index.display());
        }
        IndexOutcome::Empty { report } => {
            warn!(
                documents = report.documents,
                skipped = report.skipped,
                "Nothing to index"
            );
        }
    }

    Ok(())
}
