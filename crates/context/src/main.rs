//! PaperTrail Ask
//!
//! Answers one question over a built artifact set:
//! 1. Decomposes the question into sub-queries
//! 2. Searches the index for each sub-query and merges the hits
//! 3. Assigns citation numbers and resolves download URLs from the document table
//! 4. Generates the cited answer
//!
//! Usage: `ask <base> <documents.json> <question>`

use papertrail_common::{
    artifacts::ArtifactPaths,
    config::AppConfig,
    documents::DocumentTableFile,
    embeddings::create_embedder,
    generation::create_generator,
    progress::ProgressSink,
    telemetry, VERSION,
};
use papertrail_context::ResearchAssistant;
use papertrail_search::IndexRetriever;
use std::sync::Arc;
use tracing::{debug, info};

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

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 3 {
        eprintln!("usage: ask <base> <documents.json> <question>");
        std::process::exit(2);
    }
    let base = &args[0];
    let table_path = &args[1];
    let question = args[2..].join(" ");

    info!("Starting PaperTrail Ask v{}", VERSION);
    telemetry::install_metrics_exporter(&config.observability)?;

    let embedder = create_embedder(&config.embedding)?;
    let generator = create_generator(&config.generation)?;
    let paths = ArtifactPaths::new(&config.artifacts.directory, base);
    let retriever = IndexRetriever::load(&paths, embedder).map_err(|e| {
        tracing::error!(error = %e, base = %base, "Failed to load artifacts");
        e
    })?;

    let (progress, mut events) = ProgressSink::channel();
    let reporter = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!(?event, "Progress");
        }
    });

    let assistant = ResearchAssistant::new(
        generator,
        Arc::new(retriever),
        Arc::new(DocumentTableFile::new(table_path)),
        &config.retrieval,
    )
    .with_progress(progress);

    let response = assistant.ask(&question).await?;
    drop(assistant);
    reporter.await?;

    println!("{}\n", response.answer.text);
    if !response.sources.is_empty() {
        println!("Sources:");
        for (source, url) in response.sources.iter().zip(&response.urls) {
            println!("[{}] {} - {}", source.index, source.title, url);
        }
    }

    Ok(())
}
