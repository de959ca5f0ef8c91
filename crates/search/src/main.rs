//! PaperTrail Search
//!
//! Runs one query against a built artifact set and prints the ranked hits as JSON.
//!
//! Usage: `search <base> <query> [k]`

use papertrail_common::{
    artifacts::ArtifactPaths, config::AppConfig, embeddings::create_embedder, telemetry, VERSION,
};
use papertrail_search::{IndexRetriever, Retriever};
use tracing::info;

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
    let (base, query) = match (args.first(), args.get(1)) {
        (Some(base), Some(query)) => (base.clone(), query.clone()),
        _ => {
            eprintln!("usage: search <base> <query> [k]");
            std::process::exit(2);
        }
    };
    let k = match args.get(2) {
        Some(raw) => raw.parse::<usize>()?,
        None => config.retrieval.default_k,
    };

    info!("Starting PaperTrail Search v{}", VERSION);
    telemetry::install_metrics_exporter(&config.observability)?;

    let embedder = create_embedder(&config.embedding)?;
    let paths = ArtifactPaths::new(&config.artifacts.directory, &base);
    let retriever = IndexRetriever::load(&paths, embedder).map_err(|e| {
        tracing::error!(error = %e, base = %base, "Failed to load artifacts");
        e
    })?;

    let results = retriever.search(&query, k).await?;
    if results.is_empty() {
        info!(query = %query, "No relevant content found");
    }
    println!("{}", serde_json::to_string_pretty(&results)?);

    Ok(())
}
