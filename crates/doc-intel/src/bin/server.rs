//! Document analysis server binary
//!
//! Run with: cargo run -p doc-intel --bin doc-intel-server

use std::path::PathBuf;

use doc_intel::{config::PipelineConfig, server::DocServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "doc_intel=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("DOC_INTEL_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("doc-intel.toml"));
    let config = PipelineConfig::load(Some(&config_path))?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Models: {}", config.analysis.models.join(", "));
    tracing::info!(
        "  - Concurrency: {} jobs, {} attempts max",
        config.processing.max_concurrent,
        config.processing.attempt_ceiling
    );
    tracing::info!(
        "  - Upload dir: {}",
        config.storage.upload_dir.display()
    );

    let server = DocServer::new(config).await?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("\nEndpoints:");
    println!("  POST   /api/documents/upload      - Upload documents");
    println!("  GET    /api/documents             - List documents");
    println!("  GET    /api/documents/stats       - Statistics");
    println!("  GET    /api/documents/:id         - Document details");
    println!("  DELETE /api/documents/:id         - Delete a document");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
