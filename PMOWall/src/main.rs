use anyhow::Result;
use pmopixbuffer::Prefetcher;
use pmopixcache::CacheStore;
use pmopixfetch::Fetcher;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod settings;
use settings::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ========== PHASE 1 : Configuration ==========

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("pmowall.yaml"));
    let settings = Settings::load(&config_path)?;
    info!("🧩 {} source(s) configured", settings.sources.len());

    // ========== PHASE 2 : Coeur d'acquisition ==========

    let store = Arc::new(CacheStore::new(
        &settings.cache.dir,
        settings.cache.budget_bytes,
    )?);
    let fetcher = Arc::new(Fetcher::new(Arc::clone(&store)));
    let prefetcher = Arc::new(Prefetcher::with_options(
        Arc::clone(&fetcher),
        settings.buffer.min_buffer,
        settings.buffer.probe_limit,
        None,
    ));

    info!("🔍 Scanning sources...");
    let found = prefetcher.start_session(&settings.sources).await;
    info!("✅ {} image(s) discovered", found);

    prefetcher.spawn_workers(settings.buffer.workers);

    // ========== PHASE 3 : Boucle d'affichage (démo headless) ==========

    let interval = Duration::from_millis(settings.buffer.interval_ms);
    info!("🖼️ PMOWall is ready, press Ctrl+C to stop...");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(interval) => {
                match prefetcher.next().await {
                    Some(reference) => match fetcher.materialize(&reference).await {
                        Some(artifact) => {
                            info!("Showing {} -> {}", reference.locator, artifact.display());
                        }
                        None => warn!("No artifact for {}", reference.locator),
                    },
                    None => warn!("No references available yet"),
                }
            }
        }
    }

    prefetcher.stop();
    info!("👋 PMOWall stopped");
    Ok(())
}
