use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use attendd::config::Config;
use attendd::store::{JsonReferenceStore, MemoryAttendanceStore};
use attendd::traits::{NoopExtractor, OfficeTimings};
use attendd::{AppContext, Collaborators};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("attendd starting");

    let config = Config::from_env();
    tracing::info!(population = %config.population_path.display(), "loading configuration");

    let ctx = AppContext::start(
        &config,
        Collaborators {
            extractor: Arc::new(NoopExtractor),
            reference_store: Arc::new(JsonReferenceStore::new(config.population_path.clone())),
            attendance_store: Arc::new(MemoryAttendanceStore::new(OfficeTimings::default())),
        },
    );

    tracing::info!("attendd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("attendd shutting down");
    ctx.shutdown().await;

    Ok(())
}
