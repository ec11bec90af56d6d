use audraconfig::get_config;
use audraserver::{LoggingOptions, ServerBuilder};
use audrastream::http::create_memory_blob_router;
use audrastream::setup::{
    ConfiguredStore, backends_from_config, resolution_cache_from_config, store_from_config,
};
use audrastream::{DeliveryEngine, DeliverySettings, StreamResolver, StreamingExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_config();

    // ========== PHASE 1 : Serveur et logging ==========

    let mut server = ServerBuilder::new_configured().build();
    server
        .init_logging(LoggingOptions::from_config(&config))
        .await;

    // ========== PHASE 2 : Composants de livraison ==========

    info!("Configuring upstream resolvers...");
    let pool = backends_from_config(&config)?;
    for backend in pool.backends() {
        info!("  - {}", backend.name());
    }

    let cache = resolution_cache_from_config(&config)?;
    let resolver = StreamResolver::new(cache, pool);

    let blob_base_url = format!(
        "http://{}:{}/blob",
        config.get_base_url(),
        config.get_http_port()
    );
    let store = store_from_config(&config, &blob_base_url)?;
    if let ConfiguredStore::Memory(memory) = &store {
        warn!("Durable store is in memory: cached tracks are lost on restart");
        server
            .add_router("/", create_memory_blob_router(memory.clone()))
            .await;
    }

    let settings = DeliverySettings::from_config(&config);
    let engine = Arc::new(DeliveryEngine::new(store.as_durable(), resolver, settings)?);
    server.init_streaming(engine.clone()).await?;

    // ========== PHASE 3 : Démarrage du serveur ==========

    info!("Starting HTTP server...");
    server.start().await?;

    info!("Audra is ready");
    info!("Press Ctrl+C to stop...");
    server.wait().await;

    // Laisser aux populations en cours le temps de se terminer
    let grace = Duration::from_secs(config.get_shutdown_grace_secs()?);
    if !engine.tasks().shutdown(grace).await {
        warn!("Background uploads abandoned after {:?}", grace);
    }

    info!("Audra stopped");
    Ok(())
}
