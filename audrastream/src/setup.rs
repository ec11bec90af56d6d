//! Construction des composants à partir de la configuration

use anyhow::{Result, bail};
use audracache::{MemoryResolutionCache, NoopResolutionCache, ResolutionCache};
use audraconfig::Config;
use audraresolver::{Backend, BackendPool, ExtractorBackend, PipedBackend};
use audrastore::{DurableStore, MemoryStore, S3Store};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Backends amont selon `resolver.kind` (`piped` ou `extractor`)
pub fn backends_from_config(config: &Config) -> Result<BackendPool> {
    let kind = config.get_resolver_kind()?;
    match kind.trim().to_ascii_lowercase().as_str() {
        "piped" => {
            let instances = config.get_piped_instances()?;
            if instances.is_empty() {
                bail!("resolver.piped.instances is empty");
            }
            let backends = PipedBackend::instances(
                &instances,
                Duration::from_secs(config.get_piped_timeout_secs()?),
                Duration::from_secs(config.get_piped_cache_ttl_secs()?),
            )?;
            info!(instances = backends.len(), "Piped resolver configured");
            Ok(BackendPool::new(backends))
        }
        "extractor" => {
            let backend = ExtractorBackend::new(config.get_extractor_program()?)
                .with_args(config.get_extractor_args()?)
                .with_url_template(config.get_extractor_url_template()?)
                .with_timeout(Duration::from_secs(config.get_extractor_timeout_secs()?))
                .with_cache_ttl(Duration::from_secs(config.get_extractor_cache_ttl_secs()?))
                .with_max_renditions(config.get_extractor_max_renditions()?);
            info!(?backend, "Extractor resolver configured");
            Ok(BackendPool::new(vec![Arc::new(backend) as Arc<dyn Backend>]))
        }
        other => bail!("unknown resolver.kind '{}'", other),
    }
}

/// Cache de résolution selon `resolution_cache.*`
pub fn resolution_cache_from_config(config: &Config) -> Result<Arc<dyn ResolutionCache>> {
    if !config.get_resolution_cache_enabled()? {
        info!("Resolution cache disabled");
        return Ok(Arc::new(NoopResolutionCache));
    }
    let max_entries = config.get_resolution_cache_max_entries()?;
    Ok(Arc::new(MemoryResolutionCache::with_capacity(
        max_entries as u64,
    )))
}

/// Stockage durable selon `store.kind`
pub enum ConfiguredStore {
    S3(Arc<S3Store>),
    /// Stockage mémoire, à servir sous `/blob` par le serveur lui-même
    Memory(Arc<MemoryStore>),
}

impl ConfiguredStore {
    pub fn as_durable(&self) -> Arc<dyn DurableStore> {
        match self {
            ConfiguredStore::S3(store) => store.clone(),
            ConfiguredStore::Memory(store) => store.clone(),
        }
    }
}

/// Construit le stockage ; `blob_base_url` sert de base aux URLs du stockage mémoire
pub fn store_from_config(config: &Config, blob_base_url: &str) -> Result<ConfiguredStore> {
    let kind = config.get_store_kind()?;
    match kind.trim().to_ascii_lowercase().as_str() {
        "s3" | "r2" => Ok(ConfiguredStore::S3(Arc::new(S3Store::from_config(config)?))),
        "memory" => {
            info!("Using volatile in-memory store");
            Ok(ConfiguredStore::Memory(Arc::new(MemoryStore::with_base_url(
                blob_base_url,
            ))))
        }
        other => bail!("unknown store.kind '{}'", other),
    }
}
