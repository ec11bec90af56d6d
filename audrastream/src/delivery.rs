//! Moteur de livraison
//!
//! Pour chaque requête :
//!
//! 1. piste présente dans le stockage durable → redirection vers une URL signée
//! 2. sinon résolution (cache puis backends) et choix de la rendition
//! 3. lancement d'une tâche de fond qui télécharge le fichier complet et
//!    l'écrit dans le stockage durable
//! 4. relais de la rendition amont vers le client, par blocs de taille fixe
//!
//! Le relais n'a pas de durée totale maximale : seul le délai entre deux
//! lectures amont est borné, un client lent peut donc écouter une piste
//! longue jusqu'au bout. Le téléchargement de population, lui, est borné en
//! durée totale.
//!
//! Deux requêtes simultanées pour la même piste absente lancent chacune leur
//! propre résolution et leur propre population.

use crate::error::{DeliveryError, Result};
use crate::resolver::StreamResolver;
use crate::tasks::BackgroundTasks;
use audraconfig::Config;
use audraresolver::{Quality, Rendition, TrackId};
use audrastore::{DurableStore, KeyLayout};
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::{debug, info, warn};

pub const DEFAULT_RELAY_CHUNK_SIZE: usize = 64 * 1024;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_PRESIGN_TTL_SECS: u64 = 24 * 3600;

/// User-Agent des requêtes vers les renditions amont
const USER_AGENT: &str = concat!("audra/", env!("CARGO_PKG_VERSION"));

/// Réglages du moteur
#[derive(Debug, Clone)]
pub struct DeliverySettings {
    /// Durée de validité des URLs signées
    pub presign_ttl: Duration,
    /// Durée maximale d'un téléchargement de population ; pour le relais,
    /// délai maximal sans données reçues de l'amont
    pub fetch_timeout: Duration,
    /// Délai maximal d'établissement de connexion vers l'amont
    pub connect_timeout: Duration,
    /// Taille des blocs relayés au client
    pub relay_chunk_size: usize,
    /// Disposition des clés dans le stockage durable
    pub layout: KeyLayout,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            presign_ttl: Duration::from_secs(DEFAULT_PRESIGN_TTL_SECS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            relay_chunk_size: DEFAULT_RELAY_CHUNK_SIZE,
            layout: KeyLayout::default(),
        }
    }
}

impl DeliverySettings {
    /// Lit `delivery.*` et `store.{prefix, extension, presign_ttl_secs}`
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();
        let secs = |value: anyhow::Result<u64>, default: Duration| {
            value.map(Duration::from_secs).unwrap_or(default)
        };

        let layout = match (config.get_store_prefix(), config.get_store_extension()) {
            (Ok(prefix), Ok(extension)) => KeyLayout::new(prefix, extension),
            _ => defaults.layout.clone(),
        };

        Self {
            presign_ttl: secs(config.get_store_presign_ttl_secs(), defaults.presign_ttl),
            fetch_timeout: secs(config.get_fetch_timeout_secs(), defaults.fetch_timeout),
            connect_timeout: secs(config.get_connect_timeout_secs(), defaults.connect_timeout),
            relay_chunk_size: config
                .get_relay_chunk_size()
                .ok()
                .filter(|size| *size > 0)
                .unwrap_or(defaults.relay_chunk_size),
            layout,
        }
    }
}

/// Flux d'octets relayé au client
pub type AudioStream = BoxStream<'static, io::Result<Bytes>>;

/// Réponse du moteur
pub enum Delivery {
    /// Piste déjà stockée : URL de lecture directe
    Redirect(String),
    /// Piste relayée depuis l'amont
    Stream {
        content_type: &'static str,
        body: AudioStream,
    },
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delivery::Redirect(url) => f.debug_tuple("Redirect").field(url).finish(),
            Delivery::Stream { content_type, .. } => f
                .debug_struct("Stream")
                .field("content_type", content_type)
                .finish_non_exhaustive(),
        }
    }
}

/// Moteur de livraison partagé entre les requêtes
pub struct DeliveryEngine {
    store: Arc<dyn DurableStore>,
    resolver: StreamResolver,
    /// Client du relais : délai de lecture, sans limite totale
    relay_client: reqwest::Client,
    /// Client de population : durée totale bornée
    fetch_client: reqwest::Client,
    tasks: BackgroundTasks,
    settings: DeliverySettings,
}

impl DeliveryEngine {
    pub fn new(
        store: Arc<dyn DurableStore>,
        resolver: StreamResolver,
        settings: DeliverySettings,
    ) -> anyhow::Result<Self> {
        let relay_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(settings.connect_timeout)
            .read_timeout(settings.fetch_timeout)
            .build()?;
        let fetch_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.fetch_timeout)
            .build()?;

        Ok(Self {
            store,
            resolver,
            relay_client,
            fetch_client,
            tasks: BackgroundTasks::new(),
            settings,
        })
    }

    pub fn resolver(&self) -> &StreamResolver {
        &self.resolver
    }

    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    pub fn settings(&self) -> &DeliverySettings {
        &self.settings
    }

    /// Sert une piste
    pub async fn serve(&self, track_id: &TrackId, quality: Quality) -> Result<Delivery> {
        let key = self.settings.layout.key(track_id.as_str());

        if let Some(url) = self.durable_url(track_id, &key).await {
            info!(track_id = %track_id, key = %key, "Serving from durable store");
            return Ok(Delivery::Redirect(url));
        }

        let result = self
            .resolver
            .resolve(track_id)
            .await
            .ok_or_else(|| DeliveryError::NotFound(track_id.to_string()))?;

        let rendition = result
            .select(quality)
            .cloned()
            .ok_or_else(|| DeliveryError::NotFound(track_id.to_string()))?;

        debug!(
            track_id = %track_id,
            quality = %quality,
            bitrate = ?rendition.bitrate,
            codec = %rendition.codec,
            "Selected rendition"
        );

        self.spawn_population(track_id, key, &rendition);
        self.relay(track_id, &rendition).await
    }

    /// URL signée si la piste est stockée ; toute erreur renvoie vers le direct
    async fn durable_url(&self, track_id: &TrackId, key: &str) -> Option<String> {
        match self.store.exists(key).await {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                warn!(track_id = %track_id, key = %key, "Durable existence check failed: {}", e);
                return None;
            }
        }

        match self
            .store
            .presigned_read_url(key, self.settings.presign_ttl)
            .await
        {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(track_id = %track_id, key = %key, "Presigning failed: {}", e);
                None
            }
        }
    }

    fn spawn_population(&self, track_id: &TrackId, key: String, rendition: &Rendition) {
        let client = self.fetch_client.clone();
        let store = self.store.clone();
        let track_id = track_id.clone();
        let url = rendition.url.clone();
        let content_type = rendition.content_type();

        self.tasks.spawn(async move {
            match populate(&client, store.as_ref(), &key, &url, content_type).await {
                Ok(size) => {
                    info!(track_id = %track_id, key = %key, size, "Durable store populated")
                }
                Err(e) => warn!(track_id = %track_id, key = %key, "Population failed: {}", e),
            }
        });
    }

    async fn relay(&self, track_id: &TrackId, rendition: &Rendition) -> Result<Delivery> {
        let response = self
            .relay_client
            .get(&rendition.url)
            .send()
            .await
            .map_err(|e| DeliveryError::Upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(track_id = %track_id, status = %status, "Upstream refused relay");
            return Err(DeliveryError::Upstream(format!("upstream returned {}", status)));
        }

        let reader = StreamReader::new(response.bytes_stream().map_err(io::Error::other));
        let body = ReaderStream::with_capacity(reader, self.settings.relay_chunk_size).boxed();

        Ok(Delivery::Stream {
            content_type: rendition.content_type(),
            body,
        })
    }
}

/// Télécharge la rendition complète et l'écrit dans le stockage durable
///
/// Retourne la taille écrite.
async fn populate(
    client: &reqwest::Client,
    store: &dyn DurableStore,
    key: &str,
    url: &str,
    content_type: &str,
) -> anyhow::Result<usize> {
    let data = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    let size = data.len();
    store.put(key, data, content_type).await?;
    Ok(size)
}
