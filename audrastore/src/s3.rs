//! Stockage S3-compatible (Cloudflare R2, AWS S3, MinIO)
//!
//! Les URLs de lecture sont signées localement (SigV4 en query string) ; seules
//! les opérations `exists` et `put` font un aller-retour réseau.

use crate::error::{Result, StoreError};
use crate::DurableStore;
use async_trait::async_trait;
use audraconfig::Config;
use bytes::Bytes;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path as ObjectPath;
use object_store::signer::Signer;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};
use std::time::Duration;
use tracing::{debug, info};

/// Région utilisée par R2
pub const DEFAULT_REGION: &str = "auto";

/// Paramètres de connexion au bucket
#[derive(Debug, Clone)]
pub struct S3Settings {
    /// Endpoint S3 ; `None` pour AWS
    pub endpoint: Option<String>,
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl S3Settings {
    /// Lit les paramètres depuis la configuration (et les variables `R2_*`)
    pub fn from_config(config: &Config) -> Result<Self> {
        let (access_key_id, secret_access_key) = config
            .get_store_credentials()
            .map_err(|e| StoreError::Configuration(e.to_string()))?;
        let region = config
            .get_store_region()
            .unwrap_or_else(|_| DEFAULT_REGION.to_string());

        Ok(Self {
            endpoint: config.get_store_endpoint(),
            bucket: config.get_store_bucket(),
            region,
            access_key_id,
            secret_access_key,
        })
    }
}

/// Bucket S3 accédé via `object_store`
#[derive(Debug)]
pub struct S3Store {
    store: AmazonS3,
    bucket: String,
}

impl S3Store {
    /// Construit le client à partir des paramètres
    pub fn new(settings: S3Settings) -> Result<Self> {
        if settings.bucket.trim().is_empty() {
            return Err(StoreError::Configuration("bucket name is empty".into()));
        }

        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&settings.bucket)
            .with_region(&settings.region)
            .with_access_key_id(&settings.access_key_id)
            .with_secret_access_key(&settings.secret_access_key);

        if let Some(endpoint) = &settings.endpoint {
            // MinIO local sans TLS
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        let store = builder.build()?;

        info!(
            bucket = %settings.bucket,
            endpoint = settings.endpoint.as_deref().unwrap_or("aws"),
            "S3 store configured"
        );

        Ok(Self {
            store,
            bucket: settings.bucket,
        })
    }

    /// Construit le client depuis la configuration globale
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(S3Settings::from_config(config)?)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl DurableStore for S3Store {
    async fn exists(&self, key: &str) -> Result<bool> {
        match self.store.head(&ObjectPath::from(key)).await {
            Ok(meta) => {
                debug!(key = %key, size = meta.size, "Object found");
                Ok(true)
            }
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn presigned_read_url(&self, key: &str, ttl: Duration) -> Result<String> {
        let url = self
            .store
            .signed_url(http::Method::GET, &ObjectPath::from(key), ttl)
            .await?;
        Ok(url.to_string())
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<()> {
        let size = data.len();
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());

        let options = PutOptions {
            attributes,
            ..Default::default()
        };

        self.store
            .put_opts(&ObjectPath::from(key), PutPayload::from(data), options)
            .await?;

        debug!(key = %key, size, content_type, "Object written");
        Ok(())
    }
}
