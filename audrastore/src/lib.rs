//! # audrastore - Stockage durable des fichiers audio
//!
//! Une piste déjà téléchargée est conservée dans un stockage objet sous la
//! clé `{prefix}/{track_id}.{extension}`. Les clients ne lisent jamais le
//! stockage au travers du serveur : ils sont redirigés vers une URL signée à
//! durée limitée.
//!
//! ## Implémentations
//!
//! - [`S3Store`] : bucket S3-compatible (R2, AWS, MinIO) via `object_store`
//! - [`MemoryStore`] : stockage volatil pour les tests et l'exécution locale
//!
//! ```rust,no_run
//! use audrastore::{DurableStore, KeyLayout, S3Store};
//! use std::time::Duration;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = audraconfig::get_config();
//! let store = S3Store::from_config(&config)?;
//! let key = KeyLayout::default().key("dQw4w9WgXcQ");
//! if store.exists(&key).await? {
//!     let url = store.presigned_read_url(&key, Duration::from_secs(86_400)).await?;
//!     println!("{}", url);
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod key;
pub mod memory;
pub mod s3;

pub use error::{Result, StoreError};
pub use key::KeyLayout;
pub use memory::{MemoryStore, StoredObject};
pub use s3::{S3Settings, S3Store};

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// Stockage durable adressé par clé
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Indique si l'objet existe
    async fn exists(&self, key: &str) -> Result<bool>;

    /// URL de lecture directe valable `ttl`
    async fn presigned_read_url(&self, key: &str, ttl: Duration) -> Result<String>;

    /// Écrit (ou remplace) un objet avec son type MIME
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<()>;
}
