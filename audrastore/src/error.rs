//! Gestion des erreurs du stockage durable

use thiserror::Error;

/// Type Result pour les opérations de stockage
pub type Result<T> = std::result::Result<T, StoreError>;

/// Erreurs du stockage durable
#[derive(Error, Debug)]
pub enum StoreError {
    /// Erreur remontée par le client objet (réseau, signature, réponse S3)
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// Paramètres de connexion manquants ou invalides
    #[error("Store configuration error: {0}")]
    Configuration(String),

    /// Objet absent
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Erreur injectée ou interne au stockage mémoire
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
