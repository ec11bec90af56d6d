//! Erreurs de livraison et leur traduction HTTP

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Type Result pour la livraison
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Échec visible par le client
///
/// Les pannes de backends et du stockage durable ne remontent jamais jusqu'ici :
/// elles sont absorbées (bascule, résolution en direct ou log).
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Identifiant de piste vide
    #[error("Track id must not be empty")]
    InvalidTrackId,

    /// Valeur de `quality` inconnue
    #[error("Invalid quality: {0}")]
    InvalidQuality(String),

    /// Aucun backend n'a pu résoudre la piste
    #[error("No audio found for track {0}")]
    NotFound(String),

    /// La rendition choisie n'a pas pu être ouverte
    #[error("Upstream unavailable: {0}")]
    Upstream(String),
}

impl DeliveryError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DeliveryError::InvalidTrackId | DeliveryError::InvalidQuality(_) => {
                StatusCode::BAD_REQUEST
            }
            DeliveryError::NotFound(_) => StatusCode::NOT_FOUND,
            DeliveryError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for DeliveryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
