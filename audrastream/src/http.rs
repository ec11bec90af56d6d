//! Routes HTTP du moteur de livraison
//!
//! - `GET /stream/{track_id}?quality=best|medium|low`
//! - `GET /api/resolution_cache` et `DELETE /api/resolution_cache/{track_id}`
//! - `GET /blob/{*key}` pour le stockage mémoire (exécution locale)

use crate::delivery::{Delivery, DeliveryEngine};
use crate::error::DeliveryError;
use audraresolver::{Quality, TrackId};
use audrastore::MemoryStore;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;

/// Cache-Control des réponses relayées
pub const RELAY_CACHE_CONTROL: &str = "public, max-age=3600";

/// Nom annoncé par la route de statut
pub const SERVICE_NAME: &str = "Audra";

#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    pub quality: Option<String>,
}

impl StreamQuery {
    /// Qualité demandée ; absente ou vide → `best`
    fn quality(&self) -> Result<Quality, DeliveryError> {
        match self.quality.as_deref().map(str::trim) {
            None | Some("") => Ok(Quality::default()),
            Some(q) => q
                .parse()
                .map_err(|_| DeliveryError::InvalidQuality(q.to_string())),
        }
    }
}

/// GET /stream/{track_id}
pub async fn stream_track(
    State(engine): State<Arc<DeliveryEngine>>,
    Path(track_id): Path<String>,
    Query(query): Query<StreamQuery>,
) -> Response {
    let Some(track_id) = TrackId::new(track_id) else {
        return DeliveryError::InvalidTrackId.into_response();
    };
    let quality = match query.quality() {
        Ok(q) => q,
        Err(e) => return e.into_response(),
    };

    match engine.serve(&track_id, quality).await {
        Ok(delivery) => delivery_response(delivery),
        Err(e) => e.into_response(),
    }
}

/// GET /stream/ sans identifiant
async fn missing_track_id() -> Response {
    DeliveryError::InvalidTrackId.into_response()
}

fn delivery_response(delivery: Delivery) -> Response {
    match delivery {
        // 302 explicite : Redirect::to d'axum renvoie un 303
        Delivery::Redirect(url) => (StatusCode::FOUND, [(header::LOCATION, url)]).into_response(),
        Delivery::Stream { content_type, body } => (
            [
                (header::CONTENT_TYPE, content_type),
                (header::ACCEPT_RANGES, "bytes"),
                (header::CACHE_CONTROL, RELAY_CACHE_CONTROL),
            ],
            Body::from_stream(body),
        )
            .into_response(),
    }
}

/// GET /api/resolution_cache
async fn resolution_cache_stats(State(engine): State<Arc<DeliveryEngine>>) -> impl IntoResponse {
    Json(engine.resolver().cache().stats().await)
}

/// DELETE /api/resolution_cache/{track_id}
async fn resolution_cache_invalidate(
    State(engine): State<Arc<DeliveryEngine>>,
    Path(track_id): Path<String>,
) -> Response {
    match TrackId::new(track_id) {
        Some(id) => {
            engine.resolver().cache().invalidate(&id).await;
            StatusCode::NO_CONTENT.into_response()
        }
        None => DeliveryError::InvalidTrackId.into_response(),
    }
}

/// Routes de streaming
pub fn create_stream_router(engine: Arc<DeliveryEngine>) -> Router {
    Router::new()
        .route("/stream", get(missing_track_id))
        .route("/stream/", get(missing_track_id))
        .route("/stream/{track_id}", get(stream_track))
        .with_state(engine)
}

/// Routes d'administration du cache de résolution
pub fn create_cache_admin_router(engine: Arc<DeliveryEngine>) -> Router {
    Router::new()
        .route("/api/resolution_cache", get(resolution_cache_stats))
        .route(
            "/api/resolution_cache/{track_id}",
            axum::routing::delete(resolution_cache_invalidate),
        )
        .with_state(engine)
}

/// GET /blob/{*key} : lecture directe d'un objet du stockage mémoire
async fn memory_blob(State(store): State<Arc<MemoryStore>>, Path(key): Path<String>) -> Response {
    match store.get(&key).await {
        Some(object) => (
            [
                (header::CONTENT_TYPE, object.content_type),
                (header::CACHE_CONTROL, RELAY_CACHE_CONTROL.to_string()),
            ],
            object.data,
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Sert les objets d'un [`MemoryStore`] sous `/blob`
pub fn create_memory_blob_router(store: Arc<MemoryStore>) -> Router {
    Router::new()
        .route("/blob/{*key}", get(memory_blob))
        .with_state(store)
}

/// Corps de `GET /`
pub fn service_status() -> serde_json::Value {
    serde_json::json!({ "status": "ok", "service": SERVICE_NAME })
}
