// logs.rs
mod bufferlayer;

use audraconfig::Config;
pub use bufferlayer::BufferLayer;

use std::{
    collections::VecDeque,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::SystemTime,
};

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::Level;
use tracing_subscriber::{
    Registry, filter::LevelFilter, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

/// Taille du canal de diffusion vers les clients SSE
const BROADCAST_CAPACITY: usize = 1000;

const AVAILABLE_LEVELS: [&str; 5] = ["ERROR", "WARN", "INFO", "DEBUG", "TRACE"];

/// Représente une entrée de log
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: SystemTime,
    pub level: String,
    pub target: String,
    pub message: String,
}

/// Buffer circulaire partagé
#[derive(Clone)]
pub struct LogState {
    buffer: Arc<RwLock<VecDeque<LogEntry>>>,
    capacity: usize,
    tx: broadcast::Sender<LogEntry>,
    max_level: Arc<RwLock<Level>>,
    reload_handle: reload::Handle<LevelFilter, Registry>,
}

// Un panic pendant une écriture ne doit pas rendre les logs inaccessibles
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl LogState {
    pub fn new(
        capacity: usize,
        initial_level: Level,
        reload_handle: reload::Handle<LevelFilter, Registry>,
    ) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
            tx: broadcast::channel(BROADCAST_CAPACITY).0,
            max_level: Arc::new(RwLock::new(initial_level)),
            reload_handle,
        }
    }

    /// Change le niveau minimal à chaud
    pub fn set_max_level(&self, level: Level) -> Result<(), String> {
        self.reload_handle
            .reload(level_to_levelfilter(level))
            .map_err(|e| e.to_string())?;
        *write(&self.max_level) = level;
        Ok(())
    }

    pub fn get_max_level(&self) -> Level {
        *read(&self.max_level)
    }

    fn push(&self, entry: LogEntry) {
        {
            let mut buf = write(&self.buffer);
            if buf.len() >= self.capacity {
                buf.pop_front();
            }
            buf.push_back(entry.clone());
        }
        // Pas d'abonné : l'entrée reste seulement dans le buffer
        let _ = self.tx.send(entry);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.tx.subscribe()
    }

    pub fn dump(&self) -> Vec<LogEntry> {
        read(&self.buffer).iter().cloned().collect()
    }
}

/// Query params pour /log-sse
#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    #[serde(default)]
    pub error: Option<bool>,
    #[serde(default)]
    pub warn: Option<bool>,
    #[serde(default)]
    pub info: Option<bool>,
    #[serde(default)]
    pub debug: Option<bool>,
    #[serde(default)]
    pub trace: Option<bool>,
    #[serde(default)]
    pub search: Option<String>,
}

/// Handler SSE : historique du buffer puis logs en temps réel
pub async fn log_sse(
    State(state): State<LogState>,
    Query(params): Query<LogQuery>,
) -> impl IntoResponse {
    let mut rx = state.subscribe();
    let history = state.dump();
    let stream_state = state.clone();

    let stream = async_stream::stream! {
        let current_level = stream_state.get_max_level();
        for entry in history {
            if !is_level_allowed(&entry.level, current_level) || !filter_entry(&entry, &params) {
                continue;
            }
            if let Ok(event) = Event::default().json_data(&entry) {
                yield Ok::<_, axum::Error>(event);
            }
        }

        loop {
            let entry = match rx.recv().await {
                Ok(entry) => entry,
                // Client trop lent : on saute les entrées perdues
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let max_level = stream_state.get_max_level();
            if !is_level_allowed(&entry.level, max_level) || !filter_entry(&entry, &params) {
                continue;
            }
            if let Ok(event) = Event::default().json_data(&entry) {
                yield Ok::<_, axum::Error>(event);
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Handler REST (dump JSON du buffer)
pub async fn log_dump(State(state): State<LogState>) -> impl IntoResponse {
    Json(state.dump())
}

/// Vérifie si un niveau de log est autorisé selon le niveau maximum configuré
fn is_level_allowed(log_level: &str, max_level: Level) -> bool {
    // Level : ERROR < WARN < ... < TRACE en verbosité, `<=` garde les plus graves
    match string_to_level(log_level) {
        Some(entry_level) => entry_level <= max_level,
        None => false,
    }
}

/// Fonction de filtrage
fn filter_entry(entry: &LogEntry, q: &LogQuery) -> bool {
    let lvl = entry.level.to_lowercase();
    let flags = [
        (q.error, "error"),
        (q.warn, "warn"),
        (q.info, "info"),
        (q.debug, "debug"),
        (q.trace, "trace"),
    ];

    let any_flag = flags.iter().any(|(flag, _)| flag.unwrap_or(false));
    // si aucun flag → tout est autorisé
    let mut allowed = !any_flag
        || flags
            .iter()
            .any(|(flag, name)| flag.unwrap_or(false) && lvl == *name);

    if let Some(search) = &q.search {
        allowed &= entry.message.contains(search) || entry.target.contains(search);
    }

    allowed
}

/// Options d'initialisation du système de logging
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Capacité du buffer circulaire (nombre d'entrées conservées)
    pub buffer_capacity: usize,
    /// Activer la sortie vers la console
    pub enable_console: bool,
    /// Niveau minimal initial
    pub min_level: Level,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            buffer_capacity: 1000,
            enable_console: true,
            min_level: Level::INFO,
        }
    }
}

impl LoggingOptions {
    /// Lit les options dans `host.logger`, avec les valeurs par défaut en repli
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();
        Self {
            buffer_capacity: config
                .get_log_cache_size()
                .unwrap_or(defaults.buffer_capacity),
            enable_console: config
                .get_log_enable_console()
                .unwrap_or(defaults.enable_console),
            min_level: config
                .get_log_min_level()
                .ok()
                .and_then(|l| string_to_level(&l))
                .unwrap_or(defaults.min_level),
        }
    }
}

/// Initialise le système de logging : filtre rechargeable, buffer, console
///
/// Retourne le `LogState` à passer aux routes de logs. Si un subscriber
/// global est déjà installé (tests), le nouveau n'est pas installé mais le
/// `LogState` reste utilisable.
pub fn init_logging(options: LoggingOptions) -> LogState {
    let (filter, reload_handle) = reload::Layer::new(level_to_levelfilter(options.min_level));
    let log_state = LogState::new(options.buffer_capacity, options.min_level, reload_handle);

    // Le filtre rechargeable doit précéder les autres layers
    let subscriber = Registry::default()
        .with(filter)
        .with(BufferLayer::new(log_state.clone()));

    let installed = if options.enable_console {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true),
            )
            .try_init()
    } else {
        subscriber.try_init()
    };

    if let Err(e) = installed {
        eprintln!("Logging already initialized: {}", e);
    }

    log_state
}

/// Request body pour la configuration du logging
#[derive(Debug, Deserialize)]
pub struct LogSetupRequest {
    pub level: String,
}

/// Response pour la configuration du logging
#[derive(Debug, Serialize, Deserialize)]
pub struct LogSetupResponse {
    pub current_level: String,
    pub available_levels: Vec<String>,
}

impl LogSetupResponse {
    fn new(level: Level) -> Self {
        Self {
            current_level: level_to_string(level),
            available_levels: AVAILABLE_LEVELS.iter().map(|l| l.to_string()).collect(),
        }
    }
}

/// GET /api/log_setup - retourne la configuration actuelle
pub async fn log_setup_get(State(state): State<LogState>) -> impl IntoResponse {
    Json(LogSetupResponse::new(state.get_max_level()))
}

/// POST /api/log_setup - met à jour le niveau de log
pub async fn log_setup_post(
    State(state): State<LogState>,
    Json(payload): Json<LogSetupRequest>,
) -> Response {
    let Some(level) = string_to_level(&payload.level) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "Invalid log level. Must be one of: ERROR, WARN, INFO, DEBUG, TRACE"
            })),
        )
            .into_response();
    };

    if let Err(e) = state.set_max_level(level) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e })),
        )
            .into_response();
    }
    tracing::info!("Log level changed to: {}", level);

    Json(LogSetupResponse::new(level)).into_response()
}

fn string_to_level(s: &str) -> Option<Level> {
    match s.trim().to_uppercase().as_str() {
        "ERROR" => Some(Level::ERROR),
        "WARN" => Some(Level::WARN),
        "INFO" => Some(Level::INFO),
        "DEBUG" => Some(Level::DEBUG),
        "TRACE" => Some(Level::TRACE),
        _ => None,
    }
}

fn level_to_string(level: Level) -> String {
    level.as_str().to_string()
}

fn level_to_levelfilter(level: Level) -> LevelFilter {
    LevelFilter::from_level(level)
}

/// Crée le router pour l'API de gestion des logs (`/log_setup`)
pub fn create_logs_router(log_state: LogState) -> Router {
    Router::new()
        .route("/log_setup", get(log_setup_get).post(log_setup_post))
        .with_state(log_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    fn test_state(capacity: usize) -> LogState {
        let (_filter, handle) = reload::Layer::<LevelFilter, Registry>::new(LevelFilter::TRACE);
        LogState::new(capacity, Level::TRACE, handle)
    }

    fn entry(level: &str, message: &str) -> LogEntry {
        LogEntry {
            timestamp: SystemTime::now(),
            level: level.to_string(),
            target: "audrastream::delivery".to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_ring_buffer_drops_oldest() {
        let state = test_state(2);
        state.push(entry("INFO", "one"));
        state.push(entry("INFO", "two"));
        state.push(entry("INFO", "three"));

        let messages: Vec<String> = state.dump().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["two", "three"]);
    }

    #[test]
    fn test_buffer_layer_captures_message_and_fields() {
        let state = test_state(10);
        let subscriber = Registry::default().with(BufferLayer::new(state.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(track_id = "abc123", "Population failed");
        });

        let dump = state.dump();
        assert_eq!(dump.len(), 1);
        assert_eq!(dump[0].level, "WARN");
        assert_eq!(dump[0].message, "Population failed track_id=abc123");
    }

    #[test]
    fn test_level_filtering() {
        assert!(is_level_allowed("ERROR", Level::INFO));
        assert!(is_level_allowed("INFO", Level::INFO));
        assert!(!is_level_allowed("DEBUG", Level::INFO));
        assert!(!is_level_allowed("bogus", Level::TRACE));
    }

    #[test]
    fn test_query_filtering() {
        let warn = entry("WARN", "Backend failed");
        assert!(filter_entry(&warn, &LogQuery::default()));

        let only_errors = LogQuery {
            error: Some(true),
            ..Default::default()
        };
        assert!(!filter_entry(&warn, &only_errors));

        let search = LogQuery {
            search: Some("delivery".to_string()),
            ..Default::default()
        };
        assert!(filter_entry(&warn, &search));
    }
}
