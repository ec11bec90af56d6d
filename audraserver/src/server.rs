//! # Module Server - API de haut niveau pour Axum
//!
//! Ce module fournit une abstraction simple pour créer le serveur HTTP
//! d'Audra, en cachant la configuration du routage et de l'arrêt.
//!
//! - Routes JSON simples avec `add_route()`
//! - Handlers avec état (SSE, streaming) avec `add_handler_with_state()`
//! - Sous-routers complets avec `add_router()`
//! - Arrêt gracieux sur Ctrl+C ou via `shutdown()`

use crate::logs::{LogState, LoggingOptions, create_logs_router, init_logging, log_dump, log_sse};
use anyhow::{Context, Result};
use audraconfig::get_config;
use axum::handler::Handler;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{signal, sync::RwLock, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

/// Nom par défaut du serveur
pub const DEFAULT_SERVER_NAME: &str = "Audra";

/// Info serveur sérialisable
#[derive(Clone, Debug, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub base_url: String,
    pub http_port: u16,
}

/// Serveur principal
pub struct Server {
    name: String,
    base_url: String,
    http_port: u16,
    router: Arc<RwLock<Router>>,
    join_handle: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
    shutdown: CancellationToken,
    log_state: Option<LogState>,
}

impl Server {
    /// Crée une nouvelle instance de serveur
    ///
    /// * `name` - Nom du serveur (pour les logs)
    /// * `base_url` - Nom d'hôte annoncé (ex: "localhost")
    /// * `http_port` - Port HTTP à écouter ; 0 choisit un port libre
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, http_port: u16) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            http_port,
            router: Arc::new(RwLock::new(Router::new())),
            join_handle: None,
            local_addr: None,
            shutdown: CancellationToken::new(),
            log_state: None,
        }
    }

    pub fn new_configured() -> Self {
        ServerBuilder::new_configured().build()
    }

    /// Ajoute une route JSON dynamique
    ///
    /// La closure fournie est appelée à chaque requête GET sur `path`.
    ///
    /// ```rust,no_run
    /// # use audraserver::Server;
    /// # #[tokio::main]
    /// # async fn main() {
    /// # let mut server = Server::new("Test", "localhost", 3000);
    /// server.add_route("/api/status", || async {
    ///     serde_json::json!({ "status": "ok" })
    /// }).await;
    /// # }
    /// ```
    pub async fn add_route<F, Fut, T>(&mut self, path: &str, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let f = Arc::new(f);
        let handler = move || {
            let f = f.clone();
            async move { Json(f().await) }
        };

        self.mount(path, Router::new().route("/", get(handler))).await;
    }

    /// Ajoute un handler GET avec état
    pub async fn add_handler_with_state<H, T, S>(&mut self, path: &str, handler: H, state: S)
    where
        H: Handler<T, S> + Clone + 'static,
        T: 'static,
        S: Clone + Send + Sync + 'static,
    {
        let route = Router::new()
            .route("/", get(handler))
            .with_state(state);
        self.mount(path, route).await;
    }

    /// Ajoute un sous-router au serveur
    ///
    /// - Si `path` est "/", merge directement au router principal
    /// - Sinon, nest le router sous le chemin donné
    pub async fn add_router(&mut self, path: &str, sub_router: Router) {
        if path == "/" {
            let mut r = self.router.write().await;
            *r = std::mem::take(&mut *r).merge(sub_router);
        } else {
            let normalized = format!("/{}", path.trim_start_matches('/'));
            self.mount(&normalized, sub_router).await;
        }
    }

    async fn mount(&mut self, path: &str, route: Router) {
        let mut r = self.router.write().await;
        *r = if path == "/" {
            std::mem::take(&mut *r).merge(route)
        } else {
            std::mem::take(&mut *r).nest(path, route)
        };
    }

    /// Router complet tel qu'il sera servi (CORS inclus)
    pub async fn router(&self) -> Router {
        self.router
            .read()
            .await
            .clone()
            .layer(CorsLayer::permissive())
    }

    /// Démarre le serveur HTTP
    ///
    /// Lie le port configuré puis sert en tâche de fond jusqu'à Ctrl+C ou
    /// [`Server::shutdown`]. Les requêtes en cours sont terminées avant
    /// l'arrêt.
    pub async fn start(&mut self) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.http_port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Cannot bind HTTP port {}", self.http_port))?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);

        info!(
            "Server {} running at http://{}:{}",
            self.name,
            self.base_url,
            local_addr.port()
        );

        let router = self.router().await;
        let token = self.shutdown.clone();
        let shutdown_signal = async move {
            tokio::select! {
                result = signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!("Failed to listen for Ctrl+C: {}", e);
                        // Sans signal, seul shutdown() peut arrêter le serveur
                        token.cancelled().await;
                    } else {
                        info!("Ctrl+C reçu, arrêt gracieux");
                        token.cancel();
                    }
                }
                _ = token.cancelled() => {}
            }
        };

        self.join_handle = Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router.into_make_service())
                .with_graceful_shutdown(shutdown_signal)
                .await
            {
                error!("HTTP server error: {}", e);
            }
        }));

        Ok(())
    }

    /// Attend la fin du serveur
    pub async fn wait(&mut self) {
        if let Some(h) = self.join_handle.take() {
            let _ = h.await;
        }
    }

    /// Demande l'arrêt gracieux du serveur
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Jeton annulé à l'arrêt du serveur (Ctrl+C ou `shutdown()`)
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Adresse effectivement liée, une fois démarré
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Récupère les infos du serveur
    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            name: self.name.clone(),
            base_url: self.base_url.clone(),
            http_port: self.http_port,
        }
    }

    pub fn log_state(&self) -> Option<&LogState> {
        self.log_state.as_ref()
    }

    /// Initialise le système de logging et enregistre les routes de logs
    ///
    /// Routes : `/log-sse`, `/log-dump`, `GET|POST /api/log_setup`.
    pub async fn init_logging(&mut self, options: LoggingOptions) {
        let log_state = init_logging(options);
        self.add_log_routes(log_state).await;
    }

    /// Enregistre les routes de logs pour un `LogState` existant
    pub async fn add_log_routes(&mut self, log_state: LogState) {
        self.add_handler_with_state("/log-sse", log_sse, log_state.clone())
            .await;
        self.add_handler_with_state("/log-dump", log_dump, log_state.clone())
            .await;
        self.add_router("/api", create_logs_router(log_state.clone()))
            .await;

        self.log_state = Some(log_state);
    }
}

/// Builder pattern
pub struct ServerBuilder {
    name: String,
    base_url: String,
    http_port: u16,
}

impl ServerBuilder {
    /// Crée un nouveau builder
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, http_port: u16) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            http_port,
        }
    }

    /// Builder initialisé depuis `host.base_url` et `host.http_port`
    pub fn new_configured() -> Self {
        let config = get_config();
        Self {
            name: DEFAULT_SERVER_NAME.to_string(),
            base_url: config.get_base_url(),
            http_port: config.get_http_port(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn http_port(mut self, port: u16) -> Self {
        self.http_port = port;
        self
    }

    /// Construit le serveur
    pub fn build(self) -> Server {
        Server::new(self.name, self.base_url, self.http_port)
    }
}
