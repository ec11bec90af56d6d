//! # audraserver - Serveur web haut niveau basé sur Axum
//!
//! Cette crate fournit le serveur HTTP d'Audra et son système de logs :
//!
//! - [`server`] : serveur principal et builder, arrêt gracieux sur Ctrl+C
//! - [`logs`] : buffer circulaire de logs exposé en SSE et en JSON, niveau
//!   modifiable à chaud
//!
//! Les autres crates ajoutent leurs routes via des traits d'extension sur
//! [`Server`].
//!
//! ## Exemple d'utilisation
//!
//! ```rust,no_run
//! use audraserver::{ServerBuilder, logs::LoggingOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut server = ServerBuilder::new("MyServer", "localhost", 8080).build();
//!     server.init_logging(LoggingOptions::default()).await;
//!
//!     server.add_route("/api/status", || async {
//!         serde_json::json!({"status": "ok"})
//!     }).await;
//!
//!     server.start().await?;
//!     server.wait().await;
//!     Ok(())
//! }
//! ```

pub mod logs;
pub mod server;

pub use logs::{BufferLayer, LogState, LoggingOptions, init_logging, log_dump, log_sse};
pub use server::{Server, ServerBuilder, ServerInfo};
