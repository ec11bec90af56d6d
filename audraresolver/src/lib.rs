//! # audraresolver - Résolution des flux audio amont
//!
//! Cette crate transforme un identifiant de piste en une liste de
//! [`Rendition`]s jouables, en interrogeant des backends amont dans un ordre
//! fixe avec arrêt au premier succès.
//!
//! ## Architecture
//!
//! - [`Backend`] : capacité commune à tous les fournisseurs
//! - [`PipedBackend`] : une instance de l'API Piped (`GET /streams/{id}`)
//! - [`ExtractorBackend`] : un outil d'extraction local (yt-dlp)
//! - [`BackendPool`] : liste ordonnée, bascule sur erreur ou résultat vide
//! - [`select_rendition`] : choix d'une rendition selon la [`Quality`]
//!
//! ## Utilisation
//!
//! ```rust,no_run
//! use audraresolver::{BackendPool, PipedBackend, Quality, TrackId};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backends = PipedBackend::instances(
//!         &["https://pipedapi.kavin.rocks", "https://pipedapi.adminforge.de"],
//!         Duration::from_secs(15),
//!         Duration::from_secs(4 * 3600),
//!     )?;
//!     let pool = BackendPool::new(backends);
//!
//!     let id = TrackId::new("dQw4w9WgXcQ").unwrap();
//!     if let Some(resolution) = pool.resolve(&id).await {
//!         let rendition = resolution.result.select(Quality::Best).unwrap();
//!         println!("{} ({})", rendition.url, rendition.content_type());
//!     }
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod extractor;
pub mod models;
pub mod piped;

pub use backend::{Backend, BackendPool, Resolution};
pub use error::{ResolverError, Result};
pub use extractor::{parse_manifest, ExtractorBackend};
pub use models::{select_rendition, Quality, Rendition, ResolutionResult, TrackId};
pub use piped::PipedBackend;
