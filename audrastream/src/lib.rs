//! # audrastream - Livraison des pistes audio
//!
//! Point d'entrée de la crate : [`DeliveryEngine::serve`].
//!
//! Une piste déjà présente dans le stockage durable est servie par redirection
//! (302) vers une URL signée. Sinon elle est résolue via [`StreamResolver`]
//! (cache de résolution puis backends amont), relayée en direct au client et
//! copiée en tâche de fond dans le stockage durable pour les requêtes
//! suivantes.
//!
//! ## Modules
//!
//! - [`resolver`] : chaîne cache de résolution → backends
//! - [`delivery`] : moteur de livraison et population du stockage
//! - [`tasks`] : tâches de fond détachées, arrêt avec délai de grâce
//! - [`http`] : handlers et routers axum
//! - [`ext`] : trait [`StreamingExt`] pour `audraserver::Server`
//! - [`setup`] : construction des composants depuis la configuration

pub mod delivery;
pub mod error;
pub mod ext;
pub mod http;
pub mod resolver;
pub mod setup;
pub mod tasks;

pub use delivery::{AudioStream, Delivery, DeliveryEngine, DeliverySettings};
pub use error::{DeliveryError, Result};
pub use ext::StreamingExt;
pub use resolver::StreamResolver;
pub use tasks::BackgroundTasks;
