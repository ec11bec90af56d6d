//! Disposition des clés d'objets

/// Préfixe par défaut des objets audio
pub const DEFAULT_PREFIX: &str = "audio";

/// Extension par défaut des objets audio
pub const DEFAULT_EXTENSION: &str = "webm";

/// Construit la clé d'un objet à partir de l'identifiant de piste
///
/// Format: `{prefix}/{track_id}.{extension}`. Un préfixe vide place l'objet
/// à la racine du bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    prefix: String,
    extension: String,
}

impl KeyLayout {
    pub fn new(prefix: impl Into<String>, extension: impl Into<String>) -> Self {
        let prefix = prefix.into().trim_matches('/').to_string();
        let extension = extension.into().trim_start_matches('.').to_string();
        Self { prefix, extension }
    }

    /// Clé de l'objet associé à une piste
    pub fn key(&self, track_id: &str) -> String {
        if self.prefix.is_empty() {
            format!("{}.{}", track_id, self.extension)
        } else {
            format!("{}/{}.{}", self.prefix, track_id, self.extension)
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX, DEFAULT_EXTENSION)
    }
}
