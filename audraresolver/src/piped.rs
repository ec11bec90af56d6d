//! Piped API instances as resolver backends
//!
//! Each instance is queried with `GET {base}/streams/{id}` and answers a JSON
//! document whose `audioStreams` array lists the available audio renditions.
//! One [`PipedBackend`] wraps one instance; the failover order is the order of
//! the backends in the [`BackendPool`](crate::BackendPool).

use crate::backend::Backend;
use crate::error::{ResolverError, Result};
use crate::models::{Rendition, TrackId};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default per-request timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Default cache lifetime of resolved Piped URLs (they expire upstream)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 4 * 3600;

/// Default User-Agent
pub const DEFAULT_USER_AGENT: &str = concat!("audra/", env!("CARGO_PKG_VERSION"));

/// Codec assumed when an instance omits it
const DEFAULT_CODEC: &str = "opus";

#[derive(Debug, Deserialize)]
struct StreamsResponse {
    #[serde(default, rename = "audioStreams")]
    audio_streams: Vec<AudioStream>,
}

#[derive(Debug, Deserialize)]
struct AudioStream {
    url: Option<String>,
    bitrate: Option<u64>,
    codec: Option<String>,
    format: Option<String>,
    #[serde(rename = "mimeType")]
    mime_type: Option<String>,
}

impl AudioStream {
    /// `webm` when the format ("WEBMA_OPUS") or the MIME type mentions it, or
    /// when the instance says nothing at all
    fn container(&self) -> &'static str {
        let mentions_webm = |s: &Option<String>| {
            s.as_deref()
                .map(|v| v.to_ascii_lowercase().contains("webm"))
                .unwrap_or(false)
        };
        let unspecified = self.format.is_none() && self.mime_type.is_none();
        if unspecified || mentions_webm(&self.format) || mentions_webm(&self.mime_type) {
            "webm"
        } else {
            "m4a"
        }
    }
}

/// One Piped API instance
#[derive(Debug, Clone)]
pub struct PipedBackend {
    client: Client,
    base_url: Url,
    name: String,
    timeout: Duration,
    cache_ttl: Duration,
}

impl PipedBackend {
    /// Creates a backend for `base_url` with its own HTTP client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder().user_agent(DEFAULT_USER_AGENT).build()?;
        Self::with_client(client, base_url)
    }

    /// Creates a backend sharing an existing HTTP client
    pub fn with_client(client: Client, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        let name = format!("piped:{}", base_url.host_str().unwrap_or("unknown"));
        Ok(Self {
            client,
            base_url,
            name,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
        })
    }

    /// Builds one backend per instance, in the given order, sharing one client
    ///
    /// Invalid URLs are rejected up front rather than skipped at request time.
    pub fn instances<S: AsRef<str>>(
        base_urls: &[S],
        timeout: Duration,
        cache_ttl: Duration,
    ) -> Result<Vec<Arc<dyn Backend>>> {
        let client = Client::builder().user_agent(DEFAULT_USER_AGENT).build()?;
        base_urls
            .iter()
            .map(|base| {
                let backend = Self::with_client(client.clone(), base.as_ref())?
                    .with_timeout(timeout)
                    .with_cache_ttl(cache_ttl);
                Ok(Arc::new(backend) as Arc<dyn Backend>)
            })
            .collect()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cache_ttl(mut self, cache_ttl: Duration) -> Self {
        self.cache_ttl = cache_ttl;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn streams_url(&self, track_id: &TrackId) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ResolverError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .push("streams")
            .push(track_id.as_str());
        Ok(url)
    }
}

#[async_trait]
impl Backend for PipedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    /// Returns at most one rendition: the highest-bitrate audio stream
    async fn resolve(&self, track_id: &TrackId) -> Result<Vec<Rendition>> {
        let url = self.streams_url(track_id)?;
        debug!(instance = %self.base_url, track_id = %track_id, "Querying Piped instance");

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(ResolverError::Status(response.status().as_u16()));
        }

        let body = response.bytes().await?;
        let streams: StreamsResponse = serde_json::from_slice(&body)?;

        let best = streams
            .audio_streams
            .into_iter()
            .filter(|s| s.url.as_deref().is_some_and(|u| !u.is_empty()))
            .reduce(|best, candidate| {
                if candidate.bitrate.unwrap_or(0) > best.bitrate.unwrap_or(0) {
                    candidate
                } else {
                    best
                }
            });

        Ok(best
            .map(|stream| {
                let container = stream.container();
                Rendition {
                    url: stream.url.unwrap_or_default(),
                    bitrate: stream.bitrate,
                    codec: stream.codec.unwrap_or_else(|| DEFAULT_CODEC.to_string()),
                    container: container.to_string(),
                }
            })
            .into_iter()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(format: Option<&str>, mime: Option<&str>) -> AudioStream {
        AudioStream {
            url: Some("u".into()),
            bitrate: None,
            codec: None,
            format: format.map(str::to_string),
            mime_type: mime.map(str::to_string),
        }
    }

    #[test]
    fn test_container_detection() {
        assert_eq!(stream(Some("WEBMA_OPUS"), None).container(), "webm");
        assert_eq!(stream(Some("M4A"), Some("audio/mp4")).container(), "m4a");
        assert_eq!(stream(None, Some("audio/webm; codecs=\"opus\"")).container(), "webm");
        assert_eq!(stream(None, None).container(), "webm");
    }

    #[test]
    fn test_streams_url_escapes_and_joins() {
        let backend = PipedBackend::new("https://pipedapi.example/").unwrap();
        let id = TrackId::new("a b").unwrap();
        assert_eq!(
            backend.streams_url(&id).unwrap().as_str(),
            "https://pipedapi.example/streams/a%20b"
        );
        assert_eq!(backend.name(), "piped:pipedapi.example");
    }
}
