//! Local extraction tool (yt-dlp compatible) as a resolver backend
//!
//! The tool is spawned once per query and must print a JSON manifest on
//! stdout. Only audio-only formats are kept, best bitrate first, capped to a
//! few entries so that lower quality tiers remain selectable.

use crate::backend::Backend;
use crate::error::{ResolverError, Result};
use crate::models::{Rendition, TrackId};
use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

pub const DEFAULT_PROGRAM: &str = "yt-dlp";
pub const DEFAULT_URL_TEMPLATE: &str = "https://music.youtube.com/watch?v={id}";
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 5 * 3600;
pub const DEFAULT_MAX_RENDITIONS: usize = 3;

/// Placeholder replaced by the track id in the URL template
const ID_PLACEHOLDER: &str = "{id}";

/// Longest stderr excerpt kept in error messages
const STDERR_EXCERPT: usize = 512;

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    formats: Vec<ManifestFormat>,
}

#[derive(Debug, Deserialize)]
struct ManifestFormat {
    url: Option<String>,
    /// Average audio bitrate, kbit/s
    abr: Option<f64>,
    /// Total bitrate, kbit/s
    tbr: Option<f64>,
    acodec: Option<String>,
    vcodec: Option<String>,
    ext: Option<String>,
}

impl ManifestFormat {
    fn is_audio_only(&self) -> bool {
        let has_audio = self.acodec.as_deref().is_some_and(|c| c != "none");
        let has_video = self.vcodec.as_deref().is_some_and(|c| c != "none");
        has_audio && !has_video
    }

    fn into_rendition(self) -> Option<Rendition> {
        let url = self.url.filter(|u| !u.is_empty())?;
        let bitrate = self
            .abr
            .or(self.tbr)
            .filter(|kbps| kbps.is_finite() && *kbps >= 0.0)
            .map(|kbps| (kbps * 1000.0).round() as u64);
        Some(Rendition {
            url,
            bitrate,
            codec: self.acodec.unwrap_or_default(),
            container: self.ext.unwrap_or_default(),
        })
    }
}

/// Parses a manifest into audio-only renditions, best bitrate first
///
/// Ordering among equal bitrates follows the manifest. At most
/// `max_renditions` entries are kept.
pub fn parse_manifest(json: &[u8], max_renditions: usize) -> Result<Vec<Rendition>> {
    let manifest: Manifest = serde_json::from_slice(json)?;
    let mut renditions: Vec<Rendition> = manifest
        .formats
        .into_iter()
        .filter(ManifestFormat::is_audio_only)
        .filter_map(ManifestFormat::into_rendition)
        .collect();
    renditions.sort_by(|a, b| b.bitrate.cmp(&a.bitrate));
    renditions.truncate(max_renditions);
    Ok(renditions)
}

/// Spawns an extraction tool per query
#[derive(Debug, Clone)]
pub struct ExtractorBackend {
    program: String,
    args: Vec<String>,
    url_template: String,
    timeout: Duration,
    cache_ttl: Duration,
    max_renditions: usize,
}

impl Default for ExtractorBackend {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl ExtractorBackend {
    /// Creates a backend running `program -J --no-warnings --no-playlist <url>`
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec![
                "-J".to_string(),
                "--no-warnings".to_string(),
                "--no-playlist".to_string(),
            ],
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            max_renditions: DEFAULT_MAX_RENDITIONS,
        }
    }

    /// Replaces the arguments passed before the watch URL
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the watch URL template; `{id}` is replaced by the track id
    pub fn with_url_template(mut self, template: impl Into<String>) -> Self {
        self.url_template = template.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cache_ttl(mut self, cache_ttl: Duration) -> Self {
        self.cache_ttl = cache_ttl;
        self
    }

    pub fn with_max_renditions(mut self, max_renditions: usize) -> Self {
        self.max_renditions = max_renditions.max(1);
        self
    }

    fn watch_url(&self, track_id: &TrackId) -> String {
        self.url_template.replace(ID_PLACEHOLDER, track_id.as_str())
    }
}

#[async_trait]
impl Backend for ExtractorBackend {
    fn name(&self) -> &str {
        &self.program
    }

    fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    async fn resolve(&self, track_id: &TrackId) -> Result<Vec<Rendition>> {
        let url = self.watch_url(track_id);
        debug!(program = %self.program, url = %url, "Running extraction tool");

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(&url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // kill_on_drop : le processus est tué si le timeout abandonne le future
        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| ResolverError::Timeout(self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let excerpt: String = stderr.trim().chars().take(STDERR_EXCERPT).collect();
            return Err(ResolverError::Process(format!(
                "{} ({})",
                output.status, excerpt
            )));
        }

        parse_manifest(&output.stdout, self.max_renditions)
    }
}
