//! Data model shared by resolvers, caches and the delivery engine

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque, case-sensitive track identifier
///
/// The only validation is that the identifier is not empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TrackId(String);

impl TrackId {
    /// Builds an identifier, rejecting the empty string
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.is_empty() {
            None
        } else {
            Some(Self(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TrackId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TrackId {
    type Error = &'static str;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TrackId::new(value).ok_or("track id must not be empty")
    }
}

impl From<TrackId> for String {
    fn from(id: TrackId) -> Self {
        id.0
    }
}

/// One concrete encoded audio stream offered by an upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rendition {
    /// Upstream URL, used as-is
    pub url: String,
    /// Bitrate in bit/s, when the upstream reports one
    pub bitrate: Option<u64>,
    /// Audio codec (e.g. "opus", "mp4a.40.2")
    pub codec: String,
    /// Container (e.g. "webm", "m4a")
    pub container: String,
}

impl Rendition {
    pub fn new(
        url: impl Into<String>,
        bitrate: Option<u64>,
        codec: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            bitrate,
            codec: codec.into(),
            container: container.into(),
        }
    }

    /// MIME type announced to clients for this rendition
    ///
    /// WebM maps to `audio/webm`; everything else is served as `audio/mp4`.
    pub fn content_type(&self) -> &'static str {
        if self.container.eq_ignore_ascii_case("webm") {
            "audio/webm"
        } else {
            "audio/mp4"
        }
    }
}

/// Ordered renditions produced by one backend query round
///
/// An empty result means "no audio found".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionResult(Vec<Rendition>);

impl ResolutionResult {
    pub fn new(renditions: Vec<Rendition>) -> Self {
        Self(renditions)
    }

    pub fn renditions(&self) -> &[Rendition] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Picks a rendition according to `quality`, see [`select_rendition`]
    pub fn select(&self, quality: Quality) -> Option<&Rendition> {
        select_rendition(&self.0, quality)
    }

    pub fn into_inner(self) -> Vec<Rendition> {
        self.0
    }
}

impl From<Vec<Rendition>> for ResolutionResult {
    fn from(renditions: Vec<Rendition>) -> Self {
        Self(renditions)
    }
}

/// Quality tier requested by the client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[default]
    Best,
    Medium,
    Low,
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "best" | "high" => Ok(Quality::Best),
            "medium" => Ok(Quality::Medium),
            "low" => Ok(Quality::Low),
            other => Err(format!("unknown quality '{}'", other)),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Quality::Best => "best",
            Quality::Medium => "medium",
            Quality::Low => "low",
        };
        f.write_str(name)
    }
}

/// Selects a rendition from an ordered list
///
/// - `Best`: highest bitrate
/// - `Low`: lowest bitrate
/// - `Medium`: second-highest bitrate when at least two renditions exist,
///   otherwise the highest
///
/// Unknown bitrates rank below every known one. Equal bitrates keep input
/// order, so the first-encountered rendition wins.
pub fn select_rendition(renditions: &[Rendition], quality: Quality) -> Option<&Rendition> {
    match quality {
        Quality::Best => highest(renditions),
        Quality::Low => renditions.iter().reduce(|lowest, candidate| {
            if candidate.bitrate < lowest.bitrate {
                candidate
            } else {
                lowest
            }
        }),
        Quality::Medium => {
            if renditions.len() < 2 {
                return highest(renditions);
            }
            let mut ranked: Vec<&Rendition> = renditions.iter().collect();
            // sort_by est stable : à bitrate égal, l'ordre d'entrée est conservé
            ranked.sort_by(|a, b| b.bitrate.cmp(&a.bitrate));
            ranked.get(1).copied()
        }
    }
}

fn highest(renditions: &[Rendition]) -> Option<&Rendition> {
    renditions.iter().reduce(|best, candidate| {
        if candidate.bitrate > best.bitrate {
            candidate
        } else {
            best
        }
    })
}
