//! Backend pool ordering and extraction process tests

use async_trait::async_trait;
use audraresolver::{
    Backend, BackendPool, ExtractorBackend, Quality, Rendition, ResolverError, TrackId,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

enum Outcome {
    Fail,
    Empty,
    Found(Vec<Rendition>),
}

struct FakeBackend {
    name: String,
    outcome: Outcome,
    ttl: Duration,
    calls: AtomicUsize,
}

impl FakeBackend {
    fn new(name: &str, outcome: Outcome) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            outcome,
            ttl: Duration::from_secs(60),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for FakeBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn cache_ttl(&self) -> Duration {
        self.ttl
    }

    async fn resolve(&self, _track_id: &TrackId) -> audraresolver::Result<Vec<Rendition>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            Outcome::Fail => Err(ResolverError::Status(502)),
            Outcome::Empty => Ok(Vec::new()),
            Outcome::Found(r) => Ok(r.clone()),
        }
    }
}

fn rendition(url: &str, bitrate: u64) -> Rendition {
    Rendition::new(url, Some(bitrate), "opus", "webm")
}

fn track() -> TrackId {
    TrackId::new("abc123").unwrap()
}

#[tokio::test]
async fn test_pool_queries_in_order_with_early_exit() {
    let first = FakeBackend::new("first", Outcome::Fail);
    let second = FakeBackend::new("second", Outcome::Empty);
    let third = FakeBackend::new("third", Outcome::Found(vec![rendition("u3", 128)]));
    let fourth = FakeBackend::new("fourth", Outcome::Found(vec![rendition("u4", 320)]));

    let pool = BackendPool::new(vec![
        first.clone() as Arc<dyn Backend>,
        second.clone(),
        third.clone(),
        fourth.clone(),
    ]);
    let resolution = pool.resolve(&track()).await.unwrap();

    assert_eq!(resolution.backend, "third");
    assert_eq!(resolution.result.renditions()[0].url, "u3");
    assert_eq!(resolution.ttl, Duration::from_secs(60));
    assert_eq!(first.calls(), 1);
    assert_eq!(second.calls(), 1);
    assert_eq!(third.calls(), 1);
    assert_eq!(fourth.calls(), 0);
}

#[tokio::test]
async fn test_empty_pool_resolves_nothing() {
    let pool = BackendPool::default();
    assert!(pool.is_empty());
    assert!(pool.resolve(&track()).await.is_none());
}

#[tokio::test]
async fn test_pool_exhausted() {
    let a = FakeBackend::new("a", Outcome::Fail);
    let b = FakeBackend::new("b", Outcome::Empty);
    let pool = BackendPool::new(vec![a.clone() as Arc<dyn Backend>, b.clone()]);

    assert!(pool.resolve(&track()).await.is_none());
    assert_eq!(a.calls() + b.calls(), 2);
}

#[cfg(unix)]
mod extractor {
    use super::*;

    const MANIFEST: &str = r#"{"formats":[{"url":"https://x/low","acodec":"opus","vcodec":"none","abr":48,"ext":"webm"},{"url":"https://x/high","acodec":"opus","vcodec":"none","abr":160,"ext":"webm"},{"url":"https://x/mid","acodec":"mp4a.40.2","vcodec":"none","abr":128,"ext":"m4a"},{"url":"https://x/tiny","acodec":"opus","vcodec":"none","abr":32,"ext":"webm"}]}"#;

    #[tokio::test]
    async fn test_extractor_runs_process_and_ranks_formats() {
        // sh -c '<script>' sh <url> : l'URL arrive en $1 et est ignorée
        let backend = ExtractorBackend::new("sh")
            .with_args(["-c".to_string(), format!("printf '%s' '{}'", MANIFEST), "sh".to_string()]);

        let renditions = backend.resolve(&track()).await.unwrap();
        let urls: Vec<&str> = renditions.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://x/high", "https://x/mid", "https://x/low"]);

        let pool = BackendPool::new(vec![Arc::new(backend) as Arc<dyn Backend>]);
        let resolution = pool.resolve(&track()).await.unwrap();
        assert_eq!(resolution.ttl, Duration::from_secs(5 * 3600));
        assert_eq!(resolution.result.select(Quality::Medium).unwrap().url, "https://x/mid");
        assert_eq!(resolution.result.select(Quality::Low).unwrap().url, "https://x/low");
    }

    #[tokio::test]
    async fn test_extractor_failure_exit_code() {
        let backend = ExtractorBackend::new("false").with_args(Vec::<String>::new());
        let err = backend.resolve(&track()).await.unwrap_err();
        assert!(matches!(err, ResolverError::Process(_)));
    }

    #[tokio::test]
    async fn test_extractor_timeout() {
        let backend = ExtractorBackend::new("sh")
            .with_args(["-c", "sleep 5", "sh"])
            .with_timeout(Duration::from_millis(200));
        let err = backend.resolve(&track()).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_missing_program_is_io_error() {
        let backend = ExtractorBackend::new("/nonexistent/audra-extractor");
        let err = backend.resolve(&track()).await.unwrap_err();
        assert!(matches!(err, ResolverError::Io(_)));
    }
}
