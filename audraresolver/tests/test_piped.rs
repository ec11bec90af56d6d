//! Failover tests against mocked Piped instances

use audraresolver::{Backend, BackendPool, PipedBackend, Quality, TrackId};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn streams_json(streams: &[(&str, u64)]) -> serde_json::Value {
    let audio: Vec<serde_json::Value> = streams
        .iter()
        .map(|(url, bitrate)| {
            json!({
                "url": url,
                "bitrate": bitrate,
                "codec": "opus",
                "format": "WEBMA_OPUS",
                "mimeType": "audio/webm"
            })
        })
        .collect();
    json!({ "title": "Some track", "audioStreams": audio })
}

fn pool_for(servers: &[&MockServer], timeout: Duration) -> BackendPool {
    let urls: Vec<String> = servers.iter().map(|s| s.uri()).collect();
    BackendPool::new(
        PipedBackend::instances(&urls, timeout, Duration::from_secs(14400)).unwrap(),
    )
}

fn track(id: &str) -> TrackId {
    TrackId::new(id).unwrap()
}

#[tokio::test]
async fn test_timeout_fails_over_and_stops_at_first_success() {
    let slow = MockServer::start().await;
    let good = MockServer::start().await;
    let unused = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/streams/abc123"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(streams_json(&[("https://slow/audio", 160_000)]))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&slow)
        .await;

    Mock::given(method("GET"))
        .and(path("/streams/abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(streams_json(&[
            ("https://good/low", 64_000),
            ("https://good/high", 160_000),
        ])))
        .expect(1)
        .mount(&good)
        .await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(streams_json(&[("https://x", 1)])))
        .expect(0)
        .mount(&unused)
        .await;

    let pool = pool_for(&[&slow, &good, &unused], Duration::from_millis(300));
    let resolution = pool.resolve(&track("abc123")).await.unwrap();

    // Une instance Piped ne renvoie que son meilleur flux
    assert_eq!(resolution.result.len(), 1);
    let best = resolution.result.select(Quality::Best).unwrap();
    assert_eq!(best.url, "https://good/high");
    assert_eq!(best.bitrate, Some(160_000));
    assert_eq!(best.content_type(), "audio/webm");
    assert_eq!(resolution.ttl, Duration::from_secs(14400));
    assert!(resolution.backend.starts_with("piped:"));
}

#[tokio::test]
async fn test_error_status_and_empty_list_fail_over() {
    let broken = MockServer::start().await;
    let empty = MockServer::start().await;
    let good = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&broken)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "audioStreams": [] })))
        .expect(1)
        .mount(&empty)
        .await;
    Mock::given(method("GET"))
        .and(path("/streams/xyz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "audioStreams": [{
                "url": "https://good/m4a",
                "bitrate": 128000,
                "codec": "mp4a.40.2",
                "format": "M4A",
                "mimeType": "audio/mp4"
            }]
        })))
        .mount(&good)
        .await;

    let pool = pool_for(&[&broken, &empty, &good], Duration::from_secs(5));
    let resolution = pool.resolve(&track("xyz")).await.unwrap();

    let rendition = resolution.result.select(Quality::Low).unwrap();
    assert_eq!(rendition.url, "https://good/m4a");
    assert_eq!(rendition.container, "m4a");
    assert_eq!(rendition.content_type(), "audio/mp4");
}

#[tokio::test]
async fn test_all_instances_failing_yields_none() {
    let a = MockServer::start().await;
    let b = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&a)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&b)
        .await;

    let pool = pool_for(&[&a, &b], Duration::from_secs(5));
    assert!(pool.resolve(&track("missing")).await.is_none());
}

#[tokio::test]
async fn test_single_backend_error_kinds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let backend = PipedBackend::new(&server.uri()).unwrap();
    let err = backend.resolve(&track("abc")).await.unwrap_err();
    assert!(matches!(err, audraresolver::ResolverError::Status(503)));
    assert!(!err.is_timeout());
}

#[tokio::test]
async fn test_streams_without_url_are_ignored() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "audioStreams": [
                { "bitrate": 320000 },
                { "url": "", "bitrate": 256000 },
                { "url": "https://ok/a", "bitrate": 96000 }
            ]
        })))
        .mount(&server)
        .await;

    let backend = PipedBackend::new(&server.uri()).unwrap();
    let renditions = backend.resolve(&track("abc")).await.unwrap();
    assert_eq!(renditions.len(), 1);
    assert_eq!(renditions[0].url, "https://ok/a");
    assert_eq!(renditions[0].codec, "opus");
}
