//! S3 adapter tests against a mocked S3 endpoint

use audrastore::{DurableStore, KeyLayout, S3Settings, S3Store, StoreError};
use bytes::Bytes;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings(endpoint: &str) -> S3Settings {
    S3Settings {
        endpoint: Some(endpoint.to_string()),
        bucket: "audramusic".to_string(),
        region: "auto".to_string(),
        access_key_id: "AKIDEXAMPLE".to_string(),
        secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
    }
}

#[tokio::test]
async fn test_presigned_url_is_signed_locally() {
    let store = S3Store::new(settings("http://127.0.0.1:9")).unwrap();
    let key = KeyLayout::default().key("abc123");

    let signed = store
        .presigned_read_url(&key, Duration::from_secs(86_400))
        .await
        .unwrap();
    let url = Url::parse(&signed).unwrap();

    assert_eq!(url.path(), "/audramusic/audio/abc123.webm");
    let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    assert!(query.contains(&("X-Amz-Expires".to_string(), "86400".to_string())));
    assert!(query.iter().any(|(k, _)| k == "X-Amz-Signature"));
}

#[tokio::test]
async fn test_exists_maps_404_to_false() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/audramusic/audio/missing.webm"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let store = S3Store::new(settings(&server.uri())).unwrap();
    assert!(!store.exists("audio/missing.webm").await.unwrap());
}

#[tokio::test]
async fn test_exists_true_on_head_success() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/audramusic/audio/present.webm"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Length", "4")
                .insert_header("Last-Modified", "Mon, 01 Jan 2024 00:00:00 GMT")
                .insert_header("ETag", "\"0123456789abcdef\""),
        )
        .mount(&server)
        .await;

    let store = S3Store::new(settings(&server.uri())).unwrap();
    assert!(store.exists("audio/present.webm").await.unwrap());
}

#[tokio::test]
async fn test_put_sends_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/audramusic/audio/abc.webm"))
        .and(header("content-type", "audio/webm"))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"etag\""))
        .expect(1)
        .mount(&server)
        .await;

    let store = S3Store::new(settings(&server.uri())).unwrap();
    store
        .put("audio/abc.webm", Bytes::from_static(b"OggS...."), "audio/webm")
        .await
        .unwrap();
}

#[test]
fn test_empty_bucket_is_rejected() {
    let mut s = settings("http://127.0.0.1:9");
    s.bucket = String::new();
    assert!(matches!(
        S3Store::new(s),
        Err(StoreError::Configuration(_))
    ));
}
