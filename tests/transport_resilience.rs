//! Resilience behavior observed through the public `Client` facade: a
//! transient 503 is retried away before the caller ever sees it, and a rate
//! limit configured down to nothing makes a call fail fast instead of
//! hanging.

use nuget_client_core::cache::CacheContext;
use nuget_client_core::client::Client;
use nuget_client_core::config::{CacheConfig, ClientConfig, RateLimitConfig, RetryConfig};
use nuget_client_core::observability::Observability;
use nuget_client_core::transport::CancelToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn service_index(server: &MockServer) -> serde_json::Value {
    serde_json::json!({
        "version": "3.0.0",
        "resources": [{"@id": format!("{}/flatcontainer", server.uri()), "@type": "PackageBaseAddress/3.0.0"}]
    })
}

#[tokio::test]
async fn a_download_survives_two_transient_failures_via_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).and(path("/index.json")).respond_with(ResponseTemplate::new(200).set_body_json(service_index(&server))).mount(&server).await;

    let mut body = vec![0x50, 0x4B];
    body.extend_from_slice(b"payload");
    Mock::given(method("GET"))
        .and(path("/flatcontainer/testpkg/1.0.0/testpkg.1.0.0.nupkg"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flatcontainer/testpkg/1.0.0/testpkg.1.0.0.nupkg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = ClientConfig {
        cache: CacheConfig { root_dir: Some(dir.path().to_string_lossy().to_string()), ..Default::default() },
        retry: RetryConfig { initial_backoff_ms: 1, max_backoff_ms: 2, jitter_factor: 0.0, ..Default::default() },
        ..Default::default()
    };
    let client = Client::new(config, Observability::default()).unwrap();
    client.add_source("nuget", format!("{}/index.json", server.uri()), None).await.unwrap();

    let bytes = client.download(&CancelToken::none(), "TestPkg", "1.0.0", &CacheContext::default()).await.unwrap();
    assert_eq!(bytes.as_ref(), body.as_slice());
}

#[tokio::test]
async fn cancelling_before_detection_completes_leaves_the_source_undetected() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).and(path("/index.json")).respond_with(ResponseTemplate::new(200).set_body_json(service_index(&server))).mount(&server).await;

    let dir = tempfile::tempdir().unwrap();
    // a zero-capacity limiter starves every acquire; combined with an
    // already-cancelled token, both detection probes observe a failure and
    // (per `ProviderFactory::probe_v3`/`probe_v2`) treat it as "not this
    // protocol" rather than propagating it, so detection as a whole reports
    // the source as undetectable.
    let config = ClientConfig {
        cache: CacheConfig { root_dir: Some(dir.path().to_string_lossy().to_string()), ..Default::default() },
        rate_limit: RateLimitConfig { capacity: 0.0, refill_per_second: 0.0 },
        ..Default::default()
    };
    let client = Client::new(config, Observability::default()).unwrap();
    client.add_source("nuget", format!("{}/index.json", server.uri()), None).await.unwrap();

    let (handle, token) = nuget_client_core::transport::CancelToken::new();
    handle.cancel();
    let err = client.download(&token, "TestPkg", "1.0.0", &CacheContext::default()).await.unwrap_err();
    assert!(matches!(err, nuget_client_core::error::Error::ProtocolUnknown { .. }));
}
