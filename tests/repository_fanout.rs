//! Multi-source behavior through the public `Client` facade: first-success
//! fallback across repositories and version-union across two v3 sources.

use nuget_client_core::client::Client;
use nuget_client_core::config::{CacheConfig, ClientConfig};
use nuget_client_core::observability::Observability;
use nuget_client_core::transport::CancelToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(dir: &std::path::Path) -> Client {
    let config = ClientConfig { cache: CacheConfig { root_dir: Some(dir.to_string_lossy().to_string()), ..Default::default() }, ..Default::default() };
    Client::new(config, Observability::default()).unwrap()
}

fn service_index_with_registration(server: &MockServer) -> serde_json::Value {
    serde_json::json!({
        "version": "3.0.0",
        "resources": [{"@id": format!("{}/reg", server.uri()), "@type": "RegistrationsBaseUrl/3.6.0"}]
    })
}

#[tokio::test]
async fn get_metadata_falls_through_a_dead_first_source_to_a_working_second() {
    let good = MockServer::start().await;
    Mock::given(method("GET")).and(path("/index.json")).respond_with(ResponseTemplate::new(200).set_body_json(service_index_with_registration(&good))).mount(&good).await;
    Mock::given(method("GET")).and(path("/reg/testpkg/index.json")).respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "items": [{"lower": "1.0.0", "upper": "1.0.0", "items": [{"catalogEntry": {"id": "TestPkg", "version": "1.0.0"}}]}]
    }))).mount(&good).await;

    let dir = tempfile::tempdir().unwrap();
    let client = client(dir.path());
    client.add_source("dead", "http://127.0.0.1:1", None).await.unwrap();
    client.add_source("good", format!("{}/index.json", good.uri()), None).await.unwrap();

    let metadata = client.get_metadata(&CancelToken::none(), "TestPkg", "1.0.0").await.unwrap();
    assert_eq!(metadata.id, "TestPkg");
}

#[tokio::test]
async fn list_versions_unions_results_from_every_registered_source() {
    let a = MockServer::start().await;
    let b = MockServer::start().await;

    Mock::given(method("GET")).and(path("/index.json")).respond_with(ResponseTemplate::new(200).set_body_json(service_index_with_registration(&a))).mount(&a).await;
    Mock::given(method("GET")).and(path("/reg/testpkg/index.json")).respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "items": [{"lower": "1.0.0", "upper": "1.0.0", "items": [{"catalogEntry": {"id": "TestPkg", "version": "1.0.0"}}]}]
    }))).mount(&a).await;

    Mock::given(method("GET")).and(path("/index.json")).respond_with(ResponseTemplate::new(200).set_body_json(service_index_with_registration(&b))).mount(&b).await;
    Mock::given(method("GET")).and(path("/reg/testpkg/index.json")).respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "items": [{"lower": "2.0.0", "upper": "2.0.0", "items": [{"catalogEntry": {"id": "TestPkg", "version": "2.0.0"}}]}]
    }))).mount(&b).await;

    let dir = tempfile::tempdir().unwrap();
    let client = client(dir.path());
    client.add_source("a", format!("{}/index.json", a.uri()), None).await.unwrap();
    client.add_source("b", format!("{}/index.json", b.uri()), None).await.unwrap();

    let mut versions = client.list_versions(&CancelToken::none(), "TestPkg").await.unwrap();
    versions.sort();
    assert_eq!(versions, vec!["1.0.0".to_string(), "2.0.0".to_string()]);
}

#[tokio::test]
async fn all_sources_failing_surfaces_the_last_error() {
    let dir = tempfile::tempdir().unwrap();
    let client = client(dir.path());
    client.add_source("dead-a", "http://127.0.0.1:1", None).await.unwrap();
    client.add_source("dead-b", "http://127.0.0.1:2", None).await.unwrap();

    // both probes in `create_provider` swallow a connection failure as "not
    // this protocol" rather than propagating it, so an unreachable source
    // surfaces as an undetectable protocol, not a raw network error.
    let err = client.get_metadata(&CancelToken::none(), "TestPkg", "1.0.0").await.unwrap_err();
    assert!(matches!(err, nuget_client_core::error::Error::ProtocolUnknown { .. }));
}
