//! Source authentication: an `X-NuGet-ApiKey` header attached to every
//! outbound request for a source that needs one.
//!
//! Credential *storage* (where the key comes from — an env var, a keyring,
//! a config file) is out of scope; `Auth` only carries the key once a
//! caller has it. Composition happens through [`HttpExecutor`] rather than
//! a field on [`HttpClient`](crate::transport::HttpClient) itself, so a
//! source without credentials pays nothing for the seam.

use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::header::{HeaderName, HeaderValue};

use crate::error::Error;
use crate::transport::{CancelToken, HttpExecutor, Request, Response};

const API_KEY_HEADER: &str = "x-nuget-apikey";

/// Credentials for one source. Currently just an API key, the only scheme
/// the v2 and v3 protocols share; a source that needs something richer
/// (OAuth, a bearer token exchange) would extend this enum rather than
/// bolting more fields onto `Client`/`SourceRepository`.
#[derive(Debug, Clone)]
pub enum Auth {
    ApiKey(String),
}

impl Auth {
    pub fn api_key(key: impl Into<String>) -> Self {
        Auth::ApiKey(key.into())
    }

    fn header_value(&self) -> Option<HeaderValue> {
        match self {
            Auth::ApiKey(key) => HeaderValue::from_str(key).ok(),
        }
    }
}

/// Wraps any [`HttpExecutor`] and injects the configured [`Auth`] header
/// into every request before delegating. Composes instead of modifying
/// `HttpClient`, so `ProviderFactory` can hand a v2/v3 provider either the
/// bare client or this wrapper without either side downcasting.
pub struct AuthenticatedHttpClient {
    inner: Arc<dyn HttpExecutor>,
    auth: Auth,
}

impl AuthenticatedHttpClient {
    pub fn new(inner: Arc<dyn HttpExecutor>, auth: Auth) -> Self {
        Self { inner, auth }
    }

    fn with_auth_header(&self, mut req: Request) -> Request {
        if let Some(value) = self.auth.header_value() {
            req.headers.insert(HeaderName::from_static(API_KEY_HEADER), value);
        }
        req
    }
}

impl HttpExecutor for AuthenticatedHttpClient {
    fn do_<'a>(&'a self, cancel: &'a CancelToken, req: Request) -> BoxFuture<'a, Result<Response, Error>> {
        let req = self.with_auth_header(req);
        self.inner.do_(cancel, req)
    }

    fn do_with_retry<'a>(&'a self, cancel: &'a CancelToken, req: Request) -> BoxFuture<'a, Result<Response, Error>> {
        let req = self.with_auth_header(req);
        self.inner.do_with_retry(cancel, req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CircuitBreakerConfig, HttpConfig, RateLimitConfig, RetryConfig};
    use crate::observability::Observability;
    use crate::transport::HttpClient;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http() -> Arc<HttpClient> {
        Arc::new(HttpClient::new(HttpConfig::default(), RetryConfig::default(), CircuitBreakerConfig::default(), RateLimitConfig::default(), Observability::default()).unwrap())
    }

    #[tokio::test]
    async fn do_attaches_the_api_key_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header(API_KEY_HEADER, "secret-key"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let executor: Arc<dyn HttpExecutor> = http();
        let authenticated = AuthenticatedHttpClient::new(executor, Auth::api_key("secret-key"));

        let url = url::Url::parse(&server.uri()).unwrap();
        let resp = authenticated.do_(&CancelToken::none(), Request::get(url)).await.unwrap();
        assert_eq!(resp.status, 200);
    }

    #[tokio::test]
    async fn do_with_retry_also_attaches_the_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header(API_KEY_HEADER, "secret-key"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let executor: Arc<dyn HttpExecutor> = http();
        let authenticated = AuthenticatedHttpClient::new(executor, Auth::api_key("secret-key"));

        let url = url::Url::parse(&server.uri()).unwrap();
        let resp = authenticated.do_with_retry(&CancelToken::none(), Request::get(url)).await.unwrap();
        assert_eq!(resp.status, 200);
    }
}
