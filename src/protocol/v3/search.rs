//! v3 search query (spec §4.6.3).

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::cache::{keys, CacheContext, MultiTierCache};
use crate::error::Error;
use crate::protocol::{SearchOptions, SearchResult};
use crate::transport::{CancelToken, HttpExecutor, Request};

const CONTEXT: &str = "v3 search";
const DEFAULT_TAKE: u32 = 20;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    data: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: String,
    version: String,
    description: Option<String>,
    #[serde(rename = "totalDownloads")]
    total_downloads: Option<i64>,
}

impl SearchHit {
    fn into_result(self) -> SearchResult {
        SearchResult { id: self.id, version: self.version, description: self.description, total_downloads: self.total_downloads }
    }
}

pub struct SearchClient {
    http: Arc<dyn HttpExecutor>,
    cache: Arc<MultiTierCache>,
    cache_ttl: Duration,
    source_url: String,
}

impl SearchClient {
    pub fn new(http: Arc<dyn HttpExecutor>, cache: Arc<MultiTierCache>, cache_ttl: Duration, source_url: String) -> Self {
        Self { http, cache, cache_ttl, source_url }
    }

    pub async fn search(&self, cancel: &CancelToken, search_base: &str, query: &str, opts: &SearchOptions) -> Result<Vec<SearchResult>, Error> {
        let take = if opts.take == 0 { DEFAULT_TAKE } else { opts.take };
        let key = keys::search(query, opts.skip, take, opts.include_prerelease);

        let cache_ctx = CacheContext::default();
        if let (Some(bytes), _hit) = self.cache.get(&self.source_url, &key, &cache_ctx) {
            let parsed: SearchResponse = serde_json::from_slice(&bytes).map_err(|e| Error::decode(CONTEXT, e))?;
            return Ok(parsed.data.into_iter().map(SearchHit::into_result).collect());
        }

        let mut url = Url::parse(search_base).map_err(|e| Error::invalid_input(CONTEXT, e.to_string()))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("q", query);
            pairs.append_pair("skip", &opts.skip.to_string());
            pairs.append_pair("take", &take.to_string());
            pairs.append_pair("prerelease", &opts.include_prerelease.to_string());
            pairs.append_pair("semVerLevel", "2.0.0");
        }

        let response = self.http.do_with_retry(cancel, Request::get(url)).await.map_err(|e| e.with_context(CONTEXT))?;
        self.cache.set(&self.source_url, &key, response.body.clone(), self.cache_ttl, &cache_ctx, None)?;

        let parsed: SearchResponse = serde_json::from_slice(&response.body).map_err(|e| Error::decode(CONTEXT, e))?;
        Ok(parsed.data.into_iter().map(SearchHit::into_result).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, CircuitBreakerConfig, HttpConfig, RateLimitConfig, RetryConfig};
    use crate::observability::{Observability, SystemClock};
    use crate::transport::HttpClient;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http_client() -> Arc<HttpClient> {
        Arc::new(
            HttpClient::new(HttpConfig::default(), RetryConfig::default(), CircuitBreakerConfig::default(), RateLimitConfig::default(), Observability::default())
                .unwrap(),
        )
    }

    fn cache() -> (Arc<MultiTierCache>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let cache = MultiTierCache::with_root(&CacheConfig::default(), Arc::new(SystemClock), dir.path().to_path_buf()).unwrap();
        (Arc::new(cache), dir)
    }

    #[tokio::test]
    async fn default_take_is_twenty_and_maps_hits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .and(query_param("take", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "totalHits": 1,
                "data": [{"id": "TestPkg", "version": "1.0.0", "description": "desc", "totalDownloads": 42}],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (cache, _dir) = cache();
        let client = SearchClient::new(http_client(), cache, Duration::from_secs(1800), server.uri());

        let results = client.search(&CancelToken::none(), &format!("{}/query", server.uri()), "test", &SearchOptions::default()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "TestPkg");
        assert_eq!(results[0].total_downloads, Some(42));
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"totalHits": 0, "data": []})))
            .expect(1)
            .mount(&server)
            .await;

        let (cache, _dir) = cache();
        let client = SearchClient::new(http_client(), cache, Duration::from_secs(1800), server.uri());
        let url = format!("{}/query", server.uri());

        client.search(&CancelToken::none(), &url, "test", &SearchOptions::default()).await.unwrap();
        client.search(&CancelToken::none(), &url, "test", &SearchOptions::default()).await.unwrap();
    }
}
