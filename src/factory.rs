//! Protocol detection and provider construction (spec §4.5).
//!
//! Two fast paths short-circuit detection for the common case (nuget.org),
//! a cheap two-probe detection path covers everything else, and detection
//! successes are memoized to `~/.gonuget/protocol_cache.json` for 24 hours
//! so a repeated `create_provider` call on the same source skips both
//! probes. Failures are never cached — a transient outage shouldn't wedge
//! a source into "undetectable" for a day.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{Auth, AuthenticatedHttpClient};
use crate::cache::MultiTierCache;
use crate::config::CacheConfig;
use crate::error::Error;
use crate::observability::Observability;
use crate::persist::PersistedMap;
use crate::protocol::v2::V2Provider;
use crate::protocol::v3::V3Provider;
use crate::protocol::ResourceProvider;
use crate::transport::{CancelToken, HttpClient, HttpExecutor, Request};

const CONTEXT: &str = "create provider";
const NUGET_ORG_V3_INDEX: &str = "https://api.nuget.org/v3/index.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum CachedProtocol {
    V2,
    V3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DetectionEntry {
    protocol: CachedProtocol,
    /// The URL the provider should actually be anchored at, which may
    /// differ from the source URL (e.g. the v2-fast-path's canonical v3
    /// index, or the XML probe's stripped `index.json` suffix).
    anchor_url: String,
    expires: DateTime<Utc>,
}

pub struct ProviderFactory {
    http: Arc<HttpClient>,
    cache: Arc<MultiTierCache>,
    cache_config: CacheConfig,
    observability: Observability,
    detection_cache: PersistedMap<DetectionEntry>,
    redirects: Arc<PersistedMap<crate::protocol::v2::download::RedirectEntry>>,
}

impl ProviderFactory {
    pub fn new(http: Arc<HttpClient>, cache: Arc<MultiTierCache>, cache_config: CacheConfig, observability: Observability) -> Result<Self, Error> {
        let root = cache_config.resolved_root_dir();
        let detection_cache = PersistedMap::open(root.join("protocol_cache.json"))?;
        let redirects = Arc::new(PersistedMap::open(root.join("redirects.json"))?);
        Ok(Self { http, cache, cache_config, observability, detection_cache, redirects })
    }

    #[cfg(test)]
    pub(crate) fn reset_for_tests(&self) {
        self.detection_cache.reset_for_tests();
        self.redirects.reset_for_tests();
    }

    /// The HTTP seam a provider should be built on: the plain client, or
    /// (when the source has credentials) a wrapper that stamps every
    /// request with `X-NuGet-ApiKey` before delegating.
    fn executor(&self, auth: Option<&Auth>) -> Arc<dyn HttpExecutor> {
        match auth {
            Some(auth) => Arc::new(AuthenticatedHttpClient::new(self.http.clone(), auth.clone())),
            None => self.http.clone(),
        }
    }

    fn build_v3(&self, anchor_url: String, http: Arc<dyn HttpExecutor>) -> ResourceProvider {
        ResourceProvider::V3(V3Provider::new(anchor_url, http, self.cache.clone(), &self.cache_config, &self.observability))
    }

    fn build_v2(&self, anchor_url: String, http: Arc<dyn HttpExecutor>) -> ResourceProvider {
        ResourceProvider::V2(V2Provider::new(anchor_url, http, self.redirects.clone(), self.cache_config.redirect_ttl()))
    }

    pub async fn create_provider(&self, cancel: &CancelToken, source_url: &str, auth: Option<&Auth>) -> Result<ResourceProvider, Error> {
        let http = self.executor(auth);

        if source_url.contains("api.nuget.org/v3/index.json") {
            return Ok(self.build_v3(source_url.to_string(), http));
        }
        if source_url.contains("nuget.org/api/v2") {
            return Ok(self.build_v3(NUGET_ORG_V3_INDEX.to_string(), http));
        }

        if let Some(entry) = self.detection_cache.get(source_url) {
            if entry.expires > Utc::now() {
                return Ok(match entry.protocol {
                    CachedProtocol::V3 => self.build_v3(entry.anchor_url, http),
                    CachedProtocol::V2 => self.build_v2(entry.anchor_url, http),
                });
            }
        }

        if let Some(provider) = self.probe_v3(cancel, source_url, http.clone()).await? {
            self.remember(source_url, CachedProtocol::V3, source_url);
            return Ok(provider);
        }

        let stripped = source_url.strip_suffix("/index.json").unwrap_or(source_url);
        if let Some(provider) = self.probe_v2(cancel, stripped, http).await? {
            self.remember(source_url, CachedProtocol::V2, stripped);
            return Ok(provider);
        }

        Err(Error::ProtocolUnknown { context: CONTEXT })
    }

    fn remember(&self, source_url: &str, protocol: CachedProtocol, anchor_url: &str) {
        let entry = DetectionEntry {
            protocol,
            anchor_url: anchor_url.to_string(),
            expires: Utc::now() + chrono::Duration::from_std(self.cache_config.detection_ttl()).unwrap_or(chrono::Duration::hours(24)),
        };
        let _ = self.detection_cache.set(source_url.to_string(), entry);
    }

    async fn probe_v3(&self, cancel: &CancelToken, url: &str, http: Arc<dyn HttpExecutor>) -> Result<Option<ResourceProvider>, Error> {
        let parsed = url::Url::parse(url).map_err(|e| Error::invalid_input(CONTEXT, e.to_string()))?;
        let response = match http.do_(cancel, Request::get(parsed)).await {
            Ok(r) => r,
            Err(_) => return Ok(None),
        };

        let is_json = response
            .headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("json"));

        if response.status == 200 && is_json {
            Ok(Some(self.build_v3(url.to_string(), http)))
        } else {
            Ok(None)
        }
    }

    async fn probe_v2(&self, cancel: &CancelToken, url: &str, http: Arc<dyn HttpExecutor>) -> Result<Option<ResourceProvider>, Error> {
        let parsed = url::Url::parse(url).map_err(|e| Error::invalid_input(CONTEXT, e.to_string()))?;
        let response = match http.do_(cancel, Request::get(parsed)).await {
            Ok(r) => r,
            Err(_) => return Ok(None),
        };

        let is_xml = response
            .headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("xml") || ct.contains("atom"));

        if response.status == 200 && is_xml {
            Ok(Some(self.build_v2(url.to_string(), http)))
        } else {
            Ok(None)
        }
    }
}
