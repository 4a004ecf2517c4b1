//! v3 registration-index walk: metadata lookup, version listing, and the
//! resolver adapter's single-request dependency info (spec §4.6.2, §4.9).
//!
//! External registration pages are fetched in parallel (spec invariant 10)
//! rather than walked sequentially, since a page's URL carries no ordering
//! dependency on its siblings.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::de::{Deserializer, Error as DeError};
use serde::Deserialize;
use url::Url;

use crate::cache::{keys, CacheContext, MultiTierCache};
use crate::error::Error;
use crate::protocol::{Dependency, DependencyGroup, PackageDependencyInfo, ProtocolMetadata};
use crate::transport::{CancelToken, HttpExecutor, Request};
use crate::version::{Version, VersionRange};

const CONTEXT: &str = "v3 registration";

#[derive(Debug, Clone, Deserialize)]
struct RegistrationIndex {
    items: Vec<RegistrationPage>,
}

#[derive(Debug, Clone, Deserialize)]
struct RegistrationPage {
    #[serde(rename = "@id")]
    id: String,
    #[serde(default)]
    lower: String,
    #[serde(default)]
    upper: String,
    items: Option<Vec<RegistrationLeaf>>,
}

#[derive(Debug, Clone, Deserialize)]
struct RegistrationLeaf {
    #[serde(rename = "catalogEntry")]
    catalog_entry: CatalogEntry,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogEntry {
    id: String,
    version: String,
    title: Option<String>,
    description: Option<String>,
    summary: Option<String>,
    #[serde(default, deserialize_with = "deserialize_authors")]
    authors: Vec<String>,
    #[serde(rename = "iconUrl", default)]
    icon_url: Option<String>,
    #[serde(rename = "licenseUrl", default)]
    license_url: Option<String>,
    #[serde(rename = "licenseExpression", default)]
    license_expression: Option<String>,
    #[serde(rename = "projectUrl", default)]
    project_url: Option<String>,
    #[serde(default, deserialize_with = "deserialize_tags")]
    tags: Vec<String>,
    #[serde(rename = "dependencyGroups", default)]
    dependency_groups: Vec<WireDependencyGroup>,
    #[serde(default)]
    published: Option<String>,
    #[serde(rename = "requireLicenseAcceptance", default)]
    require_license_acceptance: bool,
    #[serde(rename = "packageContent", default)]
    package_content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireDependencyGroup {
    #[serde(rename = "targetFramework", default)]
    target_framework: String,
    #[serde(default)]
    dependencies: Vec<WireDependency>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireDependency {
    id: String,
    #[serde(default)]
    range: Option<String>,
}

/// Authors arrive as a comma-joined string.
fn deserialize_authors<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(match raw {
        Some(s) => s.split(',').map(|a| a.trim().to_string()).filter(|a| !a.is_empty()).collect(),
        None => Vec::new(),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TagsWire {
    List(Vec<String>),
    Joined(String),
}

/// Tags arrive either as a JSON array or a whitespace-joined string
/// depending on feed vintage; both shapes must be accepted (spec §9 Open
/// Question #3).
fn deserialize_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<TagsWire> = Option::deserialize(deserializer).map_err(DeError::custom)?;
    Ok(match raw {
        Some(TagsWire::List(tags)) => tags,
        Some(TagsWire::Joined(s)) => s.split_whitespace().map(str::to_string).collect(),
        None => Vec::new(),
    })
}

impl WireDependencyGroup {
    fn into_group(self) -> DependencyGroup {
        DependencyGroup {
            target_framework: self.target_framework,
            dependencies: self.dependencies.into_iter().map(WireDependency::into_dependency).collect(),
        }
    }
}

impl WireDependency {
    fn into_dependency(self) -> Dependency {
        let range = self.range.filter(|r| !r.is_empty()).unwrap_or_else(|| "0.0.0".to_string());
        Dependency { id: self.id, range }
    }
}

impl CatalogEntry {
    fn into_metadata(self) -> ProtocolMetadata {
        let is_prerelease = Version::parse(&self.version).map(|v| v.is_prerelease()).unwrap_or(false);
        ProtocolMetadata {
            id: self.id,
            version: self.version,
            title: self.title,
            description: self.description,
            summary: self.summary,
            authors: self.authors,
            owners: Vec::new(),
            icon_url: self.icon_url,
            license_url: self.license_url,
            license_expression: self.license_expression,
            project_url: self.project_url,
            tags: self.tags,
            dependencies: self.dependency_groups.into_iter().map(WireDependencyGroup::into_group).collect(),
            download_count: None,
            is_prerelease,
            published: self.published,
            require_license_acceptance: self.require_license_acceptance,
            download_url: self.package_content,
        }
    }
}

pub struct MetadataClient {
    http: Arc<dyn HttpExecutor>,
    cache: Arc<MultiTierCache>,
    cache_ttl: Duration,
    source_url: String,
}

impl MetadataClient {
    pub fn new(http: Arc<dyn HttpExecutor>, cache: Arc<MultiTierCache>, cache_ttl: Duration, source_url: String) -> Self {
        Self { http, cache, cache_ttl, source_url }
    }

    async fn fetch_with_cache(&self, cancel: &CancelToken, fetch_url: &str, cache_key: &str) -> Result<Bytes, Error> {
        let cache_ctx = CacheContext::default();
        if let (Some(bytes), _hit) = self.cache.get(&self.source_url, cache_key, &cache_ctx) {
            return Ok(bytes);
        }

        let parsed = Url::parse(fetch_url).map_err(|e| Error::invalid_input(CONTEXT, e.to_string()))?;
        let response = self.http.do_with_retry(cancel, Request::get(parsed)).await.map_err(|e| e.with_context(CONTEXT))?;
        self.cache.set(&self.source_url, cache_key, response.body.clone(), self.cache_ttl, &cache_ctx, None)?;
        Ok(response.body)
    }

    /// Walks the registration index for `package_id`, fetching every
    /// external page concurrently, and returns every leaf in index order.
    async fn collect_leaves(&self, cancel: &CancelToken, registration_base: &str, package_id: &str) -> Result<Vec<CatalogEntry>, Error> {
        let id_lower = package_id.to_lowercase();
        let index_url = format!("{}/{}/index.json", registration_base.trim_end_matches('/'), id_lower);
        let index_key = keys::v3_registration_list(&id_lower);

        let index_bytes = self.fetch_with_cache(cancel, &index_url, &index_key).await?;
        let index: RegistrationIndex = serde_json::from_slice(&index_bytes).map_err(|e| Error::decode(CONTEXT, e))?;

        let mut slots: Vec<Option<Vec<CatalogEntry>>> = Vec::with_capacity(index.items.len());
        let mut pending: Vec<(usize, &RegistrationPage)> = Vec::new();

        for (i, page) in index.items.iter().enumerate() {
            match &page.items {
                Some(items) => slots.push(Some(items.iter().cloned().map(|l| l.catalog_entry).collect())),
                None => {
                    slots.push(None);
                    pending.push((i, page));
                }
            }
        }

        if !pending.is_empty() {
            let pending_keys: Vec<String> = pending.iter().map(|(_, page)| keys::v3_registration_page(&id_lower, &page.lower, &page.upper)).collect();
            let fetches = pending.iter().zip(pending_keys.iter()).map(|((_, page), key)| self.fetch_with_cache(cancel, &page.id, key));
            let fetched = futures::future::join_all(fetches).await;

            for ((slot_index, _), bytes) in pending.into_iter().zip(fetched) {
                let bytes = bytes?;
                let page: RegistrationPage = serde_json::from_slice(&bytes).map_err(|e| Error::decode(CONTEXT, e))?;
                slots[slot_index] = Some(page.items.unwrap_or_default().into_iter().map(|l| l.catalog_entry).collect());
            }
        }

        Ok(slots.into_iter().flatten().flatten().collect())
    }

    pub async fn get_version_metadata(&self, cancel: &CancelToken, registration_base: &str, package_id: &str, version: &str) -> Result<ProtocolMetadata, Error> {
        let leaves = self.collect_leaves(cancel, registration_base, package_id).await?;
        leaves.into_iter().find(|e| e.version == version).map(CatalogEntry::into_metadata).ok_or_else(|| Error::not_found(CONTEXT))
    }

    pub async fn list_versions(&self, cancel: &CancelToken, registration_base: &str, package_id: &str) -> Result<Vec<String>, Error> {
        let leaves = self.collect_leaves(cancel, registration_base, package_id).await?;
        Ok(leaves.into_iter().map(|e| e.version).collect())
    }

    pub async fn get_dependency_info(
        &self,
        cancel: &CancelToken,
        registration_base: &str,
        package_id: &str,
        range: &VersionRange,
    ) -> Result<Vec<PackageDependencyInfo>, Error> {
        let leaves = self.collect_leaves(cancel, registration_base, package_id).await?;
        let mut out = Vec::new();
        for entry in leaves {
            let Ok(version) = Version::parse(&entry.version) else { continue };
            if !range.satisfies(&version) {
                continue;
            }
            out.push(PackageDependencyInfo {
                version: entry.version.clone(),
                dependencies: entry.dependency_groups.into_iter().map(WireDependencyGroup::into_group).collect(),
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, CircuitBreakerConfig, HttpConfig, RateLimitConfig, RetryConfig};
    use crate::observability::{Observability, SystemClock};
    use crate::transport::HttpClient;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request as WireRequest, Respond, ResponseTemplate};

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

    fn inline_catalog_entry(version: &str) -> serde_json::Value {
        serde_json::json!({
            "catalogEntry": {
                "id": "TestPkg",
                "version": version,
                "authors": "Alice, Bob",
                "tags": "web json",
                "dependencyGroups": [],
                "requireLicenseAcceptance": false,
            }
        })
    }

    #[tokio::test]
    async fn finds_inline_version_and_splits_authors_and_tags() {
        let server = MockServer::start().await;
        let index = serde_json::json!({
            "items": [{
                "@id": format!("{}/testpkg/page0.json", server.uri()),
                "lower": "1.0.0",
                "upper": "1.0.0",
                "items": [inline_catalog_entry("1.0.0")],
            }]
        });
        Mock::given(method("GET")).and(path("/testpkg/index.json")).respond_with(ResponseTemplate::new(200).set_body_json(index)).mount(&server).await;

        let (cache, _dir) = cache();
        let client = MetadataClient::new(http_client(), cache, Duration::from_secs(1800), server.uri());

        let metadata = client.get_version_metadata(&CancelToken::none(), &server.uri(), "TestPkg", "1.0.0").await.unwrap();
        assert_eq!(metadata.authors, vec!["Alice".to_string(), "Bob".to_string()]);
        assert_eq!(metadata.tags, vec!["web".to_string(), "json".to_string()]);
    }

    #[tokio::test]
    async fn version_not_found_is_not_found_error() {
        let server = MockServer::start().await;
        let index = serde_json::json!({
            "items": [{
                "@id": format!("{}/testpkg/page0.json", server.uri()),
                "lower": "1.0.0",
                "upper": "1.0.0",
                "items": [inline_catalog_entry("1.0.0")],
            }]
        });
        Mock::given(method("GET")).and(path("/testpkg/index.json")).respond_with(ResponseTemplate::new(200).set_body_json(index)).mount(&server).await;

        let (cache, _dir) = cache();
        let client = MetadataClient::new(http_client(), cache, Duration::from_secs(1800), server.uri());

        let err = client.get_version_metadata(&CancelToken::none(), &server.uri(), "TestPkg", "9.9.9").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn external_pages_are_fetched_with_overlapping_lifetimes() {
        struct DelayedPage;
        impl Respond for DelayedPage {
            fn respond(&self, _req: &WireRequest) -> ResponseTemplate {
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": [inline_catalog_entry("1.0.0")]})).set_delay(Duration::from_millis(120))
            }
        }

        let server = MockServer::start().await;

        let index = serde_json::json!({
            "items": [
                {"@id": format!("{}/page0.json", server.uri()), "lower": "1.0.0", "upper": "1.0.0", "items": null},
                {"@id": format!("{}/page1.json", server.uri()), "lower": "2.0.0", "upper": "2.0.0", "items": null},
            ]
        });
        Mock::given(method("GET")).and(path("/testpkg/index.json")).respond_with(ResponseTemplate::new(200).set_body_json(index)).mount(&server).await;
        Mock::given(method("GET")).and(path("/page0.json")).respond_with(DelayedPage).mount(&server).await;
        Mock::given(method("GET")).and(path("/page1.json")).respond_with(DelayedPage).mount(&server).await;

        let (cache, _dir) = cache();
        let client = MetadataClient::new(http_client(), cache, Duration::from_secs(1800), server.uri());

        let started = std::time::Instant::now();
        let leaves = client.collect_leaves(&CancelToken::none(), &server.uri(), "testpkg").await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(leaves.len(), 2);
        assert!(elapsed < Duration::from_millis(220), "pages should overlap, took {elapsed:?}");
    }
}
