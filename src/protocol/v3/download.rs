//! v3 package binary, nuspec, and per-package version-list downloads
//! (spec §4.6.4).

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;
use url::Url;

use crate::cache::{keys, zip_signature_validator, CacheContext, MultiTierCache};
use crate::error::Error;
use crate::transport::{CancelToken, HttpExecutor, Request};

const CONTEXT: &str = "v3 download";

#[derive(Deserialize)]
struct PackageVersionsResponse {
    versions: Vec<String>,
}

pub struct DownloadClient {
    http: Arc<dyn HttpExecutor>,
    cache: Arc<MultiTierCache>,
    cache_ttl: Duration,
    source_url: String,
}

impl DownloadClient {
    pub fn new(http: Arc<dyn HttpExecutor>, cache: Arc<MultiTierCache>, cache_ttl: Duration, source_url: String) -> Self {
        Self { http, cache, cache_ttl, source_url }
    }

    /// On cache hit, returns the cached bytes directly. On miss, fetches the
    /// `.nupkg`, validates the ZIP signature before writing through, and
    /// returns the freshly-read bytes. `direct_download`/`no_cache` on `ctx`
    /// suppress the write, per `CacheContext`'s contract.
    pub async fn download(&self, cancel: &CancelToken, package_base: &str, package_id: &str, version: &str, ctx: &CacheContext) -> Result<Bytes, Error> {
        let id_lower = package_id.to_lowercase();
        let version_lower = version.to_lowercase();
        let key = keys::package_binary(&id_lower, &version_lower);

        if let (Some(bytes), _hit) = self.cache.get(&self.source_url, &key, ctx) {
            return Ok(bytes);
        }

        let url_text = format!(
            "{}/{}/{}/{}.{}.nupkg",
            package_base.trim_end_matches('/'),
            id_lower,
            version_lower,
            id_lower,
            version_lower
        );
        let url = Url::parse(&url_text).map_err(|e| Error::invalid_input(CONTEXT, e.to_string()))?;
        let response = self.http.do_with_retry(cancel, Request::get(url)).await.map_err(|e| e.with_context(CONTEXT))?;

        self.cache.set(&self.source_url, &key, response.body.clone(), self.cache_ttl, ctx, Some(&zip_signature_validator))?;
        Ok(response.body)
    }

    pub async fn download_nuspec(&self, cancel: &CancelToken, package_base: &str, package_id: &str, version: &str) -> Result<Bytes, Error> {
        let id_lower = package_id.to_lowercase();
        let version_lower = version.to_lowercase();
        let url_text = format!("{}/{}/{}/{}.nuspec", package_base.trim_end_matches('/'), id_lower, version_lower, id_lower);
        let url = Url::parse(&url_text).map_err(|e| Error::invalid_input(CONTEXT, e.to_string()))?;
        let response = self.http.do_with_retry(cancel, Request::get(url)).await.map_err(|e| e.with_context(CONTEXT))?;
        Ok(response.body)
    }

    pub async fn get_package_versions(&self, cancel: &CancelToken, package_base: &str, package_id: &str) -> Result<Vec<String>, Error> {
        let id_lower = package_id.to_lowercase();
        let url_text = format!("{}/{}/index.json", package_base.trim_end_matches('/'), id_lower);
        let url = Url::parse(&url_text).map_err(|e| Error::invalid_input(CONTEXT, e.to_string()))?;
        let response = self.http.do_with_retry(cancel, Request::get(url)).await.map_err(|e| e.with_context(CONTEXT))?;
        let parsed: PackageVersionsResponse = serde_json::from_slice(&response.body).map_err(|e| Error::decode(CONTEXT, e))?;
        Ok(parsed.versions)
    }
}
