//! v3 JSON + registration-index resource provider (spec §4.6).
//!
//! `V3Provider` owns one client per sub-resource, all sharing the same HTTP
//! client and cache; resource URLs are discovered lazily through the
//! service index rather than hardcoded, since a source can relocate any of
//! them independently.

pub mod download;
pub mod metadata;
pub mod search;
pub mod service_index;

use std::sync::Arc;

use bytes::Bytes;

use crate::cache::{CacheContext, MultiTierCache};
use crate::config::CacheConfig;
use crate::error::Error;
use crate::observability::Observability;
use crate::transport::{CancelToken, HttpExecutor};
use crate::version::VersionRange;

use super::{PackageDependencyInfo, ProtocolMetadata, SearchOptions, SearchResult};

use download::DownloadClient;
use metadata::MetadataClient;
use search::SearchClient;
use service_index::ServiceIndexClient;

const SEARCH_QUERY_SERVICE: &str = "SearchQueryService";
const REGISTRATIONS_BASE_URL: &str = "RegistrationsBaseUrl";
const PACKAGE_BASE_ADDRESS: &str = "PackageBaseAddress";
const CONTEXT: &str = "v3 provider";

pub struct V3Provider {
    source_url: String,
    service_index_client: ServiceIndexClient,
    metadata_client: MetadataClient,
    search_client: SearchClient,
    download_client: DownloadClient,
}

impl V3Provider {
    pub fn new(source_url: String, http: Arc<dyn HttpExecutor>, cache: Arc<MultiTierCache>, cache_config: &CacheConfig, observability: &Observability) -> Self {
        Self {
            service_index_client: ServiceIndexClient::new(http.clone(), cache.clone(), cache_config.service_index_ttl(), observability.clock.clone()),
            metadata_client: MetadataClient::new(http.clone(), cache.clone(), cache_config.metadata_ttl(), source_url.clone()),
            search_client: SearchClient::new(http.clone(), cache.clone(), cache_config.metadata_ttl(), source_url.clone()),
            download_client: DownloadClient::new(http, cache, cache_config.metadata_ttl(), source_url.clone()),
            source_url,
        }
    }

    async fn resource_url(&self, cancel: &CancelToken, resource_type: &'static str) -> Result<String, Error> {
        let index = self.service_index_client.get(cancel, &self.source_url).await?;
        index.resource_url(resource_type).map(str::to_string).ok_or_else(|| Error::not_found(CONTEXT))
    }

    pub async fn get_metadata(&self, cancel: &CancelToken, id: &str, version: &str) -> Result<ProtocolMetadata, Error> {
        let base = self.resource_url(cancel, REGISTRATIONS_BASE_URL).await?;
        self.metadata_client.get_version_metadata(cancel, &base, id, version).await
    }

    pub async fn list_versions(&self, cancel: &CancelToken, id: &str) -> Result<Vec<String>, Error> {
        let base = self.resource_url(cancel, REGISTRATIONS_BASE_URL).await?;
        self.metadata_client.list_versions(cancel, &base, id).await
    }

    pub async fn search(&self, cancel: &CancelToken, query: &str, opts: &SearchOptions) -> Result<Vec<SearchResult>, Error> {
        let base = self.resource_url(cancel, SEARCH_QUERY_SERVICE).await?;
        self.search_client.search(cancel, &base, query, opts).await
    }

    pub async fn download(&self, cancel: &CancelToken, id: &str, version: &str, ctx: &CacheContext) -> Result<Bytes, Error> {
        let base = self.resource_url(cancel, PACKAGE_BASE_ADDRESS).await?;
        self.download_client.download(cancel, &base, id, version, ctx).await
    }

    pub async fn download_nuspec(&self, cancel: &CancelToken, id: &str, version: &str) -> Result<Bytes, Error> {
        let base = self.resource_url(cancel, PACKAGE_BASE_ADDRESS).await?;
        self.download_client.download_nuspec(cancel, &base, id, version).await
    }

    pub async fn get_package_versions(&self, cancel: &CancelToken, id: &str) -> Result<Vec<String>, Error> {
        let base = self.resource_url(cancel, PACKAGE_BASE_ADDRESS).await?;
        self.download_client.get_package_versions(cancel, &base, id).await
    }

    pub async fn get_package_dependency_info(&self, cancel: &CancelToken, id: &str, range: &VersionRange) -> Result<Vec<PackageDependencyInfo>, Error> {
        let base = self.resource_url(cancel, REGISTRATIONS_BASE_URL).await?;
        self.metadata_client.get_dependency_info(cancel, &base, id, range).await
    }
}
