//! v2 OData/Atom resource provider (spec §4.7).
//!
//! Unlike v3, a v2 source's sub-resource URLs are all direct children of
//! the feed's base URL — there is no service-index indirection to resolve
//! first.

pub mod download;
pub mod feed;
pub mod metadata;
pub mod search;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::cache::CacheContext;
use crate::error::Error;
use crate::persist::PersistedMap;
use crate::protocol::{PackageDependencyInfo, ProtocolMetadata, SearchOptions, SearchResult};
use crate::transport::{CancelToken, HttpExecutor};
use crate::version::VersionRange;

use download::{DownloadClient, RedirectEntry};
use feed::FeedClient;
use metadata::MetadataClient;
use search::SearchClient;

pub struct V2Provider {
    base_url: String,
    metadata_client: MetadataClient,
    search_client: SearchClient,
    download_client: DownloadClient,
}

impl V2Provider {
    pub fn new(base_url: String, http: Arc<dyn HttpExecutor>, redirects: Arc<PersistedMap<RedirectEntry>>, redirect_ttl: Duration) -> Self {
        let feed = Arc::new(FeedClient::new(http.clone()));
        Self {
            metadata_client: MetadataClient::new(feed.clone()),
            search_client: SearchClient::new(feed),
            download_client: DownloadClient::new(http, redirects, redirect_ttl),
            base_url,
        }
    }

    pub async fn get_metadata(&self, cancel: &CancelToken, id: &str, version: &str) -> Result<ProtocolMetadata, Error> {
        self.metadata_client.get_metadata(cancel, &self.base_url, id, version).await
    }

    pub async fn list_versions(&self, cancel: &CancelToken, id: &str) -> Result<Vec<String>, Error> {
        self.metadata_client.list_versions(cancel, &self.base_url, id).await
    }

    pub async fn search(&self, cancel: &CancelToken, query: &str, opts: &SearchOptions) -> Result<Vec<SearchResult>, Error> {
        self.search_client.search(cancel, &self.base_url, query, opts).await
    }

    pub async fn download(&self, cancel: &CancelToken, id: &str, version: &str, ctx: &CacheContext) -> Result<Bytes, Error> {
        self.download_client.download(cancel, &self.base_url, id, version, ctx).await
    }

    pub async fn get_package_dependency_info(&self, cancel: &CancelToken, id: &str, range: &VersionRange) -> Result<Vec<PackageDependencyInfo>, Error> {
        self.metadata_client.get_dependency_info(cancel, &self.base_url, id, range).await
    }
}
