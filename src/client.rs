//! Top-level facade: wires a [`RepositoryManager`] to the transport, cache,
//! and factory layers, and adapts provider dependency info for a version
//! resolver (spec §4.1, §4.9).

use std::sync::Arc;

use bytes::Bytes;

use crate::auth::Auth;
use crate::cache::{CacheContext, MultiTierCache};
use crate::config::ClientConfig;
use crate::error::Error;
use crate::factory::ProviderFactory;
use crate::observability::Observability;
use crate::protocol::{PackageDependencyInfo, ProtocolMetadata, SearchOptions, SearchResult};
use crate::repository::{RepositoryManager, SourceRepository};
use crate::transport::{CancelToken, HttpClient};
use crate::version::{Version, VersionRange};

const CONTEXT: &str = "client";

/// A fully wired client: one [`HttpClient`], one [`MultiTierCache`], one
/// [`ProviderFactory`], and a named set of [`SourceRepository`] instances.
pub struct Client {
    factory: Arc<ProviderFactory>,
    repositories: RepositoryManager,
}

impl Client {
    pub fn new(config: ClientConfig, observability: Observability) -> Result<Self, Error> {
        let http = Arc::new(HttpClient::new(config.http, config.retry, config.circuit_breaker, config.rate_limit, observability.clone())?);
        let cache = Arc::new(MultiTierCache::new(&config.cache, observability.clock.clone())?);
        let factory = Arc::new(ProviderFactory::new(http, cache, config.cache, observability)?);
        Ok(Self { factory, repositories: RepositoryManager::new() })
    }

    /// Registers a new named source. Fails if the name is already taken.
    /// `auth`, when set, is attached to every request the source's provider
    /// makes, including protocol detection.
    pub async fn add_source(&self, name: impl Into<String>, source_url: impl Into<String>, auth: Option<Auth>) -> Result<(), Error> {
        let repository = SourceRepository::new(name.into(), source_url.into(), self.factory.clone(), auth);
        self.repositories.add(repository).await
    }

    pub async fn search(&self, cancel: &CancelToken, query: &str, opts: &SearchOptions) -> (std::collections::HashMap<String, Vec<SearchResult>>, Option<Error>) {
        self.repositories.search_all(cancel, query, opts).await
    }

    pub async fn get_metadata(&self, cancel: &CancelToken, id: &str, version: &str) -> Result<ProtocolMetadata, Error> {
        self.repositories.get_metadata(cancel, id, version).await
    }

    pub async fn list_versions(&self, cancel: &CancelToken, id: &str) -> Result<Vec<String>, Error> {
        self.repositories.list_versions(cancel, id).await
    }

    pub async fn download(&self, cancel: &CancelToken, id: &str, version: &str, ctx: &CacheContext) -> Result<Bytes, Error> {
        self.repositories.download(cancel, id, version, ctx).await
    }

    /// Picks the lowest version satisfying `range` out of the union of every
    /// repository's known versions (spec §4.2's "lowest applicable" rule).
    pub async fn find_best_version(&self, cancel: &CancelToken, id: &str, range: &VersionRange) -> Result<Version, Error> {
        self.repositories.find_best_version(cancel, id, range).await
    }

    /// Resolves `text` as an exact version when it names one already known
    /// to exist, otherwise parses it as a range and resolves the best match.
    pub async fn resolve_version(&self, cancel: &CancelToken, id: &str, text: &str) -> Result<Version, Error> {
        self.repositories.resolve_version(cancel, id, text, false).await
    }
}

/// Adapts a [`Client`] to whatever shape an external dependency resolver
/// needs: one dependency-info lookup per package per source, regardless of
/// how many of that package's versions the resolver considers (spec §4.9).
pub struct ResolverMetadataAdapter<'a> {
    client: &'a Client,
}

impl<'a> ResolverMetadataAdapter<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn get_package_metadata(&self, cancel: &CancelToken, id: &str, range: &VersionRange) -> Result<Vec<PackageDependencyInfo>, Error> {
        self.client
            .repositories
            .get_package_dependency_info(cancel, id, range)
            .await
            .map_err(|e| e.with_context(CONTEXT))
    }
}
