//! `SourceRepository` (lazy, double-checked provider init) and
//! `RepositoryManager` (named collection with parallel fan-out) — spec
//! §4.8.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::auth::Auth;
use crate::cache::CacheContext;
use crate::error::Error;
use crate::factory::ProviderFactory;
use crate::protocol::{PackageDependencyInfo, ProtocolMetadata, ResourceProvider, SearchOptions, SearchResult};
use crate::transport::CancelToken;
use crate::version::{Version, VersionRange};

const CONTEXT: &str = "repository";

/// One configured package source. The provider is constructed lazily on
/// first use and cached for the repository's lifetime.
pub struct SourceRepository {
    pub name: String,
    source_url: String,
    factory: Arc<ProviderFactory>,
    auth: Option<Auth>,
    provider: RwLock<Option<Arc<ResourceProvider>>>,
}

impl SourceRepository {
    pub fn new(name: String, source_url: String, factory: Arc<ProviderFactory>, auth: Option<Auth>) -> Self {
        Self { name, source_url, factory, auth, provider: RwLock::new(None) }
    }

    /// Double-checked lazy init: a read-lock fast path returns an
    /// already-built provider; otherwise a write-lock rebuilds it, checking
    /// again in case another caller won the race first.
    pub async fn get_provider(&self, cancel: &CancelToken) -> Result<Arc<ResourceProvider>, Error> {
        if let Some(provider) = self.provider.read().await.as_ref() {
            return Ok(provider.clone());
        }

        let mut guard = self.provider.write().await;
        if let Some(provider) = guard.as_ref() {
            return Ok(provider.clone());
        }

        let provider = Arc::new(self.factory.create_provider(cancel, &self.source_url, self.auth.as_ref()).await?);
        *guard = Some(provider.clone());
        Ok(provider)
    }
}

/// A named collection of repositories, queried in insertion order for
/// first-success operations and fanned out in parallel for `search_all`.
pub struct RepositoryManager {
    repositories: RwLock<Vec<Arc<SourceRepository>>>,
}

impl RepositoryManager {
    pub fn new() -> Self {
        Self { repositories: RwLock::new(Vec::new()) }
    }

    pub async fn add(&self, repository: SourceRepository) -> Result<(), Error> {
        let mut guard = self.repositories.write().await;
        if guard.iter().any(|r| r.name == repository.name) {
            return Err(Error::invalid_input(CONTEXT, format!("repository \"{}\" already registered", repository.name)));
        }
        guard.push(Arc::new(repository));
        Ok(())
    }

    async fn snapshot(&self) -> Vec<Arc<SourceRepository>> {
        self.repositories.read().await.clone()
    }

    /// Fans out to every repository in parallel; returns a `name -> results`
    /// map. Individual failures are captured rather than aborting the whole
    /// call; if any occurred, the error is surfaced alongside the partial
    /// results via `Error::Aggregate`.
    pub async fn search_all(&self, cancel: &CancelToken, query: &str, opts: &SearchOptions) -> (HashMap<String, Vec<SearchResult>>, Option<Error>) {
        let repos = self.snapshot().await;
        let total = repos.len();

        let futures = repos.iter().map(|repo| {
            let query = query.to_string();
            async move {
                let result = async {
                    let provider = repo.get_provider(cancel).await?;
                    provider.search(cancel, &query, opts).await
                }
                .await;
                (repo.name.clone(), result)
            }
        });

        let outcomes = futures::future::join_all(futures).await;

        let mut results = HashMap::new();
        let mut per_source = Vec::new();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(hits) => {
                    results.insert(name, hits);
                }
                Err(e) => per_source.push((name, e.to_string())),
            }
        }

        let error = if per_source.is_empty() {
            None
        } else {
            Some(Error::Aggregate { context: CONTEXT, failures: per_source.len(), total, per_source })
        };

        (results, error)
    }

    /// Iterates repositories in insertion order, returning the first
    /// success; accumulates the last error if every repository fails.
    pub async fn get_metadata(&self, cancel: &CancelToken, id: &str, version: &str) -> Result<ProtocolMetadata, Error> {
        let repos = self.snapshot().await;
        let mut last_err = Error::not_found(CONTEXT);
        for repo in &repos {
            match repo.get_provider(cancel).await {
                Ok(provider) => match provider.get_metadata(cancel, id, version).await {
                    Ok(metadata) => return Ok(metadata),
                    Err(e) => last_err = e,
                },
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    pub async fn download(&self, cancel: &CancelToken, id: &str, version: &str, ctx: &CacheContext) -> Result<bytes::Bytes, Error> {
        let repos = self.snapshot().await;
        let mut last_err = Error::not_found(CONTEXT);
        for repo in &repos {
            match repo.get_provider(cancel).await {
                Ok(provider) => match provider.download(cancel, id, version, ctx).await {
                    Ok(bytes) => return Ok(bytes),
                    Err(e) => last_err = e,
                },
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    /// Union of `list_versions` across every repository, deduplicated by
    /// the version's string form as stored (not by parsed identity).
    pub async fn list_versions(&self, cancel: &CancelToken, id: &str) -> Result<Vec<String>, Error> {
        let repos = self.snapshot().await;
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        let mut last_err = None;

        for repo in &repos {
            let versions = match repo.get_provider(cancel).await {
                Ok(provider) => provider.list_versions(cancel, id).await,
                Err(e) => Err(e),
            };
            match versions {
                Ok(versions) => {
                    for v in versions {
                        if seen.insert(v.clone()) {
                            out.push(v);
                        }
                    }
                }
                Err(e) => last_err = Some(e),
            }
        }

        if out.is_empty() {
            if let Some(e) = last_err {
                return Err(e);
            }
        }
        Ok(out)
    }

    pub async fn find_best_version(&self, cancel: &CancelToken, id: &str, range: &VersionRange) -> Result<Version, Error> {
        let versions = self.list_versions(cancel, id).await?;
        let parsed: Vec<Version> = versions.iter().filter_map(|v| Version::parse(v).ok()).collect();
        range.find_best_match(parsed.iter()).cloned().ok_or_else(|| Error::not_found(CONTEXT))
    }

    /// Resolves `text` as an exact version first (verified present via
    /// `list_versions`), falling back to range resolution.
    pub async fn resolve_version(&self, cancel: &CancelToken, id: &str, text: &str, _include_prerelease: bool) -> Result<Version, Error> {
        if let Ok(exact) = Version::parse(text) {
            let versions = self.list_versions(cancel, id).await?;
            if versions.iter().any(|v| v == text) {
                return Ok(exact);
            }
        }

        let range = VersionRange::parse(text)?;
        self.find_best_version(cancel, id, &range).await
    }

    pub async fn get_package_dependency_info(&self, cancel: &CancelToken, id: &str, range: &VersionRange) -> Result<Vec<PackageDependencyInfo>, Error> {
        let repos = self.snapshot().await;
        let mut last_err = Error::not_found(CONTEXT);
        for repo in &repos {
            match repo.get_provider(cancel).await {
                Ok(provider) => match provider.get_package_dependency_info(cancel, id, range).await {
                    Ok(info) => return Ok(info),
                    Err(e) => last_err = e,
                },
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }
}

impl Default for RepositoryManager {
    fn default() -> Self {
        Self::new()
    }
}
