//! Uniform capability both wire protocols implement (spec §4.6, §4.7),
//! modeled as a sealed variant rather than a trait object so the resolver
//! adapter can branch on `protocol_version()` without downcasting (spec §9
//! design note).

pub mod v2;
pub mod v3;

use bytes::Bytes;

use crate::cache::CacheContext;
use crate::error::Error;
use crate::transport::CancelToken;
use crate::version::VersionRange;

/// Which wire protocol a [`ResourceProvider`] speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    V2,
    V3,
}

/// A single dependency entry: an id and a range, normalized so an empty
/// wire-format range becomes `"0.0.0"` (spec §4.9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub id: String,
    pub range: String,
}

/// One target-framework's worth of dependencies (spec §3's `DependencyGroup`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DependencyGroup {
    pub target_framework: String,
    pub dependencies: Vec<Dependency>,
}

/// The normalized package metadata shape both adapters produce (spec §3).
#[derive(Debug, Clone, Default)]
pub struct ProtocolMetadata {
    pub id: String,
    pub version: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub summary: Option<String>,
    pub authors: Vec<String>,
    pub owners: Vec<String>,
    pub icon_url: Option<String>,
    pub license_url: Option<String>,
    pub license_expression: Option<String>,
    pub project_url: Option<String>,
    pub tags: Vec<String>,
    pub dependencies: Vec<DependencyGroup>,
    pub download_count: Option<i64>,
    pub is_prerelease: bool,
    pub published: Option<String>,
    pub require_license_acceptance: bool,
    pub download_url: Option<String>,
}

/// One search hit.
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    pub id: String,
    pub version: String,
    pub description: Option<String>,
    pub total_downloads: Option<i64>,
}

/// Query parameters shared by both adapters' search resources (spec §4.6.3,
/// §4.7). `take == 0` means "use the protocol's own default".
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOptions {
    pub skip: u32,
    pub take: u32,
    pub include_prerelease: bool,
}

/// One version's worth of dependency info, as the resolver adapter needs it
/// (spec §4.9): a version string plus its dependency groups, already
/// filtered to versions satisfying the caller's range.
#[derive(Debug, Clone)]
pub struct PackageDependencyInfo {
    pub version: String,
    pub dependencies: Vec<DependencyGroup>,
}

/// `ResourceProvider::V2`/`V3` each wrap a fully-constructed adapter; the
/// enum exists purely for uniform dispatch.
pub enum ResourceProvider {
    V2(v2::V2Provider),
    V3(v3::V3Provider),
}

impl std::fmt::Debug for ResourceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceProvider::V2(_) => f.write_str("ResourceProvider::V2(..)"),
            ResourceProvider::V3(_) => f.write_str("ResourceProvider::V3(..)"),
        }
    }
}

impl ResourceProvider {
    pub fn protocol_version(&self) -> ProtocolVersion {
        match self {
            ResourceProvider::V2(_) => ProtocolVersion::V2,
            ResourceProvider::V3(_) => ProtocolVersion::V3,
        }
    }

    pub async fn get_metadata(&self, cancel: &CancelToken, id: &str, version: &str) -> Result<ProtocolMetadata, Error> {
        match self {
            ResourceProvider::V2(p) => p.get_metadata(cancel, id, version).await,
            ResourceProvider::V3(p) => p.get_metadata(cancel, id, version).await,
        }
    }

    pub async fn list_versions(&self, cancel: &CancelToken, id: &str) -> Result<Vec<String>, Error> {
        match self {
            ResourceProvider::V2(p) => p.list_versions(cancel, id).await,
            ResourceProvider::V3(p) => p.list_versions(cancel, id).await,
        }
    }

    pub async fn search(&self, cancel: &CancelToken, query: &str, opts: &SearchOptions) -> Result<Vec<SearchResult>, Error> {
        match self {
            ResourceProvider::V2(p) => p.search(cancel, query, opts).await,
            ResourceProvider::V3(p) => p.search(cancel, query, opts).await,
        }
    }

    pub async fn download(&self, cancel: &CancelToken, id: &str, version: &str, ctx: &CacheContext) -> Result<Bytes, Error> {
        match self {
            ResourceProvider::V2(p) => p.download(cancel, id, version, ctx).await,
            ResourceProvider::V3(p) => p.download(cancel, id, version, ctx).await,
        }
    }

    /// Resolver-adapter entry point (spec §4.9): a single HTTP request per
    /// package-per-source regardless of how many versions are filtered in.
    pub async fn get_package_dependency_info(
        &self,
        cancel: &CancelToken,
        id: &str,
        range: &VersionRange,
    ) -> Result<Vec<PackageDependencyInfo>, Error> {
        match self {
            ResourceProvider::V2(p) => p.get_package_dependency_info(cancel, id, range).await,
            ResourceProvider::V3(p) => p.get_package_dependency_info(cancel, id, range).await,
        }
    }
}
