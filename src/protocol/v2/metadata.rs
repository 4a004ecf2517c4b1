//! v2 single-package metadata, version listing, and dependency resolution
//! (spec §4.7, §4.9).
//!
//! `FindPackagesById()` returns every version of a package in one response,
//! so `list_versions` and the resolver's dependency lookups share a single
//! in-process cache keyed by `(source, id)` — bounded rather than left to
//! grow without limit, per spec §9 Open Question #2.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use url::Url;

use crate::error::Error;
use crate::protocol::{Dependency, DependencyGroup, PackageDependencyInfo, ProtocolMetadata};
use crate::transport::CancelToken;
use crate::version::{Version, VersionRange};

use super::feed::{Entry, FeedClient};

const CONTEXT: &str = "v2 metadata";
const FIND_BY_ID_CACHE_CAPACITY: usize = 64;

fn entry_into_metadata(entry: Entry) -> ProtocolMetadata {
    let props = entry.properties;
    let authors = props.authors.map(split_comma_joined).unwrap_or_default();
    let tags = props.tags.map(split_whitespace_joined).unwrap_or_default();
    let dependencies = props.dependencies.as_deref().map(parse_dependency_string).unwrap_or_default();

    ProtocolMetadata {
        id: props.id,
        version: props.version,
        title: entry.title,
        description: props.description,
        summary: None,
        authors,
        owners: Vec::new(),
        icon_url: props.icon_url,
        license_url: props.license_url,
        license_expression: None,
        project_url: props.project_url,
        tags,
        dependencies,
        download_count: props.download_count,
        is_prerelease: props.is_prerelease.unwrap_or(false),
        published: props.published,
        require_license_acceptance: props.require_license_acceptance,
        download_url: entry.content.and_then(|c| c.src),
    }
}

fn split_comma_joined(value: String) -> Vec<String> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

fn split_whitespace_joined(value: String) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}

/// Parses the colon-delimited `Id:VersionRange:TargetFramework|...` shape
/// (spec §4.9), grouping by target framework and defaulting an empty or
/// absent range to `0.0.0`.
fn parse_dependency_string(raw: &str) -> Vec<DependencyGroup> {
    let mut groups: Vec<DependencyGroup> = Vec::new();

    for entry in raw.split('|').filter(|s| !s.is_empty()) {
        let mut parts = entry.splitn(3, ':');
        let id = parts.next().unwrap_or_default().to_string();
        if id.is_empty() {
            continue;
        }
        let range = parts.next().filter(|s| !s.is_empty()).unwrap_or("0.0.0").to_string();
        let target_framework = parts.next().unwrap_or_default().to_string();

        match groups.iter_mut().find(|g| g.target_framework == target_framework) {
            Some(group) => group.dependencies.push(Dependency { id, range }),
            None => groups.push(DependencyGroup { target_framework, dependencies: vec![Dependency { id, range }] }),
        }
    }

    groups
}

/// Bounded LRU over `FindPackagesById()` responses, keyed by `(source, id)`.
struct FindByIdCache {
    capacity: usize,
    entries: Mutex<(std::collections::HashMap<String, Vec<Entry>>, VecDeque<String>)>,
}

impl FindByIdCache {
    fn new(capacity: usize) -> Self {
        Self { capacity, entries: Mutex::new((std::collections::HashMap::new(), VecDeque::new())) }
    }

    fn get(&self, key: &str) -> Option<Vec<Entry>> {
        let mut guard = self.entries.lock().unwrap();
        let hit = guard.0.get(key).cloned();
        if hit.is_some() {
            guard.1.retain(|k| k != key);
            guard.1.push_back(key.to_string());
        }
        hit
    }

    fn insert(&self, key: String, value: Vec<Entry>) {
        let mut guard = self.entries.lock().unwrap();
        if !guard.0.contains_key(&key) && guard.0.len() >= self.capacity {
            if let Some(oldest) = guard.1.pop_front() {
                guard.0.remove(&oldest);
            }
        }
        guard.1.retain(|k| k != &key);
        guard.1.push_back(key.clone());
        guard.0.insert(key, value);
    }
}

pub struct MetadataClient {
    feed: Arc<FeedClient>,
    find_by_id_cache: FindByIdCache,
}

impl MetadataClient {
    pub fn new(feed: Arc<FeedClient>) -> Self {
        Self { feed, find_by_id_cache: FindByIdCache::new(FIND_BY_ID_CACHE_CAPACITY) }
    }

    pub async fn get_metadata(&self, cancel: &CancelToken, base_url: &str, id: &str, version: &str) -> Result<ProtocolMetadata, Error> {
        let url = format!("{}/Packages(Id='{}',Version='{}')", base_url.trim_end_matches('/'), id, version);
        let feed = self.feed.fetch_feed(cancel, &url).await?;
        feed.entries.into_iter().next().map(entry_into_metadata).ok_or_else(|| Error::not_found(CONTEXT))
    }

    async fn find_by_id(&self, cancel: &CancelToken, base_url: &str, id: &str) -> Result<Vec<Entry>, Error> {
        let cache_key = format!("{base_url}::{id}");
        if let Some(entries) = self.find_by_id_cache.get(&cache_key) {
            return Ok(entries);
        }

        let mut url = Url::parse(&format!("{}/FindPackagesById()", base_url.trim_end_matches('/'))).map_err(|e| Error::invalid_input(CONTEXT, e.to_string()))?;
        url.query_pairs_mut().append_pair("id", &format!("'{id}'"));

        let feed = self.feed.fetch_feed(cancel, url.as_str()).await?;
        self.find_by_id_cache.insert(cache_key, feed.entries.clone());
        Ok(feed.entries)
    }

    pub async fn list_versions(&self, cancel: &CancelToken, base_url: &str, id: &str) -> Result<Vec<String>, Error> {
        let entries = self.find_by_id(cancel, base_url, id).await?;
        Ok(entries.into_iter().map(|e| e.properties.version).collect())
    }

    /// Reuses the memoized `FindPackagesById()` response so the resolver
    /// issues a single HTTP request per package per source, filtering
    /// locally by `range` (spec §4.9).
    pub async fn get_dependency_info(&self, cancel: &CancelToken, base_url: &str, id: &str, range: &VersionRange) -> Result<Vec<PackageDependencyInfo>, Error> {
        let entries = self.find_by_id(cancel, base_url, id).await?;
        let mut matches = Vec::new();
        for entry in entries {
            let version_text = entry.properties.version.clone();
            let Ok(version) = Version::parse(&version_text) else { continue };
            if range.satisfies(&version) {
                let metadata = entry_into_metadata(entry);
                matches.push(PackageDependencyInfo { version: version_text, dependencies: metadata.dependencies });
            }
        }
        Ok(matches)
    }
}
