//! v2 package binary download with redirect-hop memoization (spec §4.7).
//!
//! NuGet.org's v2 feed serves `/package/{id}/{version}` as a redirect to a
//! CDN URL; `reqwest` already follows it transparently, but paying for the
//! extra round trip on every download is wasteful once the target is known.
//! `resolve_redirect` caches the final URL keyed by the request URL so a
//! later download goes straight to the CDN.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::CacheContext;
use crate::error::Error;
use crate::persist::PersistedMap;
use crate::transport::{CancelToken, HttpExecutor, Request};

const CONTEXT: &str = "v2 download";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedirectEntry {
    target_url: String,
    expires_at_secs: u64,
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

pub struct DownloadClient {
    http: Arc<dyn HttpExecutor>,
    redirects: Arc<PersistedMap<RedirectEntry>>,
    redirect_ttl: Duration,
}

impl DownloadClient {
    pub fn new(http: Arc<dyn HttpExecutor>, redirects: Arc<PersistedMap<RedirectEntry>>, redirect_ttl: Duration) -> Self {
        Self { http, redirects, redirect_ttl }
    }

    /// Returns a URL to actually request: the cached CDN target if one is
    /// on file and unexpired, otherwise `requested_url` itself.
    fn resolve_redirect(&self, requested_url: &str) -> String {
        match self.redirects.get(requested_url) {
            Some(entry) if entry.expires_at_secs > now_secs() => entry.target_url,
            _ => requested_url.to_string(),
        }
    }

    /// Records `final_url` against `requested_url` when they differ, so the
    /// next call skips the redirect hop entirely.
    fn remember_redirect(&self, requested_url: &str, final_url: &Url) {
        if final_url.as_str() == requested_url {
            return;
        }
        let entry = RedirectEntry { target_url: final_url.to_string(), expires_at_secs: now_secs() + self.redirect_ttl.as_secs() };
        let _ = self.redirects.set(requested_url.to_string(), entry);
    }

    pub async fn download(&self, cancel: &CancelToken, base_url: &str, package_id: &str, version: &str, ctx: &CacheContext) -> Result<Bytes, Error> {
        let requested = format!("{}/package/{}/{}", base_url.trim_end_matches('/'), package_id, version);
        let target = if ctx.no_cache { requested.clone() } else { self.resolve_redirect(&requested) };

        let url = Url::parse(&target).map_err(|e| Error::invalid_input(CONTEXT, e.to_string()))?;
        let response = self.http.do_with_retry(cancel, Request::get(url)).await.map_err(|e| e.with_context(CONTEXT))?;

        if ctx.write_enabled() {
            self.remember_redirect(&requested, &response.final_url);
        }
        Ok(response.body)
    }
}
