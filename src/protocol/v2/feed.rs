//! v2 Atom feed parsing and protocol detection (spec §4.7).

use std::sync::Arc;

use serde::Deserialize;
use url::Url;

use crate::error::Error;
use crate::transport::{CancelToken, HttpExecutor, Request};

const CONTEXT: &str = "v2 feed";

#[derive(Debug, Deserialize)]
pub struct Feed {
    #[serde(rename = "entry", default)]
    pub entries: Vec<Entry>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Entry {
    pub title: Option<String>,
    pub content: Option<Content>,
    #[serde(rename = "m:properties")]
    pub properties: EntryProperties,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Content {
    #[serde(rename = "@src")]
    pub src: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct EntryProperties {
    #[serde(rename = "d:Id", default)]
    pub id: String,
    #[serde(rename = "d:Version", default)]
    pub version: String,
    #[serde(rename = "d:Description", default)]
    pub description: Option<String>,
    #[serde(rename = "d:Authors", default)]
    pub authors: Option<String>,
    #[serde(rename = "d:Tags", default)]
    pub tags: Option<String>,
    #[serde(rename = "d:Dependencies", default)]
    pub dependencies: Option<String>,
    #[serde(rename = "d:DownloadCount", default)]
    pub download_count: Option<i64>,
    #[serde(rename = "d:IsPrerelease", default)]
    pub is_prerelease: Option<bool>,
    #[serde(rename = "d:LicenseUrl", default)]
    pub license_url: Option<String>,
    #[serde(rename = "d:ProjectUrl", default)]
    pub project_url: Option<String>,
    #[serde(rename = "d:IconUrl", default)]
    pub icon_url: Option<String>,
    #[serde(rename = "d:Published", default)]
    pub published: Option<String>,
    #[serde(rename = "d:RequireLicenseAcceptance", default)]
    pub require_license_acceptance: bool,
}

#[derive(Debug, Deserialize)]
struct ServiceDocument {
    workspace: Workspace,
}

#[derive(Debug, Deserialize)]
struct Workspace {
    #[serde(rename = "collection", default)]
    collections: Vec<Collection>,
}

#[derive(Debug, Deserialize)]
struct Collection {
    #[serde(rename = "@href")]
    href: String,
}

pub struct FeedClient {
    http: Arc<dyn HttpExecutor>,
}

impl FeedClient {
    pub fn new(http: Arc<dyn HttpExecutor>) -> Self {
        Self { http }
    }

    /// Fetches `url` and parses its `<entry>` elements.
    pub async fn fetch_feed(&self, cancel: &CancelToken, url: &str) -> Result<Feed, Error> {
        let parsed = Url::parse(url).map_err(|e| Error::invalid_input(CONTEXT, e.to_string()))?;
        let response = self.http.do_with_retry(cancel, Request::get(parsed)).await.map_err(|e| e.with_context(CONTEXT))?;
        quick_xml::de::from_str(&String::from_utf8_lossy(&response.body)).map_err(|e| Error::decode(CONTEXT, e))
    }

    /// Requires 200 + an XML/Atom content-type and a `Packages` collection
    /// in the service document; anything else means "not a v2 feed".
    pub async fn detect(&self, cancel: &CancelToken, url: &str) -> Result<bool, Error> {
        let probe_url = if url.ends_with('/') { url.to_string() } else { format!("{url}/") };
        let parsed = Url::parse(&probe_url).map_err(|e| Error::invalid_input(CONTEXT, e.to_string()))?;

        let response = match self.http.do_(cancel, Request::get(parsed)).await {
            Ok(r) => r,
            Err(_) => return Ok(false),
        };

        let is_xml = response
            .headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("xml") || ct.contains("atom"));
        if !is_xml {
            return Ok(false);
        }

        let document: Result<ServiceDocument, _> = quick_xml::de::from_str(&String::from_utf8_lossy(&response.body));
        let Ok(document) = document else { return Ok(false) };

        Ok(document.workspace.collections.iter().any(|c| c.href == "Packages"))
    }
}
