//! v2 OData search (spec §4.7).

use std::sync::Arc;

use url::Url;

use crate::error::Error;
use crate::protocol::{SearchOptions, SearchResult};
use crate::transport::CancelToken;

use super::feed::FeedClient;

const CONTEXT: &str = "v2 search";
const DEFAULT_TOP: u32 = 20;

pub struct SearchClient {
    feed: Arc<FeedClient>,
}

impl SearchClient {
    pub fn new(feed: Arc<FeedClient>) -> Self {
        Self { feed }
    }

    pub async fn search(&self, cancel: &CancelToken, base_url: &str, query: &str, opts: &SearchOptions) -> Result<Vec<SearchResult>, Error> {
        let lower_query = query.to_lowercase();
        let mut filter = format!("substringof('{lower_query}',tolower(Id)) or substringof('{lower_query}',tolower(Description))");
        if !opts.include_prerelease {
            filter.push_str(" and IsPrerelease eq false");
        }
        let top = if opts.take == 0 { DEFAULT_TOP } else { opts.take };

        let mut url =
            Url::parse(&format!("{}/Packages()", base_url.trim_end_matches('/'))).map_err(|e| Error::invalid_input(CONTEXT, e.to_string()))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("$filter", &filter);
            pairs.append_pair("$orderby", "DownloadCount desc");
            pairs.append_pair("$skip", &opts.skip.to_string());
            pairs.append_pair("$top", &top.to_string());
        }

        let feed = self.feed.fetch_feed(cancel, url.as_str()).await?;
        Ok(feed
            .entries
            .into_iter()
            .map(|e| SearchResult {
                id: e.properties.id,
                version: e.properties.version,
                description: e.properties.description,
                total_downloads: e.properties.download_count,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CircuitBreakerConfig, HttpConfig, RateLimitConfig, RetryConfig};
    use crate::observability::Observability;
    use crate::transport::HttpClient;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:d="http://schemas.microsoft.com/ado/2007/08/dataservices" xmlns:m="http://schemas.microsoft.com/ado/2007/08/dataservices/metadata">
  <entry>
    <title>TestPkg</title>
    <content type="application/zip" src="https://example.test/download/TestPkg/1.0.0"/>
    <m:properties>
      <d:Id>TestPkg</d:Id>
      <d:Version>1.0.0</d:Version>
      <d:DownloadCount m:type="Edm.Int64">7</d:DownloadCount>
    </m:properties>
  </entry>
</feed>"#;

    #[tokio::test]
    async fn search_maps_feed_entries_into_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).and(path("/Packages()")).respond_with(ResponseTemplate::new(200).set_body_raw(FEED, "application/atom+xml")).mount(&server).await;

        let http = Arc::new(
            HttpClient::new(HttpConfig::default(), RetryConfig::default(), CircuitBreakerConfig::default(), RateLimitConfig::default(), Observability::default())
                .unwrap(),
        );
        let client = SearchClient::new(Arc::new(crate::protocol::v2::feed::FeedClient::new(http)));

        let results = client.search(&CancelToken::none(), &server.uri(), "test", &SearchOptions::default()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "TestPkg");
        assert_eq!(results[0].total_downloads, Some(7));
    }
}
