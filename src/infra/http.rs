//! HTTP access to Mastodon-compatible public timelines.

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use crate::application::error::FeedError;
use crate::application::feed::FeedSource;
use crate::application::fetch::TimelineFetcher;
use crate::config::RemoteSettings;
use crate::domain::Status;

use super::error::InfraError;

const PUBLIC_TIMELINE_PATH: &str = "api/v1/timelines/public";

/// [`TimelineFetcher`] backed by `GET /api/v1/timelines/public`.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: Client,
    endpoint: Url,
}

impl HttpFetcher {
    /// `host` is either a bare host name (`mastodon.example`, served over
    /// https) or a base URL such as `http://127.0.0.1:8080`.
    pub fn new(host: &str, remote: &RemoteSettings) -> Result<Self, InfraError> {
        let base = parse_base(host)?;
        let endpoint = base.join(PUBLIC_TIMELINE_PATH).map_err(|err| {
            InfraError::configuration(format!("cannot build timeline URL for `{host}`: {err}"))
        })?;
        let client = Client::builder()
            .user_agent(remote.user_agent.as_str())
            .timeout(remote.timeout)
            .build()
            .map_err(|err| InfraError::http(err.to_string()))?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn timeline_url(&self, local: bool, max_id: Option<u64>) -> Url {
        let mut pairs: Vec<(&str, String)> = Vec::new();
        if let Some(max_id) = max_id {
            pairs.push(("max_id", max_id.to_string()));
        }
        if local {
            pairs.push(("local", "1".to_string()));
        }

        let mut url = self.endpoint.clone();
        if !pairs.is_empty() {
            let mut query = url.query_pairs_mut();
            for (key, value) in &pairs {
                query.append_pair(key, value);
            }
        }
        url
    }
}

#[async_trait]
impl TimelineFetcher for HttpFetcher {
    async fn fetch_public(
        &self,
        local: bool,
        max_id: Option<u64>,
    ) -> Result<Vec<Status>, FeedError> {
        let url = self.timeline_url(local, max_id);
        debug!(%url, "requesting timeline page");

        let response = self.client.get(url.clone()).send().await.map_err(|err| {
            warn!(%url, error = %err, "timeline request failed");
            FeedError::transport_from(format!("GET {url} failed"), err)
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%url, %status, "timeline request rejected");
            return Err(FeedError::transport(format!("GET {url} returned {status}")));
        }

        let body = response.bytes().await.map_err(|err| {
            FeedError::transport_from(format!("reading body of {url} failed"), err)
        })?;

        serde_json::from_slice(&body)
            .map_err(|err| FeedError::malformed(format!("{url} did not return statuses: {err}")))
    }
}

/// Feed source for `host` talking HTTP with the given remote settings.
pub fn open_feed(
    host: &str,
    remote: &RemoteSettings,
) -> Result<FeedSource<HttpFetcher>, InfraError> {
    let fetcher = HttpFetcher::new(host, remote)?;
    debug!(endpoint = %fetcher.endpoint(), "opened timeline feed");
    Ok(FeedSource::new(fetcher))
}

fn parse_base(host: &str) -> Result<Url, InfraError> {
    let trimmed = host.trim();
    if trimmed.is_empty() {
        return Err(InfraError::configuration("host must not be empty"));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let mut url = Url::parse(&candidate)
        .map_err(|err| InfraError::configuration(format!("invalid host `{trimmed}`: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(InfraError::configuration(format!(
            "unsupported scheme `{}` for host `{trimmed}`",
            url.scheme()
        )));
    }

    // Relative joins replace the last path segment unless it ends in a slash.
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
