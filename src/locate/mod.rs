//! Measurement server discovery via the Locate API
//!
//! Resolves an ordered list of candidate servers with a cache-bypassing HTTP
//! GET, retrying with a fixed backoff before giving up. A fixed hostname in
//! the settings bypasses this module entirely (see `Server::from_hostname`).

use crate::defaults;
use crate::error::{Result, TestError};
use crate::logging;
use crate::settings::{ServerSelection, Settings};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Geolocation of a candidate server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Location {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// One measurement endpoint returned by the Locate API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Server {
    /// Identifying FQDN of the machine
    #[serde(default)]
    pub machine: String,
    #[serde(default)]
    pub location: Option<Location>,
    /// Endpoint URLs keyed by scheme and subtest path
    #[serde(default)]
    pub urls: HashMap<String, String>,
}

impl Server {
    /// Build a candidate from a pinned hostname using the standard ndt7
    /// paths, without any discovery call.
    pub fn from_hostname(hostname: &str, secure: bool) -> Server {
        let scheme = if secure { "wss" } else { "ws" };
        let mut urls = HashMap::new();
        urls.insert(
            format!("{}://{}", scheme, defaults::DOWNLOAD_PATH),
            format!("{}://{}{}", scheme, hostname, defaults::DOWNLOAD_PATH),
        );
        urls.insert(
            format!("{}://{}", scheme, defaults::UPLOAD_PATH),
            format!("{}://{}{}", scheme, hostname, defaults::UPLOAD_PATH),
        );
        Server {
            machine: hostname.to_string(),
            location: None,
            urls,
        }
    }

    /// URL of the download endpoint for the requested scheme
    pub fn download_url(&self, secure: bool) -> Option<&str> {
        let scheme = if secure { "wss" } else { "ws" };
        self.urls
            .get(&format!("{}://{}", scheme, defaults::DOWNLOAD_PATH))
            .map(String::as_str)
    }

    /// URL of the upload endpoint for the requested scheme
    pub fn upload_url(&self, secure: bool) -> Option<&str> {
        let scheme = if secure { "wss" } else { "ws" };
        self.urls
            .get(&format!("{}://{}", scheme, defaults::UPLOAD_PATH))
            .map(String::as_str)
    }
}

#[derive(Debug, Deserialize)]
struct LocateResponse {
    #[serde(default)]
    results: Vec<Server>,
}

/// Locate API client with retry policy
pub struct ServerLocator {
    client: reqwest::Client,
    backoff: Duration,
}

impl ServerLocator {
    /// Create a locator with the standard 10 s request timeout
    pub fn new() -> Result<Self> {
        Self::with_backoff(defaults::DISCOVERY_RETRY_BACKOFF)
    }

    /// Create a locator with a non-default retry backoff (used by tests)
    pub fn with_backoff(backoff: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(defaults::DISCOVERY_REQUEST_TIMEOUT)
            .user_agent(concat!("ndt7-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TestError::http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, backoff })
    }

    /// Resolve candidate servers for the given settings.
    ///
    /// Retries up to `settings.max_discovery_retries` times with a fixed
    /// backoff on transport failure or an empty/invalid response, then fails
    /// with `TestError::NoServerAvailable`. Cancelling mid-flight surfaces
    /// `TestError::DiscoveryCancelled` without further retries.
    pub async fn discover(
        &self,
        settings: &Settings,
        cancel: &CancellationToken,
    ) -> Result<Vec<Server>> {
        let url = Self::locate_url(&settings.server)?;
        logging::debug(format!("Discovering servers via {}", url));

        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(TestError::DiscoveryCancelled);
            }
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(TestError::DiscoveryCancelled),
                outcome = self.fetch(&url) => outcome,
            };
            match outcome {
                Ok(servers) if !servers.is_empty() => {
                    logging::info(format!("Discovery returned {} candidate(s)", servers.len()));
                    return Ok(servers);
                }
                Ok(_) => logging::warn("Discovery returned an empty result set"),
                Err(e) => logging::warn(format!("Discovery attempt failed: {}", e)),
            }
            attempt += 1;
            if attempt > settings.max_discovery_retries {
                return Err(TestError::NoServerAvailable);
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(TestError::DiscoveryCancelled),
                _ = tokio::time::sleep(self.backoff) => {}
            }
        }
    }

    /// Deterministic selection among candidates: the first whose machine
    /// name is non-empty.
    pub fn select(servers: &[Server]) -> Option<&Server> {
        servers.iter().find(|s| !s.machine.is_empty())
    }

    fn locate_url(selection: &ServerSelection) -> Result<url::Url> {
        let ServerSelection::Discover {
            locate_url,
            country,
        } = selection
        else {
            return Err(TestError::config(
                "Discovery requested with a fixed server selection",
            ));
        };
        let mut url = url::Url::parse(locate_url)?;
        url.query_pairs_mut()
            .append_pair("client_name", defaults::CLIENT_NAME);
        if let Some(country) = country {
            url.query_pairs_mut().append_pair("country", country);
        }
        Ok(url)
    }

    async fn fetch(&self, url: &url::Url) -> Result<Vec<Server>> {
        let response = self
            .client
            .get(url.clone())
            .header("Cache-Control", "no-cache, no-store")
            .header("Pragma", "no-cache")
            .send()
            .await?
            .error_for_status()?;
        let body: LocateResponse = response.json().await?;
        Ok(body.results)
    }
}
