use std::time::Duration;

use anyhow::bail;
use tracker_logic::{LatestFetcher, LatestResponse, prelude::*};

const fn api_base_url() -> &'static str {
    if let Some(url) = option_env!("API_BASE_URL") {
        url
    } else {
        "http://localhost:3000"
    }
}

const fn socket_url() -> &'static str {
    if let Some(url) = option_env!("SOCKET_URL") {
        url
    } else {
        "ws://localhost:3000"
    }
}

const fn app_name() -> &'static str {
    if let Some(name) = option_env!("APP_NAME") {
        name
    } else {
        "Location Tracker"
    }
}

const fn app_version() -> &'static str {
    if let Some(version) = option_env!("APP_VERSION") {
        version
    } else {
        env!("CARGO_PKG_VERSION")
    }
}

pub const DEFAULT_API_BASE_URL: &str = api_base_url();
pub const DEFAULT_SOCKET_URL: &str = socket_url();
pub const DEFAULT_APP_NAME: &str = app_name();
pub const DEFAULT_APP_VERSION: &str = app_version();

const LATEST_PATH: &str = "/api/locations/latest";
const SOCKET_IO_PATH: &str = "/socket.io/?EIO=4&transport=websocket";

/// Default URL for the latest location, used for logging before config is read
pub const DEFAULT_LATEST_URL: &str = const_str::concat!(DEFAULT_API_BASE_URL, LATEST_PATH);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the tracking service lives and how to present it, built-in defaults can be
/// overridden with environment variables of the same name at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub api_base_url: String,
    pub socket_url: String,
    pub app_name: String,
    pub app_version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            socket_url: DEFAULT_SOCKET_URL.to_string(),
            app_name: DEFAULT_APP_NAME.to_string(),
            app_version: DEFAULT_APP_VERSION.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let get = |key: &str, default: String| {
            lookup(key)
                .filter(|val| !val.trim().is_empty())
                .unwrap_or(default)
        };
        Self {
            api_base_url: get("API_BASE_URL", defaults.api_base_url),
            socket_url: get("SOCKET_URL", defaults.socket_url),
            app_name: get("APP_NAME", defaults.app_name),
            app_version: get("APP_VERSION", defaults.app_version),
        }
    }

    pub fn latest_url(&self) -> String {
        format!("{}{LATEST_PATH}", self.api_base_url.trim_end_matches('/'))
    }

    /// Websocket URL for the Socket.IO endpoint, `http(s)` bases are mapped to `ws(s)`
    pub fn socket_io_url(&self) -> Result<String> {
        let base = self.socket_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else if base.starts_with("ws://") || base.starts_with("wss://") {
            base.to_string()
        } else {
            bail!("Unsupported scheme in socket URL {base:?}");
        };
        Ok(format!("{base}{SOCKET_IO_PATH}"))
    }
}

/// Gets the latest location from the tracking service's HTTP API
pub struct HttpFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpFetcher {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: reqwest::Client, config: &ServerConfig) -> Self {
        Self {
            client,
            url: config.latest_url(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl LatestFetcher for HttpFetcher {
    async fn fetch_latest(&self) -> Result<LatestResponse> {
        self.client
            .get(&self.url)
            .send()
            .await
            .context("Could not send request")?
            .error_for_status()
            .context("Server returned error")?
            .json::<LatestResponse>()
            .await
            .context("Server sent a malformed response")
    }
}
