use anyhow::{
    Context,
    anyhow,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    fs,
    path::Path,
    str::FromStr,
    time::Duration,
};
use url::Url;

pub const API_KEY_VAR: &str = "ETHERSCAN_API_KEY";
pub const BASE_URL_VAR: &str = "ETHERSCAN_BASE_URL";
pub const CHAIN_ID_VAR: &str = "ETHERSCAN_CHAIN_ID";

pub const DEFAULT_PAGE_SIZE: u64 = 1_000;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_SEPOLIA_URL: &str = "https://api-sepolia.etherscan.io/api";
pub const DEFAULT_MAINNET_URL: &str = "https://api.etherscan.io/api";
pub const DEFAULT_LOCAL_URL: &str = "http://127.0.0.1:8080/api";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("explorer API key missing; set {API_KEY_VAR} or pass --api-key")]
    MissingApiKey,
    #[error("invalid explorer base url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("invalid chain id '{0}'")]
    InvalidChainId(String),
    #[error("page size must be greater than zero")]
    InvalidPageSize,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplorerNetwork {
    Mainnet,
    #[default]
    Sepolia,
    Local,
}

impl ExplorerNetwork {
    pub fn default_base_url(self) -> &'static str {
        match self {
            ExplorerNetwork::Mainnet => DEFAULT_MAINNET_URL,
            ExplorerNetwork::Sepolia => DEFAULT_SEPOLIA_URL,
            ExplorerNetwork::Local => DEFAULT_LOCAL_URL,
        }
    }

    pub fn default_chain_id(self) -> u64 {
        match self {
            ExplorerNetwork::Mainnet => 1,
            ExplorerNetwork::Sepolia => 11_155_111,
            ExplorerNetwork::Local => 31_337,
        }
    }
}

impl fmt::Display for ExplorerNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExplorerNetwork::Mainnet => "Mainnet",
            ExplorerNetwork::Sepolia => "Sepolia",
            ExplorerNetwork::Local => "Local",
        };
        write!(f, "{name}")
    }
}

/// Everything a log source needs to talk to an explorer `getLogs` endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExplorerConfig {
    pub network: ExplorerNetwork,
    pub base_url: String,
    pub api_key: Option<String>,
    pub chain_id: Option<u64>,
    pub page_size: u64,
    pub request_timeout: Option<Duration>,
}

impl ExplorerConfig {
    pub fn for_network(network: ExplorerNetwork) -> Self {
        Self {
            network,
            base_url: network.default_base_url().to_string(),
            api_key: None,
            chain_id: Some(network.default_chain_id()),
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
        }
    }

    /// Defaults for `network`, overlaid with the `ETHERSCAN_*` environment variables.
    pub fn from_env(network: ExplorerNetwork) -> Result<Self, ConfigError> {
        Self::from_vars(network, |name| std::env::var(name).ok())
    }

    pub fn from_vars(
        network: ExplorerNetwork,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::for_network(network);
        if let Some(key) = lookup(API_KEY_VAR) {
            config = config.with_api_key(key);
        }
        if let Some(url) = lookup(BASE_URL_VAR) {
            config = config.with_base_url(&url)?;
        }
        if let Some(raw) = lookup(CHAIN_ID_VAR) {
            config = config.with_chain_id(parse_chain_id(&raw)?);
        }
        Ok(config)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, raw: &str) -> Result<Self, ConfigError> {
        self.base_url = parse_base_url(raw)?;
        Ok(self)
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    pub fn without_chain_id(mut self) -> Self {
        self.chain_id = None;
        self
    }

    pub fn with_page_size(mut self, page_size: u64) -> Result<Self, ConfigError> {
        if page_size == 0 {
            return Err(ConfigError::InvalidPageSize);
        }
        self.page_size = page_size;
        Ok(self)
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// The access credential, or [`ConfigError::MissingApiKey`] when it is absent or blank.
    pub fn api_key(&self) -> Result<&str, ConfigError> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(ConfigError::MissingApiKey),
        }
    }
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self::for_network(ExplorerNetwork::default())
    }
}

/// Optional overrides read from a JSON file, every field may be omitted.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExplorerConfigFile {
    #[serde(default)]
    pub network: Option<ExplorerNetwork>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub page_size: Option<u64>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl ExplorerConfigFile {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path).with_context(|| {
            format!("Failed to read explorer config file {}", path.display())
        })?;
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(&data).map_err(|e| {
            anyhow!(
                "Failed to parse explorer config file {}: {e}",
                path.display()
            )
        })
    }

    /// Overlays the fields present in the file onto `config`.
    ///
    /// A `network` entry only matters through [`ExplorerConfigFile::base_config`].
    pub fn apply(&self, mut config: ExplorerConfig) -> Result<ExplorerConfig, ConfigError> {
        if let Some(url) = &self.base_url {
            config = config.with_base_url(url)?;
        }
        if let Some(key) = &self.api_key {
            config = config.with_api_key(key.clone());
        }
        if let Some(chain_id) = self.chain_id {
            config = config.with_chain_id(chain_id);
        }
        if let Some(page_size) = self.page_size {
            config = config.with_page_size(page_size)?;
        }
        if let Some(secs) = self.request_timeout_secs {
            config = config.with_request_timeout(Some(Duration::from_secs(secs)));
        }
        Ok(config)
    }

    /// Network defaults for the file's network (or `fallback`) with the file applied.
    pub fn base_config(
        &self,
        fallback: ExplorerNetwork,
    ) -> Result<ExplorerConfig, ConfigError> {
        let network = self.network.unwrap_or(fallback);
        self.apply(ExplorerConfig::for_network(network))
    }
}

fn parse_base_url(raw: &str) -> Result<String, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidBaseUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url.to_string()),
        other => Err(ConfigError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme {other}"),
        }),
    }
}

fn parse_chain_id(raw: &str) -> Result<u64, ConfigError> {
    u64::from_str(raw.trim()).map_err(|_| ConfigError::InvalidChainId(raw.to_string()))
}
