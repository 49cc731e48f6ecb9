//! Configuration management (C9): TOML file plus environment-variable
//! overrides, validated before the engine starts.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub http: HttpConfig,
    pub feed: FeedConfig,
    pub products: ProductsConfig,
    pub output: OutputConfig,
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// N for the L2 view.
    pub num_output_levels: usize,
    /// Errors accumulated before an engine triggers a rebuild.
    pub error_threshold: u32,
    /// Bounded capacity of each per-product inbox.
    pub inbox_capacity: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Snapshot retry budget.
    pub attempts: u32,
    /// Per-request timeout, in seconds.
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeedConfig {
    pub ws_endpoint: String,
    /// `{}` is replaced with the product id.
    pub snapshot_url_template: String,
    /// How long the feed task keeps reconnecting before giving up, in
    /// seconds.
    pub reconnect_deadline_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProductsConfig {
    /// Products this process maintains books for.
    pub subscribed: Vec<String>,
    /// Every product id this deployment is allowed to subscribe to.
    /// `subscribed` must be a subset of this list.
    pub allowed: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// `"stdout"` or `"file:<path>"`.
    pub sink: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            http: HttpConfig::default(),
            feed: FeedConfig::default(),
            products: ProductsConfig::default(),
            output: OutputConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_output_levels: 25,
            error_threshold: 10,
            inbox_capacity: 1024,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            timeout_seconds: 30,
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            ws_endpoint: "wss://ws-feed.example-exchange.com".to_string(),
            snapshot_url_template: "https://api.example-exchange.com/products/{}/book?level=3"
                .to_string(),
            reconnect_deadline_seconds: 300,
        }
    }
}

impl Default for ProductsConfig {
    fn default() -> Self {
        Self {
            subscribed: vec!["BTC-USD".to_string()],
            allowed: vec![
                "BCH-BTC".to_string(),
                "BCH-USD".to_string(),
                "BTC-EUR".to_string(),
                "BTC-GBP".to_string(),
                "BTC-USD".to_string(),
                "ETH-BTC".to_string(),
                "ETH-EUR".to_string(),
                "ETH-USD".to_string(),
                "LTC-BTC".to_string(),
                "LTC-EUR".to_string(),
                "LTC-USD".to_string(),
                "BCH-EUR".to_string(),
            ],
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sink: "stdout".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file, applies environment
    /// overrides, then validates. Missing files fall back to defaults
    /// via [`Config::load_or_default`].
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {}", path.as_ref().display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.as_ref().display()))?;

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::load_from_file(path).unwrap_or_else(|err| {
            tracing::warn!(%err, "failed to load config, using defaults");
            Self::default()
        })
    }

    /// Applies the documented environment-variable overrides, one per
    /// configuration field.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = env::var("MARKETBOOK_NUM_OUTPUT_LEVELS") {
            if let Ok(value) = value.parse() {
                self.engine.num_output_levels = value;
            }
        }
        if let Ok(value) = env::var("MARKETBOOK_ERROR_THRESHOLD") {
            if let Ok(value) = value.parse() {
                self.engine.error_threshold = value;
            }
        }
        if let Ok(value) = env::var("MARKETBOOK_INBOX_CAPACITY") {
            if let Ok(value) = value.parse() {
                self.engine.inbox_capacity = value;
            }
        }
        if let Ok(value) = env::var("MARKETBOOK_HTTP_ATTEMPTS") {
            if let Ok(value) = value.parse() {
                self.http.attempts = value;
            }
        }
        if let Ok(value) = env::var("MARKETBOOK_HTTP_TIMEOUT_SECONDS") {
            if let Ok(value) = value.parse() {
                self.http.timeout_seconds = value;
            }
        }
        if let Ok(value) = env::var("MARKETBOOK_FEED_WS_ENDPOINT") {
            self.feed.ws_endpoint = value;
        }
        if let Ok(value) = env::var("MARKETBOOK_FEED_SNAPSHOT_URL_TEMPLATE") {
            self.feed.snapshot_url_template = value;
        }
        if let Ok(value) = env::var("MARKETBOOK_PRODUCTS") {
            self.products.subscribed = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(value) = env::var("MARKETBOOK_OUTPUT_SINK") {
            self.output.sink = value;
        }
        if let Ok(value) = env::var("MARKETBOOK_LOG_LEVEL") {
            self.log_level = value;
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("failed to serialize configuration")?;
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write config file: {}", path.as_ref().display()))?;
        Ok(())
    }

    /// Validates the startup-fatal constraints: `subscribed` must be a
    /// non-empty subset of `allowed`, and the numeric knobs must be
    /// positive.
    pub fn validate(&self) -> Result<()> {
        if self.products.subscribed.is_empty() {
            anyhow::bail!("products.subscribed must name at least one product");
        }
        for product_id in &self.products.subscribed {
            if !self.products.allowed.contains(product_id) {
                anyhow::bail!(
                    "subscribed product '{product_id}' is not in products.allowed"
                );
            }
        }
        if self.engine.num_output_levels == 0 {
            anyhow::bail!("engine.num_output_levels must be greater than 0");
        }
        if self.engine.error_threshold == 0 {
            anyhow::bail!("engine.error_threshold must be greater than 0");
        }
        if self.engine.inbox_capacity == 0 {
            anyhow::bail!("engine.inbox_capacity must be greater than 0");
        }
        if self.http.attempts == 0 {
            anyhow::bail!("http.attempts must be greater than 0");
        }
        if self.http.timeout_seconds == 0 {
            anyhow::bail!("http.timeout_seconds must be greater than 0");
        }
        Ok(())
    }

    pub fn display(&self) -> Result<()> {
        println!("{:#?}", self);
        Ok(())
    }
}
