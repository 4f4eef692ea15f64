use crate::error::CoreError;
use crate::models::{FeedKind, MergePolicy};
use serde::{Deserialize, Serialize};

/// Valid Jupiter top-trending windows.
pub const TOP_TRENDING_TIMEFRAMES: &[&str] = &["5m", "1h", "6h", "24h"];

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub feeds: FeedsSettings,
    #[serde(default)]
    pub watch: WatchSettings,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Pending events per SSE subscriber before it is dropped as too slow.
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FeedsSettings {
    #[serde(default = "default_feed")]
    pub jupiter_recent: FeedSettings,
    #[serde(default = "default_feed")]
    pub jupiter_top_trending: FeedSettings,
    #[serde(default = "default_feed")]
    pub gmgn: FeedSettings,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FeedSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Start polling at boot. When false the feed waits for `POST .../start`.
    #[serde(default = "default_true")]
    pub autostart: bool,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub policy: Option<MergePolicy>,
    /// Upper bound on tokens held in the snapshot, oldest evicted first.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default)]
    pub timeframe: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,
}

impl FeedSettings {
    pub fn url_for(&self, kind: FeedKind) -> String {
        self.url.clone().unwrap_or_else(|| {
            match kind {
                FeedKind::JupiterRecent => "https://lite-api.jup.ag/tokens/v2/recent",
                FeedKind::JupiterTopTrending => "https://lite-api.jup.ag/tokens/v2/toptrending",
                FeedKind::Gmgn => "https://gmgn.ai/defi/quotation/v1/rank/sol/swaps/1h",
            }
            .to_string()
        })
    }

    /// GMGN accumulates tokens across polls, the Jupiter feeds are replaced.
    pub fn policy_for(&self, kind: FeedKind) -> MergePolicy {
        self.policy.unwrap_or(match kind {
            FeedKind::Gmgn => MergePolicy::Merge,
            _ => MergePolicy::Replace,
        })
    }

    pub fn timeframe_for(&self, kind: FeedKind) -> Option<String> {
        match kind {
            FeedKind::JupiterTopTrending => {
                Some(self.timeframe.clone().unwrap_or_else(|| "1h".to_string()))
            }
            _ => self.timeframe.clone(),
        }
    }

    pub fn limit_for(&self, kind: FeedKind) -> Option<u32> {
        match kind {
            FeedKind::JupiterTopTrending => Some(self.limit.unwrap_or(50)),
            _ => self.limit,
        }
    }
}

impl FeedsSettings {
    pub fn get(&self, kind: FeedKind) -> &FeedSettings {
        match kind {
            FeedKind::JupiterRecent => &self.jupiter_recent,
            FeedKind::JupiterTopTrending => &self.jupiter_top_trending,
            FeedKind::Gmgn => &self.gmgn,
        }
    }
}

impl Settings {
    /// Load from a TOML file, then let `MEMESCOPE_*` env vars override it
    /// (nested keys use `__`, e.g. `MEMESCOPE_SERVER__PORT=9000`).
    #[cfg(feature = "native")]
    pub fn from_file(path: &str) -> Result<Self, CoreError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("MEMESCOPE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        let cfg = builder.build()?;
        Ok(cfg.try_deserialize()?)
    }

    #[cfg(feature = "native")]
    pub fn save_to_file(&self, path: &str) -> Result<(), CoreError> {
        let toml_string = toml::to_string(self)?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }

    /// Validate settings ranges and constraints
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.server.port == 0 {
            return Err(CoreError::Validation("server.port must be > 0".to_string()));
        }
        if self.server.stream_buffer == 0 {
            return Err(CoreError::Validation("server.stream_buffer must be > 0".to_string()));
        }
        if self.server.keep_alive_secs == 0 {
            return Err(CoreError::Validation("server.keep_alive_secs must be > 0".to_string()));
        }
        for kind in FeedKind::ALL {
            let feed = self.feeds.get(kind);
            if feed.poll_interval_ms == 0 {
                return Err(CoreError::Validation(format!(
                    "feeds.{}.poll_interval_ms must be > 0",
                    kind
                )));
            }
            if feed.timeout_ms == 0 {
                return Err(CoreError::Validation(format!(
                    "feeds.{}.timeout_ms must be > 0",
                    kind
                )));
            }
            if feed.max_tokens == 0 {
                return Err(CoreError::Validation(format!(
                    "feeds.{}.max_tokens must be > 0",
                    kind
                )));
            }
            if let Err(e) = url::Url::parse(&feed.url_for(kind)) {
                return Err(CoreError::Validation(format!(
                    "feeds.{}.url is invalid: {}",
                    kind, e
                )));
            }
        }
        let trending = &self.feeds.jupiter_top_trending;
        if let Some(timeframe) = trending.timeframe_for(FeedKind::JupiterTopTrending) {
            if !TOP_TRENDING_TIMEFRAMES.contains(&timeframe.as_str()) {
                return Err(CoreError::Validation(format!(
                    "feeds.jupiter_top_trending.timeframe must be one of {:?}",
                    TOP_TRENDING_TIMEFRAMES
                )));
            }
        }
        if trending.limit == Some(0) {
            return Err(CoreError::Validation(
                "feeds.jupiter_top_trending.limit must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            stream_buffer: default_stream_buffer(),
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

impl Default for FeedsSettings {
    fn default() -> Self {
        Self {
            jupiter_recent: default_feed(),
            jupiter_top_trending: default_feed(),
            gmgn: default_feed(),
        }
    }
}

impl Default for FeedSettings {
    fn default() -> Self {
        default_feed()
    }
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            storage_dir: default_storage_dir(),
        }
    }
}

fn default_feed() -> FeedSettings {
    FeedSettings {
        enabled: true,
        autostart: true,
        url: None,
        poll_interval_ms: default_poll_interval_ms(),
        timeout_ms: default_timeout_ms(),
        policy: None,
        max_tokens: default_max_tokens(),
        timeframe: None,
        limit: None,
        user_agent: default_user_agent(),
    }
}

fn default_true() -> bool { true }
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_stream_buffer() -> usize { 16 }
fn default_keep_alive_secs() -> u64 { 15 }
fn default_poll_interval_ms() -> u64 { 5_000 }
fn default_timeout_ms() -> u64 { 8_000 }
fn default_max_tokens() -> usize { 1_000 }
fn default_user_agent() -> String { "memescope/0.1".to_string() }
fn default_base_url() -> String { "http://127.0.0.1:8080".to_string() }
fn default_storage_dir() -> String { ".memescope".to_string() }
