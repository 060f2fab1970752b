use anyhow::{Context, Result};
use generation::PollConfig;
use optimistic::Placement;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides `api_token`
pub const TOKEN_ENV: &str = "SHORTPLAY_API_TOKEN";

/// Authoring engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    /// Base URL every endpoint path is joined onto
    pub api_base_url: String,

    /// Bearer token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    /// Series opened at startup
    pub series_id: Option<String>,

    /// Video poll cadence and ceiling
    pub poll: PollConfig,

    /// Where "add" puts new script and audio items
    pub new_item_placement: Placement,

    /// Directory for the durable scene cache
    pub cache_dir: PathBuf,

    pub request_timeout_secs: u64,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080/api".to_string(),
            api_token: None,
            series_id: None,
            poll: PollConfig::default(),
            new_item_placement: Placement::Head,
            cache_dir: scene_cache::default_cache_dir(),
            request_timeout_secs: 30,
        }
    }
}

impl StudioConfig {
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn with_series(mut self, series_id: impl Into<String>) -> Self {
        self.series_id = Some(series_id.into());
        self
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.new_item_placement = placement;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Apply `SHORTPLAY_API_TOKEN` when it is set and non-blank.
    pub fn with_env_overrides(self) -> Self {
        match std::env::var(TOKEN_ENV) {
            Ok(token) if !token.trim().is_empty() => self.with_token(token),
            _ => self,
        }
    }

    /// Save configuration to JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Load configuration from JSON; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config = serde_json::from_str(&json)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }
}
