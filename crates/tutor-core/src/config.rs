use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Result, anyhow};
use tracing::warn;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3001/api";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    /// Routing root of the published site, used to resolve citation links
    pub site_base_url: String,
    /// Per-chunk idle timeout for chat streams; 0 waits forever
    pub stream_idle_timeout_secs: u64,
    pub selection_guard_ms: u64,
    pub lesson_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            site_base_url: "/".to_string(),
            stream_idle_timeout_secs: 60,
            selection_guard_ms: 300,
            lesson_path: None,
        }
    }

    /// Load from the user config directory, then apply env overrides.
    /// An unreadable file falls back to defaults; overrides apply either way.
    pub fn load_or_default() -> Self {
        let path = Self::get_config_path();
        Self::resolve(
            path.as_deref().ok(),
            std::env::var("TUTOR_API_URL").ok(),
            std::env::var("TUTOR_SITE_BASE_URL").ok(),
        )
    }

    fn resolve(path: Option<&Path>, api_url: Option<String>, site_base: Option<String>) -> Self {
        let mut config = match path.map(Self::load_from) {
            Some(Ok(config)) => config,
            Some(Err(err)) => {
                warn!(error = %err, "ignoring unreadable config file");
                Self::new()
            }
            None => Self::new(),
        };
        config.apply_overrides(api_url, site_base);
        config
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    /// Record the lesson to open by default next time.
    pub fn remember_lesson(lesson: &Path) -> Result<()> {
        Self::remember_lesson_in(&Self::get_config_path()?, lesson)
    }

    fn remember_lesson_in(config_path: &Path, lesson: &Path) -> Result<()> {
        // Re-read the file so env overrides are not persisted
        let mut config = Self::load_from(config_path).unwrap_or_else(|_| Self::new());
        config.lesson_path = Some(lesson.to_path_buf());
        config.save_to(config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    fn apply_overrides(&mut self, api_url: Option<String>, site_base: Option<String>) {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(base) = site_base.filter(|b| !b.trim().is_empty()) {
            self.site_base_url = base;
        }
    }

    pub fn stream_idle_timeout(&self) -> Option<Duration> {
        match self.stream_idle_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn selection_guard(&self) -> Duration {
        Duration::from_millis(self.selection_guard_ms)
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("tutor").join("config.json"))
    }
}
