use crate::error::{HarvestError, Result};
use crate::pacing::{PacingStrategy, RateLimiter};
use crate::scrapers::{BrowserSettings, LoadMoreSettings, LocatorTable};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_KEY_ENV: &str = "GOOGLE_PLACES_API_KEY";
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacingMode {
    None,
    Fixed,
    Exponential,
}

/// Settings read from the local, non-versioned `config.json`.
/// Every key is optional; missing keys keep their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub google_places_api_key: Option<String>,
    pub cities: Vec<String>,
    pub restaurant_types: Vec<String>,
    pub max_results_per_search: usize,
    pub search_delay_ms: u64,
    pub detail_delay_ms: u64,
    pub pacing: PacingMode,
    /// Upper bound for exponential pacing and retry backoff
    pub max_backoff_ms: u64,
    pub max_retries: u32,
    pub output_dir: PathBuf,
    /// Custom locator table; the embedded one is used otherwise
    pub locator_table: Option<PathBuf>,
    pub browser: BrowserConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            google_places_api_key: None,
            cities: strings(&["Київ", "Львів", "Одеса", "Харків", "Дніпро"]),
            restaurant_types: strings(&[
                "ресторан",
                "кафе",
                "піцерія",
                "суші ресторан",
                "український ресторан",
                "італійський ресторан",
            ]),
            max_results_per_search: 20,
            search_delay_ms: 300,
            detail_delay_ms: 500,
            pacing: PacingMode::Fixed,
            max_backoff_ms: 30_000,
            max_retries: 2,
            output_dir: PathBuf::from("."),
            locator_table: None,
            browser: BrowserConfig::default(),
        }
    }
}

/// Browser harvest settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub city: String,
    pub restaurant_type: String,
    pub restaurants: Vec<String>,
    pub max_reviews: usize,
    pub max_scroll_attempts: usize,
    pub scroll_pause_ms: u64,
    pub ready_timeout_secs: u64,
    pub between_places_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            city: "Київ".to_string(),
            restaurant_type: "ресторан".to_string(),
            restaurants: strings(&["Mafia", "Хачапурі та Вино", "Евразія", "Чорноморка"]),
            max_reviews: 200,
            max_scroll_attempts: 40,
            scroll_pause_ms: 3_000,
            ready_timeout_secs: 15,
            between_places_ms: 3_000,
        }
    }
}

impl Settings {
    /// Read `path`, falling back to defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                HarvestError::Configuration(format!("invalid {}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(HarvestError::Configuration(format!(
                "cannot read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Environment first, config file second
    pub fn resolve_api_key(&self, from_env: Option<String>) -> Result<String> {
        from_env
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                self.google_places_api_key
                    .clone()
                    .filter(|k| !k.trim().is_empty())
            })
            .ok_or_else(|| {
                HarvestError::Configuration(format!(
                    "no API key found: set {} or google_places_api_key in {}",
                    API_KEY_ENV, DEFAULT_CONFIG_FILE
                ))
            })
    }

    fn pacing_for(&self, delay_ms: u64) -> PacingStrategy {
        let delay = Duration::from_millis(delay_ms);
        match self.pacing {
            PacingMode::None => PacingStrategy::None,
            PacingMode::Fixed => PacingStrategy::Fixed(delay),
            PacingMode::Exponential => PacingStrategy::Exponential {
                base: delay,
                max: Duration::from_millis(self.max_backoff_ms),
            },
        }
    }

    pub fn search_limiter(&self) -> RateLimiter {
        RateLimiter::new(self.pacing_for(self.search_delay_ms))
    }

    pub fn detail_limiter(&self) -> RateLimiter {
        RateLimiter::new(self.pacing_for(self.detail_delay_ms))
    }

    /// Pacing between places in a browser run
    pub fn browser_limiter(&self) -> RateLimiter {
        RateLimiter::new(self.pacing_for(self.browser.between_places_ms))
    }

    pub fn retry_backoff(&self) -> PacingStrategy {
        PacingStrategy::Exponential {
            base: Duration::from_secs(1),
            max: Duration::from_millis(self.max_backoff_ms),
        }
    }

    pub fn locators(&self) -> Result<LocatorTable> {
        match &self.locator_table {
            Some(path) => LocatorTable::from_file(path),
            None => LocatorTable::embedded(),
        }
    }

    pub fn browser_settings(&self) -> BrowserSettings {
        BrowserSettings {
            headless: self.browser.headless,
            ready_timeout: Duration::from_secs(self.browser.ready_timeout_secs),
            load_more: LoadMoreSettings {
                target: self.browser.max_reviews,
                max_attempts: self.browser.max_scroll_attempts,
                pause: Duration::from_millis(self.browser.scroll_pause_ms),
            },
            ..BrowserSettings::default()
        }
    }
}
