use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid stop configuration: {0}")]
    InvalidStop(String),

    #[error("invalid start URL: {0}")]
    InvalidUrl(String),
}

/// Hard caps; either one ends the walk immediately
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HardBudget {
    /// Maximum number of actions (visits plus executed follow-up actions)
    #[serde(default = "default_max_actions")]
    pub max_actions: u64,

    /// Wall-clock budget for the whole walk, in seconds
    #[serde(default = "default_time_budget_secs")]
    pub time_budget_secs: u64,
}

/// Plateau detection over a trailing window of steps
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoftBudget {
    /// Number of steps in the trailing window
    #[serde(default = "default_plateau_window")]
    pub plateau_window: usize,

    /// Minimum ratio of newly discovered links to actions inside the window
    #[serde(default = "default_min_new_ratio")]
    pub min_new_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopConfig {
    #[serde(default)]
    pub hard: HardBudget,

    #[serde(default)]
    pub soft: SoftBudget,
}

impl Default for HardBudget {
    fn default() -> Self {
        Self {
            max_actions: default_max_actions(),
            time_budget_secs: default_time_budget_secs(),
        }
    }
}

impl Default for SoftBudget {
    fn default() -> Self {
        Self {
            plateau_window: default_plateau_window(),
            min_new_ratio: default_min_new_ratio(),
        }
    }
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            hard: HardBudget::default(),
            soft: SoftBudget::default(),
        }
    }
}

impl StopConfig {
    /// Checks `plateau_window >= 1` and `0 <= min_new_ratio <= 1`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.soft.plateau_window < 1 {
            return Err(ConfigError::InvalidStop(
                "plateau_window must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.soft.min_new_ratio) {
            return Err(ConfigError::InvalidStop(format!(
                "min_new_ratio must be within [0, 1], got {}",
                self.soft.min_new_ratio
            )));
        }
        Ok(())
    }

    pub fn time_budget(&self) -> Duration {
        Duration::from_secs(self.hard.time_budget_secs)
    }
}

/// Immutable per-run walk plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// URL the walk starts from; also anchors the same-site check
    #[serde(default)]
    pub start_url: String,

    /// Restrict the frontier to the start site (plus the allowlist)
    #[serde(default = "default_same_domain_only")]
    pub same_domain_only: bool,

    /// Extra hosts accepted when `same_domain_only` is set
    #[serde(default)]
    pub domain_allowlist: BTreeSet<String>,

    /// Language codes to switch to, most preferred first
    #[serde(default = "default_preferred_languages")]
    pub preferred_languages: Vec<String>,

    #[serde(default)]
    pub stop: StopConfig,
}

impl Plan {
    pub fn new(start_url: &str) -> Self {
        Self {
            start_url: start_url.to_string(),
            same_domain_only: default_same_domain_only(),
            domain_allowlist: BTreeSet::new(),
            preferred_languages: default_preferred_languages(),
            stop: StopConfig::default(),
        }
    }

    /// Validates the start URL and stop budgets
    pub fn validate(&self) -> Result<(), ConfigError> {
        match Url::parse(&self.start_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(ConfigError::InvalidUrl(format!(
                    "unsupported scheme '{}' in {}",
                    url.scheme(),
                    self.start_url
                )));
            }
            Err(e) => {
                return Err(ConfigError::InvalidUrl(format!("{}: {}", self.start_url, e)));
            }
        }
        self.stop.validate()
    }
}

impl Default for Plan {
    fn default() -> Self {
        Self::new("")
    }
}

/// Tuning for the reveal sequence; durations are in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevealConfig {
    /// Whole-page scroll steps in the first sweep (halved, min 2, in the second)
    #[serde(default = "default_scroll_steps")]
    pub scroll_steps: usize,

    /// Pause after each page scroll step
    #[serde(default = "default_scroll_pause_ms")]
    pub scroll_pause_ms: u64,

    /// Timeout for a single click
    #[serde(default = "default_click_timeout_ms")]
    pub click_timeout_ms: u64,

    /// Pause after each successful click
    #[serde(default = "default_click_settle_ms")]
    pub click_settle_ms: u64,

    /// Upper bound for any single reveal sub-step
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,

    /// Best-effort network idle wait
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Text growth (characters) that triggers the second sweep
    #[serde(default = "default_growth_threshold")]
    pub growth_threshold: usize,

    #[serde(default = "default_cookie_clicks")]
    pub cookie_clicks: usize,

    #[serde(default = "default_tab_clicks")]
    pub tab_clicks: usize,

    #[serde(default = "default_expander_limit")]
    pub expander_limit: usize,

    #[serde(default = "default_load_more_rounds")]
    pub load_more_rounds: usize,

    #[serde(default = "default_load_more_per_round")]
    pub load_more_per_round: usize,

    #[serde(default = "default_popup_passes")]
    pub popup_passes: usize,

    #[serde(default = "default_popup_per_pass")]
    pub popup_per_pass: usize,

    /// Overlay nodes removed when dismissal finds nothing to close
    #[serde(default = "default_overlay_removals")]
    pub overlay_removals: usize,

    #[serde(default = "default_max_scroll_containers")]
    pub max_scroll_containers: usize,

    #[serde(default = "default_container_scroll_steps")]
    pub container_scroll_steps: usize,

    #[serde(default = "default_carousel_clicks")]
    pub carousel_clicks: usize,

    /// Delay before an opener popup is closed
    #[serde(default = "default_popup_close_delay_ms")]
    pub popup_close_delay_ms: u64,

    /// How often the WebDriver adapter polls for new windows
    #[serde(default = "default_popup_poll_interval_ms")]
    pub popup_poll_interval_ms: u64,
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            scroll_steps: default_scroll_steps(),
            scroll_pause_ms: default_scroll_pause_ms(),
            click_timeout_ms: default_click_timeout_ms(),
            click_settle_ms: default_click_settle_ms(),
            step_timeout_ms: default_step_timeout_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            growth_threshold: default_growth_threshold(),
            cookie_clicks: default_cookie_clicks(),
            tab_clicks: default_tab_clicks(),
            expander_limit: default_expander_limit(),
            load_more_rounds: default_load_more_rounds(),
            load_more_per_round: default_load_more_per_round(),
            popup_passes: default_popup_passes(),
            popup_per_pass: default_popup_per_pass(),
            overlay_removals: default_overlay_removals(),
            max_scroll_containers: default_max_scroll_containers(),
            container_scroll_steps: default_container_scroll_steps(),
            carousel_clicks: default_carousel_clicks(),
            popup_close_delay_ms: default_popup_close_delay_ms(),
            popup_poll_interval_ms: default_popup_poll_interval_ms(),
        }
    }
}

impl RevealConfig {
    pub fn scroll_pause(&self) -> Duration {
        Duration::from_millis(self.scroll_pause_ms)
    }

    pub fn click_timeout(&self) -> Duration {
        Duration::from_millis(self.click_timeout_ms)
    }

    pub fn click_settle(&self) -> Duration {
        Duration::from_millis(self.click_settle_ms)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn popup_close_delay(&self) -> Duration {
        Duration::from_millis(self.popup_close_delay_ms)
    }

    pub fn popup_poll_interval(&self) -> Duration {
        Duration::from_millis(self.popup_poll_interval_ms)
    }
}

/// Full configuration for one walk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkerConfig {
    /// Walk plan; a missing `start_url` is filled in by the caller
    #[serde(default)]
    pub plan: Plan,

    #[serde(default)]
    pub reveal: RevealConfig,

    /// URL for the WebDriver instance
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Navigation timeout per page
    #[serde(default = "default_nav_timeout_ms")]
    pub nav_timeout_ms: u64,

    /// Directory for organizations.json / projects.json; in-memory store when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Directory for per-page HTML, markdown and screenshots; nothing written when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts_dir: Option<PathBuf>,
}

impl WalkerConfig {
    /// Create a new configuration with default values
    pub fn new(start_url: &str) -> Self {
        Self {
            plan: Plan::new(start_url),
            reveal: RevealConfig::default(),
            webdriver_url: default_webdriver_url(),
            nav_timeout_ms: default_nav_timeout_ms(),
            data_dir: None,
            artifacts_dir: None,
        }
    }

    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Self::from_json(&contents)
    }

    /// Load configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config)
    }

    pub fn nav_timeout(&self) -> Duration {
        Duration::from_millis(self.nav_timeout_ms)
    }
}

fn default_max_actions() -> u64 {
    40
}

fn default_time_budget_secs() -> u64 {
    120
}

fn default_plateau_window() -> usize {
    4
}

fn default_min_new_ratio() -> f64 {
    0.15
}

fn default_same_domain_only() -> bool {
    true
}

fn default_preferred_languages() -> Vec<String> {
    vec!["uk".to_string(), "en".to_string()]
}

fn default_scroll_steps() -> usize {
    10
}

fn default_scroll_pause_ms() -> u64 {
    350
}

fn default_click_timeout_ms() -> u64 {
    1800
}

fn default_click_settle_ms() -> u64 {
    200
}

fn default_step_timeout_ms() -> u64 {
    20_000
}

fn default_idle_timeout_ms() -> u64 {
    5_000
}

fn default_growth_threshold() -> usize {
    2_000
}

fn default_cookie_clicks() -> usize {
    2
}

fn default_tab_clicks() -> usize {
    12
}

fn default_expander_limit() -> usize {
    50
}

fn default_load_more_rounds() -> usize {
    8
}

fn default_load_more_per_round() -> usize {
    6
}

fn default_popup_passes() -> usize {
    2
}

fn default_popup_per_pass() -> usize {
    10
}

fn default_overlay_removals() -> usize {
    6
}

fn default_max_scroll_containers() -> usize {
    40
}

fn default_container_scroll_steps() -> usize {
    5
}

fn default_carousel_clicks() -> usize {
    15
}

fn default_popup_close_delay_ms() -> u64 {
    50
}

fn default_popup_poll_interval_ms() -> u64 {
    250
}

/// Default value for webdriver_url
fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

fn default_nav_timeout_ms() -> u64 {
    35_000
}
