//! Narrow capability interface over a live browser page.
//!
//! The reveal engine, snapshot builder and orchestrator only talk to a page
//! through [`PageAutomation`]. The WebDriver binding lives in [`webdriver`];
//! any other automation backend can implement the same trait.

pub mod popup;
pub mod scripts;
pub mod webdriver;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Errors from a single page operation; always recoverable by the caller
#[derive(Debug, Clone, Error)]
pub enum PageError {
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("command failed: {0}")]
    Command(String),

    #[error("script failed: {0}")]
    Script(String),

    #[error("browser session lost: {0}")]
    SessionLost(String),
}

impl PageError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, PageError::Timeout(_))
    }
}

/// Readiness level to wait for after navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// DOM parsed (`interactive` or `complete`)
    DomReady,
    /// Load complete and no new network resources for a short quiet period
    NetworkIdle,
}

/// Which elements a text click may target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickScope {
    /// Tab, button and link roles plus plain text elements
    Interactive,
    /// Like `Interactive`, but skips links that would navigate away
    Controls,
    /// Links only
    Links,
    /// Any text element inside the given frame
    Frame(FrameId),
}

/// Index of a non-main frame in document order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub usize);

/// What to scroll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollTarget {
    /// One step of the top-level window towards the bottom
    Window,
    /// Every element with a real vertical overflow, each to its bottom
    Overflowing { max_containers: usize, steps: usize },
    /// The window of a child frame
    Frame(FrameId),
}

/// Bounds for one click operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickOptions {
    /// Maximum elements clicked
    pub limit: usize,
    /// Timeout for each individual click
    pub timeout: Duration,
    /// Pause after each successful click
    pub settle: Duration,
}

/// Operations the walker needs from a loaded page
///
/// Scripts follow the WebDriver convention: the source is a function body,
/// arguments are available as `arguments[i]`, and a returned promise is
/// awaited.
#[async_trait]
pub trait PageAutomation: Send + Sync {
    /// Navigate and wait for `until`; a timeout is reported as `PageError::Timeout`
    async fn goto(&self, url: &str, until: LoadState, timeout: Duration) -> Result<(), PageError>;

    /// Wait for the current document to reach `until`
    async fn wait_for_load(&self, until: LoadState, timeout: Duration) -> Result<(), PageError>;

    /// Click up to `limit` elements matching a CSS selector; returns clicks made
    async fn click_selector(&self, selector: &str, options: ClickOptions)
    -> Result<usize, PageError>;

    /// Click up to `limit` elements whose accessible name matches `pattern`
    async fn click_text(
        &self,
        pattern: &Regex,
        scope: ClickScope,
        options: ClickOptions,
    ) -> Result<usize, PageError>;

    async fn evaluate(&self, script: &str, args: Vec<Value>) -> Result<Value, PageError>;

    /// Returns the number of scroll steps performed
    async fn scroll(&self, target: ScrollTarget) -> Result<usize, PageError>;

    async fn press_escape(&self) -> Result<(), PageError>;

    async fn wait_for_timeout(&self, duration: Duration);

    /// Child frames of the current document
    async fn frames(&self) -> Result<Vec<FrameId>, PageError>;

    /// Rendered HTML of the current document
    async fn content(&self) -> Result<String, PageError>;

    /// URL of the document currently shown, after redirects or in-page navigation
    async fn current_url(&self) -> Result<String, PageError>;

    /// PNG of the whole document when `full_page`, else of the viewport
    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, PageError>;
}
