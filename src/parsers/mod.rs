pub mod html;

#[cfg(test)]
mod tests;

use crate::results::Anchor;
use serde_json::{Map, Value};
use thiserror::Error;

pub use html::HtmlSignalExtractor;

/// Errors from a single extraction; the affected snapshot field degrades to empty
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid selector: {0}")]
    Selector(String),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Page-level metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub site_name: Option<String>,
    pub meta_description: Option<String>,
}

/// Turns rendered HTML into the signals a snapshot carries
pub trait SignalExtractor: Send + Sync {
    fn to_markdown(&self, html: &str) -> Result<String, ExtractError>;

    fn extract_metadata(&self, html: &str, url: &str) -> Result<PageMetadata, ExtractError>;

    /// JSON-LD objects embedded in the page, arrays flattened
    fn extract_json_ld(&self, html: &str, url: &str)
    -> Result<Vec<Map<String, Value>>, ExtractError>;

    /// Absolute, deduplicated links, at most `limit`
    fn extract_anchors(
        &self,
        html: &str,
        base_url: &str,
        limit: usize,
    ) -> Result<Vec<Anchor>, ExtractError>;
}
