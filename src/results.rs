use crate::metrics::{Metrics, StopReason};
use crate::reflect::Action;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Hard ceiling on the HTML carried by a snapshot, in characters
pub const HTML_CHAR_LIMIT: usize = 120_000;

/// Maximum JSON-LD objects kept per snapshot
pub const JSON_LD_LIMIT: usize = 50;

/// Maximum anchors kept per snapshot
pub const ANCHOR_LIMIT: usize = 200;

/// A link found on a page, already resolved to an absolute URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub text: Option<String>,
    pub href: String,
}

/// Normalized, size-bounded capture of one visited page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub url: String,
    pub title: Option<String>,
    pub site_name: Option<String>,
    pub meta_description: Option<String>,
    pub markdown: String,
    pub html_truncated: String,
    pub json_ld_objects: Vec<serde_json::Map<String, serde_json::Value>>,
    pub anchors: Vec<Anchor>,

    /// Hex SHA-256 of the full captured HTML, before truncation
    #[serde(default)]
    pub content_hash: String,
}

/// Files written for one visited page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageArtifacts {
    pub url: String,
    pub content_hash: String,
    pub html: Option<PathBuf>,
    pub markdown: Option<PathBuf>,
    pub screenshot: Option<PathBuf>,
}

/// Result of a walk, produced once at loop exit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkState {
    /// Pages navigated to, in visit order
    pub visited: Vec<String>,

    /// URLs still queued when the walk ended
    pub frontier: Vec<String>,

    pub metrics: Metrics,

    pub stop_reason: StopReason,

    /// URLs whose navigation failed outright
    #[serde(default)]
    pub failed: Vec<String>,

    /// Reflector actions that were recorded but not executed
    #[serde(default)]
    pub deferred_actions: Vec<Action>,

    /// Popup windows closed by the popup guard
    #[serde(default)]
    pub popups_closed: usize,

    /// Per-page files, when an artifacts directory is configured
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<PageArtifacts>,
}
