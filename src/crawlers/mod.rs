pub mod orchestrator;
pub mod web;


use crate::config::ConfigError;
use thiserror::Error;

pub use orchestrator::CrawlOrchestrator;

/// Fatal walk failures; everything else degrades inside the walk
#[derive(Debug, Error)]
pub enum WalkError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no WebDriver session available: {0}")]
    Session(String),
}
