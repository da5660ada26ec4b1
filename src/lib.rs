// Re-export modules
pub mod artifacts;
pub mod config;
pub mod crawlers;
pub mod filter;
pub mod metrics;
pub mod page;
pub mod parsers;
pub mod patterns;
pub mod reflect;
pub mod results;
pub mod reveal;
pub mod snapshot;
pub mod store;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types for convenience
pub use config::{ConfigError, Plan, RevealConfig, StopConfig, WalkerConfig};
pub use crawlers::{CrawlOrchestrator, WalkError};
pub use metrics::{Metrics, StopReason};
pub use reflect::{AnchorReflector, ReflectOutput, Reflector};
pub use results::{PageArtifacts, Snapshot, WalkState};
pub use reveal::{RevealCounters, RevealEngine};
pub use store::{JsonFileStore, MemoryStore, Store};

use parsers::{HtmlSignalExtractor, SignalExtractor};
use std::path::Path;
use std::sync::Arc;

/// Builder for one site walk
pub struct SiteWalk {
    config: WalkerConfig,
    reflector: Arc<dyn Reflector>,
    store: Option<Arc<dyn Store>>,
    extractor: Box<dyn SignalExtractor>,
    seeds: Vec<String>,
}

impl SiteWalk {
    /// Create a walk of `start_url` with default configuration
    pub fn new(start_url: &str) -> Self {
        Self {
            config: WalkerConfig::new(start_url),
            reflector: Arc::new(AnchorReflector),
            store: None,
            extractor: Box::new(HtmlSignalExtractor),
            seeds: Vec::new(),
        }
    }

    /// Replace the configuration; an empty `start_url` keeps the current one
    pub fn with_config(mut self, mut config: WalkerConfig) -> Self {
        if config.plan.start_url.is_empty() {
            config.plan.start_url = std::mem::take(&mut self.config.plan.start_url);
        }
        self.config = config;
        self
    }

    /// Load configuration from a file
    pub fn with_config_file(self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = WalkerConfig::from_file(path)?;
        Ok(self.with_config(config))
    }

    /// Load configuration from a string
    pub fn with_config_str(self, config_str: &str) -> Result<Self, ConfigError> {
        let config = WalkerConfig::from_json(config_str)?;
        Ok(self.with_config(config))
    }

    pub fn with_stop_config(mut self, stop: StopConfig) -> Self {
        self.config.plan.stop = stop;
        self
    }

    pub fn with_webdriver_url(mut self, url: &str) -> Self {
        self.config.webdriver_url = url.to_string();
        self
    }

    pub fn with_reflector(mut self, reflector: Arc<dyn Reflector>) -> Self {
        self.reflector = reflector;
        self
    }

    /// Store for upserted entities; defaults to the data directory, else memory
    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_extractor(mut self, extractor: Box<dyn SignalExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Extra URLs queued right after the start URL
    pub fn with_seeds(mut self, seeds: Vec<String>) -> Self {
        self.seeds = seeds;
        self
    }

    pub fn config(&self) -> &WalkerConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut WalkerConfig {
        &mut self.config
    }

    /// Run the walk and return its final state
    pub async fn walk(self) -> Result<WalkState, WalkError> {
        let mut config = self.config;

        // Override the WebDriver URL with an environment variable if provided
        if let Ok(webdriver_url) = std::env::var("WEBDRIVER_URL") {
            if !webdriver_url.is_empty() {
                config.webdriver_url = webdriver_url;
            }
        }

        let store = match self.store {
            Some(store) => store,
            None => default_store(&config),
        };

        let orchestrator = CrawlOrchestrator::new(&config, self.reflector, store, self.extractor)?
            .with_seeds(self.seeds);

        crawlers::web::walk(&config, orchestrator).await
    }
}

/// Walk `url` with default settings and optional stop budgets
pub async fn walk_site(url: &str, stop: Option<StopConfig>) -> Result<WalkState, WalkError> {
    let mut walk = SiteWalk::new(url);
    if let Some(stop) = stop {
        walk = walk.with_stop_config(stop);
    }
    walk.walk().await
}

fn default_store(config: &WalkerConfig) -> Arc<dyn Store> {
    let Some(dir) = &config.data_dir else {
        return Arc::new(MemoryStore::new());
    };
    match JsonFileStore::open(dir) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            ::log::warn!(
                "Cannot use data directory {}, keeping entities in memory: {}",
                dir.display(),
                e
            );
            Arc::new(MemoryStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_without_start_url_keeps_builder_url() {
        let walk = SiteWalk::new("https://org.example/")
            .with_config_str(r#"{"plan": {"stop": {"hard": {"max_actions": 3}}}}"#)
            .unwrap();

        assert_eq!(walk.config().plan.start_url, "https://org.example/");
        assert_eq!(walk.config().plan.stop.hard.max_actions, 3);
    }

    #[test]
    fn test_config_start_url_wins() {
        let walk = SiteWalk::new("https://org.example/")
            .with_config_str(r#"{"plan": {"start_url": "https://other.example/"}}"#)
            .unwrap();

        assert_eq!(walk.config().plan.start_url, "https://other.example/");
    }

    #[test]
    fn test_with_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("walker.json");
        std::fs::write(&path, r#"{"webdriver_url": "http://localhost:9515"}"#).unwrap();

        let walk = SiteWalk::new("https://org.example/")
            .with_config_file(&path)
            .unwrap();
        assert_eq!(walk.config().webdriver_url, "http://localhost:9515");

        assert!(matches!(
            SiteWalk::new("https://org.example/").with_config_file(dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_configuration_fails_before_connecting() {
        let mut stop = StopConfig::default();
        stop.soft.plateau_window = 0;

        let result = walk_site("https://org.example/", Some(stop)).await;
        assert!(matches!(result, Err(WalkError::Config(ConfigError::InvalidStop(_)))));

        let result = walk_site("not a url", None).await;
        assert!(matches!(result, Err(WalkError::Config(ConfigError::InvalidUrl(_)))));
    }

    #[test]
    fn test_default_store_falls_back_to_memory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, "x").unwrap();

        let mut config = WalkerConfig::new("https://org.example/");
        config.data_dir = Some(file);
        let store = default_store(&config);
        assert!(store.organizations().is_empty());
    }
}
