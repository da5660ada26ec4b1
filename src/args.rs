use clap::Parser;
use site_walker::WalkerConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "site-walker")]
#[command(about = "Walks an organization's website, revealing hidden content as it goes")]
#[command(version)]
pub struct Args {
    /// Start URL of the walk
    pub url: String,

    /// JSON configuration file; command-line flags override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum number of actions (visits plus executed follow-ups)
    #[arg(long)]
    pub max_actions: Option<u64>,

    /// Wall-clock budget in seconds
    #[arg(long)]
    pub time_budget: Option<u64>,

    /// Steps in the plateau window
    #[arg(long)]
    pub plateau_window: Option<usize>,

    /// Minimum new-links-per-action ratio inside the window
    #[arg(long)]
    pub min_new_ratio: Option<f64>,

    /// Follow links to any domain
    #[arg(long)]
    pub allow_external: bool,

    /// Extra domain to follow (repeatable)
    #[arg(long = "allow-domain")]
    pub allow_domains: Vec<String>,

    /// Preferred page language, most preferred first (repeatable)
    #[arg(long = "language")]
    pub languages: Vec<String>,

    /// WebDriver endpoint (WEBDRIVER_URL takes precedence)
    #[arg(long)]
    pub webdriver_url: Option<String>,

    /// Directory for organizations.json and projects.json
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Directory for per-page HTML, markdown and screenshots
    #[arg(long)]
    pub artifacts_dir: Option<PathBuf>,

    /// Extra URL queued after the start URL (repeatable)
    #[arg(long = "seed")]
    pub seeds: Vec<String>,

    /// Write the walk result here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl Args {
    /// Apply command-line overrides on top of a loaded configuration
    pub fn apply(&self, config: &mut WalkerConfig) {
        config.plan.start_url = self.url.clone();

        let stop = &mut config.plan.stop;
        if let Some(max_actions) = self.max_actions {
            stop.hard.max_actions = max_actions;
        }
        if let Some(time_budget) = self.time_budget {
            stop.hard.time_budget_secs = time_budget;
        }
        if let Some(window) = self.plateau_window {
            stop.soft.plateau_window = window;
        }
        if let Some(ratio) = self.min_new_ratio {
            stop.soft.min_new_ratio = ratio;
        }

        if self.allow_external {
            config.plan.same_domain_only = false;
        }
        config
            .plan
            .domain_allowlist
            .extend(self.allow_domains.iter().cloned());
        if !self.languages.is_empty() {
            config.plan.preferred_languages = self.languages.clone();
        }
        if let Some(url) = &self.webdriver_url {
            config.webdriver_url = url.clone();
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.artifacts_dir {
            config.artifacts_dir = Some(dir.clone());
        }
    }
}
