use crate::config::WalkerConfig;
use crate::crawlers::{CrawlOrchestrator, WalkError};
use crate::page::popup::PopupGuard;
use crate::page::webdriver::WebDriverPage;
use crate::results::WalkState;
use fantoccini::{Client, ClientBuilder};
use std::sync::Arc;

/// Common WebDriver endpoints tried after the configured one
const FALLBACK_WEBDRIVER_URLS: [&str; 4] = [
    "http://localhost:9515", // ChromeDriver default
    "http://localhost:4723", // Appium default
    "http://localhost:9222", // Chrome debug port default
    "http://127.0.0.1:4444", // Try with IP instead of localhost
];

/// Runs one walk against a fresh WebDriver session.
///
/// The session is closed on every exit path once it has been acquired.
pub async fn walk(
    config: &WalkerConfig,
    mut orchestrator: CrawlOrchestrator,
) -> Result<WalkState, WalkError> {
    ::log::info!("Starting site walk for: {}", config.plan.start_url);

    let client = connect_to_webdriver(&config.webdriver_url)
        .await
        .ok_or_else(|| {
            WalkError::Session(format!(
                "could not connect to {} or any fallback endpoint",
                config.webdriver_url
            ))
        })?;

    let result = drive(client.clone(), config, &mut orchestrator).await;

    if let Err(e) = client.close().await {
        ::log::warn!("Failed to close WebDriver session: {}", e);
    }

    result
}

async fn drive(
    client: Client,
    config: &WalkerConfig,
    orchestrator: &mut CrawlOrchestrator,
) -> Result<WalkState, WalkError> {
    let page = WebDriverPage::new(client)
        .await
        .map_err(|e| WalkError::Session(e.to_string()))?;

    let opened = page
        .watch_windows(config.reveal.popup_poll_interval())
        .await;
    let guard = PopupGuard::spawn(
        page.primary_window(),
        opened,
        Arc::new(page.clone()),
        config.reveal.popup_close_delay(),
    );

    let mut state = orchestrator.run(&page).await;

    state.popups_closed = guard.shutdown();
    if state.popups_closed > 0 {
        ::log::info!("Closed {} popup window(s)", state.popups_closed);
    }

    Ok(state)
}

/// Connects to the WebDriver instance, trying common endpoints on failure
async fn connect_to_webdriver(webdriver_url: &str) -> Option<Client> {
    match ClientBuilder::native().connect(webdriver_url).await {
        Ok(client) => {
            ::log::debug!("Connected to WebDriver at {}", webdriver_url);
            return Some(client);
        }
        Err(e) => {
            ::log::error!(
                "Failed to connect to WebDriver at {}: {}",
                webdriver_url,
                e
            );
        }
    }

    for url in FALLBACK_WEBDRIVER_URLS {
        if url == webdriver_url {
            continue;
        }

        ::log::info!("Trying fallback WebDriver URL: {}", url);
        if let Ok(client) = ClientBuilder::native().connect(url).await {
            ::log::debug!("Connected to fallback WebDriver at {}", url);
            return Some(client);
        }
    }

    ::log::error!(
        "Make sure a WebDriver server is running or set the WEBDRIVER_URL environment variable"
    );
    None
}
