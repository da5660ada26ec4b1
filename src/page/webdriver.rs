//! `PageAutomation` over a WebDriver session (fantoccini).

use crate::page::popup::{PageOpened, WindowCloser, WindowId};
use crate::page::{
    ClickOptions, ClickScope, FrameId, LoadState, PageAutomation, PageError, ScrollTarget, scripts,
};
use async_trait::async_trait;
use fantoccini::error::CmdError;
use fantoccini::wd::WindowHandle;
use fantoccini::{Client, Locator};
use regex::Regex;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard, mpsc};
use tokio::time::timeout;

/// Candidates inspected per text click
const MAX_TEXT_CANDIDATES: usize = 400;

/// Quiet period without new resource entries that counts as network idle
const NETWORK_QUIET: Duration = Duration::from_millis(500);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Largest window edge used for a full-page screenshot, in pixels
const MAX_SCREENSHOT_EDGE: u64 = 16_384;

/// WebDriver "Escape" key code point
const ESCAPE_KEY: &str = "\u{e00c}";

/// Set while focus may be inside a frame
///
/// A frame command cancelled by a caller's timeout never reaches its
/// `leave_frame`; the next command sees the flag and returns to the top.
#[derive(Debug, Default, Clone)]
struct FrameFocus(Arc<AtomicBool>);

impl FrameFocus {
    fn entered(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn left(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Clears the flag, returning whether it was set
    fn take_stale(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// One WebDriver session driving a single primary window
///
/// Commands that depend on which window or frame has focus hold `focus`, so
/// the popup closer can switch windows without interleaving with the walk.
#[derive(Clone)]
pub struct WebDriverPage {
    client: Client,
    primary: WindowHandle,
    focus: Arc<Mutex<()>>,
    frame_focus: FrameFocus,
    own_tabs: Arc<std::sync::Mutex<HashSet<String>>>,
}

impl WebDriverPage {
    pub async fn new(client: Client) -> Result<Self, PageError> {
        let primary = client.window().await.map_err(map_cmd_error)?;
        Ok(Self {
            client,
            primary,
            focus: Arc::new(Mutex::new(())),
            frame_focus: FrameFocus::default(),
            own_tabs: Arc::new(std::sync::Mutex::new(HashSet::new())),
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn primary_window(&self) -> WindowId {
        WindowId(String::from(self.primary.clone()))
    }

    /// Open an extra tab without an opener; the popup guard leaves it alone
    pub async fn open_tab(&self) -> Result<WindowId, PageError> {
        let _focus = self.focused().await;
        let response = self.client.new_window(true).await.map_err(map_cmd_error)?;
        let id = String::from(response.handle);
        if let Ok(mut own) = self.own_tabs.lock() {
            own.insert(id.clone());
        }
        Ok(WindowId(id))
    }

    /// Poll window handles and report every window that appears after now
    ///
    /// WebDriver does not expose openers; any window not created through
    /// `open_tab` is reported as opened by the page. The watcher stops when the
    /// receiver is dropped or the session goes away.
    pub async fn watch_windows(&self, interval: Duration) -> mpsc::Receiver<PageOpened> {
        let (tx, rx) = mpsc::channel(32);
        let client = self.client.clone();
        let own_tabs = Arc::clone(&self.own_tabs);

        let mut known: HashSet<String> = match client.windows().await {
            Ok(handles) => handles.into_iter().map(String::from).collect(),
            Err(e) => {
                ::log::warn!("Could not list windows, popup watcher disabled: {}", e);
                return rx;
            }
        };

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let handles = match client.windows().await {
                    Ok(handles) => handles,
                    Err(e) => {
                        ::log::debug!("Window watcher stopping: {}", e);
                        break;
                    }
                };

                for handle in handles {
                    let id = String::from(handle);
                    if !known.insert(id.clone()) {
                        continue;
                    }
                    let has_opener = own_tabs.lock().map(|own| !own.contains(&id)).unwrap_or(true);
                    let event = PageOpened {
                        id: WindowId(id),
                        has_opener,
                    };
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
        });

        rx
    }

    /// Take the focus lock with the top-level document selected
    async fn focused(&self) -> MutexGuard<'_, ()> {
        let guard = self.focus.lock().await;
        if self.frame_focus.take_stale() {
            ::log::debug!("Returning to the top-level document after an interrupted frame step");
            if let Err(e) = self.client.enter_frame(None).await {
                ::log::debug!("Failed to return to the top-level document: {}", e);
                self.frame_focus.entered();
            }
        }
        guard
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, PageError> {
        self.client
            .execute(script, args)
            .await
            .map_err(map_script_error)
    }

    async fn click_each(
        &self,
        elements: Vec<fantoccini::elements::Element>,
        options: ClickOptions,
    ) -> usize {
        let mut clicked = 0;
        for element in elements {
            if clicked >= options.limit {
                break;
            }
            match timeout(options.timeout, element.click()).await {
                Ok(Ok(())) => {
                    clicked += 1;
                    tokio::time::sleep(options.settle).await;
                }
                Ok(Err(e)) => ::log::trace!("Click skipped: {}", e),
                Err(_) => ::log::trace!("Click timed out after {:?}", options.timeout),
            }
        }
        clicked
    }

    /// Mark candidates in the current frame and click those whose name matches
    async fn click_marked(
        &self,
        pattern: &Regex,
        scope: &str,
        options: ClickOptions,
    ) -> Result<usize, PageError> {
        let names = self
            .execute(
                scripts::MARK_TEXT_CANDIDATES,
                vec![json!(scope), json!(MAX_TEXT_CANDIDATES)],
            )
            .await?;

        let matching: Vec<usize> = names
            .as_array()
            .map(|names| {
                names
                    .iter()
                    .enumerate()
                    .filter(|(_, name)| name.as_str().is_some_and(|n| pattern.is_match(n)))
                    .map(|(i, _)| i)
                    .collect()
            })
            .unwrap_or_default();

        let mut clicked = 0;
        for index in matching {
            if clicked >= options.limit {
                break;
            }
            let selector = format!(r#"[data-site-walker-candidate="{}"]"#, index);
            // Earlier clicks may have re-rendered the node away
            let Ok(element) = self.client.find(Locator::Css(&selector)).await else {
                continue;
            };
            clicked += self
                .click_each(
                    vec![element],
                    ClickOptions {
                        limit: 1,
                        ..options
                    },
                )
                .await;
        }
        Ok(clicked)
    }

    async fn enter_frame(&self, frame: FrameId) -> Result<(), PageError> {
        let frames = self
            .client
            .find_all(Locator::Css("iframe, frame"))
            .await
            .map_err(map_cmd_error)?;
        let element = frames
            .get(frame.0)
            .ok_or_else(|| PageError::Command(format!("frame {} no longer exists", frame.0)))?;
        self.frame_focus.entered();
        element.enter_frame().await.map_err(map_cmd_error)
    }

    async fn leave_frame(&self) {
        match self.client.enter_parent_frame().await {
            Ok(()) => self.frame_focus.left(),
            Err(e) => ::log::debug!("Failed to return to parent frame: {}", e),
        }
    }

    async fn poll_load(&self, until: LoadState) -> Result<(), PageError> {
        let mut last_resources: Option<u64> = None;
        let mut quiet_since = Instant::now();

        loop {
            let state = self.execute(scripts::READY_STATE, vec![]).await?;
            let state = state.as_str().unwrap_or_default();

            match until {
                LoadState::DomReady if state == "interactive" || state == "complete" => {
                    return Ok(());
                }
                LoadState::NetworkIdle if state == "complete" => {
                    let count = self
                        .execute(scripts::RESOURCE_COUNT, vec![])
                        .await?
                        .as_u64()
                        .unwrap_or(0);
                    if last_resources != Some(count) {
                        last_resources = Some(count);
                        quiet_since = Instant::now();
                    } else if quiet_since.elapsed() >= NETWORK_QUIET {
                        return Ok(());
                    }
                }
                _ => {}
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl PageAutomation for WebDriverPage {
    async fn goto(&self, url: &str, until: LoadState, limit: Duration) -> Result<(), PageError> {
        let _focus = self.focused().await;
        let started = Instant::now();

        match timeout(limit, self.client.goto(url)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(map_cmd_error(e)),
            Err(_) => return Err(PageError::Timeout(format!("navigating to {}", url))),
        }

        let remaining = limit.saturating_sub(started.elapsed());
        match timeout(remaining, self.poll_load(until)).await {
            Ok(result) => result,
            Err(_) => Err(PageError::Timeout(format!("waiting for {:?} on {}", until, url))),
        }
    }

    async fn wait_for_load(&self, until: LoadState, limit: Duration) -> Result<(), PageError> {
        let _focus = self.focused().await;
        match timeout(limit, self.poll_load(until)).await {
            Ok(result) => result,
            Err(_) => Err(PageError::Timeout(format!("waiting for {:?}", until))),
        }
    }

    async fn click_selector(
        &self,
        selector: &str,
        options: ClickOptions,
    ) -> Result<usize, PageError> {
        let _focus = self.focused().await;
        let elements = self
            .client
            .find_all(Locator::Css(selector))
            .await
            .map_err(map_cmd_error)?;
        Ok(self.click_each(elements, options).await)
    }

    async fn click_text(
        &self,
        pattern: &Regex,
        scope: ClickScope,
        options: ClickOptions,
    ) -> Result<usize, PageError> {
        let _focus = self.focused().await;
        match scope {
            ClickScope::Interactive => self.click_marked(pattern, "interactive", options).await,
            ClickScope::Controls => self.click_marked(pattern, "controls", options).await,
            ClickScope::Links => self.click_marked(pattern, "links", options).await,
            ClickScope::Frame(frame) => {
                self.enter_frame(frame).await?;
                let result = self.click_marked(pattern, "any", options).await;
                self.leave_frame().await;
                result
            }
        }
    }

    async fn evaluate(&self, script: &str, args: Vec<Value>) -> Result<Value, PageError> {
        let _focus = self.focused().await;
        self.execute(script, args).await
    }

    async fn scroll(&self, target: ScrollTarget) -> Result<usize, PageError> {
        let _focus = self.focused().await;
        let value = match target {
            ScrollTarget::Window => self.execute(scripts::SCROLL_WINDOW, vec![]).await?,
            ScrollTarget::Overflowing {
                max_containers,
                steps,
            } => {
                self.execute(
                    scripts::SCROLL_OVERFLOWING,
                    vec![json!(steps), json!(max_containers)],
                )
                .await?
            }
            ScrollTarget::Frame(frame) => {
                self.enter_frame(frame).await?;
                let result = self.execute(scripts::SCROLL_WINDOW, vec![]).await;
                self.leave_frame().await;
                result?
            }
        };
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    async fn press_escape(&self) -> Result<(), PageError> {
        let _focus = self.focused().await;
        let sent = match self.client.active_element().await {
            Ok(element) => element.send_keys(ESCAPE_KEY).await.is_ok(),
            Err(_) => false,
        };
        if !sent {
            self.execute(scripts::DISPATCH_ESCAPE, vec![]).await?;
        }
        Ok(())
    }

    async fn wait_for_timeout(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn frames(&self) -> Result<Vec<FrameId>, PageError> {
        let _focus = self.focused().await;
        let frames = self
            .client
            .find_all(Locator::Css("iframe, frame"))
            .await
            .map_err(map_cmd_error)?;
        Ok((0..frames.len()).map(FrameId).collect())
    }

    async fn content(&self) -> Result<String, PageError> {
        let _focus = self.focused().await;
        self.client.source().await.map_err(map_cmd_error)
    }

    async fn current_url(&self) -> Result<String, PageError> {
        let _focus = self.focused().await;
        let url = self.client.current_url().await.map_err(map_cmd_error)?;
        Ok(url.to_string())
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, PageError> {
        let _focus = self.focused().await;
        if !full_page {
            return self.client.screenshot().await.map_err(map_cmd_error);
        }

        // WebDriver only captures the viewport; grow the window to the document
        let (width, height) = self.client.get_window_size().await.map_err(map_cmd_error)?;
        let size = self.execute(scripts::DOCUMENT_SIZE, vec![]).await?;
        let edge = |i: usize, current: u64| {
            let wanted = size.get(i).and_then(Value::as_u64).unwrap_or(current);
            wanted.max(current).min(MAX_SCREENSHOT_EDGE) as u32
        };
        self.client
            .set_window_size(edge(0, width), edge(1, height))
            .await
            .map_err(map_cmd_error)?;

        let shot = self.client.screenshot().await.map_err(map_cmd_error);

        let restore = (
            u32::try_from(width).unwrap_or(u32::MAX),
            u32::try_from(height).unwrap_or(u32::MAX),
        );
        if let Err(e) = self.client.set_window_size(restore.0, restore.1).await {
            ::log::debug!("Failed to restore window size: {}", e);
        }
        shot
    }
}

#[async_trait]
impl WindowCloser for WebDriverPage {
    async fn close_window(&self, id: &WindowId) -> Result<(), PageError> {
        let handle = WindowHandle::try_from(id.0.clone())
            .map_err(|_| PageError::Command(format!("invalid window handle {}", id.0)))?;
        if handle == self.primary {
            return Ok(());
        }

        let _focus = self.focused().await;
        self.client
            .switch_to_window(handle)
            .await
            .map_err(map_cmd_error)?;
        let closed = self.client.close_window().await.map_err(map_cmd_error);
        let restored = self
            .client
            .switch_to_window(self.primary.clone())
            .await
            .map_err(map_cmd_error);
        closed.and(restored)
    }
}

/// Classify a WebDriver command error
fn map_cmd_error(error: CmdError) -> PageError {
    let message = error.to_string();
    let lower = message.to_lowercase();
    if message.contains("Unable to find session") || lower.contains("invalid session id") {
        PageError::SessionLost(message)
    } else if lower.contains("timeout") || lower.contains("timed out") {
        PageError::Timeout(message)
    } else {
        PageError::Command(message)
    }
}

fn map_script_error(error: CmdError) -> PageError {
    match map_cmd_error(error) {
        PageError::Command(message) => PageError::Script(message),
        other => other,
    }
}
