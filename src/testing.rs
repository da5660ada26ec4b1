//! Scripted fakes shared by the unit and scenario tests.

use crate::config::Plan;
use crate::page::{
    ClickOptions, ClickScope, FrameId, LoadState, PageAutomation, PageError, ScrollTarget,
};
use crate::parsers::{ExtractError, PageMetadata, SignalExtractor};
use crate::reflect::{ReflectError, ReflectOutput, Reflector};
use crate::results::{Anchor, Snapshot};
use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// How a scripted navigation behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavOutcome {
    Ok,
    /// Network idle never arrives, DOM-ready does
    IdleTimeout,
    /// Neither load state arrives
    Stalled,
    /// Navigation errors outright
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Working,
    Failing,
    Hanging,
}

/// Responses returned in order; the last one repeats forever
#[derive(Debug, Default)]
struct Script<T> {
    responses: HashMap<String, VecDeque<T>>,
}

impl<T: Clone> Script<T> {
    fn push(&mut self, key: &str, values: &[T]) {
        self.responses
            .entry(key.to_string())
            .or_default()
            .extend(values.iter().cloned());
    }

    fn next(&mut self, key: &str) -> Option<T> {
        let queue = self.responses.get_mut(key)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[derive(Debug, Default)]
struct PageState {
    current_url: String,
    html: HashMap<String, String>,
    nav: HashMap<String, NavOutcome>,
    gotos: Vec<String>,
    click_text: Script<usize>,
    click_selector: Script<usize>,
    evaluate: Script<Value>,
    clicked_selectors: Vec<String>,
    frames: Vec<FrameId>,
    scrolls: usize,
    redirects: HashMap<String, String>,
    full_page_fails: bool,
    screenshots: Vec<bool>,
}

/// In-memory `PageAutomation` with scripted responses
pub struct FakePage {
    mode: Mode,
    state: Mutex<PageState>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::with_mode(Mode::Working)
    }

    /// Every operation fails
    pub fn failing() -> Self {
        Self::with_mode(Mode::Failing)
    }

    /// Every operation except `wait_for_timeout` never completes
    pub fn hanging() -> Self {
        Self::with_mode(Mode::Hanging)
    }

    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            state: Mutex::new(PageState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, PageState> {
        self.state.lock().unwrap()
    }

    pub fn respond_click_text(&self, pattern: &Regex, counts: &[usize]) {
        self.state().click_text.push(pattern.as_str(), counts);
    }

    pub fn respond_click_selector(&self, selector: &str, counts: &[usize]) {
        self.state().click_selector.push(selector, counts);
    }

    pub fn respond_evaluate(&self, script: &str, values: &[Value]) {
        self.state().evaluate.push(script, values);
    }

    pub fn set_frames(&self, frames: Vec<FrameId>) {
        self.state().frames = frames;
    }

    pub fn set_html(&self, url: &str, html: &str) {
        self.state().html.insert(url.to_string(), html.to_string());
    }

    pub fn set_nav(&self, url: &str, outcome: NavOutcome) {
        self.state().nav.insert(url.to_string(), outcome);
    }

    /// Navigating to `from` lands on `to`
    pub fn set_redirect(&self, from: &str, to: &str) {
        self.state()
            .redirects
            .insert(from.to_string(), to.to_string());
    }

    /// Full-page screenshots fail, viewport ones still work
    pub fn fail_full_page_screenshots(&self) {
        self.state().full_page_fails = true;
    }

    /// `full_page` flag of every screenshot request, in order
    pub fn screenshots(&self) -> Vec<bool> {
        self.state().screenshots.clone()
    }

    /// Pretend the page already shows `url`
    pub fn navigate_to(&self, url: &str) {
        self.state().current_url = url.to_string();
    }

    pub fn gotos(&self) -> Vec<String> {
        self.state().gotos.clone()
    }

    pub fn clicked_selectors(&self) -> Vec<String> {
        self.state().clicked_selectors.clone()
    }

    pub fn window_scrolls(&self) -> usize {
        self.state().scrolls
    }

    async fn gate(&self, op: &str) -> Result<(), PageError> {
        match self.mode {
            Mode::Working => Ok(()),
            Mode::Failing => Err(PageError::Script(format!("{} failed", op))),
            Mode::Hanging => std::future::pending().await,
        }
    }
}

#[async_trait]
impl PageAutomation for FakePage {
    async fn goto(&self, url: &str, _until: LoadState, _timeout: Duration) -> Result<(), PageError> {
        self.gate("goto").await?;
        let mut state = self.state();
        state.gotos.push(url.to_string());
        let outcome = state.nav.get(url).copied().unwrap_or(NavOutcome::Ok);
        if outcome != NavOutcome::Fail {
            let landed = state.redirects.get(url).cloned();
            state.current_url = landed.unwrap_or_else(|| url.to_string());
        }
        match outcome {
            NavOutcome::Ok => Ok(()),
            NavOutcome::IdleTimeout | NavOutcome::Stalled => {
                Err(PageError::Timeout(format!("waiting for {}", url)))
            }
            NavOutcome::Fail => Err(PageError::Command(format!("cannot reach {}", url))),
        }
    }

    async fn wait_for_load(&self, until: LoadState, _timeout: Duration) -> Result<(), PageError> {
        self.gate("wait_for_load").await?;
        let state = self.state();
        let outcome = state
            .nav
            .get(&state.current_url)
            .copied()
            .unwrap_or(NavOutcome::Ok);
        match (outcome, until) {
            (NavOutcome::Stalled, _) | (NavOutcome::IdleTimeout, LoadState::NetworkIdle) => {
                Err(PageError::Timeout("load state".to_string()))
            }
            _ => Ok(()),
        }
    }

    async fn click_selector(
        &self,
        selector: &str,
        options: ClickOptions,
    ) -> Result<usize, PageError> {
        self.gate("click_selector").await?;
        let mut state = self.state();
        state.clicked_selectors.push(selector.to_string());
        Ok(state.click_selector.next(selector).unwrap_or(0).min(options.limit))
    }

    async fn click_text(
        &self,
        pattern: &Regex,
        _scope: ClickScope,
        options: ClickOptions,
    ) -> Result<usize, PageError> {
        self.gate("click_text").await?;
        let mut state = self.state();
        Ok(state
            .click_text
            .next(pattern.as_str())
            .unwrap_or(0)
            .min(options.limit))
    }

    async fn evaluate(&self, script: &str, _args: Vec<Value>) -> Result<Value, PageError> {
        self.gate("evaluate").await?;
        Ok(self.state().evaluate.next(script).unwrap_or(Value::Null))
    }

    async fn scroll(&self, target: ScrollTarget) -> Result<usize, PageError> {
        self.gate("scroll").await?;
        match target {
            ScrollTarget::Window => {
                self.state().scrolls += 1;
                Ok(1)
            }
            ScrollTarget::Overflowing { .. } => Ok(0),
            ScrollTarget::Frame(_) => Ok(1),
        }
    }

    async fn press_escape(&self) -> Result<(), PageError> {
        self.gate("press_escape").await
    }

    async fn wait_for_timeout(&self, _duration: Duration) {}

    async fn frames(&self) -> Result<Vec<FrameId>, PageError> {
        self.gate("frames").await?;
        Ok(self.state().frames.clone())
    }

    async fn content(&self) -> Result<String, PageError> {
        self.gate("content").await?;
        let state = self.state();
        Ok(state
            .html
            .get(&state.current_url)
            .cloned()
            .unwrap_or_else(|| "<html><head></head><body></body></html>".to_string()))
    }

    async fn current_url(&self) -> Result<String, PageError> {
        self.gate("current_url").await?;
        Ok(self.state().current_url.clone())
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, PageError> {
        self.gate("screenshot").await?;
        let mut state = self.state();
        state.screenshots.push(full_page);
        if full_page && state.full_page_fails {
            return Err(PageError::Command("full-page capture unsupported".to_string()));
        }
        Ok(b"\x89PNG fake".to_vec())
    }
}

type ReflectFn = dyn Fn(&Snapshot) -> Result<ReflectOutput, ReflectError> + Send + Sync;

/// Reflector answering from a closure over the first snapshot
pub struct FnReflector {
    respond: Box<ReflectFn>,
    seen: Mutex<Vec<String>>,
}

impl FnReflector {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&Snapshot) -> Result<ReflectOutput, ReflectError> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// URLs of the snapshots reflected on, in order
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Reflector for FnReflector {
    async fn reflect(
        &self,
        _plan: &Plan,
        snapshots: &[Snapshot],
    ) -> Result<ReflectOutput, ReflectError> {
        let snapshot = snapshots
            .first()
            .ok_or_else(|| ReflectError::Malformed("no snapshots".to_string()))?;
        self.seen.lock().unwrap().push(snapshot.url.clone());
        (self.respond)(snapshot)
    }
}

/// Extractor whose every extraction fails
pub struct FailingExtractor;

impl SignalExtractor for FailingExtractor {
    fn to_markdown(&self, _html: &str) -> Result<String, ExtractError> {
        Err(ExtractError::Selector("markdown".to_string()))
    }

    fn extract_metadata(&self, _html: &str, _url: &str) -> Result<PageMetadata, ExtractError> {
        Err(ExtractError::Selector("metadata".to_string()))
    }

    fn extract_json_ld(
        &self,
        _html: &str,
        _url: &str,
    ) -> Result<Vec<Map<String, Value>>, ExtractError> {
        Err(ExtractError::Selector("json-ld".to_string()))
    }

    fn extract_anchors(
        &self,
        _html: &str,
        _base_url: &str,
        _limit: usize,
    ) -> Result<Vec<Anchor>, ExtractError> {
        Err(ExtractError::Selector("anchors".to_string()))
    }
}
