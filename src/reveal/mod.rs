//! Content reveal: drives a loaded page through an ordered set of heuristic
//! interactions so that hidden, collapsed and lazily loaded content is
//! rendered before the page is captured.
//!
//! Every interaction goes through [`RevealEngine::try_step`]; a failing or
//! hanging interaction only ever counts as zero.

use crate::config::RevealConfig;
use crate::page::{
    ClickOptions, ClickScope, LoadState, PageAutomation, PageError, ScrollTarget, scripts,
};
use crate::patterns::{
    ACCORDION_SELECTORS, CAROUSEL_NEXT_SELECTORS, CLOSE_SELECTORS, OVERLAY_SELECTORS,
    PatternTables,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::future::Future;
use std::time::Duration;

/// Pause after expanders were opened
const EXPANDER_PAUSE: Duration = Duration::from_millis(300);

/// Pause after each productive load-more round
const LOAD_MORE_PAUSE: Duration = Duration::from_millis(500);

/// Pause after scrolling a frame, before clicking inside it
const FRAME_PAUSE: Duration = Duration::from_millis(200);

/// "More" clicks per frame
const FRAME_CLICKS: usize = 3;

/// What one reveal did to the page; observability only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealCounters {
    pub language_switched: bool,
    pub cookies_accepted: usize,
    pub popups_closed: usize,
    pub overlays_removed: usize,
    pub tabs_clicked: usize,
    pub expanders_opened: usize,
    pub details_opened: usize,
    pub expand_clicks: usize,
    pub overflow_scrolls: usize,
    pub scroll_steps: usize,
    pub carousel_clicks: usize,
    pub iframe_clicks: usize,
    /// Rendered text growth (characters) between the baseline and the end
    pub text_growth: usize,
}

/// Budgets for one structural sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Sweep {
    load_more_rounds: usize,
    load_more_per_round: usize,
    scroll_steps: usize,
    carousel_clicks: usize,
    tab_clicks: usize,
    popup_passes: usize,
    popup_per_pass: usize,
    overlay_removals: usize,
}

impl Sweep {
    fn first(config: &RevealConfig) -> Self {
        Self {
            load_more_rounds: config.load_more_rounds,
            load_more_per_round: config.load_more_per_round,
            scroll_steps: config.scroll_steps,
            carousel_clicks: config.carousel_clicks,
            tab_clicks: config.tab_clicks,
            popup_passes: config.popup_passes,
            popup_per_pass: config.popup_per_pass,
            overlay_removals: config.overlay_removals,
        }
    }

    /// Reduced budgets for the sweep triggered by large text growth
    fn second(config: &RevealConfig) -> Self {
        Self {
            load_more_rounds: config.load_more_rounds.min(3),
            load_more_per_round: config.load_more_per_round.saturating_sub(1).max(1),
            scroll_steps: (config.scroll_steps / 2).max(2),
            carousel_clicks: config.carousel_clicks * 2 / 3,
            tab_clicks: config.tab_clicks / 2,
            popup_passes: config.popup_passes.min(1),
            popup_per_pass: config.popup_per_pass * 3 / 5,
            overlay_removals: config.overlay_removals * 2 / 3,
        }
    }
}

/// Performs the reveal sequence on a single loaded page
#[derive(Debug, Clone)]
pub struct RevealEngine {
    config: RevealConfig,
    patterns: PatternTables,
    languages: Vec<String>,
}

impl RevealEngine {
    pub fn new(config: RevealConfig, patterns: PatternTables, languages: Vec<String>) -> Self {
        Self {
            config,
            patterns,
            languages,
        }
    }

    pub fn config(&self) -> &RevealConfig {
        &self.config
    }

    /// Reveal as much of the current page as possible
    ///
    /// Never fails; interactions that error or exceed the step timeout are
    /// logged at debug level and contribute nothing to the counters.
    pub async fn reveal<P>(&self, page: &P) -> RevealCounters
    where
        P: PageAutomation + ?Sized,
    {
        let mut counters = RevealCounters::default();
        let first = Sweep::first(&self.config);

        counters.language_switched = self.switch_language(page).await;

        counters.cookies_accepted = self
            .try_step(
                "accept cookies",
                page.click_text(
                    self.patterns.cookie.regex(),
                    ClickScope::Interactive,
                    self.click_options(self.config.cookie_clicks),
                ),
            )
            .await;

        self.dismiss_popups(page, &first, &mut counters).await;

        let baseline = self.text_length(page).await;

        counters.tabs_clicked += self.click_tabs(page, first.tab_clicks).await;

        counters.expanders_opened = self
            .try_count(
                "open expanders",
                page.evaluate(
                    scripts::OPEN_EXPANDERS,
                    vec![json!(ACCORDION_SELECTORS), json!(self.config.expander_limit)],
                ),
            )
            .await;
        if counters.expanders_opened > 0 {
            page.wait_for_timeout(EXPANDER_PAUSE).await;
        }

        counters.details_opened = self
            .try_count("open details", page.evaluate(scripts::OPEN_DETAILS, vec![]))
            .await;

        counters.expand_clicks += self.load_more(page, &first).await;
        self.scroll_everything(page, &first, &mut counters).await;
        counters.carousel_clicks += self.walk_carousels(page, first.carousel_clicks).await;
        counters.iframe_clicks += self.walk_frames(page).await;
        self.dismiss_popups(page, &first, &mut counters).await;
        self.wait_idle(page).await;

        let grown = self.text_length(page).await.saturating_sub(baseline);
        if grown > self.config.growth_threshold as u64 {
            ::log::debug!("Text grew by {} characters, running second sweep", grown);
            let second = Sweep::second(&self.config);

            counters.expand_clicks += self.load_more(page, &second).await;
            self.scroll_everything(page, &second, &mut counters).await;
            counters.carousel_clicks += self.walk_carousels(page, second.carousel_clicks).await;
            counters.iframe_clicks += self.walk_frames(page).await;
            counters.tabs_clicked += self.click_tabs(page, second.tab_clicks).await;
            self.dismiss_popups(page, &second, &mut counters).await;
            self.wait_idle(page).await;
        }

        counters.text_growth = self.text_length(page).await.saturating_sub(baseline) as usize;
        counters
    }

    /// Run one bounded interaction; `None` when it failed or timed out
    pub async fn attempt<T, F>(&self, label: &str, step: F) -> Option<T>
    where
        F: Future<Output = Result<T, PageError>>,
    {
        match tokio::time::timeout(self.config.step_timeout(), step).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                ::log::debug!("Reveal step '{}' failed: {}", label, e);
                None
            }
            Err(_) => {
                ::log::debug!(
                    "Reveal step '{}' timed out after {:?}",
                    label,
                    self.config.step_timeout()
                );
                None
            }
        }
    }

    /// Like [`attempt`](Self::attempt), degrading failures to the default value
    pub async fn try_step<T, F>(&self, label: &str, step: F) -> T
    where
        T: Default,
        F: Future<Output = Result<T, PageError>>,
    {
        self.attempt(label, step).await.unwrap_or_default()
    }

    /// A script step whose result is a count
    async fn try_count<F>(&self, label: &str, step: F) -> usize
    where
        F: Future<Output = Result<Value, PageError>>,
    {
        as_count(&self.try_step(label, step).await)
    }

    fn click_options(&self, limit: usize) -> ClickOptions {
        ClickOptions {
            limit,
            timeout: self.config.click_timeout(),
            settle: self.config.click_settle(),
        }
    }

    async fn text_length<P>(&self, page: &P) -> u64
    where
        P: PageAutomation + ?Sized,
    {
        self.try_step("text length", page.evaluate(scripts::TEXT_LENGTH, vec![]))
            .await
            .as_u64()
            .unwrap_or(0)
    }

    async fn wait_idle<P>(&self, page: &P)
    where
        P: PageAutomation + ?Sized,
    {
        self.try_step(
            "network idle",
            page.wait_for_load(LoadState::NetworkIdle, self.config.idle_timeout()),
        )
        .await
    }

    /// Switch to the first preferred language the page offers
    async fn switch_language<P>(&self, page: &P) -> bool
    where
        P: PageAutomation + ?Sized,
    {
        for code in &self.languages {
            let code = sanitize_language(code);
            if code.is_empty() {
                continue;
            }

            let selector = format!(r#"a[hreflang="{}" i]"#, code);
            let mut clicked = self
                .try_step(
                    "language hreflang",
                    page.click_selector(&selector, self.click_options(1)),
                )
                .await;

            if clicked == 0 {
                if let Some(labels) = self.patterns.language_matcher(&code) {
                    clicked = self
                        .try_step(
                            "language label",
                            page.click_text(
                                labels.regex(),
                                ClickScope::Links,
                                self.click_options(1),
                            ),
                        )
                        .await;
                }
            }

            if clicked > 0 {
                ::log::debug!("Switched page language to '{}'", code);
                self.try_step(
                    "language load",
                    page.wait_for_load(LoadState::DomReady, self.config.idle_timeout()),
                )
                .await;
                return true;
            }
        }
        false
    }

    async fn dismiss_popups<P>(&self, page: &P, sweep: &Sweep, counters: &mut RevealCounters)
    where
        P: PageAutomation + ?Sized,
    {
        let close_selectors = CLOSE_SELECTORS.join(", ");
        let mut closed = 0;

        for _ in 0..sweep.popup_passes {
            let mut pass = self
                .try_step(
                    "close selectors",
                    page.click_selector(&close_selectors, self.click_options(sweep.popup_per_pass)),
                )
                .await;

            if pass < sweep.popup_per_pass {
                pass += self
                    .try_step(
                        "close phrases",
                        page.click_text(
                            self.patterns.close.regex(),
                            ClickScope::Interactive,
                            self.click_options(sweep.popup_per_pass - pass),
                        ),
                    )
                    .await;
            }

            self.try_step("escape", page.press_escape()).await;
            closed += pass;
        }

        counters.popups_closed += closed;

        if closed == 0 && sweep.overlay_removals > 0 {
            counters.overlays_removed += self
                .try_count(
                    "remove overlays",
                    page.evaluate(
                        scripts::REMOVE_OVERLAYS,
                        vec![json!(OVERLAY_SELECTORS), json!(sweep.overlay_removals)],
                    ),
                )
                .await;
        }
    }

    async fn click_tabs<P>(&self, page: &P, limit: usize) -> usize
    where
        P: PageAutomation + ?Sized,
    {
        if limit == 0 {
            return 0;
        }
        self.try_step(
            "navigation tabs",
            page.click_text(
                self.patterns.nav_tabs.regex(),
                ClickScope::Controls,
                self.click_options(limit),
            ),
        )
        .await
    }

    /// Click "load more" style controls round by round while the page keeps growing
    async fn load_more<P>(&self, page: &P, sweep: &Sweep) -> usize
    where
        P: PageAutomation + ?Sized,
    {
        let mut total = 0;
        let mut last_length = self.text_length(page).await;

        for round in 0..sweep.load_more_rounds {
            let clicked = self
                .try_step(
                    "load more",
                    page.click_text(
                        self.patterns.expand.regex(),
                        ClickScope::Controls,
                        self.click_options(sweep.load_more_per_round),
                    ),
                )
                .await;
            if clicked == 0 {
                break;
            }
            total += clicked;

            page.wait_for_timeout(LOAD_MORE_PAUSE).await;
            let length = self.text_length(page).await;
            if length <= last_length {
                ::log::trace!("Load more stopped growing after round {}", round + 1);
                break;
            }
            last_length = length;
        }
        total
    }

    async fn scroll_everything<P>(&self, page: &P, sweep: &Sweep, counters: &mut RevealCounters)
    where
        P: PageAutomation + ?Sized,
    {
        counters.overflow_scrolls += self
            .try_step(
                "overflow scroll",
                page.scroll(ScrollTarget::Overflowing {
                    max_containers: self.config.max_scroll_containers,
                    steps: self.config.container_scroll_steps,
                }),
            )
            .await;

        for _ in 0..sweep.scroll_steps {
            match self.attempt("page scroll", page.scroll(ScrollTarget::Window)).await {
                Some(steps) => counters.scroll_steps += steps,
                None => break,
            }
            page.wait_for_timeout(self.config.scroll_pause()).await;
        }
    }

    async fn walk_carousels<P>(&self, page: &P, per_widget: usize) -> usize
    where
        P: PageAutomation + ?Sized,
    {
        if per_widget == 0 {
            return 0;
        }
        self.try_count(
            "carousels",
            page.evaluate(
                scripts::WALK_CAROUSELS,
                vec![json!(CAROUSEL_NEXT_SELECTORS), json!(per_widget)],
            ),
        )
        .await
    }

    async fn walk_frames<P>(&self, page: &P) -> usize
    where
        P: PageAutomation + ?Sized,
    {
        let frames = self.try_step("list frames", page.frames()).await;
        let more: &Regex = self.patterns.frame_more.regex();

        let mut clicks = 0;
        for frame in frames {
            self.try_step("frame scroll", page.scroll(ScrollTarget::Frame(frame)))
                .await;
            page.wait_for_timeout(FRAME_PAUSE).await;
            clicks += self
                .try_step(
                    "frame more",
                    page.click_text(
                        more,
                        ClickScope::Frame(frame),
                        self.click_options(FRAME_CLICKS),
                    ),
                )
                .await;
        }
        clicks
    }
}

/// Language codes end up inside a CSS attribute selector
fn sanitize_language(code: &str) -> String {
    code.trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect::<String>()
        .to_lowercase()
}

fn as_count(value: &Value) -> usize {
    value.as_u64().unwrap_or(0) as usize
}
