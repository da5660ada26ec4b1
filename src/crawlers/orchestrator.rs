use crate::artifacts::ArtifactWriter;
use crate::config::{ConfigError, Plan, WalkerConfig};
use crate::filter::{ReachabilityFilter, resolve_link};
use crate::metrics::{Metrics, StopPolicy, StopReason};
use crate::page::{LoadState, PageAutomation, PageError, ScrollTarget};
use crate::parsers::SignalExtractor;
use crate::patterns::PatternTables;
use crate::reflect::{Action, ReflectOutput, Reflector};
use crate::results::{PageArtifacts, WalkState};
use crate::reveal::RevealEngine;
use crate::snapshot::SnapshotBuilder;
use crate::store::Store;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifecycle of one walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkPhase {
    Idle,
    Running,
    Stopped(StopReason),
}

/// Frontier, visited set and metrics of a walk in progress
#[derive(Debug, Default)]
struct Walk {
    frontier: VecDeque<String>,
    queued: HashSet<String>,
    visited: Vec<String>,
    seen: HashSet<String>,
    failed: Vec<String>,
    failed_set: HashSet<String>,
    metrics: Metrics,
    deferred: Vec<Action>,
    artifacts: Vec<PageArtifacts>,
    last_organization: Option<u64>,
}

impl Walk {
    /// Queue a URL unless it is filtered, visited, queued or failed
    fn enqueue(&mut self, url: String, filter: &ReachabilityFilter) -> bool {
        if self.seen.contains(&url)
            || self.queued.contains(&url)
            || self.failed_set.contains(&url)
            || !filter.allowed(&url)
        {
            return false;
        }
        self.queued.insert(url.clone());
        self.frontier.push_back(url);
        true
    }

    fn pop(&mut self) -> Option<String> {
        let url = self.frontier.pop_front()?;
        self.queued.remove(&url);
        Some(url)
    }

    fn visit(&mut self, url: &str) {
        if self.seen.insert(url.to_string()) {
            self.visited.push(url.to_string());
        }
        self.metrics.pages_visited += 1;
    }

    /// A page reached without navigating to it, e.g. by a language switch
    fn landed(&mut self, url: &str) {
        if self.seen.insert(url.to_string()) {
            self.visited.push(url.to_string());
        }
        if self.queued.remove(url) {
            self.frontier.retain(|queued| queued != url);
        }
    }

    fn fail(&mut self, url: &str) {
        if self.failed_set.insert(url.to_string()) {
            self.failed.push(url.to_string());
        }
        self.metrics.navigation_failures += 1;
    }

    fn finish(self, stop_reason: StopReason) -> WalkState {
        WalkState {
            visited: self.visited,
            frontier: self.frontier.into_iter().collect(),
            metrics: self.metrics,
            stop_reason,
            failed: self.failed,
            deferred_actions: self.deferred,
            popups_closed: 0,
            artifacts: self.artifacts,
        }
    }
}

/// Drives the bounded walk: navigate, reveal, snapshot, reflect, persist
///
/// One walk is strictly sequential. The orchestrator owns the frontier, the
/// visited set and the metrics; nothing else mutates them.
pub struct CrawlOrchestrator {
    plan: Plan,
    filter: ReachabilityFilter,
    policy: StopPolicy,
    reveal: RevealEngine,
    snapshots: SnapshotBuilder,
    reflector: Arc<dyn Reflector>,
    store: Arc<dyn Store>,
    artifacts: Option<ArtifactWriter>,
    nav_timeout: Duration,
    scroll_pause: Duration,
    seeds: Vec<String>,
    phase: WalkPhase,
}

impl CrawlOrchestrator {
    pub fn new(
        config: &WalkerConfig,
        reflector: Arc<dyn Reflector>,
        store: Arc<dyn Store>,
        extractor: Box<dyn SignalExtractor>,
    ) -> Result<Self, ConfigError> {
        config.plan.validate()?;

        let reveal = RevealEngine::new(
            config.reveal.clone(),
            PatternTables::default(),
            config.plan.preferred_languages.clone(),
        );

        let artifacts = config.artifacts_dir.as_ref().and_then(|dir| {
            match ArtifactWriter::open(dir, config.reveal.step_timeout()) {
                Ok(writer) => Some(writer),
                Err(e) => {
                    ::log::warn!(
                        "Cannot use artifacts directory {}, not saving page files: {}",
                        dir.display(),
                        e
                    );
                    None
                }
            }
        });

        Ok(Self {
            plan: config.plan.clone(),
            filter: ReachabilityFilter::new(&config.plan),
            policy: StopPolicy::new(config.plan.stop),
            reveal,
            snapshots: SnapshotBuilder::new(extractor, config.reveal.idle_timeout()),
            reflector,
            store,
            artifacts,
            nav_timeout: config.nav_timeout(),
            scroll_pause: config.reveal.scroll_pause(),
            seeds: Vec::new(),
            phase: WalkPhase::Idle,
        })
    }

    /// Extra URLs queued right after the start URL
    pub fn with_seeds(mut self, seeds: Vec<String>) -> Self {
        self.seeds = seeds;
        self
    }

    /// Replace the reveal engine, e.g. to use other phrase tables
    pub fn with_reveal_engine(mut self, reveal: RevealEngine) -> Self {
        self.reveal = reveal;
        self
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn phase(&self) -> WalkPhase {
        self.phase
    }

    /// Run the walk to a terminal state
    pub async fn run<P>(&mut self, page: &P) -> WalkState
    where
        P: PageAutomation + ?Sized,
    {
        let started = Instant::now();
        let mut walk = Walk::default();

        let start = self.plan.start_url.clone();
        for seed in std::iter::once(&start).chain(self.seeds.iter()) {
            match resolve_link(&start, seed) {
                Some(url) => {
                    walk.enqueue(url, &self.filter);
                }
                None => ::log::warn!("Ignoring unusable seed URL: {}", seed),
            }
        }

        self.phase = WalkPhase::Running;
        ::log::info!(
            "Starting walk of {} with {} queued URL(s)",
            start,
            walk.frontier.len()
        );

        let reason = loop {
            if let Some(reason) = self.policy.hard_stop(&walk.metrics, started.elapsed()) {
                break reason;
            }

            let Some(url) = walk.pop() else {
                break StopReason::EmptyFrontier;
            };

            if walk.seen.contains(&url) {
                ::log::trace!("Skipping already visited: {}", url);
                continue;
            }
            if !self.filter.allowed(&url) {
                ::log::debug!("Filter rejected: {}", url);
                continue;
            }

            if let Err(e) = self.navigate(page, &url).await {
                ::log::warn!("Failed to navigate to {}: {}", url, e);
                walk.fail(&url);
                continue;
            }
            walk.visit(&url);

            if let Some(reason) = self.step(page, &url, &mut walk).await {
                break reason;
            }
        };

        self.phase = WalkPhase::Stopped(reason);
        ::log::info!(
            "Walk stopped ({:?}) after {} page(s), {} action(s) in {:.2} seconds",
            reason,
            walk.metrics.pages_visited,
            walk.metrics.actions_total,
            started.elapsed().as_secs_f64()
        );

        walk.finish(reason)
    }

    /// Everything after a successful navigation; returns a soft stop if one fired
    async fn step<P>(&self, page: &P, url: &str, walk: &mut Walk) -> Option<StopReason>
    where
        P: PageAutomation + ?Sized,
    {
        let counters = self.reveal.reveal(page).await;
        ::log::info!("Revealed {}: {:?}", url, counters);

        let page_url = self.landed_url(page, url, walk).await;
        let (snapshot, html) = self.snapshots.capture(page, &page_url).await;
        if let Some(writer) = &self.artifacts {
            let saved = writer
                .save(page, walk.metrics.pages_visited, &snapshot, &html)
                .await;
            walk.artifacts.push(saved);
        }

        let output = match self
            .reflector
            .reflect(&self.plan, std::slice::from_ref(&snapshot))
            .await
        {
            Ok(output) => output,
            Err(e) => {
                ::log::warn!("Reflection failed for {}: {}", url, e);
                ReflectOutput::fallback()
            }
        };

        // The visit itself is one action; follow-ups share what is left
        let mut actions = 1;
        let mut budget = self.policy.actions_left(&walk.metrics).saturating_sub(1);
        for action in &output.actions {
            match action {
                Action::Scroll if budget > 0 => {
                    budget -= 1;
                    if self.scroll(page).await {
                        actions += 1;
                    }
                }
                Action::Scroll => {
                    ::log::debug!("Action budget spent, deferring scroll on {}", url);
                    walk.deferred.push(Action::Scroll);
                }
                other => walk.deferred.push(other.clone()),
            }
        }

        self.persist(&output, walk);

        let mut new_links = 0;
        for link in &output.goto_urls {
            if let Some(resolved) = resolve_link(&page_url, link) {
                if walk.enqueue(resolved, &self.filter) {
                    new_links += 1;
                }
            }
        }

        walk.metrics
            .record(actions, new_links, self.policy.window());
        ::log::info!(
            "Visited {} ({} action(s), {} new link(s), coverage {:?}, frontier {})",
            url,
            actions,
            new_links,
            output.coverage,
            walk.frontier.len()
        );

        self.policy.soft_stop(&walk.metrics)
    }

    /// URL the page shows now; redirects and language switches may have moved it
    async fn landed_url<P>(&self, page: &P, requested: &str, walk: &mut Walk) -> String
    where
        P: PageAutomation + ?Sized,
    {
        let current = self
            .reveal
            .attempt("current url", page.current_url())
            .await
            .and_then(|current| resolve_link(requested, &current));

        match current {
            Some(current) if current != requested => {
                ::log::debug!("{} is now showing {}", requested, current);
                walk.landed(&current);
                current
            }
            _ => requested.to_string(),
        }
    }

    /// Wait for network idle, falling back to DOM-ready on timeout
    async fn navigate<P>(&self, page: &P, url: &str) -> Result<(), PageError>
    where
        P: PageAutomation + ?Sized,
    {
        match page.goto(url, LoadState::NetworkIdle, self.nav_timeout).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_timeout() => {
                ::log::debug!("No network idle on {}, waiting for DOM ready: {}", url, e);
                page.wait_for_load(LoadState::DomReady, self.nav_timeout)
                    .await
            }
            Err(e) => Err(e),
        }
    }

    async fn scroll<P>(&self, page: &P) -> bool
    where
        P: PageAutomation + ?Sized,
    {
        let scrolled = self
            .reveal
            .attempt("scroll action", page.scroll(ScrollTarget::Window))
            .await
            .is_some();
        if scrolled {
            page.wait_for_timeout(self.scroll_pause).await;
        }
        scrolled
    }

    /// Upsert reflected entities; store failures never stop the walk
    fn persist(&self, output: &ReflectOutput, walk: &mut Walk) {
        let mut organization_id = walk.last_organization;

        if let Some(candidate) = &output.organization {
            match self.store.upsert_organization(candidate) {
                Ok(record) => {
                    ::log::debug!(
                        "Upserted organization #{}: {}",
                        record.organization_id,
                        record.name
                    );
                    organization_id = Some(record.organization_id);
                    walk.last_organization = organization_id;
                }
                Err(e) => ::log::warn!("Failed to store organization {}: {}", candidate.name, e),
            }
        }

        if output.projects.is_empty() {
            return;
        }
        let Some(organization_id) = organization_id else {
            ::log::debug!(
                "No organization known yet, dropping {} project(s)",
                output.projects.len()
            );
            return;
        };

        for project in &output.projects {
            match self.store.upsert_project(organization_id, project) {
                Ok(record) => ::log::debug!(
                    "Upserted project #{} for organization #{}: {}",
                    record.project_id,
                    organization_id,
                    record.name
                ),
                Err(e) => ::log::warn!("Failed to store project {}: {}", project.name, e),
            }
        }
    }
}
