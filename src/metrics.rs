use crate::config::StopConfig;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Walk counters plus the trailing plateau window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub actions_total: u64,
    pub pages_visited: u64,

    /// Cumulative count of URLs newly appended to the frontier
    pub links_discovered: u64,
    pub navigation_failures: u64,

    /// Actions performed per step, oldest first
    pub window_actions: VecDeque<u64>,

    /// New links discovered per step, oldest first
    pub window_new: VecDeque<u64>,
}

impl Metrics {
    /// Record one loop step
    ///
    /// Both windows are rings of capacity `window`: once full, each push
    /// evicts exactly the oldest entry.
    pub fn record(&mut self, actions: u64, new_links: u64, window: usize) {
        let window = window.max(1);

        self.actions_total += actions;
        self.links_discovered += new_links;

        self.window_actions.push_back(actions);
        self.window_new.push_back(new_links);
        while self.window_actions.len() > window {
            self.window_actions.pop_front();
        }
        while self.window_new.len() > window {
            self.window_new.pop_front();
        }
    }

    /// New links per action over the trailing window
    pub fn frontier_new_ratio(&self) -> f64 {
        let actions: u64 = self.window_actions.iter().sum();
        let new_links: u64 = self.window_new.iter().sum();
        new_links as f64 / actions.max(1) as f64
    }

    pub fn window_full(&self, window: usize) -> bool {
        self.window_actions.len() >= window.max(1)
    }
}

/// Why a walk ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// `actions_total` reached `max_actions`
    HardActions,
    /// Wall-clock budget exhausted
    HardTime,
    /// Discovery rate fell below `min_new_ratio` over a full window
    SoftPlateau,
    EmptyFrontier,
}

impl StopReason {
    pub fn is_hard(&self) -> bool {
        matches!(self, StopReason::HardActions | StopReason::HardTime)
    }
}

/// Evaluates hard caps and the soft plateau signal
#[derive(Debug, Clone, Copy)]
pub struct StopPolicy {
    config: StopConfig,
}

impl StopPolicy {
    pub fn new(config: StopConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StopConfig {
        &self.config
    }

    pub fn window(&self) -> usize {
        self.config.soft.plateau_window
    }

    /// Actions still allowed before the hard cap
    pub fn actions_left(&self, metrics: &Metrics) -> u64 {
        self.config
            .hard
            .max_actions
            .saturating_sub(metrics.actions_total)
    }

    /// Checked at the top of every iteration, before navigation
    pub fn hard_stop(&self, metrics: &Metrics, elapsed: Duration) -> Option<StopReason> {
        if metrics.actions_total >= self.config.hard.max_actions {
            return Some(StopReason::HardActions);
        }
        if elapsed >= self.config.time_budget() {
            return Some(StopReason::HardTime);
        }
        None
    }

    /// Checked after a step; silent until the window has filled
    pub fn soft_stop(&self, metrics: &Metrics) -> Option<StopReason> {
        if !metrics.window_full(self.window()) {
            return None;
        }
        if metrics.frontier_new_ratio() < self.config.soft.min_new_ratio {
            return Some(StopReason::SoftPlateau);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_actions: u64, window: usize, ratio: f64) -> StopPolicy {
        let mut config = StopConfig::default();
        config.hard.max_actions = max_actions;
        config.soft.plateau_window = window;
        config.soft.min_new_ratio = ratio;
        StopPolicy::new(config)
    }

    #[test]
    fn test_window_evicts_oldest_only() {
        let mut metrics = Metrics::default();
        metrics.record(1, 10, 3);
        metrics.record(2, 20, 3);
        metrics.record(3, 30, 3);
        metrics.record(4, 40, 3);

        assert_eq!(metrics.window_actions, VecDeque::from(vec![2, 3, 4]));
        assert_eq!(metrics.window_new, VecDeque::from(vec![20, 30, 40]));
        assert_eq!(metrics.actions_total, 10);
        assert_eq!(metrics.links_discovered, 100);
    }

    #[test]
    fn test_ratio_is_trailing_not_cumulative() {
        let mut metrics = Metrics::default();
        metrics.record(1, 5, 2);
        metrics.record(1, 0, 2);
        metrics.record(1, 0, 2);

        // The early burst of 5 has left the window
        assert_eq!(metrics.frontier_new_ratio(), 0.0);
    }

    #[test]
    fn test_zero_actions_do_not_divide_by_zero() {
        let mut metrics = Metrics::default();
        assert_eq!(metrics.frontier_new_ratio(), 0.0);

        metrics.record(0, 3, 2);
        metrics.record(0, 0, 2);
        assert_eq!(metrics.window_actions, VecDeque::from(vec![0, 0]));
        assert_eq!(metrics.frontier_new_ratio(), 3.0);
    }

    #[test]
    fn test_soft_stop_waits_for_full_window() {
        let policy = policy(100, 3, 0.2);
        let mut metrics = Metrics::default();

        metrics.record(2, 0, 3);
        assert_eq!(policy.soft_stop(&metrics), None);
        metrics.record(2, 0, 3);
        assert_eq!(policy.soft_stop(&metrics), None);
        metrics.record(2, 0, 3);
        assert_eq!(policy.soft_stop(&metrics), Some(StopReason::SoftPlateau));
    }

    #[test]
    fn test_soft_stop_threshold_is_strict() {
        let policy = policy(100, 2, 0.5);
        let mut metrics = Metrics::default();
        metrics.record(2, 1, 2);
        metrics.record(2, 1, 2);

        // 2 / 4 == 0.5 is not below the threshold
        assert_eq!(policy.soft_stop(&metrics), None);
    }

    #[test]
    fn test_hard_stop_on_actions_and_time() {
        let policy = policy(5, 3, 0.2);
        let mut metrics = Metrics::default();
        assert_eq!(policy.hard_stop(&metrics, Duration::ZERO), None);

        metrics.actions_total = 5;
        assert_eq!(
            policy.hard_stop(&metrics, Duration::ZERO),
            Some(StopReason::HardActions)
        );

        metrics.actions_total = 0;
        assert_eq!(
            policy.hard_stop(&metrics, Duration::from_secs(120)),
            Some(StopReason::HardTime)
        );
    }

    #[test]
    fn test_actions_left_saturates() {
        let policy = policy(3, 3, 0.2);
        let mut metrics = Metrics::default();
        assert_eq!(policy.actions_left(&metrics), 3);

        metrics.record(2, 0, 3);
        assert_eq!(policy.actions_left(&metrics), 1);

        metrics.record(4, 0, 3);
        assert_eq!(policy.actions_left(&metrics), 0);
    }
}
