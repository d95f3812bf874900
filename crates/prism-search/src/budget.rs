//! Daily neuron quota tracking
//!
//! The remote embedding tier is metered in "neurons" - one neuron
//! approximates the cost of one output dimension of one embedding. This
//! tracker gates remote requests against a per-day allowance that resets at
//! UTC midnight. Any observation at or after the reset instant auto-resets
//! the counter before answering.
//!
//! `can_afford` is an optimistic read; `track_usage` is the authoritative
//! compare-and-increment. The pair is deliberately not atomic: a racing
//! caller may land usage after a positive `can_afford`, in which case
//! `track_usage` proceeds and the threshold warning fires. Oversubscription
//! is bounded by the per-batch neuron granularity.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};

use prism_config::BudgetConfig;

/// Snapshot of the daily budget state.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetStats {
    /// Neurons consumed today
    pub used: f64,
    /// Neurons left before the daily limit
    pub remaining: f64,
    /// `used / daily_limit`, in [0, 1]
    pub percentage: f64,
    /// Next UTC midnight; the counter resets on any observation at or
    /// after this instant
    pub resets_at: DateTime<Utc>,
}

struct DayState {
    used: f64,
    resets_at: DateTime<Utc>,
    warned: bool,
}

/// Concurrency-safe daily neuron budget.
pub struct BudgetTracker {
    state: Mutex<DayState>,
    daily_limit: f64,
    warning_threshold: f64,
    cost_per_million: HashMap<String, f64>,
    default_cost_per_million: f64,
}

/// Next UTC midnight strictly after `now`.
fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = now.date_naive() + Duration::days(1);
    tomorrow
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time")
        .and_utc()
}

impl BudgetTracker {
    /// Create a tracker from configuration.
    pub fn new(config: &BudgetConfig) -> Self {
        Self::with_limit(
            config.daily_neurons,
            config.warning_threshold,
            config.cost_per_million.clone(),
            config.default_cost_per_million,
        )
    }

    /// Create a tracker with an explicit limit; model costs default empty.
    pub fn with_limit(
        daily_limit: f64,
        warning_threshold: f64,
        cost_per_million: HashMap<String, f64>,
        default_cost_per_million: f64,
    ) -> Self {
        Self {
            state: Mutex::new(DayState {
                used: 0.0,
                resets_at: next_utc_midnight(Utc::now()),
                warned: false,
            }),
            daily_limit,
            warning_threshold,
            cost_per_million,
            default_cost_per_million,
        }
    }

    /// Neuron cost for running `tokens` tokens through `model`.
    ///
    /// Known models use their configured cost per million tokens; unknown
    /// models fall back to the default cost.
    pub fn neurons_for(&self, model: &str, tokens: u64) -> f64 {
        let cost = self
            .cost_per_million
            .get(model)
            .copied()
            .unwrap_or(self.default_cost_per_million);
        cost * tokens as f64 / 1_000_000.0
    }

    /// Whether `tokens` tokens of `model` fit in today's remaining budget.
    pub fn can_afford(&self, model: &str, tokens: u64) -> bool {
        self.can_afford_neurons(self.neurons_for(model, tokens))
    }

    /// Whether a raw neuron amount fits in today's remaining budget.
    pub fn can_afford_neurons(&self, neurons: f64) -> bool {
        self.can_afford_neurons_at(neurons, Utc::now())
    }

    /// Record usage for `tokens` tokens of `model`.
    pub fn track_usage(&self, model: &str, tokens: u64) {
        self.track_neurons(self.neurons_for(model, tokens));
    }

    /// Record a raw neuron amount.
    pub fn track_neurons(&self, neurons: f64) {
        self.track_neurons_at(neurons, Utc::now());
    }

    /// Current stats, after applying any pending auto-reset.
    pub fn stats(&self) -> BudgetStats {
        self.stats_at(Utc::now())
    }

    /// Reset the counter immediately and advance the reset instant.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.used = 0.0;
        state.warned = false;
        state.resets_at = next_utc_midnight(Utc::now());
        debug!("Budget reset, next reset at {}", state.resets_at);
    }

    // Deterministic clock-injected variants; the public wrappers above pass
    // the wall clock.

    pub fn can_afford_neurons_at(&self, neurons: f64, now: DateTime<Utc>) -> bool {
        let mut state = self.state.lock();
        Self::auto_reset(&mut state, now);
        state.used + neurons <= self.daily_limit
    }

    pub fn track_neurons_at(&self, neurons: f64, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        Self::auto_reset(&mut state, now);
        state.used += neurons;

        let percentage = state.used / self.daily_limit;
        if percentage >= self.warning_threshold && !state.warned {
            state.warned = true;
            warn!(
                "Daily neuron budget at {:.0}% ({:.0} of {:.0})",
                percentage * 100.0,
                state.used,
                self.daily_limit
            );
        }
    }

    pub fn stats_at(&self, now: DateTime<Utc>) -> BudgetStats {
        let mut state = self.state.lock();
        Self::auto_reset(&mut state, now);
        BudgetStats {
            used: state.used,
            remaining: (self.daily_limit - state.used).max(0.0),
            percentage: (state.used / self.daily_limit).clamp(0.0, 1.0),
            resets_at: state.resets_at,
        }
    }

    fn auto_reset(state: &mut DayState, now: DateTime<Utc>) {
        if now >= state.resets_at {
            debug!("Daily neuron budget auto-reset");
            state.used = 0.0;
            state.warned = false;
            state.resets_at = next_utc_midnight(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tracker(limit: f64) -> BudgetTracker {
        BudgetTracker::with_limit(limit, 0.80, HashMap::new(), 6058.0)
    }

    #[test]
    fn test_next_utc_midnight() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 26).unwrap();
        let midnight = next_utc_midnight(now);
        assert_eq!(midnight, Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap());

        // Exactly at midnight, the next reset is the following day
        let at_midnight = Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap();
        assert_eq!(
            next_utc_midnight(at_midnight),
            Utc.with_ymd_and_hms(2026, 3, 16, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_neurons_for_known_and_unknown_models() {
        let mut costs = HashMap::new();
        costs.insert("known".to_string(), 1000.0);
        let tracker = BudgetTracker::with_limit(10_000.0, 0.80, costs, 500.0);

        assert_eq!(tracker.neurons_for("known", 1_000_000), 1000.0);
        assert_eq!(tracker.neurons_for("mystery", 1_000_000), 500.0);
        assert_eq!(tracker.neurons_for("known", 500_000), 500.0);
    }

    #[test]
    fn test_afford_and_track() {
        let tracker = tracker(1000.0);
        assert!(tracker.can_afford_neurons(800.0));
        tracker.track_neurons(800.0);

        let stats = tracker.stats();
        assert_eq!(stats.used, 800.0);
        assert_eq!(stats.remaining, 200.0);
        assert!(!tracker.can_afford_neurons(800.0));
        assert!(tracker.can_afford_neurons(200.0));
    }

    #[test]
    fn test_reset_clears_usage() {
        let tracker = tracker(1000.0);
        tracker.track_neurons(600.0);
        tracker.reset();

        let stats = tracker.stats();
        assert_eq!(stats.used, 0.0);
        assert_eq!(stats.remaining, 1000.0);
        assert!(stats.resets_at > Utc::now());
    }

    #[test]
    fn test_auto_reset_on_observation() {
        let tracker = tracker(1000.0);
        tracker.track_neurons(900.0);

        let resets_at = tracker.stats().resets_at;
        let after_reset = resets_at + Duration::seconds(1);

        let stats = tracker.stats_at(after_reset);
        assert_eq!(stats.used, 0.0);
        assert_eq!(stats.remaining, 1000.0);
        assert!(stats.resets_at > after_reset);
    }

    #[test]
    fn test_auto_reset_applies_to_afford() {
        let tracker = tracker(1000.0);
        tracker.track_neurons(1000.0);
        assert!(!tracker.can_afford_neurons(1.0));

        let resets_at = tracker.stats().resets_at;
        assert!(tracker.can_afford_neurons_at(1000.0, resets_at));
    }

    #[test]
    fn test_percentage_clamped() {
        let tracker = tracker(100.0);
        // A racing track_usage may overshoot; percentage stays in [0, 1]
        tracker.track_neurons(150.0);
        let stats = tracker.stats();
        assert_eq!(stats.percentage, 1.0);
        assert_eq!(stats.remaining, 0.0);
    }
}
