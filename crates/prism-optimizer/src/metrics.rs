//! Metrics sink for optimizer savings events

use std::time::Duration;

use parking_lot::Mutex;
use tracing::info;

use crate::intent::IntentKind;

/// One record of what a pipeline run saved.
#[derive(Debug, Clone, PartialEq)]
pub struct SavingsEvent {
    /// Sum of estimated tokens over every candidate chunk
    pub original_tokens: usize,
    /// Estimated tokens of the final prompt
    pub optimized_tokens: usize,
    /// `original_tokens / max(1, optimized_tokens)`
    pub compression_ratio: f64,
    /// Intent the pipeline classified
    pub intent: IntentKind,
    /// Wall-clock duration of the run
    pub duration: Duration,
}

/// Destination for savings events. Persistence format is up to the host.
pub trait MetricsSink: Send + Sync {
    fn record(&self, event: &SavingsEvent);
}

/// Default sink: structured log line per event.
#[derive(Debug, Default)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn record(&self, event: &SavingsEvent) {
        info!(
            original_tokens = event.original_tokens,
            optimized_tokens = event.optimized_tokens,
            compression_ratio = format!("{:.2}", event.compression_ratio).as_str(),
            intent = %event.intent,
            duration_ms = event.duration.as_millis() as u64,
            "prompt optimized"
        );
    }
}

/// In-memory sink for tests and diagnostics.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SavingsEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SavingsEvent> {
        self.events.lock().clone()
    }
}

impl MetricsSink for RecordingSink {
    fn record(&self, event: &SavingsEvent) {
        self.events.lock().push(event.clone());
    }
}
