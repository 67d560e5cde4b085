//! Execution context for chain runs.
//!
//! The context travels through the executor and dispatcher for one
//! invocation, accumulating [`ChainMetrics`] and a structured trace of
//! [`ChainEvent`]s. It is cheap to clone and thread-safe, so a host may share
//! one context across several invocations to aggregate metrics.

use std::sync::{Arc, Mutex};

use crate::events::{ChainEvent, TraceEntry};
use crate::metrics::ChainMetrics;

/// Shared metrics and trace log for chain executions.
///
/// # Example
///
/// ```rust
/// use prompt_chain::{ChainEvent, ExecutionContext};
///
/// let ctx = ExecutionContext::new();
/// ctx.emit(ChainEvent::Completed { steps_run: 2 });
///
/// let traces = ctx.trace_snapshot();
/// assert_eq!(traces.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    metrics: Arc<Mutex<ChainMetrics>>,
    traces: Arc<Mutex<Vec<TraceEntry>>>,
}

impl ExecutionContext {
    /// Create a new context with empty metrics and traces.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed step.
    pub fn record_step(&self) {
        self.metrics.lock().unwrap().record_step();
    }

    /// Record a step deferred to the upstream model.
    pub fn record_deferred(&self) {
        self.metrics.lock().unwrap().record_deferred();
    }

    /// Record a successful provider call that returned no text.
    pub fn record_empty_output(&self) {
        self.metrics.lock().unwrap().record_empty_output();
    }

    /// Record provider-reported token usage.
    pub fn record_tokens(&self, prompt: usize, completion: usize) {
        self.metrics.lock().unwrap().add_tokens(prompt, completion);
    }

    /// Record a failed provider call.
    pub fn record_failure(&self, error: impl Into<String>) {
        self.metrics.lock().unwrap().record_failure(error.into());
    }

    /// Get a snapshot of the current metrics.
    #[must_use]
    pub fn snapshot(&self) -> ChainMetrics {
        self.metrics.lock().unwrap().clone()
    }

    /// Emit a structured chain event to the trace log.
    ///
    /// Events are timestamped automatically when emitted.
    pub fn emit(&self, event: ChainEvent) {
        self.traces.lock().unwrap().push(TraceEntry::new(event));
    }

    /// Get a snapshot of the current trace log.
    #[must_use]
    pub fn trace_snapshot(&self) -> Vec<TraceEntry> {
        self.traces.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_accumulate_across_clones() {
        let ctx = ExecutionContext::new();
        let shared = ctx.clone();

        ctx.record_step();
        shared.record_step();
        shared.record_tokens(10, 5);
        shared.record_failure("boom");

        let metrics = ctx.snapshot();
        assert_eq!(metrics.steps_completed, 2);
        assert_eq!(metrics.total_tokens(), 15);
        assert!(metrics.has_failures());
    }

    #[test]
    fn trace_preserves_emission_order() {
        let ctx = ExecutionContext::new();
        ctx.emit(ChainEvent::StepStart {
            step: 1,
            backend: crate::backend::Backend::Local,
        });
        ctx.emit(ChainEvent::StepEnd {
            step: 1,
            duration_ms: 3,
        });

        let traces = ctx.trace_snapshot();
        assert_eq!(traces.len(), 2);
        assert!(matches!(traces[0].event, ChainEvent::StepStart { step: 1, .. }));
        assert!(matches!(traces[1].event, ChainEvent::StepEnd { step: 1, .. }));
    }
}
