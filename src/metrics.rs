//! Metrics collection for chain execution.

use serde::{Deserialize, Serialize};

/// Aggregated counters for one chain execution.
///
/// Token counts come from provider-reported usage and stay at zero for chains
/// running entirely against the local backend.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ChainMetrics {
    /// Steps that completed and produced a history record.
    pub steps_completed: usize,
    /// Steps routed to the local backend, whose output is pending an
    /// upstream-connected model.
    pub deferred_steps: usize,
    /// Hosted-provider calls that succeeded but returned no text.
    pub empty_outputs: usize,
    /// Prompt tokens reported by hosted providers.
    pub prompt_tokens: usize,
    /// Completion tokens reported by hosted providers.
    pub completion_tokens: usize,
    /// Diagnostics from failed provider calls.
    pub failures: Vec<String>,
}

impl ChainMetrics {
    /// Record one completed step.
    pub fn record_step(&mut self) {
        self.steps_completed += 1;
    }

    /// Record a step deferred to the upstream model.
    pub fn record_deferred(&mut self) {
        self.deferred_steps += 1;
    }

    /// Record a successful provider call with empty output.
    pub fn record_empty_output(&mut self) {
        self.empty_outputs += 1;
    }

    /// Record provider-reported token usage.
    pub fn add_tokens(&mut self, prompt: usize, completion: usize) {
        self.prompt_tokens += prompt;
        self.completion_tokens += completion;
    }

    /// Record a failed provider call.
    pub fn record_failure(&mut self, error: String) {
        self.failures.push(error);
    }

    /// Whether any provider call failed.
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Total tokens (prompt + completion) across all steps.
    pub fn total_tokens(&self) -> usize {
        self.prompt_tokens + self.completion_tokens
    }
}
