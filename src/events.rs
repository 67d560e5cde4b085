//! Structured chain execution events.
//!
//! Log lines through `tracing` are the human-readable surface; these events
//! are the machine-readable one, collected per run on the
//! [`ExecutionContext`](crate::ExecutionContext) so a host can inspect the
//! exact transition sequence after the fact.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::backend::Backend;

/// Events emitted at the chain state machine's major transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ChainEvent {
    /// A step began executing.
    StepStart {
        /// 1-based step index.
        step: usize,
        /// Backend the step dispatches to.
        backend: Backend,
    },
    /// A step completed and its record was appended to the history.
    StepEnd {
        /// 1-based step index.
        step: usize,
        /// Wall-clock duration of the step in milliseconds.
        duration_ms: u128,
    },
    /// The chain halted cleanly at an unconfigured step.
    Halted {
        /// 1-based index of the unconfigured step.
        step: usize,
    },
    /// The terminal frame was emitted.
    Completed {
        /// Number of steps that produced a history record.
        steps_run: usize,
    },
    /// A fatal error aborted the execution.
    Error {
        /// Description of what went wrong.
        message: String,
    },
}

/// A timestamped trace entry containing a chain event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Unix epoch timestamp in milliseconds when this event occurred.
    pub timestamp: u128,
    /// The recorded event.
    #[serde(flatten)]
    pub event: ChainEvent,
}

impl TraceEntry {
    /// Create a new trace entry with the current timestamp.
    #[must_use]
    pub fn new(event: ChainEvent) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards")
            .as_millis();
        Self { timestamp, event }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_entry_serialization() {
        let entry = TraceEntry::new(ChainEvent::StepStart {
            step: 1,
            backend: Backend::OpenAi,
        });

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"type\":\"StepStart\""));
        assert!(json.contains("\"backend\":\"openai\""));
        assert!(json.contains("\"timestamp\":"));
    }

    #[test]
    fn test_halted_event_round_trip() {
        let event = ChainEvent::Halted { step: 4 };

        let json = serde_json::to_string(&event).unwrap();
        let back: ChainEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, ChainEvent::Halted { step: 4 }));
    }
}
