//! # prompt-chain
//!
//! A multi-step prompt chain element for dataflow pipelines in Rust.
//!
//! The element receives one [`Frame`] per invocation, decomposes it into a
//! linear pipeline of up to ten configured steps, threads each step's output
//! into the next step's prompt, and emits an observable intermediate frame at
//! every step boundary plus a single terminal frame carrying the full
//! execution history.
//!
//! ## Core Concepts
//!
//! - **[`Frame`]**: the unit of dataflow — media payload plus an open
//!   key-value side channel
//! - **[`ChainConfig`] / [`StepConfig`]**: per-step prompt template, backend,
//!   credential and temperature, resolved once from the host settings store
//! - **[`format_prompt`]**: pure template rendering with `{input}` and
//!   `{previous}` placeholders
//! - **[`Dispatcher`]**: routes a rendered prompt to the local backend or a
//!   hosted provider, never raising — failures degrade to placeholder output
//! - **[`ChainElement`]**: the sequential state machine driving the steps
//! - **[`FrameSink`] / [`ChannelSink`]**: producer-style emission of step and
//!   final frames, in order, with no internal buffering
//! - **[`ExecutionContext`] / [`ChainMetrics`]**: per-run metrics and a
//!   structured event trace
//!
//! ## Example
//!
//! ```rust
//! use prompt_chain::{
//!     ChainConfig, ChainElement, ChannelSink, Frame, OutputPort, ReqwestClient, StepConfig,
//! };
//!
//! # tokio_test::block_on(async {
//! let config = ChainConfig::new(2)
//!     .with_step(1, StepConfig::with_prompt("Analyze: {input}"))
//!     .with_step(2, StepConfig::with_prompt("Summarize: {previous}"));
//! let element = ChainElement::new(config, ReqwestClient::new());
//!
//! let (sink, mut rx) = ChannelSink::channel(16);
//! let frame = Frame::new(1).with_data("message", "Hello, world");
//!
//! element.run(Some(frame), &sink).await.unwrap();
//! drop(sink);
//!
//! let mut ports = Vec::new();
//! while let Some(emission) = rx.recv().await {
//!     ports.push(emission.port);
//! }
//! assert_eq!(
//!     ports,
//!     vec![OutputPort::Step(1), OutputPort::Step(2), OutputPort::Final]
//! );
//! # });
//! ```

pub mod backend;
pub mod chain;
pub mod context;
pub mod error;
pub mod events;
pub mod frame;
pub mod metrics;
pub mod output;
pub mod prompt;
pub mod settings;

pub use backend::http::{HttpClient, ReqwestClient};
pub use backend::{Backend, BackendError, Completion, DispatchOutcome, Dispatcher};
pub use chain::{deferred_marker, no_output_marker, ChainElement, StepRecord};
pub use context::ExecutionContext;
pub use error::{Error, Result};
pub use events::{ChainEvent, TraceEntry};
pub use frame::{ColorSpace, Frame, RegionOfInterest, Tensor};
pub use metrics::ChainMetrics;
pub use output::{ChannelSink, Emission, FrameSink, OutputPort};
pub use prompt::{format_prompt, INPUT_PLACEHOLDER, PREVIOUS_PLACEHOLDER};
pub use settings::{ChainConfig, StepConfig, DEFAULT_NUM_STEPS, DEFAULT_TEMPERATURE, MAX_STEPS};
