//! The chain execution state machine.
//!
//! One invocation processes one input frame: extract the input text, then for
//! each declared step resolve its configuration, render its prompt, obtain its
//! output from the selected backend, append a history record, and emit an
//! intermediate frame on that step's port. The loop halts early at the first
//! unconfigured step. Either way exactly one terminal frame follows, carrying
//! the last output and the full history.
//!
//! Executions are independent: all per-frame state lives in a fresh
//! `ChainState` and is discarded once the terminal frame is emitted.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use crate::backend::http::HttpClient;
use crate::backend::{Backend, DispatchOutcome, Dispatcher};
use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::events::ChainEvent;
use crate::frame::Frame;
use crate::metrics::ChainMetrics;
use crate::output::{Emission, FrameSink, OutputPort};
use crate::prompt::format_prompt;
use crate::settings::ChainConfig;

/// Output placeholder for a step routed to the local backend.
///
/// The engine cannot invoke a model living in another pipeline stage, so the
/// step's real output is pending; downstream consumers detect this marker to
/// fill it in. Never empty, so `{previous}` substitution in later steps stays
/// meaningful.
pub fn deferred_marker(step: usize) -> String {
    format!("[step {step} awaiting upstream model]")
}

/// Output placeholder for a step whose provider call failed or returned
/// nothing.
pub fn no_output_marker(step: usize) -> String {
    format!("[step {step} - no output]")
}

/// One completed step, as recorded in the chain history.
///
/// The history is append-only and attached verbatim to every frame emitted
/// from that point onward, giving downstream consumers a cumulative audit
/// trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// 1-based step index.
    pub step: usize,
    /// The rendered prompt sent to the backend.
    pub prompt: String,
    /// The step's output text (a placeholder marker when deferred or failed).
    pub output: String,
    /// Backend the step dispatched to.
    pub backend: Backend,
}

/// Per-invocation execution state. Created fresh for each input frame,
/// mutated only by the step loop, discarded after the terminal frame.
struct ChainState {
    current_input: String,
    previous_output: Option<String>,
    history: Vec<StepRecord>,
}

/// The prompt-chain pipeline element.
///
/// Holds the resolved [`ChainConfig`] and a [`Dispatcher`]; each call to
/// [`run`](ChainElement::run) processes one input frame to completion.
///
/// # Example
///
/// ```rust
/// use prompt_chain::{
///     ChainConfig, ChainElement, ChannelSink, Frame, ReqwestClient, StepConfig,
/// };
///
/// # tokio_test::block_on(async {
/// let config = ChainConfig::new(1).with_step(1, StepConfig::with_prompt("Summarize: {input}"));
/// let element = ChainElement::new(config, ReqwestClient::new());
///
/// let (sink, mut rx) = ChannelSink::channel(16);
/// let frame = Frame::new(1).with_data("message", "Hello");
///
/// let metrics = element.run(Some(frame), &sink).await.unwrap();
/// assert_eq!(metrics.steps_completed, 1);
///
/// drop(sink);
/// let mut count = 0;
/// while rx.recv().await.is_some() {
///     count += 1;
/// }
/// assert_eq!(count, 2); // one step frame, one final frame
/// # });
/// ```
#[derive(Debug)]
pub struct ChainElement<C> {
    config: ChainConfig,
    dispatcher: Dispatcher<C>,
}

impl<C: HttpClient> ChainElement<C> {
    /// Create an element from a resolved configuration and an HTTP transport
    /// for hosted backends.
    pub fn new(config: ChainConfig, client: C) -> Self {
        Self {
            config,
            dispatcher: Dispatcher::new(client),
        }
    }

    /// The element's configuration.
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Process one input frame with a fresh [`ExecutionContext`], returning
    /// the collected metrics.
    pub async fn run<S: FrameSink>(
        &self,
        frame: Option<Frame>,
        sink: &S,
    ) -> Result<ChainMetrics> {
        let ctx = ExecutionContext::new();
        self.run_with_ctx(&ctx, frame, sink).await?;
        Ok(ctx.snapshot())
    }

    /// Process one input frame with a caller-provided execution context.
    ///
    /// Useful when the host shares a context across invocations to aggregate
    /// metrics. Fatal errors are logged and recorded as a trace event before
    /// propagating; no terminal frame is emitted in that case.
    pub async fn run_with_ctx<S: FrameSink>(
        &self,
        ctx: &ExecutionContext,
        frame: Option<Frame>,
        sink: &S,
    ) -> Result<()> {
        match self.execute(ctx, frame, sink).await {
            Ok(()) => Ok(()),
            Err(err) => {
                error!(error = %err, "chain execution failed");
                ctx.emit(ChainEvent::Error {
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn execute<S: FrameSink>(
        &self,
        ctx: &ExecutionContext,
        frame: Option<Frame>,
        sink: &S,
    ) -> Result<()> {
        info!("starting prompt chain execution");

        let frame = frame.ok_or_else(|| Error::Input("missing input frame".to_string()))?;

        let input_text = match frame.extract_text() {
            Some(text) => text,
            None => {
                warn!("no text found in frame side-channel data");
                String::new()
            }
        };
        if input_text.trim().is_empty() {
            return Err(Error::Input("no input text provided for chain".to_string()));
        }

        let num_steps = self.config.num_steps();
        info!(num_steps, "executing chain");

        let mut state = ChainState {
            current_input: input_text.clone(),
            previous_output: None,
            history: Vec::new(),
        };

        for step in 1..=num_steps {
            let step_config = self.config.resolve(step);
            let Some(template) = step_config.prompt.as_deref().filter(|t| !t.is_empty())
            else {
                warn!(step, "step prompt not configured, halting chain");
                ctx.emit(ChainEvent::Halted { step });
                break;
            };

            let started = Instant::now();
            info!(step, backend = %step_config.backend, "executing step");
            ctx.emit(ChainEvent::StepStart {
                step,
                backend: step_config.backend,
            });

            let prompt = format_prompt(
                template,
                &state.current_input,
                state.previous_output.as_deref(),
            );
            let preview: String = prompt.chars().take(100).collect();
            debug!(step, preview = %preview, "step prompt");

            let outcome = self
                .dispatcher
                .dispatch(
                    ctx,
                    step,
                    &prompt,
                    step_config.backend,
                    &step_config.api_key,
                    step_config.temperature,
                )
                .await;

            let output = match outcome {
                DispatchOutcome::Deferred => {
                    ctx.record_deferred();
                    deferred_marker(step)
                }
                DispatchOutcome::Text(text) if text.is_empty() => {
                    warn!(step, "step returned empty output");
                    ctx.record_empty_output();
                    no_output_marker(step)
                }
                DispatchOutcome::Text(text) => text,
                DispatchOutcome::Failed(_) => no_output_marker(step),
            };

            let record = StepRecord {
                step,
                prompt,
                output: output.clone(),
                backend: step_config.backend,
            };
            let overlay = step_overlay(&record, &state.history)?;
            state.history.push(record);
            ctx.record_step();
            ctx.emit(ChainEvent::StepEnd {
                step,
                duration_ms: started.elapsed().as_millis(),
            });

            sink.emit(Emission {
                port: OutputPort::Step(step),
                frame: frame.project(overlay),
            })
            .await?;

            state.previous_output = Some(output.clone());
            state.current_input = output;
        }

        let final_output = state.previous_output.as_deref().unwrap_or(&input_text);
        let overlay = final_overlay(final_output, num_steps, &state.history)?;

        info!(steps_run = state.history.len(), "chain execution complete");
        ctx.emit(ChainEvent::Completed {
            steps_run: state.history.len(),
        });

        sink.emit(Emission {
            port: OutputPort::Final,
            frame: frame.project(overlay),
        })
        .await
    }
}

fn step_overlay(record: &StepRecord, prior: &[StepRecord]) -> Result<Map<String, Value>> {
    let snapshot: Vec<&StepRecord> = prior.iter().chain(std::iter::once(record)).collect();
    let mut overlay = Map::new();
    overlay.insert("chain_step".to_string(), json!(record.step));
    overlay.insert("chain_output".to_string(), json!(record.output));
    overlay.insert("chain_prompt".to_string(), json!(record.prompt));
    overlay.insert("chain_model".to_string(), json!(record.backend.to_string()));
    overlay.insert("chain_history".to_string(), serde_json::to_value(snapshot)?);
    Ok(overlay)
}

fn final_overlay(
    final_output: &str,
    num_steps: usize,
    history: &[StepRecord],
) -> Result<Map<String, Value>> {
    let mut overlay = Map::new();
    overlay.insert("chain_final_output".to_string(), json!(final_output));
    overlay.insert("chain_steps".to_string(), json!(num_steps));
    overlay.insert("chain_history".to_string(), serde_json::to_value(history)?);
    overlay.insert("chain_complete".to_string(), json!(true));
    Ok(overlay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::http::mock::MockHttpClient;
    use crate::backend::{anthropic, openai};
    use crate::output::test_support::CollectingSink;
    use crate::settings::StepConfig;

    fn local_step(template: &str) -> StepConfig {
        StepConfig::with_prompt(template)
    }

    fn input_frame(text: &str) -> Frame {
        Frame::new(1).with_data("message", text)
    }

    fn history_len(frame: &Frame) -> usize {
        frame.other_data["chain_history"].as_array().unwrap().len()
    }

    #[tokio::test]
    async fn single_local_step_emits_pending_marker() {
        // Scenario: one step on the local backend; the engine has no call
        // path to an upstream model, so the step output is the pending
        // marker, carried through to the final frame.
        let config = ChainConfig::new(1).with_step(1, local_step("Process: {input}"));
        let element = ChainElement::new(config, MockHttpClient::new());
        let sink = CollectingSink::new();

        let metrics = element
            .run(Some(input_frame("Hello")), &sink)
            .await
            .unwrap();

        let emissions = sink.take();
        assert_eq!(emissions.len(), 2);
        assert_eq!(emissions[0].port, OutputPort::Step(1));
        assert_eq!(emissions[1].port, OutputPort::Final);

        let step_frame = &emissions[0].frame;
        assert_eq!(step_frame.other_data["chain_step"], json!(1));
        assert_eq!(step_frame.other_data["chain_output"], json!(deferred_marker(1)));
        assert_eq!(step_frame.other_data["chain_prompt"], json!("Process: Hello"));
        assert_eq!(step_frame.other_data["chain_model"], json!("local"));

        let final_frame = &emissions[1].frame;
        assert_eq!(
            final_frame.other_data["chain_final_output"],
            json!(deferred_marker(1))
        );
        assert_eq!(final_frame.other_data["chain_complete"], json!(true));
        assert_eq!(final_frame.other_data["chain_steps"], json!(1));

        assert_eq!(metrics.steps_completed, 1);
        assert_eq!(metrics.deferred_steps, 1);
    }

    #[tokio::test]
    async fn unconfigured_step_halts_cleanly() {
        // Scenario: three declared steps, the second unset. One step frame,
        // then a final frame with the declared count but a one-record history.
        let config = ChainConfig::new(3).with_step(1, local_step("Start: {input}"));
        let element = ChainElement::new(config, MockHttpClient::new());
        let sink = CollectingSink::new();
        let ctx = ExecutionContext::new();

        element
            .run_with_ctx(&ctx, Some(input_frame("go")), &sink)
            .await
            .unwrap();

        let emissions = sink.take();
        assert_eq!(emissions.len(), 2);
        assert_eq!(emissions[0].port, OutputPort::Step(1));
        assert_eq!(emissions[1].port, OutputPort::Final);

        let final_frame = &emissions[1].frame;
        assert_eq!(final_frame.other_data["chain_steps"], json!(3));
        assert_eq!(history_len(final_frame), 1);

        let traces = ctx.trace_snapshot();
        assert!(traces
            .iter()
            .any(|entry| matches!(entry.event, ChainEvent::Halted { step: 2 })));
        assert_eq!(ctx.snapshot().steps_completed, 1);
    }

    #[tokio::test]
    async fn missing_frame_is_a_fatal_input_error() {
        let config = ChainConfig::new(1).with_step(1, local_step("{input}"));
        let element = ChainElement::new(config, MockHttpClient::new());
        let sink = CollectingSink::new();

        let err = element.run(None, &sink).await.unwrap_err();
        assert!(matches!(err, Error::Input(_)));
        assert!(sink.take().is_empty());
    }

    #[tokio::test]
    async fn blank_input_text_is_a_fatal_input_error() {
        let config = ChainConfig::new(1).with_step(1, local_step("{input}"));
        let element = ChainElement::new(config, MockHttpClient::new());
        let sink = CollectingSink::new();

        let err = element
            .run(Some(input_frame("   ")), &sink)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Input(_)));
        assert!(sink.take().is_empty());

        let err = element.run(Some(Frame::new(2)), &sink).await.unwrap_err();
        assert!(matches!(err, Error::Input(_)));
        assert!(sink.take().is_empty());
    }

    #[tokio::test]
    async fn failed_provider_call_degrades_to_marker_and_continues() {
        // Scenario: step 1's provider call fails; its output becomes the
        // no-output marker and step 2 still runs.
        let config = ChainConfig::new(2)
            .with_step(
                1,
                StepConfig::with_prompt("Ask: {input}")
                    .with_backend(Backend::OpenAi)
                    .with_api_key("sk-test"),
            )
            .with_step(2, local_step("Then: {previous}"));
        let client = MockHttpClient::new().with_error(openai::COMPLETIONS_URL, "boom");
        let element = ChainElement::new(config, client);
        let sink = CollectingSink::new();

        let metrics = element.run(Some(input_frame("q")), &sink).await.unwrap();

        let emissions = sink.take();
        assert_eq!(emissions.len(), 3);
        assert_eq!(
            emissions[0].frame.other_data["chain_output"],
            json!(no_output_marker(1))
        );
        // The failed step's marker feeds the next step's prompt.
        assert_eq!(
            emissions[1].frame.other_data["chain_prompt"],
            json!(format!("Then: {}", no_output_marker(1)))
        );
        assert_eq!(history_len(&emissions[2].frame), 2);
        assert_eq!(metrics.steps_completed, 2);
        assert!(metrics.has_failures());
    }

    #[tokio::test]
    async fn empty_provider_output_becomes_no_output_marker() {
        let config = ChainConfig::new(1).with_step(
            1,
            StepConfig::with_prompt("{input}")
                .with_backend(Backend::Anthropic)
                .with_api_key("key"),
        );
        let client = MockHttpClient::new()
            .with_response(anthropic::MESSAGES_URL, json!({"content": []}));
        let element = ChainElement::new(config, client);
        let sink = CollectingSink::new();

        let metrics = element.run(Some(input_frame("q")), &sink).await.unwrap();

        let emissions = sink.take();
        assert_eq!(
            emissions[0].frame.other_data["chain_output"],
            json!(no_output_marker(1))
        );
        assert_eq!(metrics.empty_outputs, 1);
        assert!(!metrics.has_failures());
    }

    #[tokio::test]
    async fn provider_output_threads_into_next_step() {
        let config = ChainConfig::new(2)
            .with_step(
                1,
                StepConfig::with_prompt("Analyze: {input}")
                    .with_backend(Backend::OpenAi)
                    .with_api_key("sk-test"),
            )
            .with_step(
                2,
                StepConfig::with_prompt("Based on {previous}, conclude about {input}")
                    .with_backend(Backend::OpenAi)
                    .with_api_key("sk-test"),
            );
        let client = MockHttpClient::new().with_response(
            openai::COMPLETIONS_URL,
            json!({"choices": [{"message": {"content": "analysis"}}]}),
        );
        let element = ChainElement::new(config, client);
        let sink = CollectingSink::new();

        element.run(Some(input_frame("data")), &sink).await.unwrap();

        let emissions = sink.take();
        // current_input follows the previous output, so both tokens resolve
        // to step 1's output by step 2.
        assert_eq!(
            emissions[1].frame.other_data["chain_prompt"],
            json!("Based on analysis, conclude about analysis")
        );
        assert_eq!(
            emissions[2].frame.other_data["chain_final_output"],
            json!("analysis")
        );
    }

    #[tokio::test]
    async fn history_grows_by_one_record_per_step() {
        let config = ChainConfig::new(3)
            .with_step(1, local_step("a: {input}"))
            .with_step(2, local_step("b: {previous}"))
            .with_step(3, local_step("c: {previous}"));
        let element = ChainElement::new(config, MockHttpClient::new());
        let sink = CollectingSink::new();

        element.run(Some(input_frame("x")), &sink).await.unwrap();

        let emissions = sink.take();
        assert_eq!(emissions.len(), 4);
        for (index, emission) in emissions[..3].iter().enumerate() {
            assert_eq!(emission.port, OutputPort::Step(index + 1));
            assert_eq!(history_len(&emission.frame), index + 1);
        }
        assert_eq!(history_len(&emissions[3].frame), 3);

        // Records stay in step order.
        let history = emissions[3].frame.other_data["chain_history"]
            .as_array()
            .unwrap()
            .clone();
        let steps: Vec<u64> = history
            .iter()
            .map(|record| record["step"].as_u64().unwrap())
            .collect();
        assert_eq!(steps, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn emitted_frames_keep_original_side_channel_keys() {
        let config = ChainConfig::new(1).with_step(1, local_step("{input}"));
        let element = ChainElement::new(config, MockHttpClient::new());
        let sink = CollectingSink::new();

        let frame = input_frame("hi")
            .with_data("source", "camera-2")
            .with_data("sequence", 88);
        element.run(Some(frame.clone()), &sink).await.unwrap();

        for emission in sink.take() {
            for key in frame.other_data.keys() {
                assert!(
                    emission.frame.other_data.contains_key(key),
                    "emitted frame dropped key {key}"
                );
            }
            assert_eq!(emission.frame.other_data["source"], json!("camera-2"));
            assert_eq!(emission.frame.frame_id, frame.frame_id);
        }
    }

    #[tokio::test]
    async fn api_messages_feed_the_first_prompt() {
        let config = ChainConfig::new(1).with_step(1, local_step("Q: {input}"));
        let element = ChainElement::new(config, MockHttpClient::new());
        let sink = CollectingSink::new();

        let frame = Frame::new(1).with_data(
            "api",
            json!([
                {"role": "user", "content": "part one"},
                {"role": "user", "content": [{"type": "text", "text": "part two"}]}
            ]),
        );
        element.run(Some(frame), &sink).await.unwrap();

        let emissions = sink.take();
        assert_eq!(
            emissions[0].frame.other_data["chain_prompt"],
            json!("Q: part one part two")
        );
    }

    #[tokio::test]
    async fn fatal_errors_are_recorded_in_the_trace() {
        let config = ChainConfig::new(1).with_step(1, local_step("{input}"));
        let element = ChainElement::new(config, MockHttpClient::new());
        let sink = CollectingSink::new();
        let ctx = ExecutionContext::new();

        let err = element.run_with_ctx(&ctx, None, &sink).await.unwrap_err();
        assert!(matches!(err, Error::Input(_)));
        assert!(ctx
            .trace_snapshot()
            .iter()
            .any(|entry| matches!(entry.event, ChainEvent::Error { .. })));
    }

    #[test]
    fn markers_are_never_empty_and_name_the_step() {
        assert!(deferred_marker(3).contains('3'));
        assert!(no_output_marker(7).contains('7'));
        assert!(!deferred_marker(1).is_empty());
        assert!(!no_output_marker(1).is_empty());
    }
}
