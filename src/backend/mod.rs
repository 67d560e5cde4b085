//! Text-generation backends and per-step dispatch.
//!
//! Each configured step names one [`Backend`]. Hosted providers are called
//! through the [`HttpClient`](http::HttpClient) seam with exactly one attempt
//! per step; the `local` backend has no call path inside the engine at all —
//! it marks the step as awaiting an upstream-connected model.
//!
//! The dispatcher never raises. Provider failures of any kind are folded into
//! [`DispatchOutcome::Failed`] so a broken step degrades to a placeholder
//! output instead of aborting the chain.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::context::ExecutionContext;
use crate::error::Error;

pub mod anthropic;
pub mod http;
pub mod openai;

use http::HttpClient;

/// Token budget for a single hosted-provider completion.
pub(crate) const MAX_COMPLETION_TOKENS: u32 = 1000;

/// The text-generation target for a chain step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// An upstream-connected model in another pipeline stage. The engine has
    /// no direct call path to it and defers the step's output.
    #[default]
    Local,
    /// OpenAI chat completions.
    OpenAi,
    /// Anthropic messages.
    Anthropic,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::Local => "local",
            Backend::OpenAi => "openai",
            Backend::Anthropic => "anthropic",
        })
    }
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Backend::Local),
            "openai" => Ok(Backend::OpenAi),
            "anthropic" => Ok(Backend::Anthropic),
            other => Err(Error::Settings(format!("unknown backend '{other}'"))),
        }
    }
}

/// A failure inside a hosted-provider call.
///
/// These never escape the dispatcher; they become
/// [`DispatchOutcome::Failed`] diagnostics.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The step selected a hosted provider without supplying a credential.
    #[error("missing api key")]
    MissingApiKey,

    /// The request could not be sent or completed.
    #[error("request failed: {0}")]
    Request(String),

    /// The provider answered with a non-success status.
    #[error("http {status}: {body}")]
    Status { status: u16, body: String },

    /// The provider's response body did not match its contract.
    #[error("malformed response: {0}")]
    Parse(String),
}

/// Text produced by one hosted-provider call, with reported token usage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Completion {
    /// Response text; may legitimately be empty.
    pub text: String,
    /// Prompt tokens reported by the provider, when available.
    pub prompt_tokens: usize,
    /// Completion tokens reported by the provider, when available.
    pub completion_tokens: usize,
}

/// The result of dispatching one step's prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The step targets the local backend; output must come from an
    /// upstream-connected model the engine cannot invoke itself.
    Deferred,
    /// The provider answered. Empty text is permitted.
    Text(String),
    /// The provider call failed; the diagnostic is carried for logging and
    /// metrics, and the step degrades to a placeholder output.
    Failed(String),
}

/// Routes a formatted prompt to the backend a step selected.
///
/// At most one provider attempt per step; no retries.
#[derive(Debug)]
pub struct Dispatcher<C> {
    client: C,
}

impl<C: HttpClient> Dispatcher<C> {
    /// Create a dispatcher issuing provider calls through `client`.
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Obtain step output for `prompt` from `backend`.
    ///
    /// Never returns an error: provider failures are reported as
    /// [`DispatchOutcome::Failed`] and recorded on `ctx`.
    pub async fn dispatch(
        &self,
        ctx: &ExecutionContext,
        step: usize,
        prompt: &str,
        backend: Backend,
        api_key: &str,
        temperature: f64,
    ) -> DispatchOutcome {
        let result = match backend {
            Backend::Local => {
                info!(step, "local backend selected, deferring to upstream model");
                return DispatchOutcome::Deferred;
            }
            Backend::OpenAi => {
                openai::complete(&self.client, api_key, prompt, temperature).await
            }
            Backend::Anthropic => {
                anthropic::complete(&self.client, api_key, prompt, temperature).await
            }
        };

        match result {
            Ok(completion) => {
                info!(step, backend = %backend, "backend response received");
                ctx.record_tokens(completion.prompt_tokens, completion.completion_tokens);
                DispatchOutcome::Text(completion.text)
            }
            Err(err) => {
                warn!(step, backend = %backend, error = %err, "backend call failed");
                ctx.record_failure(err.to_string());
                DispatchOutcome::Failed(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::http::mock::MockHttpClient;
    use super::*;

    #[tokio::test]
    async fn local_backend_defers() {
        let dispatcher = Dispatcher::new(MockHttpClient::new());
        let ctx = ExecutionContext::new();

        let outcome = dispatcher
            .dispatch(&ctx, 1, "prompt", Backend::Local, "", 0.7)
            .await;

        assert_eq!(outcome, DispatchOutcome::Deferred);
        assert!(ctx.snapshot().failures.is_empty());
    }

    #[tokio::test]
    async fn provider_failure_becomes_failed_outcome() {
        let client = MockHttpClient::new().with_error(openai::COMPLETIONS_URL, "connection reset");
        let dispatcher = Dispatcher::new(client);
        let ctx = ExecutionContext::new();

        let outcome = dispatcher
            .dispatch(&ctx, 2, "prompt", Backend::OpenAi, "sk-test", 0.7)
            .await;

        match outcome {
            DispatchOutcome::Failed(diagnostic) => {
                assert!(diagnostic.contains("connection reset"))
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(ctx.snapshot().failures.len(), 1);
    }

    #[tokio::test]
    async fn missing_api_key_fails_without_a_request() {
        let dispatcher = Dispatcher::new(MockHttpClient::new());
        let ctx = ExecutionContext::new();

        let outcome = dispatcher
            .dispatch(&ctx, 1, "prompt", Backend::Anthropic, "", 0.7)
            .await;

        match outcome {
            DispatchOutcome::Failed(diagnostic) => assert!(diagnostic.contains("missing api key")),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn successful_call_records_token_usage() {
        let response = serde_json::json!({
            "choices": [{"message": {"content": "answer"}}],
            "usage": {"prompt_tokens": 11, "completion_tokens": 4}
        });
        let client = MockHttpClient::new().with_response(openai::COMPLETIONS_URL, response);
        let dispatcher = Dispatcher::new(client);
        let ctx = ExecutionContext::new();

        let outcome = dispatcher
            .dispatch(&ctx, 1, "prompt", Backend::OpenAi, "sk-test", 0.2)
            .await;

        assert_eq!(outcome, DispatchOutcome::Text("answer".to_string()));
        let metrics = ctx.snapshot();
        assert_eq!(metrics.prompt_tokens, 11);
        assert_eq!(metrics.completion_tokens, 4);
    }

    #[test]
    fn backend_parses_settings_values() {
        assert_eq!("local".parse::<Backend>().unwrap(), Backend::Local);
        assert_eq!("openai".parse::<Backend>().unwrap(), Backend::OpenAi);
        assert_eq!("anthropic".parse::<Backend>().unwrap(), Backend::Anthropic);
        assert!("gpt4all".parse::<Backend>().is_err());
    }

    #[test]
    fn backend_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(Backend::OpenAi).unwrap(),
            serde_json::json!("openai")
        );
    }
}
