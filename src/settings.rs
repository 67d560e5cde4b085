//! Chain configuration resolved from the host's settings store.
//!
//! The host exposes a flat key-value surface: `num_steps` plus
//! `step{i}_prompt`, `step{i}_model`, `step{i}_api_key` and
//! `step{i}_temperature` for each step 1..=10. [`ChainConfig::from_settings`]
//! parses that surface exactly once into an indexed sequence of
//! [`StepConfig`] entries, so per-step resolution during execution is a plain
//! array lookup.

use serde_json::{Map, Value};

use crate::backend::Backend;
use crate::error::{Error, Result};

/// Maximum number of configurable steps in a chain.
pub const MAX_STEPS: usize = 10;

/// Declared step count when the host does not set `num_steps`.
pub const DEFAULT_NUM_STEPS: usize = 2;

/// Sampling temperature when the host does not set `step{i}_temperature`.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Resolved configuration for one chain step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepConfig {
    /// Prompt template; `None` or empty marks the step unconfigured.
    pub prompt: Option<String>,
    /// Backend the step dispatches to.
    pub backend: Backend,
    /// Credential for hosted backends; empty when not provided.
    pub api_key: String,
    /// Sampling temperature in `[0, 1]`.
    pub temperature: f64,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            prompt: None,
            backend: Backend::Local,
            api_key: String::new(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl StepConfig {
    /// Create a configured step with the given template and defaults
    /// elsewhere.
    pub fn with_prompt(template: impl Into<String>) -> Self {
        Self {
            prompt: Some(template.into()),
            ..Self::default()
        }
    }

    /// Set the backend, returning the config for chaining.
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Set the credential, returning the config for chaining.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Set the temperature (clamped to `[0, 1]`), returning the config for
    /// chaining.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature.clamp(0.0, 1.0);
        self
    }

    /// Whether this step has a usable prompt template.
    ///
    /// An unconfigured step is the chain's halt signal, not a skip.
    pub fn is_configured(&self) -> bool {
        self.prompt.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// An ordered sequence of step configurations plus the declared step count.
///
/// The step count is clamped to `[1, MAX_STEPS]`; entries beyond it are never
/// read during execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainConfig {
    num_steps: usize,
    steps: Vec<StepConfig>,
}

impl ChainConfig {
    /// Create a configuration with `num_steps` declared steps, all at their
    /// defaults (and therefore unconfigured until a prompt is set).
    pub fn new(num_steps: usize) -> Self {
        Self {
            num_steps: num_steps.clamp(1, MAX_STEPS),
            steps: vec![StepConfig::default(); MAX_STEPS],
        }
    }

    /// Replace the configuration of step `step` (1-based), returning the
    /// config for chaining.
    ///
    /// # Panics
    ///
    /// Panics when `step` is outside `1..=MAX_STEPS`.
    pub fn with_step(mut self, step: usize, config: StepConfig) -> Self {
        assert!(
            (1..=MAX_STEPS).contains(&step),
            "step index {step} outside 1..={MAX_STEPS}"
        );
        self.steps[step - 1] = config;
        self
    }

    /// Build the configuration from the host's flat settings map.
    ///
    /// Missing optional fields fall back to their documented defaults
    /// (backend `local`, empty credential, temperature 0.7). An unknown
    /// `step{i}_model` value is rejected with [`Error::Settings`].
    pub fn from_settings(settings: &Map<String, Value>) -> Result<Self> {
        let num_steps = settings
            .get("num_steps")
            .and_then(Value::as_u64)
            .map_or(DEFAULT_NUM_STEPS, |n| n as usize)
            .clamp(1, MAX_STEPS);

        let mut steps = Vec::with_capacity(MAX_STEPS);
        for step in 1..=MAX_STEPS {
            let prompt = settings
                .get(&format!("step{step}_prompt"))
                .and_then(Value::as_str)
                .map(str::to_string);
            let backend = match settings
                .get(&format!("step{step}_model"))
                .and_then(Value::as_str)
            {
                Some(name) => name
                    .parse::<Backend>()
                    .map_err(|_| Error::Settings(format!("step{step}_model: unknown backend '{name}'")))?,
                None => Backend::Local,
            };
            let api_key = settings
                .get(&format!("step{step}_api_key"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let temperature = settings
                .get(&format!("step{step}_temperature"))
                .and_then(Value::as_f64)
                .unwrap_or(DEFAULT_TEMPERATURE)
                .clamp(0.0, 1.0);

            steps.push(StepConfig {
                prompt,
                backend,
                api_key,
                temperature,
            });
        }

        Ok(Self { num_steps, steps })
    }

    /// The declared number of steps, already clamped to `[1, MAX_STEPS]`.
    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    /// Resolve the configuration for step `step` (1-based).
    pub fn resolve(&self, step: usize) -> &StepConfig {
        &self.steps[step - 1]
    }
}
