//! Configuration types for the [`Harness`](super::harness::Harness).
//!
//! ```ignore
//! let config = AgentConfig::new()
//!     .with_max_steps(30)
//!     .with_generation(GenerationOptions::default().with_max_tokens(4096).with_retries(3))
//!     .with_task_timeout(Duration::from_secs(600));
//! ```

use crate::agent::prompt::DEFAULT_SYSTEM_PROMPT;
use std::time::Duration;

// ── Generation options ─────────────────────────────────────────────

/// Per-call sampling and transport options handed to
/// [`LlmClient::send`](crate::api::backend::LlmClient::send).
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    /// Maximum tokens per model response.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    /// Whether the model may request several tools in one response, and
    /// whether the harness dispatches them concurrently.
    pub parallel_tool_calls: bool,
    /// Retries for transient provider failures (0 = fail on the first one).
    pub max_retries: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.5,
            top_p: None,
            top_k: None,
            parallel_tool_calls: false,
            max_retries: 3,
        }
    }
}

impl GenerationOptions {
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_parallel_tool_calls(mut self, parallel: bool) -> Self {
        self.parallel_tool_calls = parallel;
        self
    }

    /// Enable automatic retries for transient API failures (429, 5xx,
    /// network errors). Uses exponential backoff with jitter.
    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

// ── Agent config ───────────────────────────────────────────────────

/// Configuration for one step loop.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum model calls (steps) per task.
    pub max_steps: u32,
    /// Options for every model call made by the loop.
    pub generation: GenerationOptions,
    /// System prompt seeded at the start of each task.
    pub system_prompt: String,
    /// Wall-clock limit for a whole task. `None` means unbounded.
    pub task_timeout: Option<Duration>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 20,
            generation: GenerationOptions::default(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            task_timeout: None,
        }
    }
}

impl AgentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the step budget.
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_generation(mut self, generation: GenerationOptions) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Fail the task with a timeout once this much wall-clock time has passed.
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = AgentConfig::new()
            .with_max_steps(3)
            .with_generation(GenerationOptions::default().with_retries(0).with_top_p(0.9))
            .with_task_timeout(Duration::from_secs(5));
        assert_eq!(config.max_steps, 3);
        assert_eq!(config.generation.max_retries, 0);
        assert_eq!(config.generation.top_p, Some(0.9));
        assert_eq!(config.task_timeout, Some(Duration::from_secs(5)));
        assert!(!config.system_prompt.is_empty());
    }
}
