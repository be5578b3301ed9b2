//! Model API layer: backend abstraction, provider selection and retry.
//!
//! - [`backend`]: the [`ModelBackend`] trait, [`Provider`] endpoints and the
//!   retrying [`LlmClient`] used by the agent loop.
//! - [`retry`]: exponential backoff with jitter. Only transient provider
//!   failures (429, 408, 5xx, network faults) are retried.

pub mod backend;
pub mod retry;

pub use backend::{BackendFuture, LlmClient, ModelBackend, Provider};
pub use retry::RetryConfig;
