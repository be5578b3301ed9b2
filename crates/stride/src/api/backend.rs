//! Model backend abstraction and the retrying client the agent loop talks to.
//!
//! A [`ModelBackend`] turns one [`ChatRequest`] into one [`ModelResponse`] and
//! classifies its own failures. [`LlmClient`] owns a backend plus the backoff
//! policy, builds requests from a conversation and [`GenerationOptions`], and
//! retries transient failures. Neither keeps state between calls.

use crate::agent::config::GenerationOptions;
use crate::agent::conversation::Conversation;
use crate::api::retry::{RetryConfig, retry_with_backoff};
use crate::error::ProviderError;
use crate::{ChatRequest, ModelResponse, ToolDef};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

/// Boxed future returned by [`ModelBackend::complete`].
pub type BackendFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ModelResponse, ProviderError>> + Send + 'a>>;

/// A chat-completion provider.
///
/// Uses a boxed future so the trait stays dyn-compatible and backends can be
/// swapped at runtime (HTTP in production, scripted in tests).
pub trait ModelBackend: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Perform exactly one request. Implementations must classify failures
    /// as transient or terminal; retrying is the client's job.
    fn complete(&self, request: &ChatRequest) -> BackendFuture<'_>;
}

impl<T: ModelBackend + ?Sized> ModelBackend for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn complete(&self, request: &ChatRequest) -> BackendFuture<'_> {
        (**self).complete(request)
    }
}

// ── Provider selection ─────────────────────────────────────────────

/// Which OpenAI-compatible endpoint an [`HttpBackend`](crate::HttpBackend)
/// talks to. Chosen once at construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    OpenRouter,
    OpenAi,
    /// Zhipu GLM models.
    Zhipu,
    Custom { url: String },
}

impl Provider {
    pub const OPENROUTER_URL: &'static str = "https://openrouter.ai/api/v1/chat/completions";
    pub const OPENAI_URL: &'static str = "https://api.openai.com/v1/chat/completions";
    pub const ZHIPU_URL: &'static str = "https://open.bigmodel.cn/api/paas/v4/chat/completions";

    /// Chat completions endpoint.
    pub fn url(&self) -> &str {
        match self {
            Provider::OpenRouter => Self::OPENROUTER_URL,
            Provider::OpenAi => Self::OPENAI_URL,
            Provider::Zhipu => Self::ZHIPU_URL,
            Provider::Custom { url } => url,
        }
    }

    /// Parse a provider name as accepted on the command line.
    pub fn from_name(name: &str, base_url: Option<&str>) -> Option<Self> {
        if let Some(url) = base_url {
            return Some(Provider::Custom {
                url: url.to_string(),
            });
        }
        match name.to_ascii_lowercase().as_str() {
            "openrouter" => Some(Provider::OpenRouter),
            "openai" => Some(Provider::OpenAi),
            "zhipu" | "glm" => Some(Provider::Zhipu),
            _ => None,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Provider::OpenRouter => "openrouter",
            Provider::OpenAi => "openai",
            Provider::Zhipu => "zhipu",
            Provider::Custom { .. } => "custom",
        }
    }
}

// ── Client ─────────────────────────────────────────────────────────

/// Retrying front-end over a [`ModelBackend`].
pub struct LlmClient {
    backend: Box<dyn ModelBackend>,
    model: String,
    retry: RetryConfig,
}

impl LlmClient {
    pub fn new(backend: impl ModelBackend + 'static, model: impl Into<String>) -> Self {
        Self {
            backend: Box::new(backend),
            model: model.into(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Build the request body for one call.
    pub fn build_request(
        &self,
        conversation: &Conversation,
        tools: &[ToolDef],
        options: &GenerationOptions,
    ) -> ChatRequest {
        let tools = (!tools.is_empty()).then(|| tools.to_vec());
        ChatRequest {
            model: self.model.clone(),
            messages: conversation.messages().to_vec(),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
            top_k: options.top_k,
            parallel_tool_calls: tools.as_ref().map(|_| options.parallel_tool_calls),
            tools,
        }
    }

    /// Send the conversation with the given tool schema.
    ///
    /// Transient failures are retried up to `options.max_retries` times; the
    /// returned error is always terminal.
    pub async fn send(
        &self,
        conversation: &Conversation,
        tools: &[ToolDef],
        options: &GenerationOptions,
    ) -> Result<ModelResponse, ProviderError> {
        let request = self.build_request(conversation, tools, options);
        debug!(
            "{} request: model={}, messages={}, tools={}",
            self.backend.name(),
            request.model,
            request.messages.len(),
            request.tools.as_ref().map_or(0, |t| t.len()),
        );
        retry_with_backoff(&self.retry, options.max_retries, || {
            self.backend.complete(&request)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Message;

    #[test]
    fn provider_urls() {
        assert!(Provider::OpenRouter.url().contains("openrouter.ai"));
        assert!(Provider::Zhipu.url().contains("bigmodel.cn"));
        let custom = Provider::Custom {
            url: "http://localhost:8080/v1/chat/completions".into(),
        };
        assert_eq!(custom.url(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn provider_from_name() {
        assert_eq!(
            Provider::from_name("OpenRouter", None),
            Some(Provider::OpenRouter)
        );
        assert_eq!(Provider::from_name("glm", None), Some(Provider::Zhipu));
        assert_eq!(Provider::from_name("nope", None), None);
        assert_eq!(
            Provider::from_name("openai", Some("http://x")),
            Some(Provider::Custom {
                url: "http://x".into()
            })
        );
    }

    struct NeverCalled;

    impl ModelBackend for NeverCalled {
        fn name(&self) -> &str {
            "never"
        }

        fn complete(&self, _request: &ChatRequest) -> BackendFuture<'_> {
            Box::pin(async { Err(ProviderError::Terminal("unused".into())) })
        }
    }

    #[test]
    fn request_omits_tools_when_empty() {
        let client = LlmClient::new(NeverCalled, "test-model");
        let mut conversation = Conversation::new();
        conversation.push(Message::user("hi"));
        let options = GenerationOptions::default().with_top_k(40);

        let req = client.build_request(&conversation, &[], &options);
        assert_eq!(req.model, "test-model");
        assert!(req.tools.is_none());
        assert!(req.parallel_tool_calls.is_none());
        assert_eq!(req.top_k, Some(40));

        let tools = vec![ToolDef::new("t", "d", serde_json::json!({"type": "object"}))];
        let req = client.build_request(&conversation, &tools, &options);
        assert_eq!(req.tools.as_ref().map(Vec::len), Some(1));
        assert_eq!(req.parallel_tool_calls, Some(options.parallel_tool_calls));
    }
}
