//! One-shot rewriting of the per-chunk instruction.
//!
//! Enhancement only improves answer quality, so it never fails the task:
//! a provider error or an empty reply falls back to the base instruction.

use crate::agent::config::GenerationOptions;
use crate::agent::conversation::Conversation;
use crate::api::backend::LlmClient;
use crate::longctx::prompts::{ENHANCER_SYSTEM_PROMPT, enhancer_message};
use crate::{Message, ModelResponse};
use serde::Serialize;
use tracing::{debug, warn};

/// The instruction a chunk will be processed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Enhancement {
    pub instruction: String,
    /// `false` when the base instruction was kept.
    pub enhanced: bool,
    /// Why enhancement was skipped, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

impl Enhancement {
    fn fallback(base_instruction: &str, reason: String) -> Self {
        Self {
            instruction: base_instruction.to_string(),
            enhanced: false,
            fallback_reason: Some(reason),
        }
    }
}

/// Rewrites terse instructions into detailed, self-contained ones with a
/// single model call and no tools.
pub struct MetaPromptEnhancer<'a> {
    client: &'a LlmClient,
    options: GenerationOptions,
}

impl<'a> MetaPromptEnhancer<'a> {
    pub fn new(client: &'a LlmClient, options: GenerationOptions) -> Self {
        Self { client, options }
    }

    pub async fn enhance(&self, base_instruction: &str, chunk_context_summary: &str) -> Enhancement {
        let conversation = Conversation::from(vec![
            Message::system(ENHANCER_SYSTEM_PROMPT),
            Message::user(enhancer_message(base_instruction, chunk_context_summary)),
        ]);

        match self.client.send(&conversation, &[], &self.options).await {
            Ok(response) => match enhanced_text(&response) {
                Some(instruction) => {
                    debug!(
                        "Enhanced instruction: {} -> {} chars",
                        base_instruction.len(),
                        instruction.len()
                    );
                    Enhancement {
                        instruction,
                        enhanced: true,
                        fallback_reason: None,
                    }
                }
                None => {
                    warn!("Enhancer returned an empty reply; using base instruction");
                    Enhancement::fallback(base_instruction, "empty reply".into())
                }
            },
            Err(e) => {
                warn!("Enhancer call failed: {e}; using base instruction");
                Enhancement::fallback(base_instruction, e.to_string())
            }
        }
    }
}

fn enhanced_text(response: &ModelResponse) -> Option<String> {
    response
        .content
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChatRequest;
    use crate::api::backend::{BackendFuture, ModelBackend};
    use crate::api::retry::RetryConfig;
    use crate::error::ProviderError;
    use std::sync::Mutex;

    struct Once(Mutex<Option<Result<ModelResponse, ProviderError>>>);

    impl ModelBackend for Once {
        fn name(&self) -> &str {
            "once"
        }

        fn complete(&self, request: &ChatRequest) -> BackendFuture<'_> {
            assert!(request.tools.is_none());
            let next = self.0.lock().unwrap().take();
            Box::pin(async move { next.unwrap_or_else(|| Err(ProviderError::Terminal("done".into()))) })
        }
    }

    fn client(reply: Result<ModelResponse, ProviderError>) -> LlmClient {
        LlmClient::new(Once(Mutex::new(Some(reply))), "m").with_retry(RetryConfig::immediate())
    }

    #[tokio::test]
    async fn uses_model_reply() {
        let client = client(Ok(ModelResponse::text("  Detailed instruction.  ")));
        let out = MetaPromptEnhancer::new(&client, GenerationOptions::default())
            .enhance("find names", "chunk 1 of 3")
            .await;
        assert!(out.enhanced);
        assert_eq!(out.instruction, "Detailed instruction.");
    }

    #[tokio::test]
    async fn falls_back_on_provider_error() {
        let client = client(Err(ProviderError::Terminal("HTTP 401: bad key".into())));
        let out = MetaPromptEnhancer::new(&client, GenerationOptions::default().with_retries(0))
            .enhance("find names", "chunk 1 of 3")
            .await;
        assert!(!out.enhanced);
        assert_eq!(out.instruction, "find names");
        assert!(out.fallback_reason.unwrap().contains("401"));
    }

    #[tokio::test]
    async fn falls_back_on_empty_reply() {
        let client = client(Ok(ModelResponse::text("   ")));
        let out = MetaPromptEnhancer::new(&client, GenerationOptions::default())
            .enhance("find names", "chunk 1 of 3")
            .await;
        assert!(!out.enhanced);
        assert_eq!(out.instruction, "find names");
    }
}
