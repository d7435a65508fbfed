//! The model call, behind the `Llm` trait.

use std::future::Future;

use zonewise_core::PromptExperiment;

use crate::LlmError;

/// One prompt with the sampling settings to send it with.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// `prompt` sent with the experiment's model and sampling settings.
    pub fn for_experiment(experiment: &PromptExperiment, prompt: String) -> Self {
        Self {
            model: experiment.model.clone(),
            prompt,
            temperature: experiment.temperature,
            max_tokens: experiment.max_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub tokens_used: Option<u64>,
}

/// A text-completion backend. No retries happen behind this trait.
pub trait Llm {
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<Completion, LlmError>> + Send;
}

#[cfg(feature = "http")]
pub use http::ChatClient;

#[cfg(feature = "http")]
mod http {
    use std::time::Duration;

    use serde::{Deserialize, Serialize};
    use tracing::info;

    use super::{Completion, CompletionRequest, Llm};
    use crate::LlmError;

    const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

    /// Client for OpenAI-compatible `chat/completions` endpoints (xAI Grok).
    pub struct ChatClient {
        client: reqwest::Client,
        base_url: String,
        api_key: String,
    }

    #[derive(Serialize)]
    struct ChatRequest<'a> {
        model: &'a str,
        messages: [Message<'a>; 1],
        max_tokens: u32,
        temperature: f64,
    }

    #[derive(Serialize)]
    struct Message<'a> {
        role: &'a str,
        content: &'a str,
    }

    #[derive(Deserialize)]
    struct ChatResponse {
        #[serde(default)]
        choices: Vec<Choice>,
        usage: Option<Usage>,
    }

    #[derive(Deserialize)]
    struct Choice {
        message: ChoiceMessage,
    }

    #[derive(Deserialize)]
    struct ChoiceMessage {
        content: Option<String>,
    }

    #[derive(Deserialize)]
    struct Usage {
        total_tokens: Option<u64>,
    }

    impl ChatClient {
        pub const DEFAULT_BASE_URL: &'static str = "https://api.x.ai/v1";

        /// `base_url` is the API root, e.g. `https://api.x.ai/v1`.
        pub fn new(base_url: &str, api_key: &str) -> Result<Self, LlmError> {
            Ok(Self {
                client: reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?,
                base_url: base_url.trim_end_matches('/').to_string(),
                api_key: api_key.to_string(),
            })
        }
    }

    impl Llm for ChatClient {
        async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
            let url = format!("{}/chat/completions", self.base_url);
            let body = ChatRequest {
                model: &request.model,
                messages: [Message {
                    role: "user",
                    content: &request.prompt,
                }],
                max_tokens: request.max_tokens,
                temperature: request.temperature,
            };

            info!(url = %url, model = %request.model, prompt_chars = request.prompt.len(), "requesting completion");
            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(LlmError::Server {
                    status: status.as_u16(),
                    body,
                });
            }

            let chat: ChatResponse = serde_json::from_str(&resp.text().await?)?;
            let tokens_used = chat.usage.and_then(|u| u.total_tokens);
            let text = chat
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .filter(|t| !t.trim().is_empty())
                .ok_or(LlmError::EmptyCompletion)?;
            info!(chars = text.len(), tokens_used, "completion received");
            Ok(Completion { text, tokens_used })
        }
    }

}
