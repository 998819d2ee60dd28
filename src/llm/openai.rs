//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）：OpenAI、Azure 代理、Gemini 兼容层、
//! DeepSeek、本地 gpt4all 等。SDK 错误在这里归类为 LlmError。

use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use super::traits::{non_empty, InvokeOptions, LlmClient, LlmError};
use crate::memory::{ChatMessage, Role};

/// OpenAI 兼容客户端
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    /// 推理类模型（o1 等）只接受默认温度
    send_temperature: bool,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config).with_backoff(single_shot()),
            model: model.to_string(),
            send_temperature: !is_reasoning_model(model),
        }
    }

    /// 转为 API 消息；图片引用在此后端只发送文本部分
    fn to_openai_messages(
        &self,
        messages: &[ChatMessage],
    ) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        messages
            .iter()
            .map(|m| {
                let text = m.text().to_string();
                let built = match m.role {
                    Role::System => ChatCompletionRequestSystemMessageArgs::default()
                        .content(text)
                        .build()
                        .map(ChatCompletionRequestMessage::System),
                    Role::User => ChatCompletionRequestUserMessageArgs::default()
                        .content(text)
                        .build()
                        .map(ChatCompletionRequestMessage::User),
                    Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                        .content(text)
                        .build()
                        .map(ChatCompletionRequestMessage::Assistant),
                };
                built.map_err(classify)
            })
            .collect()
    }
}

/// SDK 内置退避只尝试一次：5xx / 429 原样返回，次数与等待统一由 RetryingLlmClient 决定
fn single_shot() -> backoff::ExponentialBackoff {
    backoff::ExponentialBackoffBuilder::new()
        .with_max_elapsed_time(Some(Duration::ZERO))
        .build()
}

fn is_reasoning_model(model: &str) -> bool {
    model.starts_with("o1") || model.starts_with("gpt-5")
}

/// SDK 错误 -> LlmError
pub(crate) fn classify(err: OpenAIError) -> LlmError {
    match err {
        OpenAIError::Reqwest(e) => LlmError::Transient(e.to_string()),
        OpenAIError::ApiError(api) => classify_api_message(&api.to_string()),
        OpenAIError::InvalidArgument(msg) => LlmError::Client(msg),
        other => LlmError::Unknown(other.to_string()),
    }
}

/// 按 API 返回的错误文本归类
pub(crate) fn classify_api_message(message: &str) -> LlmError {
    let lower = message.to_lowercase();
    if lower.contains("context_length_exceeded")
        || lower.contains("maximum context length")
        || lower.contains("too many tokens")
    {
        LlmError::ContextOverflow(message.to_string())
    } else if lower.contains("rate limit") || lower.contains("rate_limit") {
        LlmError::RateLimited {
            message: message.to_string(),
            retry_after_ms: None,
        }
    } else if lower.contains("server error")
        || lower.contains("overloaded")
        || lower.contains("bad gateway")
        || lower.contains("timed out")
    {
        LlmError::Transient(message.to_string())
    } else if lower.contains("invalid")
        || lower.contains("unsupported")
        || lower.contains("api key")
        || lower.contains("not found")
    {
        LlmError::Client(message.to_string())
    } else {
        LlmError::Unknown(message.to_string())
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        history: &[ChatMessage],
        options: &InvokeOptions,
    ) -> Result<String, LlmError> {
        let model = options.model.as_deref().unwrap_or(&self.model);
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(model).messages(self.to_openai_messages(history)?);
        if self.send_temperature {
            args.temperature(options.temperature);
        }
        let request = args.build().map_err(classify)?;

        let response = self.client.chat().create(request).await.map_err(classify)?;

        if let Some(usage) = &response.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Token usage"
            );
        }

        non_empty(
            response
                .choices
                .first()
                .and_then(|c| c.message.content.clone()),
        )
    }
}
