//! Anthropic Messages API 客户端（reqwest 直连）
//!
//! system 消息单独放在 `system` 字段；图片引用以 url source 的 image 块发送。
//! HTTP 状态码在这里归类为 LlmError。

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};

use super::traits::{non_empty, InvokeOptions, LlmClient, LlmError};
use crate::memory::{ChatMessage, Content, Role};

const API_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const MAX_TOKENS: u32 = 4096;

pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .unwrap_or_default();
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
        }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Ok(val) = HeaderValue::from_str(&self.api_key) {
            headers.insert("x-api-key", val);
        }
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        headers
    }

    fn request_body(&self, history: &[ChatMessage], options: &InvokeOptions) -> Value {
        let system: Vec<&str> = history
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.text())
            .collect();

        let messages: Vec<Value> = history
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                let role = if m.role == Role::Assistant {
                    "assistant"
                } else {
                    "user"
                };
                json!({ "role": role, "content": content_blocks(&m.content) })
            })
            .collect();

        let mut body = json!({
            "model": options.model.as_deref().unwrap_or(&self.model),
            "max_tokens": MAX_TOKENS,
            "temperature": options.temperature,
            "messages": messages,
        });
        if !system.is_empty() {
            body["system"] = Value::String(system.join("\n"));
        }
        body
    }
}

fn content_blocks(content: &Content) -> Value {
    match content {
        Content::Text(text) => json!([{ "type": "text", "text": text }]),
        Content::TextWithImage { text, image_url } => json!([
            { "type": "image", "source": { "type": "url", "url": image_url } },
            { "type": "text", "text": text },
        ]),
    }
}

/// HTTP 状态 + 响应体 -> LlmError
pub(crate) fn classify_status(status: u16, body: &str, retry_after: Option<u64>) -> LlmError {
    match status {
        429 => LlmError::RateLimited {
            message: body.to_string(),
            retry_after_ms: retry_after.map(|s| s * 1000),
        },
        400 | 413 if body.contains("prompt is too long") || body.contains("too many tokens") => {
            LlmError::ContextOverflow(body.to_string())
        }
        400..=499 => LlmError::Client(format!("HTTP {status}: {body}")),
        500..=599 => LlmError::Transient(format!("HTTP {status}: {body}")),
        _ => LlmError::Unknown(format!("HTTP {status}: {body}")),
    }
}

/// 错误响应体；读取失败时把原因写进消息
fn error_body<E: std::fmt::Display>(read: Result<String, E>) -> String {
    match read {
        Ok(body) => body,
        Err(e) => format!("<failed to read response body: {e}>"),
    }
}

fn classify_transport(err: reqwest::Error) -> LlmError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        LlmError::Transient(err.to_string())
    } else {
        LlmError::Unknown(err.to_string())
    }
}

/// 拼接响应中的全部 text 块
fn extract_text(body: &Value) -> Option<String> {
    let blocks = body.get("content")?.as_array()?;
    let text: String = blocks
        .iter()
        .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
        .collect();
    Some(text)
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        history: &[ChatMessage],
        options: &InvokeOptions,
    ) -> Result<String, LlmError> {
        let resp = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .headers(self.headers())
            .json(&self.request_body(history, options))
            .send()
            .await
            .map_err(classify_transport)?;

        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        if status != 200 {
            let body = error_body(resp.text().await);
            return Err(classify_status(status, &body, retry_after));
        }

        let body: Value = resp.json().await.map_err(classify_transport)?;
        non_empty(extract_text(&body))
    }
}
