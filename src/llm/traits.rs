//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Anthropic / Mock）实现 LlmClient：给定带角色的历史，返回回复文本。
//! 后端在调用点把各自 SDK 的错误归类为 LlmError，重试循环只看 `FailureKind`，与后端无关。

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::ChatMessage;

/// 闭合的失败分类，决定重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// 连接失败、超时：退避后重试，计入次数
    Transient,
    /// 限流：按限流间隔退避后重试，计入次数
    RateLimited,
    /// 超出上下文窗口：压缩 + 缩窗后立即重试，不计入次数
    ContextOverflow,
    /// 请求本身有误（参数、鉴权、终止性错误）：不重试
    ClientError,
    /// 未归类：按 Transient 处理，计入次数
    Unknown,
}

/// LLM 调用错误（后端归类后的结果与重试层的终止错误）
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Transient network error: {0}")]
    Transient(String),

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_ms: Option<u64>,
    },

    #[error("Context window exceeded: {0}")]
    ContextOverflow(String),

    #[error("Client error: {0}")]
    Client(String),

    #[error("Empty response from model")]
    EmptyResponse,

    #[error("Unexpected error: {0}")]
    Unknown(String),

    #[error(
        "Response is not valid. The most likely reason is the connection to the model backend is not stable"
    )]
    UnstableConnection,

    #[error("Failed to get response after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<LlmError>,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl LlmError {
    pub fn kind(&self) -> FailureKind {
        match self {
            LlmError::Transient(_) | LlmError::EmptyResponse => FailureKind::Transient,
            LlmError::RateLimited { .. } => FailureKind::RateLimited,
            LlmError::ContextOverflow(_) => FailureKind::ContextOverflow,
            LlmError::Unknown(_) => FailureKind::Unknown,
            LlmError::Client(_)
            | LlmError::Configuration(_)
            | LlmError::UnstableConnection
            | LlmError::Exhausted { .. } => FailureKind::ClientError,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            FailureKind::Transient | FailureKind::RateLimited | FailureKind::Unknown
        )
    }
}

/// 单次调用参数
#[derive(Debug, Clone)]
pub struct InvokeOptions {
    /// 目标模型，None 时使用客户端配置的模型
    pub model: Option<String>,
    pub temperature: f32,
    pub timeout: Option<Duration>,
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.5,
            timeout: None,
        }
    }
}

impl InvokeOptions {
    /// 单次调用改用另一个模型
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// LLM 客户端 trait：编排层只依赖这一能力签名
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 后端名（用于日志）
    fn name(&self) -> &str;

    /// 配置的默认模型
    fn model(&self) -> &str;

    /// 给定非空历史，返回回复文本；空回复以 `LlmError::EmptyResponse` 显式报告
    async fn complete(
        &self,
        history: &[ChatMessage],
        options: &InvokeOptions,
    ) -> Result<String, LlmError>;
}

/// 对回复做统一校验：空白回复视为 EmptyResponse
pub(crate) fn non_empty(content: Option<String>) -> Result<String, LlmError> {
    match content {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(LlmError::EmptyResponse),
    }
}
