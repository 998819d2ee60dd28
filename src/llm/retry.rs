//! 重试层：退避重试、限流等待、上下文超限时压缩并缩窗
//!
//! - Transient / Unknown：等待 `error_wait` 后重试，计入次数
//! - RateLimited：等待 `rate_limit_wait` 与服务端 retry-after 中较长者后重试，计入次数
//! - ContextOverflow：压缩最后一条消息 + 窗口减一（下限 `min_history`），立即重试，不计入次数；
//!   已到下限时直接返回错误，因此最多压缩 `初始窗口 - 下限` 次
//! - ClientError：立即失败
//! - EmptyResponse：只容忍一次，第二次升级为 UnstableConnection

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::Instrument;

use super::tokens::TokenEstimator;
use super::traits::{FailureKind, InvokeOptions, LlmClient, LlmError};
use crate::memory::{ChatMessage, Role};

const COMPRESSION_SYSTEM: &str = "You are a helpful assistant.";
const COMPRESSION_REQUEST: &str = "Please reduce the word count of the given message to save tokens. Keep its original meaning so that it can be understood by a large language model. The message is:";

/// 重试策略配置
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 计入次数的最大调用次数（含第一次）
    pub max_attempts: u32,
    /// 网络 / 未知错误后的等待
    pub error_wait: Duration,
    /// 限流后的等待
    pub rate_limit_wait: Duration,
    /// 历史窗口下限
    pub min_history: usize,
    /// 估算 token 超过该值时先压缩再发送
    pub token_limit: Option<usize>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            error_wait: Duration::from_secs(2),
            rate_limit_wait: Duration::from_secs(2),
            min_history: 2,
            token_limit: None,
        }
    }
}

impl RetryConfig {
    fn wait_for(&self, err: &LlmError) -> Duration {
        match err {
            LlmError::RateLimited {
                retry_after_ms: Some(ms),
                ..
            } => self.rate_limit_wait.max(Duration::from_millis(*ms)),
            LlmError::RateLimited { .. } => self.rate_limit_wait,
            _ => self.error_wait,
        }
    }
}

/// 历史窗口（轮数），压缩时收缩；ConversationStore 重建历史时读取同一个值
#[derive(Debug, Clone)]
pub struct HistoryWindow(Arc<AtomicUsize>);

impl HistoryWindow {
    pub fn new(turns: usize) -> Self {
        Self(Arc::new(AtomicUsize::new(turns)))
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    /// 窗口减一，不低于 floor；返回收缩后的值
    pub fn shrink(&self, floor: usize) -> usize {
        let next = self.get().saturating_sub(1).max(floor);
        self.0.store(next, Ordering::Relaxed);
        next
    }
}

/// 生成压缩后的新历史（不修改输入）。
///
/// 开头的 system 前言保留；其余只留最近 `window` 轮问答加上最后的请求，
/// 最后一条的文本替换为 `compressed_last`。
pub fn compress_history(
    history: &[ChatMessage],
    compressed_last: &str,
    window: usize,
) -> Vec<ChatMessage> {
    let (preamble, body) = match history.first() {
        Some(first) if first.role == Role::System => (Some(first), &history[1..]),
        _ => (None, history),
    };

    let keep = window * 2 + 1;
    let start = body.len().saturating_sub(keep);
    let mut out: Vec<ChatMessage> = preamble.into_iter().cloned().collect();
    out.extend(body[start..].iter().cloned());

    if !body.is_empty() {
        if let Some(last) = out.last_mut() {
            last.content = last.content.with_text(compressed_last);
        }
    }
    out
}

/// 带重试的客户端：包装任意后端，对外同样实现 LlmClient
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
    window: HistoryWindow,
    span: tracing::Span,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig, window: HistoryWindow) -> Self {
        let span = tracing::info_span!("llm", backend = inner.name(), model = inner.model());
        Self {
            inner,
            config,
            window,
            span,
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// 当前历史窗口（共享句柄）
    pub fn window(&self) -> &HistoryWindow {
        &self.window
    }

    async fn call(
        &self,
        history: &[ChatMessage],
        options: &InvokeOptions,
    ) -> Result<String, LlmError> {
        match options.timeout {
            Some(limit) => tokio::time::timeout(limit, self.inner.complete(history, options))
                .await
                .map_err(|_| {
                    LlmError::Transient(format!("request timed out after {}s", limit.as_secs()))
                })?,
            None => self.inner.complete(history, options).await,
        }
    }

    /// 让模型改写最后一条消息使其更短；压缩调用本身失败时保留原文
    async fn compress_last(&self, history: &[ChatMessage], options: &InvokeOptions) -> String {
        let original = history.last().map(|m| m.text().to_string()).unwrap_or_default();
        let request = vec![
            ChatMessage::system(COMPRESSION_SYSTEM),
            ChatMessage::user(format!("{COMPRESSION_REQUEST}\n\n{original}")),
        ];
        match self.call(&request, options).await {
            Ok(compressed) => compressed,
            Err(e) => {
                tracing::warn!(error = %e, "Compression request failed, keeping original message");
                original
            }
        }
    }

    /// 一次压缩周期；窗口已到下限时返回 None
    async fn compression_cycle(
        &self,
        history: &[ChatMessage],
        options: &InvokeOptions,
    ) -> Option<Vec<ChatMessage>> {
        if self.window.get() <= self.config.min_history {
            return None;
        }
        let compressed = self.compress_last(history, options).await;
        let window = self.window.shrink(self.config.min_history);
        tracing::warn!(window, "Token size limit reached. The recent message is compressed");
        Some(compress_history(history, &compressed, window))
    }

    async fn invoke(
        &self,
        history: &[ChatMessage],
        options: &InvokeOptions,
    ) -> Result<String, LlmError> {
        if history.is_empty() {
            return Err(LlmError::Client("history must not be empty".to_string()));
        }

        let mut history = history.to_vec();
        if let Some(limit) = self.config.token_limit {
            let estimated = TokenEstimator::estimate_history(&history);
            if estimated > limit {
                tracing::debug!(estimated, limit, "Outgoing history exceeds token limit");
                if let Some(shorter) = self.compression_cycle(&history, options).await {
                    history = shorter;
                }
            }
        }

        let mut attempt: u32 = 0;
        let mut empty_seen = false;

        loop {
            let err = match self.call(&history, options).await {
                Ok(text) => return Ok(text),
                Err(e) => e,
            };

            match err.kind() {
                FailureKind::ContextOverflow => {
                    match self.compression_cycle(&history, options).await {
                        Some(shorter) => {
                            history = shorter;
                            continue;
                        }
                        None => return Err(err),
                    }
                }
                FailureKind::ClientError => {
                    tracing::error!(error = %err, "Request rejected, not retrying");
                    return Err(err);
                }
                kind => {
                    if matches!(err, LlmError::EmptyResponse) {
                        if empty_seen {
                            tracing::error!("Second empty response in this call, giving up");
                            return Err(LlmError::UnstableConnection);
                        }
                        empty_seen = true;
                    }

                    attempt += 1;
                    let wait = self.config.wait_for(&err);
                    tracing::warn!(
                        attempt,
                        max_attempts = self.config.max_attempts,
                        kind = ?kind,
                        wait_ms = wait.as_millis() as u64,
                        error = %err,
                        "Model call failed, waiting before retry"
                    );
                    tokio::time::sleep(wait).await;

                    if attempt >= self.config.max_attempts {
                        return Err(LlmError::Exhausted {
                            attempts: attempt,
                            last: Box::new(err),
                        });
                    }
                }
            }
        }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn complete(
        &self,
        history: &[ChatMessage],
        options: &InvokeOptions,
    ) -> Result<String, LlmError> {
        self.invoke(history, options)
            .instrument(self.span.clone())
            .await
    }
}
