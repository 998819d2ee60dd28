//! Mock LLM 客户端（用于测试，无需 API）
//!
//! - `MockLlmClient`：回显最后一条 User 消息，`--model mock` 时离线跑通整个流程
//! - `ScriptedLlmClient`：按顺序返回预设结果，并记录每次收到的历史

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::traits::{InvokeOptions, LlmClient, LlmError};
use crate::memory::{ChatMessage, Role};

/// Mock 客户端：回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock"
    }

    async fn complete(
        &self,
        history: &[ChatMessage],
        _options: &InvokeOptions,
    ) -> Result<String, LlmError> {
        let last_user = history
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.text())
            .unwrap_or("(no input)");
        let first_line = last_user.lines().next().unwrap_or_default();
        Ok(format!("Echo from Mock: {first_line}"))
    }
}

#[derive(Debug, Default)]
struct Script {
    replies: VecDeque<Result<String, LlmError>>,
    delays: VecDeque<Duration>,
    calls: Vec<Vec<ChatMessage>>,
}

/// 脚本客户端：回复用尽后返回 fallback（未设置时返回 Client 错误）
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    script: Mutex<Script>,
    fallback: Option<String>,
}

impl ScriptedLlmClient {
    pub fn new(replies: Vec<Result<String, LlmError>>) -> Self {
        Self {
            script: Mutex::new(Script {
                replies: replies.into(),
                ..Default::default()
            }),
            fallback: None,
        }
    }

    /// 全部成功的回复序列
    pub fn with_replies<S: Into<String>>(replies: impl IntoIterator<Item = S>) -> Self {
        Self::new(replies.into_iter().map(|r| Ok(r.into())).collect())
    }

    /// 每次调用前的延迟（按顺序消耗）
    pub fn with_delays(self, delays: Vec<Duration>) -> Self {
        self.lock().delays = delays.into();
        self
    }

    pub fn with_fallback(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push_reply(&self, reply: Result<String, LlmError>) {
        self.lock().replies.push_back(reply);
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// 每次调用收到的完整历史
    pub fn histories(&self) -> Vec<Vec<ChatMessage>> {
        self.lock().calls.clone()
    }

    pub fn last_history(&self) -> Option<Vec<ChatMessage>> {
        self.lock().calls.last().cloned()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        history: &[ChatMessage],
        _options: &InvokeOptions,
    ) -> Result<String, LlmError> {
        let (delay, reply) = {
            let mut script = self.lock();
            script.calls.push(history.to_vec());
            (script.delays.pop_front(), script.replies.pop_front())
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match reply {
            Some(reply) => reply,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| LlmError::Client("no scripted reply left".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_echoes_last_user_message() {
        let reply = MockLlmClient
            .complete(
                &[ChatMessage::system("s"), ChatMessage::user("hello\nworld")],
                &InvokeOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(reply, "Echo from Mock: hello");
    }

    #[tokio::test]
    async fn test_scripted_replies_in_order_then_fallback() {
        let client = ScriptedLlmClient::with_replies(["one", "two"]).with_fallback("more");
        let history = [ChatMessage::user("q")];
        let options = InvokeOptions::default();

        assert_eq!(client.complete(&history, &options).await.unwrap(), "one");
        assert_eq!(client.complete(&history, &options).await.unwrap(), "two");
        assert_eq!(client.complete(&history, &options).await.unwrap(), "more");
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_scripted_without_fallback_errors() {
        let client = ScriptedLlmClient::new(vec![]);
        let result = client
            .complete(&[ChatMessage::user("q")], &InvokeOptions::default())
            .await;
        assert!(matches!(result, Err(LlmError::Client(_))));
    }
}
