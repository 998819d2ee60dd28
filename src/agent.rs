//! Agent 会话：角色 + 重试客户端 + 对话句柄
//!
//! `start` 总是新开对话（只发送 primer，不带历史）；`send` 按窗口重建历史后调用模型，
//! 成功后向对话追加一条 Message。对话记录由调用方持有的 ConversationStore 保存。

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::core::error::{CopilotError, Result};
use crate::llm::{InvokeOptions, LlmClient, RetryingLlmClient};
use crate::memory::{ChatMessage, ConversationId, ConversationStore, Message};

/// 每次调用固定的 system 前言
pub const SYSTEM_PREAMBLE: &str = "You are a helpful assistant";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Planner,
    Generator,
    Reflector,
    Analyst,
}

impl AgentRole {
    pub const ALL: [AgentRole; 4] = [
        AgentRole::Planner,
        AgentRole::Generator,
        AgentRole::Reflector,
        AgentRole::Analyst,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Planner => "planner",
            AgentRole::Generator => "generator",
            AgentRole::Reflector => "reflector",
            AgentRole::Analyst => "analyst",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgentRole::Planner => "Planner",
            AgentRole::Generator => "Generator",
            AgentRole::Reflector => "Reflector",
            AgentRole::Analyst => "Analyst",
        };
        f.write_str(name)
    }
}

pub struct AgentSession {
    role: AgentRole,
    client: Arc<RetryingLlmClient>,
    options: InvokeOptions,
    conversation: Option<ConversationId>,
    span: tracing::Span,
}

impl AgentSession {
    pub fn new(role: AgentRole, client: Arc<RetryingLlmClient>, options: InvokeOptions) -> Self {
        let span = tracing::info_span!("agent", role = role.as_str());
        Self {
            role,
            client,
            options,
            conversation: None,
            span,
        }
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation.as_deref()
    }

    /// 绑定已有对话（恢复会话，或与其他 Agent 共享同一对话）
    pub fn attach(&mut self, id: impl Into<ConversationId>) {
        self.conversation = Some(id.into());
    }

    /// 新开对话：发送 primer，返回 (回复, 新句柄)
    pub async fn start(
        &mut self,
        store: &mut ConversationStore,
        primer: &str,
    ) -> Result<(String, ConversationId)> {
        let ask = ChatMessage::user(primer);
        let message = Message::begin(ask.clone());
        let history = vec![ChatMessage::system(SYSTEM_PREAMBLE), ask];

        let reply = self
            .client
            .complete(&history, &self.options)
            .instrument(self.span.clone())
            .await?;

        let id = store.create();
        store.append(&id, message.finish(reply.clone()));
        tracing::info!(parent: &self.span, conversation = %id, "Conversation started");
        self.conversation = Some(id.clone());
        Ok((reply, id))
    }

    /// 在当前对话上发送一条文本
    pub async fn send(&self, store: &mut ConversationStore, text: &str) -> Result<String> {
        self.exchange(store, ChatMessage::user(text)).await
    }

    /// 发送文本 + 图片引用
    pub async fn send_with_image(
        &self,
        store: &mut ConversationStore,
        text: &str,
        image_url: &str,
    ) -> Result<String> {
        self.exchange(store, ChatMessage::user_with_image(text, image_url))
            .await
    }

    async fn exchange(&self, store: &mut ConversationStore, request: ChatMessage) -> Result<String> {
        let id = self
            .conversation
            .clone()
            .ok_or(CopilotError::NoConversation(self.role))?;

        let history = store.build_history(
            &id,
            SYSTEM_PREAMBLE,
            self.client.window().get(),
            &request,
        );
        let message = Message::begin(request);

        let reply = self
            .client
            .complete(&history, &self.options)
            .instrument(self.span.clone())
            .await?;

        store.append(&id, message.finish(reply.clone()));
        tracing::debug!(parent: &self.span, conversation = %id, "Exchange recorded");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{HistoryWindow, LlmError, RetryConfig, ScriptedLlmClient};
    use crate::memory::Role;

    fn session(script: Arc<ScriptedLlmClient>) -> AgentSession {
        let client = Arc::new(RetryingLlmClient::new(
            script,
            RetryConfig::default(),
            HistoryWindow::new(5),
        ));
        AgentSession::new(AgentRole::Planner, client, InvokeOptions::default())
    }

    #[tokio::test]
    async fn test_start_returns_fresh_handle() {
        let script = Arc::new(ScriptedLlmClient::with_replies(["ok", "ok again"]));
        let mut agent = session(script.clone());
        let mut store = ConversationStore::new();

        let (_, first) = agent.start(&mut store, "primer").await.unwrap();
        let (_, second) = agent.start(&mut store, "primer").await.unwrap();

        assert_ne!(first, second);
        assert_eq!(agent.conversation_id(), Some(second.as_str()));
        // start 只发送 system + primer
        assert_eq!(script.histories()[1].len(), 2);
    }

    #[tokio::test]
    async fn test_send_appends_one_message_and_replays_history() {
        let script = Arc::new(ScriptedLlmClient::with_replies(["primed", "r1", "r2"]));
        let mut agent = session(script.clone());
        let mut store = ConversationStore::new();

        let (_, id) = agent.start(&mut store, "primer").await.unwrap();
        agent.send(&mut store, "q1").await.unwrap();
        assert_eq!(store.message_count(&id), 2);
        agent.send(&mut store, "q2").await.unwrap();
        assert_eq!(store.message_count(&id), 3);

        let last = script.last_history().unwrap();
        let texts: Vec<&str> = last.iter().map(|m| m.text()).collect();
        assert_eq!(
            texts,
            vec![SYSTEM_PREAMBLE, "primer", "primed", "q1", "r1", "q2"]
        );
        assert_eq!(last[0].role, Role::System);
    }

    #[tokio::test]
    async fn test_send_without_conversation_fails() {
        let script = Arc::new(ScriptedLlmClient::with_replies(["unused"]));
        let agent = session(script.clone());
        let mut store = ConversationStore::new();

        let err = agent.send(&mut store, "q").await.unwrap_err();
        assert!(matches!(err, CopilotError::NoConversation(AgentRole::Planner)));
        assert_eq!(script.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_call_records_nothing() {
        let script = Arc::new(ScriptedLlmClient::new(vec![
            Ok("primed".into()),
            Err(LlmError::Client("bad request".into())),
        ]));
        let mut agent = session(script);
        let mut store = ConversationStore::new();

        let (_, id) = agent.start(&mut store, "primer").await.unwrap();
        let err = agent.send(&mut store, "q").await.unwrap_err();
        assert!(matches!(err, CopilotError::Llm(LlmError::Client(_))));
        assert_eq!(store.message_count(&id), 1);
    }

    #[tokio::test]
    async fn test_attached_unknown_handle_created_lazily() {
        let script = Arc::new(ScriptedLlmClient::with_replies(["r"]));
        let mut agent = session(script);
        let mut store = ConversationStore::new();

        agent.attach("restored");
        agent.send(&mut store, "q").await.unwrap();
        assert_eq!(store.message_count("restored"), 1);
    }

    #[tokio::test]
    async fn test_send_with_image_keeps_reference() {
        let script = Arc::new(ScriptedLlmClient::with_replies(["primed", "a screenshot"]));
        let mut agent = session(script.clone());
        let mut store = ConversationStore::new();

        agent.start(&mut store, "primer").await.unwrap();
        let reply = agent
            .send_with_image(&mut store, "what is shown?", "https://x/shot.png")
            .await
            .unwrap();

        assert_eq!(reply, "a screenshot");
        let request = script.last_history().unwrap().pop().unwrap();
        assert_eq!(request.text(), "what is shown?");
        assert_eq!(request.content.image_url(), Some("https://x/shot.png"));
    }
}
