//! 对话注册表：句柄 -> Conversation
//!
//! 存储是完整记录（只追加）；`build_history` 只取最近 N 轮用于发给模型。
//! 单线程编排下由 Orchestrator 独占 `&mut`，不加锁。

use std::collections::HashMap;

use super::conversation::{ChatMessage, Conversation, ConversationId, Message};

#[derive(Debug, Default, Clone)]
pub struct ConversationStore {
    conversations: HashMap<ConversationId, Conversation>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从快照恢复（会话文件中保存的本地对话）
    pub fn from_snapshot(conversations: Vec<Conversation>) -> Self {
        Self {
            conversations: conversations
                .into_iter()
                .map(|c| (c.id.clone(), c))
                .collect(),
        }
    }

    /// 导出快照，按 id 排序保证输出稳定
    pub fn snapshot(&self) -> Vec<Conversation> {
        let mut all: Vec<Conversation> = self.conversations.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// 生成一个从未出现过的新句柄并登记空对话
    pub fn create(&mut self) -> ConversationId {
        loop {
            let id = uuid::Uuid::new_v4().to_string();
            if !self.conversations.contains_key(&id) {
                self.conversations.insert(id.clone(), Conversation::new(id.clone()));
                return id;
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.conversations.contains_key(id)
    }

    /// 未知句柄时按需创建空对话（本地存储没有远端历史可查）
    pub fn ensure(&mut self, id: &str) -> &mut Conversation {
        self.conversations
            .entry(id.to_string())
            .or_insert_with(|| {
                tracing::debug!(conversation = id, "Creating conversation on first reference");
                Conversation::new(id)
            })
    }

    /// 重建发给模型的历史：system 前言 + 最近 `window` 轮交换 + 新请求
    pub fn build_history(
        &self,
        id: &str,
        preamble: &str,
        window: usize,
        request: &ChatMessage,
    ) -> Vec<ChatMessage> {
        let mut history = vec![ChatMessage::system(preamble)];
        if let Some(conv) = self.conversations.get(id) {
            for msg in conv.recent(window) {
                history.push(msg.ask.clone());
                if let Some(answer) = &msg.answer {
                    history.push(answer.clone());
                }
            }
        }
        history.push(request.clone());
        history
    }

    /// 追加一轮已完成的交换
    pub fn append(&mut self, id: &str, message: Message) {
        self.ensure(id).push(message);
    }

    pub fn message_count(&self, id: &str) -> usize {
        self.conversations.get(id).map(|c| c.len()).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Role;

    fn exchange(q: &str, a: &str) -> Message {
        Message::begin(ChatMessage::user(q)).finish(a)
    }

    #[test]
    fn test_create_returns_fresh_handles() {
        let mut store = ConversationStore::new();
        let a = store.create();
        let b = store.create();
        assert_ne!(a, b);
        assert!(store.contains(&a));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_build_history_is_windowed_but_storage_is_not() {
        let mut store = ConversationStore::new();
        let id = store.create();
        for i in 0..6 {
            store.append(&id, exchange(&format!("q{i}"), &format!("a{i}")));
        }

        let request = ChatMessage::user("next");
        let history = store.build_history(&id, "You are a helpful assistant", 2, &request);

        // system + 2 轮 * 2 + 新请求
        assert_eq!(history.len(), 6);
        assert_eq!(history[0].role, Role::System);
        assert_eq!(history[1].text(), "q4");
        assert_eq!(history[2].text(), "a4");
        assert_eq!(history[4].text(), "a5");
        assert_eq!(history[5].text(), "next");
        assert_eq!(store.message_count(&id), 6);
    }

    #[test]
    fn test_unknown_handle_is_created_on_demand() {
        let mut store = ConversationStore::new();
        let history = store.build_history("restored-id", "pre", 5, &ChatMessage::user("x"));
        assert_eq!(history.len(), 2);

        store.append("restored-id", exchange("x", "y"));
        assert_eq!(store.message_count("restored-id"), 1);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut store = ConversationStore::new();
        let id = store.create();
        store.append(&id, exchange("q", "a"));

        let restored = ConversationStore::from_snapshot(store.snapshot());
        assert_eq!(restored.message_count(&id), 1);
    }
}
