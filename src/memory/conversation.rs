//! 对话记录：消息角色、请求内容、单轮交换（Message）与对话（Conversation）
//!
//! Conversation 只追加不裁剪；发给模型的历史由 ConversationStore 按窗口重建。

use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 对话句柄（本地生成的 UUID 或后端分配的 ID）
pub type ConversationId = String;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// 消息内容：纯文本，或文本 + 图片引用
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    TextWithImage { text: String, image_url: String },
}

impl Content {
    /// 文本部分（不支持图片的后端只发送这一部分）
    pub fn text(&self) -> &str {
        match self {
            Content::Text(t) => t,
            Content::TextWithImage { text, .. } => text,
        }
    }

    pub fn image_url(&self) -> Option<&str> {
        match self {
            Content::Text(_) => None,
            Content::TextWithImage { image_url, .. } => Some(image_url),
        }
    }

    /// 替换文本部分，保留图片引用
    pub fn with_text(&self, text: impl Into<String>) -> Content {
        match self {
            Content::Text(_) => Content::Text(text.into()),
            Content::TextWithImage { image_url, .. } => Content::TextWithImage {
                text: text.into(),
                image_url: image_url.clone(),
            },
        }
    }
}

/// 发给模型的一条带角色消息
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Content,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::Text(content.into()),
        }
    }

    pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::TextWithImage {
                text: text.into(),
                image_url: image_url.into(),
            },
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::Text(content.into()),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Content::Text(content.into()),
        }
    }

    pub fn text(&self) -> &str {
        self.content.text()
    }
}

/// 一次请求/回复交换。
///
/// 调用前创建（回复字段为空），调用完成后由 `finish` 定稿，之后不再修改。
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub ask_id: String,
    pub ask: ChatMessage,
    pub answer: Option<ChatMessage>,
    pub answer_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// 耗时（毫秒），= finished_at - started_at
    pub elapsed_ms: Option<i64>,
}

impl Message {
    pub fn begin(ask: ChatMessage) -> Self {
        Self {
            ask_id: uuid::Uuid::new_v4().to_string(),
            ask,
            answer: None,
            answer_id: None,
            started_at: Utc::now(),
            finished_at: None,
            elapsed_ms: None,
        }
    }

    pub fn finish(mut self, response: impl Into<String>) -> Self {
        let finished = Utc::now();
        self.answer = Some(ChatMessage::assistant(response));
        self.answer_id = Some(uuid::Uuid::new_v4().to_string());
        self.elapsed_ms = Some((finished - self.started_at).num_milliseconds());
        self.finished_at = Some(finished);
        self
    }

    pub fn is_finished(&self) -> bool {
        self.answer.is_some()
    }

    /// 回复文本（未完成时为 None）
    pub fn answer_text(&self) -> Option<&str> {
        self.answer.as_ref().map(|a| a.text())
    }
}

/// 同一句柄下按时间顺序追加的交换序列；相等性只看 id
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new(id: impl Into<ConversationId>) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// 最近 n 轮已完成的交换（按时间顺序）
    pub fn recent(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl PartialEq for Conversation {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Conversation {}

impl Hash for Conversation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
