//! 编排层错误
//!
//! 模型调用失败以 `LlmError` 原样包装；主循环捕获后写入 exception 桶并结束本次运行。

use thiserror::Error;

use crate::agent::AgentRole;
use crate::llm::LlmError;

#[derive(Error, Debug)]
pub enum CopilotError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// Agent 尚未 start / attach 就被调用
    #[error("{0} has no conversation yet, initialize the session first")]
    NoConversation(AgentRole),

    #[error("Operator input failed: {0}")]
    Operator(#[from] std::io::Error),

    #[error("Session persistence failed: {0}")]
    Persistence(String),
}

impl CopilotError {
    /// 操作员输入流已关闭（EOF）
    pub fn is_input_closed(&self) -> bool {
        matches!(self, CopilotError::Operator(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
    }
}

pub type Result<T> = std::result::Result<T, CopilotError>;
