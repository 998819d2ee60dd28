//! 会话快照：四个对话句柄、任务日志、动作 / 决策历史
//!
//! 句柄字段沿用会话文件中的键名（reasoning / test_generation / reflection / analysis）。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::agent::AgentRole;
use crate::memory::{Conversation, ConversationId};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(rename = "reasoning", default)]
    pub planner: Option<ConversationId>,
    #[serde(rename = "test_generation", default)]
    pub generator: Option<ConversationId>,
    #[serde(rename = "reflection", default)]
    pub reflector: Option<ConversationId>,
    #[serde(rename = "analysis", default)]
    pub analyst: Option<ConversationId>,

    /// 自由文本任务日志（如 "task description"）
    #[serde(default)]
    pub task_log: BTreeMap<String, String>,
    /// 操作员提交的执行结果
    #[serde(default)]
    pub action_history: Vec<String>,
    /// IRT / 任务选择等决策输出
    #[serde(default)]
    pub decision_history: Vec<String>,

    /// 本地对话记录（恢复后重建窗口历史）
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conversations: Vec<Conversation>,
}

impl SessionState {
    pub fn conversation(&self, role: AgentRole) -> Option<&str> {
        match role {
            AgentRole::Planner => self.planner.as_deref(),
            AgentRole::Generator => self.generator.as_deref(),
            AgentRole::Reflector => self.reflector.as_deref(),
            AgentRole::Analyst => self.analyst.as_deref(),
        }
    }

    pub fn set_conversation(&mut self, role: AgentRole, id: impl Into<ConversationId>) {
        let id = Some(id.into());
        match role {
            AgentRole::Planner => self.planner = id,
            AgentRole::Generator => self.generator = id,
            AgentRole::Reflector => self.reflector = id,
            AgentRole::Analyst => self.analyst = id,
        }
    }

    /// 四个句柄齐全才可恢复；缺任何一个都按新会话处理
    pub fn is_resumable(&self) -> bool {
        AgentRole::ALL
            .iter()
            .all(|role| self.conversation(*role).is_some())
    }

    pub fn record_action(&mut self, action: impl Into<String>) {
        self.action_history.push(action.into());
    }

    pub fn record_decision(&mut self, decision: impl Into<String>) {
        self.decision_history.push(decision.into());
    }

    /// 最近 k 条（k 超过长度时返回全部）
    pub fn recent_actions(&self, k: usize) -> &[String] {
        tail(&self.action_history, k)
    }

    pub fn recent_decisions(&self, k: usize) -> &[String] {
        tail(&self.decision_history, k)
    }
}

fn tail(items: &[String], k: usize) -> &[String] {
    &items[items.len().saturating_sub(k)..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resumable_requires_all_four_handles() {
        let mut state = SessionState::default();
        assert!(!state.is_resumable());

        state.set_conversation(AgentRole::Planner, "p");
        state.set_conversation(AgentRole::Generator, "g");
        state.set_conversation(AgentRole::Reflector, "r");
        assert!(!state.is_resumable());

        state.set_conversation(AgentRole::Analyst, "p");
        assert!(state.is_resumable());
    }

    #[test]
    fn test_file_keys() {
        let mut state = SessionState::default();
        state.set_conversation(AgentRole::Planner, "p");
        state
            .task_log
            .insert("task description".into(), "web defacement".into());

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["reasoning"], "p");
        assert!(json["test_generation"].is_null());
        assert_eq!(json["task_log"]["task description"], "web defacement");
        assert!(json.get("conversations").is_none());
    }

    #[test]
    fn test_recent_windows() {
        let mut state = SessionState::default();
        for a in ["a", "b", "c"] {
            state.record_action(a);
        }
        assert_eq!(state.recent_actions(2), ["b", "c"]);
        assert_eq!(state.recent_actions(10).len(), 3);
        assert!(state.recent_decisions(1).is_empty());
    }
}
