//! 状态定义：图节点、路由状态（不持久化）与单次运行的产出
//!
//! 路由状态只由图驱动的转移函数修改；产出（IRT、所选任务、指导、反思）由各节点写入。

use std::collections::BTreeMap;
use std::fmt;

use crate::agent::AgentRole;

/// 自动图中的节点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Node {
    Planner,
    Generator,
    /// 收集操作员的执行结果
    HumanInput,
    Reflector,
    Analyst,
    /// 与某个 Agent 的临时对话
    Chat,
    Exit,
}

impl Node {
    pub const ALL: [Node; 7] = [
        Node::Planner,
        Node::Generator,
        Node::HumanInput,
        Node::Reflector,
        Node::Analyst,
        Node::Chat,
        Node::Exit,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, Node::Exit)
    }

    /// 节点对应的 Agent（HumanInput / Chat / Exit 没有）
    pub fn agent(&self) -> Option<AgentRole> {
        match self {
            Node::Planner => Some(AgentRole::Planner),
            Node::Generator => Some(AgentRole::Generator),
            Node::Reflector => Some(AgentRole::Reflector),
            Node::Analyst => Some(AgentRole::Analyst),
            Node::HumanInput | Node::Chat | Node::Exit => None,
        }
    }

    /// 操作员选择 continue 时的后继
    pub fn default_successor(&self, skip_reflector: bool) -> Option<Node> {
        match self {
            Node::Planner => Some(Node::Generator),
            Node::Generator => Some(Node::HumanInput),
            Node::HumanInput if skip_reflector => Some(Node::Analyst),
            Node::HumanInput => Some(Node::Reflector),
            Node::Reflector => Some(Node::Analyst),
            Node::Analyst => Some(Node::Planner),
            Node::Chat | Node::Exit => None,
        }
    }
}

impl From<AgentRole> for Node {
    fn from(role: AgentRole) -> Self {
        match role {
            AgentRole::Planner => Node::Planner,
            AgentRole::Generator => Node::Generator,
            AgentRole::Reflector => Node::Reflector,
            AgentRole::Analyst => Node::Analyst,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Node::Planner => "planner",
            Node::Generator => "generator",
            Node::HumanInput => "ir_results_input",
            Node::Reflector => "reflector",
            Node::Analyst => "analyst",
            Node::Chat => "chat",
            Node::Exit => "exit",
        };
        f.write_str(name)
    }
}

/// 路由状态：每次进入循环时重置，进程退出即丢弃
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingState {
    pub last_node: Option<Node>,
    /// chat 结束后回到的节点
    pub next_node: Option<Node>,
    /// 操作员要求与之临时对话的 Agent
    pub chat_target: Option<AgentRole>,
    pub exit_requested: bool,
    /// HumanInput 中选择了不反思（只对紧接着的一次转移生效）
    pub skip_reflector: bool,
}

/// 自动图一次运行的完整状态
#[derive(Debug, Clone, Default)]
pub struct GraphState {
    pub irt: Option<String>,
    pub selected_task: Option<String>,
    pub generator_output: Option<String>,
    pub reflection: Option<String>,
    pub analyst_summary: Option<String>,

    /// 最近一次操作员输入（初始为事件描述，之后为执行结果）
    pub user_input: Option<String>,
    /// 临时对话的回复等杂项（如 "planner_chat"）
    pub meta: BTreeMap<String, String>,

    pub routing: RoutingState,
}

impl GraphState {
    /// 以事件描述作为首个输入
    pub fn with_input(input: impl Into<String>) -> Self {
        Self {
            user_input: Some(input.into()),
            ..Self::default()
        }
    }
}
