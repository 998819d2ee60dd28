//! IRCopilot - 应急响应多智能体 Copilot
//!
//! 模块划分：
//! - **agent**: Agent 角色与会话（start / send）
//! - **cli**: 命令行参数
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 共享编排核心、自动图驱动、交互菜单驱动
//! - **llm**: LLM 客户端抽象、重试与压缩、各后端实现与模型注册表
//! - **memory**: 对话记录与对话注册表
//! - **session**: 会话快照、持久化与运行日志

pub mod agent;
pub mod cli;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod session;

pub use crate::core::{Copilot, CopilotError};
