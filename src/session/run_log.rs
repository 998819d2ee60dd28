//! 运行日志：按来源分桶记录 (时间戳, 文本)，退出时一次写出
//!
//! 文件：<log_dir>/IRCopilot_log_<timestamp>.txt，内容为 JSON 对象。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::persistence::unix_timestamp;
use crate::agent::AgentRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogBucket {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "IRCopilot")]
    System,
    #[serde(rename = "planner")]
    Planner,
    #[serde(rename = "generator")]
    Generator,
    #[serde(rename = "reflector")]
    Reflector,
    #[serde(rename = "analyst")]
    Analyst,
    #[serde(rename = "exception")]
    Exception,
}

impl LogBucket {
    pub const ALL: [LogBucket; 7] = [
        LogBucket::User,
        LogBucket::System,
        LogBucket::Planner,
        LogBucket::Generator,
        LogBucket::Reflector,
        LogBucket::Analyst,
        LogBucket::Exception,
    ];
}

impl From<AgentRole> for LogBucket {
    fn from(role: AgentRole) -> Self {
        match role {
            AgentRole::Planner => LogBucket::Planner,
            AgentRole::Generator => LogBucket::Generator,
            AgentRole::Reflector => LogBucket::Reflector,
            AgentRole::Analyst => LogBucket::Analyst,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunLog {
    buckets: BTreeMap<LogBucket, Vec<(f64, String)>>,
}

impl Default for RunLog {
    fn default() -> Self {
        Self {
            buckets: LogBucket::ALL.iter().map(|b| (*b, Vec::new())).collect(),
        }
    }
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, bucket: impl Into<LogBucket>, text: impl Into<String>) {
        self.buckets
            .entry(bucket.into())
            .or_default()
            .push((unix_timestamp(), text.into()));
    }

    pub fn entries(&self, bucket: LogBucket) -> &[(f64, String)] {
        self.buckets.get(&bucket).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 写出到 dir 下带时间戳的文件，返回路径
    pub fn write(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create log dir {}", dir.display()))?;
        let path = dir.join(format!("IRCopilot_log_{}.txt", unix_timestamp()));
        let data = serde_json::to_string(self)?;
        std::fs::write(&path, data)
            .with_context(|| format!("failed to write run log {}", path.display()))?;
        Ok(path)
    }
}
