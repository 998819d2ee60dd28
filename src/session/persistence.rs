//! 会话文件读写：<session_dir>/<name>，JSON 格式
//!
//! 未指定名称时以当前 UNIX 时间戳命名。

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};

use super::state::SessionState;

pub struct SessionPersistence {
    dir: PathBuf,
}

impl SessionPersistence {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> anyhow::Result<PathBuf> {
        let name = name.trim();
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            bail!("invalid session name: {:?}", name);
        }
        Ok(self.dir.join(name))
    }

    /// 保存快照；目录不存在时自动创建。返回实际使用的名称
    pub fn save(&self, state: &SessionState, name: Option<&str>) -> anyhow::Result<String> {
        let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(n) => n.to_string(),
            None => default_session_name(),
        };
        let path = self.path_for(&name)?;
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let data = serde_json::to_string_pretty(state)?;
        std::fs::write(&path, data)
            .with_context(|| format!("failed to write session {}", path.display()))?;
        tracing::info!("Session saved as {}", name);
        Ok(name)
    }

    pub fn load(&self, name: &str) -> anyhow::Result<SessionState> {
        let path = self.path_for(name)?;
        let data = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read session {}", path.display()))?;
        let state = serde_json::from_str(&data)
            .with_context(|| format!("session {} is not valid JSON", path.display()))?;
        Ok(state)
    }

    /// 已保存的会话名（排序）；目录不存在时为空
    pub fn list(&self) -> anyhow::Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// 读取可恢复的会话；读取失败或句柄不全时返回 None（由调用方全新初始化）
    pub fn load_resumable(&self, name: &str) -> Option<SessionState> {
        match self.load(name) {
            Ok(state) if state.is_resumable() => Some(state),
            Ok(_) => {
                tracing::warn!(
                    "Session {} is missing conversation handles, starting a fresh session",
                    name
                );
                None
            }
            Err(e) => {
                tracing::warn!("Error when loading the previous session: {:#}", e);
                None
            }
        }
    }
}

/// 当前 UNIX 时间（秒，带小数）
pub fn unix_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

fn default_session_name() -> String {
    format!("{:.6}", unix_timestamp())
}
