//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `IRCOPILOT__*` 覆盖（双下划线表示嵌套，如 `IRCOPILOT__LLM__MODEL=gpt-4-o`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
}

/// [app] 段：日志、会话、提示词目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 运行日志与诊断日志目录
    pub log_dir: PathBuf,
    /// 会话文件目录
    pub session_dir: PathBuf,
    /// 提示词覆盖文件目录（<name>.txt）
    pub prompts_dir: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            session_dir: PathBuf::from("test_history"),
            prompts_dir: PathBuf::from("config/prompts"),
        }
    }
}

/// [llm] 段：模型、端点、采样温度、单次请求超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub request_timeout_secs: u64,
    pub retry: RetrySection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: "gpt-4".to_string(),
            base_url: None,
            temperature: 0.5,
            request_timeout_secs: 60,
            retry: RetrySection::default(),
        }
    }
}

impl LlmSection {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

/// [llm.retry] 段：未设置的项使用模型注册表中的默认值
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: Option<u32>,
    pub error_wait_secs: f64,
    pub rate_limit_wait_secs: f64,
    /// 初始历史窗口（轮）
    pub history_length: usize,
    /// 压缩时窗口下限
    pub min_history: usize,
    pub token_limit: Option<usize>,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: None,
            error_wait_secs: 2.0,
            rate_limit_wait_secs: 2.0,
            history_length: 5,
            min_history: 2,
            token_limit: None,
        }
    }
}

/// 从 config 目录加载配置，环境变量 IRCOPILOT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 IRCOPILOT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!("Config file {} not found, ignoring", path.display());
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("IRCOPILOT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.model, "gpt-4");
        assert_eq!(cfg.llm.retry.history_length, 5);
        assert_eq!(cfg.llm.retry.min_history, 2);
        assert_eq!(cfg.app.session_dir, PathBuf::from("test_history"));
        assert_eq!(cfg.llm.request_timeout(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[llm]\nmodel = \"gpt-4-o\"\n\n[llm.retry]\nmax_attempts = 5\nhistory_length = 8\n\n[app]\nlog_dir = \"/tmp/ir-logs\""
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.llm.model, "gpt-4-o");
        assert_eq!(cfg.llm.retry.max_attempts, Some(5));
        assert_eq!(cfg.llm.retry.history_length, 8);
        assert_eq!(cfg.llm.retry.min_history, 2);
        assert_eq!(cfg.app.log_dir, PathBuf::from("/tmp/ir-logs"));
        assert_eq!(cfg.app.session_dir, PathBuf::from("test_history"));
    }
}
