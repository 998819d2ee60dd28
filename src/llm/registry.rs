//! 模型注册表：模型 id -> 后端构造参数
//!
//! 启动时解析一次；未知 id 回退到 `gpt-3.5-turbo-16k` 并告警。

use std::sync::Arc;
use std::time::Duration;

use super::anthropic::AnthropicClient;
use super::mock::MockLlmClient;
use super::openai::OpenAiClient;
use super::retry::{HistoryWindow, RetryConfig, RetryingLlmClient};
use super::traits::{InvokeOptions, LlmClient};
use crate::config::LlmSection;

const FALLBACK_MODEL: &str = "gpt-3.5-turbo-16k";
const GPT4_TOKEN_LIMIT: usize = 8000;
const DEFAULT_TOKEN_LIMIT: usize = 14000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// OpenAI 兼容 chat completions
    OpenAi,
    Anthropic,
    Mock,
}

/// 一个注册项
#[derive(Debug, Clone, Copy)]
pub struct ModelSpec {
    pub id: &'static str,
    pub provider: Provider,
    /// 发送给后端的模型名
    pub model: &'static str,
    pub base_url: Option<&'static str>,
    pub api_key_env: &'static str,
    pub max_attempts: u32,
    pub token_limit: usize,
}

const fn openai(id: &'static str, model: &'static str) -> ModelSpec {
    ModelSpec {
        id,
        provider: Provider::OpenAi,
        model,
        base_url: None,
        api_key_env: "OPENAI_API_KEY",
        max_attempts: 3,
        token_limit: DEFAULT_TOKEN_LIMIT,
    }
}

static REGISTRY: &[ModelSpec] = &[
    ModelSpec {
        token_limit: GPT4_TOKEN_LIMIT,
        ..openai("gpt-4", "gpt-4")
    },
    openai("gpt-4-1106-preview", "gpt-4-1106-preview"),
    openai("gpt-4-o", "gpt-4o-2024-05-13"),
    openai("gpt-4o-2024-08-06", "gpt-4o-2024-08-06"),
    openai("gpt-3.5-turbo-16k", "gpt-3.5-turbo"),
    openai("o1-preview", "o1-preview"),
    openai("o1-mini", "o1-mini"),
    openai("o1-2024-12-17", "o1-2024-12-17"),
    openai("gpt-5.1-2025-11-13", "gpt-5.1-2025-11-13"),
    ModelSpec {
        base_url: Some("http://localhost:4891/v1"),
        api_key_env: "GPT4ALL_API_KEY",
        max_attempts: 2,
        ..openai("gpt4all", "mistral-7b-openorca.Q4_0.gguf")
    },
    ModelSpec {
        base_url: Some("https://docs-test-001.openai.azure.com/openai/v1"),
        api_key_env: "AZURE_OPENAI_API_KEY",
        ..openai("azure-gpt-3.5", "gpt-35-turbo")
    },
    ModelSpec {
        base_url: Some("https://generativelanguage.googleapis.com/v1beta/openai"),
        api_key_env: "GOOGLE_API_KEY",
        ..openai("gemini-1.0", "gemini-1.0-pro")
    },
    ModelSpec {
        base_url: Some("https://generativelanguage.googleapis.com/v1beta/openai"),
        api_key_env: "GOOGLE_API_KEY",
        ..openai("gemini-1.5", "gemini-1.5-pro-latest")
    },
    ModelSpec {
        provider: Provider::Anthropic,
        api_key_env: "ANTHROPIC_API_KEY",
        ..openai("claude-3-5-sonnet-20240620", "claude-3-5-sonnet-20240620")
    },
    ModelSpec {
        base_url: Some("https://api.deepseek.com"),
        api_key_env: "DEEPSEEK_API_KEY",
        ..openai("DeepSeek", "deepseek-chat")
    },
    ModelSpec {
        base_url: Some("https://api.groq.com/openai/v1"),
        api_key_env: "GROQ_API_KEY",
        ..openai("Llama", "llama3-70b-8192")
    },
    ModelSpec {
        provider: Provider::Mock,
        api_key_env: "",
        ..openai("mock", "mock")
    },
];

/// 查找注册项；未知 id 回退到默认模型
pub fn lookup(id: &str) -> &'static ModelSpec {
    if let Some(spec) = REGISTRY.iter().find(|s| s.id == id) {
        return spec;
    }
    tracing::warn!(
        "Model '{}' not supported. Falling back to default model ({})",
        id,
        FALLBACK_MODEL
    );
    REGISTRY
        .iter()
        .find(|s| s.id == FALLBACK_MODEL)
        .unwrap_or(&REGISTRY[0])
}

pub fn known_models() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|s| s.id)
}

/// 按注册项构造原始后端（不含重试）
pub fn create_backend(spec: &ModelSpec, base_url_override: Option<&str>) -> Arc<dyn LlmClient> {
    let base_url = base_url_override.or(spec.base_url);
    let api_key = if spec.api_key_env.is_empty() {
        None
    } else {
        std::env::var(spec.api_key_env).ok()
    };
    if api_key.is_none() && spec.provider != Provider::Mock {
        tracing::warn!("{} is not set, requests to {} will likely fail", spec.api_key_env, spec.id);
    }

    match spec.provider {
        Provider::OpenAi => {
            tracing::info!("Using OpenAI-compatible LLM ({})", spec.model);
            Arc::new(OpenAiClient::new(base_url, spec.model, api_key.as_deref()))
        }
        Provider::Anthropic => {
            tracing::info!("Using Anthropic LLM ({})", spec.model);
            Arc::new(AnthropicClient::new(base_url, spec.model, api_key.as_deref()))
        }
        Provider::Mock => {
            tracing::info!("Using Mock LLM");
            Arc::new(MockLlmClient)
        }
    }
}

/// 解析后的模型：一个后端 + 重试参数；每个需要独立窗口的 Agent 各取一个 `client()`
#[derive(Clone)]
pub struct ResolvedModel {
    pub id: String,
    backend: Arc<dyn LlmClient>,
    retry: RetryConfig,
    history_length: usize,
    options: InvokeOptions,
}

impl ResolvedModel {
    /// 由 [llm] 配置解析；配置中未设置的重试参数取注册项默认值
    pub fn resolve(cfg: &LlmSection) -> Self {
        let spec = lookup(&cfg.model);
        let backend = create_backend(spec, cfg.base_url.as_deref());
        let retry = RetryConfig {
            max_attempts: cfg.retry.max_attempts.unwrap_or(spec.max_attempts),
            error_wait: Duration::from_secs_f64(cfg.retry.error_wait_secs.max(0.0)),
            rate_limit_wait: Duration::from_secs_f64(cfg.retry.rate_limit_wait_secs.max(0.0)),
            min_history: cfg.retry.min_history,
            token_limit: Some(cfg.retry.token_limit.unwrap_or(spec.token_limit)),
        };
        let mut options = InvokeOptions::default().with_temperature(cfg.temperature);
        if let Some(timeout) = cfg.request_timeout() {
            options = options.with_timeout(timeout);
        }
        Self {
            id: spec.id.to_string(),
            backend,
            retry,
            history_length: cfg.retry.history_length.max(cfg.retry.min_history),
            options,
        }
    }

    /// 直接使用给定后端（测试或自定义后端）
    pub fn from_backend(
        backend: Arc<dyn LlmClient>,
        retry: RetryConfig,
        history_length: usize,
    ) -> Self {
        Self {
            id: backend.model().to_string(),
            backend,
            retry,
            history_length,
            options: InvokeOptions::default(),
        }
    }

    /// 新的重试客户端，带独立的历史窗口
    pub fn client(&self) -> Arc<RetryingLlmClient> {
        Arc::new(RetryingLlmClient::new(
            self.backend.clone(),
            self.retry.clone(),
            HistoryWindow::new(self.history_length),
        ))
    }

    pub fn options(&self) -> &InvokeOptions {
        &self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_and_fallback() {
        assert_eq!(lookup("gpt-4").token_limit, 8000);
        assert_eq!(lookup("gpt-4-o").token_limit, 14000);
        assert_eq!(lookup("gpt4all").max_attempts, 2);
        assert_eq!(lookup("claude-3-5-sonnet-20240620").provider, Provider::Anthropic);
        assert_eq!(lookup("no-such-model").id, "gpt-3.5-turbo-16k");
    }

    #[test]
    fn test_every_model_except_gpt4all_allows_three_attempts() {
        for spec in REGISTRY.iter().filter(|s| s.id != "gpt4all") {
            assert_eq!(spec.max_attempts, 3, "{}", spec.id);
        }
        assert!(known_models().any(|id| id == "mock"));
    }

    #[test]
    fn test_resolve_uses_registry_defaults() {
        let cfg = LlmSection {
            model: "mock".to_string(),
            ..LlmSection::default()
        };
        let resolved = ResolvedModel::resolve(&cfg);
        assert_eq!(resolved.id, "mock");
        assert_eq!(resolved.retry.max_attempts, 3);
        assert_eq!(resolved.retry.token_limit, Some(14000));
        assert_eq!(resolved.client().window().get(), 5);
        assert_eq!(resolved.options().timeout, Some(Duration::from_secs(60)));
    }
}
