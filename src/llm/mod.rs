//! LLM 层：客户端抽象、重试层与各后端实现（OpenAI 兼容 / Anthropic / Mock）

pub mod anthropic;
pub mod mock;
pub mod openai;
pub mod registry;
pub mod retry;
pub mod tokens;
pub mod traits;

pub use anthropic::AnthropicClient;
pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use openai::OpenAiClient;
pub use registry::{create_backend, known_models, lookup, ModelSpec, Provider, ResolvedModel};
pub use retry::{compress_history, HistoryWindow, RetryConfig, RetryingLlmClient};
pub use tokens::TokenEstimator;
pub use traits::{FailureKind, InvokeOptions, LlmClient, LlmError};
