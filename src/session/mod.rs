//! 会话层：快照、持久化与运行日志

pub mod persistence;
pub mod run_log;
pub mod state;

pub use persistence::SessionPersistence;
pub use run_log::{LogBucket, RunLog};
pub use state::SessionState;
