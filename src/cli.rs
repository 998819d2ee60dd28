//! 命令行参数：覆盖配置文件中的对应项

use std::path::PathBuf;

use clap::Parser;

use crate::config::AppConfig;

/// IRCopilot CLI
#[derive(Parser, Debug, Default)]
#[command(name = "ircopilot")]
#[command(about = "Incident response copilot driven by Planner / Generator / Reflector / Analyst agents")]
#[command(version)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Model id (see the registry; unknown ids fall back to gpt-3.5-turbo-16k)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Directory for run logs
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Directory for saved sessions
    #[arg(long)]
    pub session_dir: Option<PathBuf>,

    /// Drive the agents with the automatic graph instead of the interactive menu
    #[arg(long, default_value_t = false)]
    pub use_graph: bool,
}

impl Cli {
    /// 命令行显式给出的项覆盖配置
    pub fn apply_to(&self, cfg: &mut AppConfig) {
        if let Some(model) = &self.model {
            cfg.llm.model = model.clone();
        }
        if let Some(dir) = &self.log_dir {
            cfg.app.log_dir = dir.clone();
        }
        if let Some(dir) = &self.session_dir {
            cfg.app.session_dir = dir.clone();
        }
    }
}
