//! IRCopilot
//!
//! 入口：解析命令行、加载配置、初始化日志，解析模型后按模式运行交互菜单或自动图，退出前写运行日志并保存会话。

use std::sync::Mutex;

use anyhow::Context;
use clap::Parser;
use ircopilot::cli::Cli;
use ircopilot::config::{load_config, AppConfig};
use ircopilot::core::{
    run_graph, run_menu, ConsoleOperator, Copilot, GraphState, PromptSet, RunOutcome,
};
use ircopilot::llm::ResolvedModel;
use ircopilot::session::SessionPersistence;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 终端 + <log_dir>/IRCopilot.log 两个输出；默认 info，可通过 RUST_LOG 覆盖
fn init_logging(cfg: &AppConfig) -> anyhow::Result<()> {
    std::fs::create_dir_all(&cfg.app.log_dir)
        .with_context(|| format!("Failed to create {}", cfg.app.log_dir.display()))?;
    let log_path = cfg.app.log_dir.join("IRCopilot.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open {}", log_path.display()))?;

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut cfg = load_config(cli.config.clone()).context("Failed to load config")?;
    cli.apply_to(&mut cfg);
    init_logging(&cfg)?;

    let model = ResolvedModel::resolve(&cfg.llm);
    tracing::info!(model = %model.id, graph = cli.use_graph, "Starting IRCopilot");

    let prompts = PromptSet::load(&cfg.app.prompts_dir);
    let persistence = SessionPersistence::new(&cfg.app.session_dir);
    let mut copilot = Copilot::new(&model, prompts, ConsoleOperator::new());

    let outcome = match start(&mut copilot, &persistence, cli.use_graph).await {
        Ok(outcome) => outcome,
        Err(e) => {
            copilot.record_exception(&e);
            RunOutcome::Aborted(e.to_string())
        }
    };
    if let RunOutcome::Aborted(reason) = &outcome {
        tracing::warn!("Run ended early: {}", reason);
    }

    copilot.write_run_log(&cfg.app.log_dir);
    if let Err(e) = copilot.save_session(&persistence).await {
        tracing::error!("{}", e);
    }
    Ok(())
}

/// 预加载会话、初始化 Agent，然后交给选定的驱动
async fn start(
    copilot: &mut Copilot<ConsoleOperator>,
    persistence: &SessionPersistence,
    use_graph: bool,
) -> ircopilot::core::Result<RunOutcome> {
    let previous = copilot.preload_session(persistence).await?;
    let resumed = copilot.initialize(previous).await?;

    if use_graph {
        let description = copilot.ask_task_description().await?;
        let mut state = GraphState::with_input(description);
        Ok(run_graph(copilot, &mut state).await)
    } else {
        if !resumed {
            copilot.feed_init_prompts().await?;
        }
        Ok(run_menu(copilot).await)
    }
}
