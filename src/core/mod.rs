//! 核心编排层：错误、提示词、操作员 I/O、图状态、共享核心与两种驱动（自动图 / 交互菜单）

pub mod copilot;
pub mod error;
pub mod graph;
pub mod menu;
pub mod operator;
pub mod prompts;
pub mod state;

pub use copilot::{join_with_divider, Copilot};
pub use error::{CopilotError, Result};
pub use graph::{run_graph, RunOutcome};
pub use menu::{run_menu, Intent, LocalIntent};
pub use operator::{ConsoleOperator, Operator, ScriptedOperator};
pub use prompts::PromptSet;
pub use state::{GraphState, Node, RoutingState};
