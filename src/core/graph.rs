//! 自动图驱动：Analyst -> Planner -> Generator -> HumanInput -> Reflector -> Analyst ...
//!
//! 每个节点执行后由操作员在 continue / chat / exit 中选择；路由函数只读 RoutingState，不做 I/O。

use crate::agent::AgentRole;
use crate::core::copilot::{join_with_divider, Copilot};
use crate::core::error::Result;
use crate::core::operator::Operator;
use crate::core::state::{GraphState, Node, RoutingState};

/// 一次图运行的结局
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// 操作员选择退出
    Exited,
    /// 顶层错误中止（已写入 exception 桶）
    Aborted(String),
}

// ---- 路由（纯函数） ----

pub fn route_from_planner(routing: &RoutingState) -> Node {
    route_agent_node(routing, AgentRole::Planner, Node::Generator)
}

pub fn route_from_generator(routing: &RoutingState) -> Node {
    route_agent_node(routing, AgentRole::Generator, Node::HumanInput)
}

pub fn route_from_reflector(routing: &RoutingState) -> Node {
    route_agent_node(routing, AgentRole::Reflector, Node::Analyst)
}

pub fn route_from_analyst(routing: &RoutingState) -> Node {
    route_agent_node(routing, AgentRole::Analyst, Node::Planner)
}

fn route_agent_node(routing: &RoutingState, role: AgentRole, default: Node) -> Node {
    if routing.exit_requested {
        Node::Exit
    } else if routing.chat_target == Some(role) {
        Node::Chat
    } else {
        default
    }
}

pub fn route_from_human_input(routing: &RoutingState) -> Node {
    if routing.exit_requested {
        Node::Exit
    } else if routing.chat_target.is_some() {
        Node::Chat
    } else if let Some(next) = routing.next_node {
        next
    } else if routing.skip_reflector {
        Node::Analyst
    } else {
        Node::Reflector
    }
}

/// chat 结束后回到发起对话的节点
pub fn route_from_chat(routing: &RoutingState) -> Node {
    if routing.exit_requested {
        Node::Exit
    } else {
        routing.next_node.unwrap_or(Node::Planner)
    }
}

/// 从 node 出发的下一节点；Exit 没有后继
pub fn route(node: Node, routing: &RoutingState) -> Option<Node> {
    match node {
        Node::Planner => Some(route_from_planner(routing)),
        Node::Generator => Some(route_from_generator(routing)),
        Node::HumanInput => Some(route_from_human_input(routing)),
        Node::Reflector => Some(route_from_reflector(routing)),
        Node::Analyst => Some(route_from_analyst(routing)),
        Node::Chat => Some(route_from_chat(routing)),
        Node::Exit => None,
    }
}

/// 图中允许的全部边
pub fn successors(node: Node) -> &'static [Node] {
    match node {
        Node::Planner => &[Node::Generator, Node::Chat, Node::Exit],
        Node::Generator => &[Node::HumanInput, Node::Chat, Node::Exit],
        Node::HumanInput => &[Node::Reflector, Node::Analyst, Node::Chat, Node::Exit],
        Node::Reflector => &[Node::Analyst, Node::Chat, Node::Exit],
        Node::Analyst => &[Node::Planner, Node::Chat, Node::Exit],
        Node::Chat => &[
            Node::Planner,
            Node::Generator,
            Node::HumanInput,
            Node::Reflector,
            Node::Analyst,
            Node::Exit,
        ],
        Node::Exit => &[],
    }
}

// ---- 节点 ----

/// 节点执行后的三选一：continue / chat / exit（HumanInput 没有 chat）
async fn gate<O: Operator>(
    copilot: &mut Copilot<O>,
    routing: &mut RoutingState,
    node: Node,
    next: Node,
) -> Result<()> {
    let continue_label = format!("Continue to {next}");
    let chat_label = format!("Chat with {node}");
    let mut choices: Vec<(&str, &str)> = vec![("continue", continue_label.as_str())];
    let chat_role = node.agent();
    if chat_role.is_some() {
        choices.push(("chat", chat_label.as_str()));
    }
    choices.push(("exit", "Exit IRCopilot"));

    copilot.say(&format!("[SYSTEM] {node}: choose next action"));
    let request = copilot
        .choose(&format!("> {node}: next action"), &choices)
        .await?;

    match (request.as_str(), chat_role) {
        ("exit", _) => {
            routing.exit_requested = true;
            routing.chat_target = None;
        }
        ("chat", Some(role)) => {
            routing.chat_target = Some(role);
            routing.next_node = Some(node);
        }
        _ => {
            routing.chat_target = None;
            routing.next_node = Some(next);
        }
    }
    Ok(())
}

async fn planner_node<O: Operator>(copilot: &mut Copilot<O>, state: &mut GraphState) -> Result<()> {
    let task_selection = copilot.prompts().task_selection.clone();
    let decision = copilot.talk(AgentRole::Planner, &task_selection).await?;
    copilot.session_mut().record_decision(decision.as_str());
    copilot.respond(&decision);
    state.selected_task = Some(decision);
    Ok(())
}

async fn generator_node<O: Operator>(
    copilot: &mut Copilot<O>,
    state: &mut GraphState,
) -> Result<()> {
    if let (Some(irt), Some(task)) = (&state.irt, &state.selected_task) {
        let request = format!(
            "{}{}",
            copilot.prompts().todo_to_command,
            join_with_divider(irt, task)
        );
        let response = copilot.generation_handler(&request).await?;
        copilot.respond(&response);
        state.generator_output = Some(response);
    } else {
        tracing::debug!("No IRT or selected task yet, generator skipped");
    }
    Ok(())
}

async fn human_input_node<O: Operator>(
    copilot: &mut Copilot<O>,
    state: &mut GraphState,
) -> Result<()> {
    let input = copilot
        .hear("[SYSTEM] Please send the results of the guidance/command execution.")
        .await?;
    if !input.trim().is_empty() {
        copilot.session_mut().record_action(input.as_str());
    }
    state.user_input = Some(input);

    copilot.say("[SYSTEM] Run reflection now?");
    let reflect = copilot
        .choose(
            "> Run reflection now?",
            &[("no", "No"), ("yes", "Yes"), ("exit", "Exit IRCopilot")],
        )
        .await?;
    let routing = &mut state.routing;
    match reflect.as_str() {
        "exit" => {
            routing.exit_requested = true;
            routing.chat_target = None;
            routing.skip_reflector = false;
        }
        "no" => routing.skip_reflector = true,
        _ => routing.skip_reflector = false,
    }
    Ok(())
}

async fn reflector_node<O: Operator>(
    copilot: &mut Copilot<O>,
    state: &mut GraphState,
) -> Result<()> {
    let thoughts = state.user_input.clone().unwrap_or_default();
    let response = copilot.reflect(1, &thoughts).await?;
    copilot.respond(&response);
    state.reflection = Some(response);
    Ok(())
}

async fn analyst_node<O: Operator>(copilot: &mut Copilot<O>, state: &mut GraphState) -> Result<()> {
    let text = state.user_input.clone().unwrap_or_default();
    if text.is_empty() {
        return Ok(());
    }
    let prefix = if state.irt.is_none() {
        copilot.prompts().task_description.clone()
    } else {
        copilot.prompts().analysis_results.clone()
    };
    let response = copilot
        .talk(AgentRole::Analyst, &format!("{prefix}{text}"))
        .await?;
    copilot.session_mut().record_decision(response.as_str());
    copilot.respond(&response);
    state.irt = Some(response.clone());
    state.analyst_summary = Some(response);
    Ok(())
}

async fn chat_node<O: Operator>(copilot: &mut Copilot<O>, state: &mut GraphState) -> Result<()> {
    if let Some(role) = state.routing.chat_target {
        let thoughts = copilot
            .hear(&format!("[SYSTEM] Please send your thoughts to {role}."))
            .await?;
        if role == AgentRole::Analyst {
            let request = format!("{}{}", copilot.prompts().analysis_results, thoughts);
            let response = copilot.talk(role, &request).await?;
            copilot.respond(&response);
            state.analyst_summary = Some(response);
        } else {
            let response = copilot.talk(role, &thoughts).await?;
            copilot.respond(&response);
            state.meta.insert(format!("{}_chat", role.as_str()), response);
        }
    }
    state.routing.chat_target = None;
    if let Some(next) = state.routing.next_node {
        copilot.say(&format!("[SYSTEM] Continue to {next}"));
    }
    Ok(())
}

/// 执行一个节点（含其后的操作员选择），返回下一节点
pub async fn step<O: Operator>(
    copilot: &mut Copilot<O>,
    state: &mut GraphState,
    node: Node,
) -> Result<Option<Node>> {
    // 跳过反思只对 HumanInput 之后的那一次转移生效
    if node != Node::HumanInput {
        state.routing.skip_reflector = false;
    }

    match node {
        Node::Planner => planner_node(copilot, state).await?,
        Node::Generator => generator_node(copilot, state).await?,
        Node::HumanInput => human_input_node(copilot, state).await?,
        Node::Reflector => reflector_node(copilot, state).await?,
        Node::Analyst => analyst_node(copilot, state).await?,
        Node::Chat => chat_node(copilot, state).await?,
        Node::Exit => {
            copilot.say("Thank you for using IRCopilot!");
            state.routing.last_node = Some(Node::Exit);
            return Ok(None);
        }
    }
    state.routing.last_node = Some(node);

    if node != Node::Chat && !state.routing.exit_requested {
        if let Some(next) = node.default_successor(state.routing.skip_reflector) {
            gate(copilot, &mut state.routing, node, next).await?;
        }
    }

    Ok(route(node, &state.routing))
}

/// 从 Analyst 开始运行直到 Exit 或顶层错误
pub async fn run_graph<O: Operator>(copilot: &mut Copilot<O>, state: &mut GraphState) -> RunOutcome {
    let mut node = Node::Analyst;
    loop {
        tracing::debug!(node = %node, "Entering node");
        match step(copilot, state, node).await {
            Ok(Some(next)) => node = next,
            Ok(None) => return RunOutcome::Exited,
            Err(e) => {
                copilot.record_exception(&e);
                return RunOutcome::Aborted(e.to_string());
            }
        }
    }
}
