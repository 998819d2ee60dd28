//! 自动图端到端场景：脚本后端 + 脚本操作员

use std::sync::Arc;

use ircopilot::agent::AgentRole;
use ircopilot::core::graph::{route, step, successors};
use ircopilot::core::{
    run_graph, Copilot, GraphState, Node, PromptSet, RoutingState, RunOutcome, ScriptedOperator,
};
use ircopilot::llm::{ResolvedModel, RetryConfig, ScriptedLlmClient};
use ircopilot::memory::Role;
use ircopilot::session::LogBucket;

async fn ready_copilot(
    script: Arc<ScriptedLlmClient>,
    inputs: Vec<&str>,
) -> Copilot<ScriptedOperator> {
    let model = ResolvedModel::from_backend(script, RetryConfig::default(), 5);
    let mut copilot = Copilot::new(&model, PromptSet::default(), ScriptedOperator::new(inputs));
    copilot.initialize(None).await.unwrap();
    copilot
}

fn primed_script() -> Arc<ScriptedLlmClient> {
    Arc::new(ScriptedLlmClient::default().with_fallback("Yes"))
}

#[tokio::test]
async fn test_analyst_builds_initial_irt() {
    let script = primed_script();
    let mut copilot = ready_copilot(script.clone(), vec!["continue"]).await;
    script.push_reply(Ok("1. Web server review (to-do)".into()));

    let mut state = GraphState::with_input("Investigate host 10.0.2.5 for web defacement");
    let next = step(&mut copilot, &mut state, Node::Analyst).await.unwrap();

    assert_eq!(next, Some(Node::Planner));
    assert_eq!(state.irt.as_deref(), Some("1. Web server review (to-do)"));
    assert_eq!(state.analyst_summary, state.irt);

    let sent = script.last_history().unwrap();
    let request = sent.last().unwrap().text();
    assert!(request.starts_with(&PromptSet::default().task_description));
    assert!(request.ends_with("Investigate host 10.0.2.5 for web defacement"));
}

#[tokio::test]
async fn test_chat_digression_returns_to_planner_with_history() {
    let script = primed_script();
    let mut copilot = ready_copilot(
        script.clone(),
        vec!["chat", "focus on log review first", "exit"],
    )
    .await;
    let planner = copilot
        .conversation(AgentRole::Planner)
        .unwrap()
        .to_string();

    let mut state = GraphState::with_input("web defacement");
    state.irt = Some("IRT".into());

    script.push_reply(Ok("task: check processes".into()));
    let next = step(&mut copilot, &mut state, Node::Planner).await.unwrap();
    assert_eq!(next, Some(Node::Chat));
    let before_digression = copilot.store().message_count(&planner);

    script.push_reply(Ok("agreed, logs first".into()));
    let next = step(&mut copilot, &mut state, Node::Chat).await.unwrap();
    assert_eq!(next, Some(Node::Planner));
    assert!(state.routing.chat_target.is_none());
    assert_eq!(
        state.meta.get("planner_chat").map(String::as_str),
        Some("agreed, logs first")
    );

    script.push_reply(Ok("task: review access.log".into()));
    let next = step(&mut copilot, &mut state, Node::Planner).await.unwrap();
    assert_eq!(next, Some(Node::Exit));
    assert_eq!(state.selected_task.as_deref(), Some("task: review access.log"));

    assert_eq!(copilot.store().message_count(&planner), before_digression + 2);
    let second_planner_call = script.last_history().unwrap();
    assert!(second_planner_call
        .iter()
        .any(|m| m.role == Role::User && m.text() == "focus on log review first"));
    assert!(second_planner_call
        .iter()
        .any(|m| m.role == Role::Assistant && m.text() == "agreed, logs first"));
}

#[tokio::test]
async fn test_empty_results_without_reflection_go_to_analyst() {
    let script = primed_script();
    let mut copilot = ready_copilot(script.clone(), vec!["", "no", "continue", "continue"]).await;
    let calls = script.call_count();

    let mut state = GraphState::default();
    state.irt = Some("IRT".into());

    let next = step(&mut copilot, &mut state, Node::HumanInput).await.unwrap();
    assert_eq!(next, Some(Node::Analyst));
    assert!(state.routing.skip_reflector);
    assert!(copilot.session().action_history.is_empty());

    // 空输入时 Analyst 不调用模型，跳过标记随即清除
    let next = step(&mut copilot, &mut state, Node::Analyst).await.unwrap();
    assert_eq!(next, Some(Node::Planner));
    assert!(!state.routing.skip_reflector);
    assert_eq!(script.call_count(), calls);
}

#[tokio::test]
async fn test_full_cycle_until_exit() {
    let script = primed_script();
    let mut copilot = ready_copilot(
        script.clone(),
        vec![
            "continue",
            "continue",
            "continue",
            "nmap shows port 80 open",
            "yes",
            "exit",
        ],
    )
    .await;

    let mut state = GraphState::with_input("web defacement on 10.0.2.5");
    let outcome = run_graph(&mut copilot, &mut state).await;

    assert_eq!(outcome, RunOutcome::Exited);
    assert!(state.irt.is_some());
    assert!(state.selected_task.is_some());
    assert!(state.generator_output.is_some());
    assert!(state.reflection.is_none());
    assert_eq!(
        copilot.session().action_history,
        vec!["nmap shows port 80 open".to_string()]
    );
    assert!(copilot
        .operator()
        .shown()
        .iter()
        .any(|s| s == "Thank you for using IRCopilot!"));
}

#[tokio::test]
async fn test_top_level_error_is_recorded() {
    let script = Arc::new(ScriptedLlmClient::with_replies(["Yes", "Yes", "Yes", "Yes"]));
    let mut copilot = ready_copilot(script, vec![]).await;

    let mut state = GraphState::with_input("host compromised");
    let outcome = run_graph(&mut copilot, &mut state).await;

    assert!(matches!(outcome, RunOutcome::Aborted(_)));
    assert_eq!(copilot.log().entries(LogBucket::Exception).len(), 1);
    assert!(state.irt.is_none());
}

#[test]
fn test_exit_is_one_step_from_every_node() {
    let exiting = RoutingState {
        exit_requested: true,
        ..RoutingState::default()
    };
    for node in Node::ALL {
        if node.is_terminal() {
            assert!(successors(node).is_empty());
            assert_eq!(route(node, &exiting), None);
        } else {
            assert_eq!(route(node, &exiting), Some(Node::Exit));
        }
    }
}
