//! 交互菜单：操作员逐条选择意图，每个意图调用共享核心上的同一组 Agent 操作

use std::fmt;
use std::str::FromStr;

use crate::agent::AgentRole;
use crate::core::copilot::Copilot;
use crate::core::error::Result;
use crate::core::graph::RunOutcome;
use crate::core::operator::Operator;

/// 主菜单意图
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    ChatWithPlanner,
    Next,
    AnalyseResults,
    AnalyseFiles,
    Discuss,
    RegenerateIrt,
    ChatWithGenerator,
    GenerateCommands,
    SubTask,
    ChatWithReflector,
    Reflect,
    Help,
    Exit,
}

impl Intent {
    pub const ALL: [Intent; 13] = [
        Intent::ChatWithPlanner,
        Intent::Next,
        Intent::AnalyseResults,
        Intent::AnalyseFiles,
        Intent::Discuss,
        Intent::RegenerateIrt,
        Intent::ChatWithGenerator,
        Intent::GenerateCommands,
        Intent::SubTask,
        Intent::ChatWithReflector,
        Intent::Reflect,
        Intent::Help,
        Intent::Exit,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Intent::ChatWithPlanner => "chat_with_Planner",
            Intent::Next => "next",
            Intent::AnalyseResults => "analyse_results",
            Intent::AnalyseFiles => "analyse_files",
            Intent::Discuss => "discuss_with_IRCopilot",
            Intent::RegenerateIrt => "regenerate_the_IRT",
            Intent::ChatWithGenerator => "chat_with_Generator",
            Intent::GenerateCommands => "generate_commands",
            Intent::SubTask => "sub-task",
            Intent::ChatWithReflector => "chat_with_Reflector",
            Intent::Reflect => "reflect",
            Intent::Help => "help",
            Intent::Exit => "exit_IRCopilot",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Intent::ChatWithPlanner => "Chat with Planner.",
            Intent::Next => "Continue to the next step by inputting the test results.",
            Intent::AnalyseResults => "Analysis results.",
            Intent::AnalyseFiles => "Analysis files.",
            Intent::Discuss => "Ask IRCopilot for the task list and what to do next.",
            Intent::RegenerateIrt => {
                "Regenerate the IRT. You can ask for help, discuss the task, or give any feedbacks."
            }
            Intent::ChatWithGenerator => "Chat with Generator.",
            Intent::GenerateCommands => "Explain the previous given task with more details.",
            Intent::SubTask => "Focus on the sub-task.",
            Intent::ChatWithReflector => "Chat with Reflector.",
            Intent::Reflect => "Reflect on the results of the execution.",
            Intent::Help => "Show this help page.",
            Intent::Exit => "End the current session.",
        }
    }

    pub fn choices() -> Vec<(&'static str, &'static str)> {
        Self::ALL.iter().map(|i| (i.key(), i.describe())).collect()
    }

    pub fn help_text() -> String {
        Self::ALL
            .iter()
            .map(|i| format!(" - {}: {}", i.key(), i.describe()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|i| i.key() == s)
            .ok_or_else(|| format!("unknown option: {s}"))
    }
}

/// 子任务循环中的选项（只作用于 Generator）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalIntent {
    Discuss,
    Deliberate,
    Help,
    Exit,
}

impl LocalIntent {
    pub const CHOICES: [(&'static str, &'static str); 4] = [
        ("discuss", "Discuss with IRCopilot about this sub-task."),
        ("deliberate", "Deliberate on solutions for the sub-task."),
        ("help", "Show the help page."),
        ("exit", "Exit from sub-task."),
    ];

    pub fn help_text() -> String {
        Self::CHOICES
            .iter()
            .map(|(key, desc)| format!(" - {key}: {desc}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl FromStr for LocalIntent {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "discuss" => Ok(LocalIntent::Discuss),
            "deliberate" => Ok(LocalIntent::Deliberate),
            "help" => Ok(LocalIntent::Help),
            "exit" => Ok(LocalIntent::Exit),
            other => Err(format!("unknown option: {other}")),
        }
    }
}

/// 一个意图处理完后是否继续主循环
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

const NO_REASONING: &str =
    "You have not initialized the task yet. Please perform the basic testing following `next` option.";
const NO_GENERATION: &str =
    "You haven't initialized the generator yet. Please perform the basic testing following `generate` option.";

async fn chat_with<O: Operator>(copilot: &mut Copilot<O>, role: AgentRole) -> Result<String> {
    let thoughts = copilot
        .hear(&format!("Please send your thoughts to {role}."))
        .await?;
    let response = copilot.talk(role, &thoughts).await?;
    copilot.respond(&response);
    Ok(response)
}

async fn analyse_with<O: Operator>(
    copilot: &mut Copilot<O>,
    prompt: &str,
    prefix: String,
) -> Result<()> {
    let input = copilot.hear(prompt).await?;
    let response = copilot.analyse(&prefix, &input).await?;
    copilot.respond(&response);
    Ok(())
}

async fn reflect<O: Operator>(copilot: &mut Copilot<O>) -> Result<()> {
    let thoughts = copilot
        .hear("Please send your thoughts to GPT for reflection.")
        .await?;
    let raw_k = copilot
        .hear("Enter the number of recent conversations to include in reflection:")
        .await?;
    let k = match raw_k.trim() {
        "" => 1,
        s => match s.parse::<usize>() {
            Ok(k) => k,
            Err(_) => {
                copilot.say("Invalid input. Using default value.");
                1
            }
        },
    };
    let response = copilot.reflect(k, &thoughts).await?;
    copilot.respond(&response);
    Ok(())
}

/// 子任务循环：每轮先以本地任务提示重新引导 Generator
async fn sub_task<O: Operator>(copilot: &mut Copilot<O>) -> Result<()> {
    let local_task_init = copilot.prompts().local_task_init.clone();
    loop {
        copilot.generation_handler(&local_task_init).await?;

        let choice = copilot.choose("> sub-task", &LocalIntent::CHOICES).await?;
        match choice.parse::<LocalIntent>() {
            Ok(LocalIntent::Help) => {
                let help = LocalIntent::help_text();
                copilot.operator_mut().show(&help);
            }
            Ok(LocalIntent::Discuss) => {
                let input = copilot
                    .hear("Please share your findings/questions with IRCopilot.")
                    .await?;
                let request = format!("{}{}", copilot.prompts().local_task_prefix, input);
                let response = copilot.generation_handler(&request).await?;
                copilot.respond(&response);
            }
            Ok(LocalIntent::Deliberate) => {
                let input = copilot
                    .hear("Please share your concerns and questions with IRCopilot.")
                    .await?;
                let request = format!("{}{}", copilot.prompts().local_task_brainstorm, input);
                let response = copilot.generation_handler(&request).await?;
                copilot.respond(&response);
            }
            Ok(LocalIntent::Exit) => {
                copilot.say("Exit the local task and continue the main task.");
                return Ok(());
            }
            Err(e) => tracing::warn!("{}", e),
        }
    }
}

/// 执行一个意图
pub async fn dispatch<O: Operator>(copilot: &mut Copilot<O>, intent: Intent) -> Result<Flow> {
    match intent {
        Intent::ChatWithPlanner => {
            let response = chat_with(copilot, AgentRole::Planner).await?;
            copilot.reasoning_output = Some(response);
        }
        Intent::Next => {
            let input = copilot.hear("Your input:").await?;
            let (response, _) = copilot.reasoning_handler(&input).await?;
            copilot.session_mut().record_decision(response.as_str());
            copilot.say(&format!(
                "Based on the analysis, the following tasks are recommended: {response}"
            ));
            copilot.reasoning_output = Some(response);
        }
        Intent::AnalyseResults => {
            let prefix = copilot.prompts().analysis_results.clone();
            analyse_with(
                copilot,
                "Please send the results of the guidance/command execution to IRCopilot.",
                prefix,
            )
            .await?;
        }
        Intent::AnalyseFiles => {
            let prefix = copilot.prompts().analysis_files.clone();
            analyse_with(
                copilot,
                "Please send the files that need to be reviewed to IRCopilot.",
                prefix,
            )
            .await?;
        }
        Intent::Discuss => {
            let input = copilot
                .hear("Please share your thoughts/questions with IRCopilot.")
                .await?;
            let request = format!("{}{}", copilot.prompts().discussion, input);
            let (response, _) = copilot.reasoning_handler(&request).await?;
            copilot.respond(&response);
            copilot.reasoning_output = Some(response);
        }
        Intent::RegenerateIrt => {
            let input = copilot
                .hear("Please share your thoughts/questions to regenerate the IRT.")
                .await?;
            let request = format!("{}{}", copilot.prompts().regenerate, input);
            let (reasoning, _) = copilot.reasoning_handler(&request).await?;
            let message = format!("{}\n{}", copilot.prompts().todo_to_command, reasoning);
            let generation = copilot.generation_handler(&message).await?;
            copilot.say(&format!(
                "Based on the analysis, the following tasks are recommended: \n{reasoning}\n\
You can follow the instructions below to complete the tasks. \n{generation}"
            ));
            copilot.reasoning_output = Some(reasoning);
            copilot.generation_output = Some(generation);
        }
        Intent::ChatWithGenerator => {
            let response = chat_with(copilot, AgentRole::Generator).await?;
            copilot.generation_output = Some(response);
        }
        Intent::GenerateCommands => {
            let Some(reasoning) = copilot.reasoning_output.clone() else {
                copilot.say(NO_REASONING);
                return Ok(Flow::Continue);
            };
            copilot.say("IRCopilot will generate details");
            let response = copilot.generation_handler(&reasoning).await?;
            copilot.say(&format!("Below are the further details.\n{response}"));
            copilot.generation_output = Some(response);
        }
        Intent::SubTask => {
            if copilot.generation_output.is_none() {
                copilot.say(NO_GENERATION);
                return Ok(Flow::Continue);
            }
            sub_task(copilot).await?;
        }
        Intent::ChatWithReflector => {
            chat_with(copilot, AgentRole::Reflector).await?;
        }
        Intent::Reflect => {
            // 反思失败只提示，不结束本次运行
            if let Err(e) = reflect(copilot).await {
                if e.is_input_closed() {
                    return Err(e);
                }
                tracing::warn!(error = %e, "Reflection failed");
                copilot.say(&format!("An error occurred during reflection: {e}"));
            }
        }
        Intent::Help => {
            let help = Intent::help_text();
            copilot.operator_mut().show(&help);
        }
        Intent::Exit => {
            copilot.say("Thank you for using IRCopilot!");
            return Ok(Flow::Exit);
        }
    }
    Ok(Flow::Continue)
}

async fn next_intent<O: Operator>(
    copilot: &mut Copilot<O>,
    choices: &[(&str, &str)],
) -> Result<Flow> {
    let key = copilot.choose("> ", choices).await?;
    match key.parse::<Intent>() {
        Ok(intent) => dispatch(copilot, intent).await,
        Err(_) => {
            copilot.say("Please key in the correct options.");
            Ok(Flow::Continue)
        }
    }
}

/// 交互主循环：直到 exit_IRCopilot 或顶层错误
pub async fn run_menu<O: Operator>(copilot: &mut Copilot<O>) -> RunOutcome {
    let choices = Intent::choices();
    loop {
        match next_intent(copilot, &choices).await {
            Ok(Flow::Continue) => copilot.operator_mut().show(&"-".repeat(41)),
            Ok(Flow::Exit) => return RunOutcome::Exited,
            Err(e) => {
                copilot.record_exception(&e);
                return RunOutcome::Aborted(e.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::copilot::join_with_divider;
    use crate::core::operator::ScriptedOperator;
    use crate::core::prompts::PromptSet;
    use crate::llm::{ResolvedModel, RetryConfig, ScriptedLlmClient};
    use std::sync::Arc;

    async fn ready(script: Arc<ScriptedLlmClient>, inputs: Vec<&str>) -> Copilot<ScriptedOperator> {
        let model = ResolvedModel::from_backend(script, RetryConfig::default(), 5);
        let mut copilot = Copilot::new(&model, PromptSet::default(), ScriptedOperator::new(inputs));
        copilot.initialize(None).await.unwrap();
        copilot
    }

    #[test]
    fn test_intent_keys_round_trip() {
        for intent in Intent::ALL {
            assert_eq!(intent.key().parse::<Intent>(), Ok(intent));
        }
        assert!("nope".parse::<Intent>().is_err());
        assert_eq!("sub-task".parse::<Intent>(), Ok(Intent::SubTask));
        assert!(Intent::help_text().contains("exit_IRCopilot"));
    }

    #[tokio::test]
    async fn test_generate_commands_requires_reasoning() {
        let script = Arc::new(ScriptedLlmClient::default().with_fallback("Yes"));
        let mut copilot = ready(script.clone(), vec![]).await;
        let before = script.call_count();

        let flow = dispatch(&mut copilot, Intent::GenerateCommands).await.unwrap();
        assert_eq!(flow, Flow::Continue);
        assert_eq!(script.call_count(), before);
        assert!(copilot.operator().shown().iter().any(|s| s == NO_REASONING));
    }

    #[tokio::test]
    async fn test_next_sets_reasoning_output() {
        let script = Arc::new(ScriptedLlmClient::default().with_fallback("Yes"));
        let mut copilot = ready(script.clone(), vec!["port 80 open"]).await;
        script.push_reply(Ok("updated IRT".into()));
        script.push_reply(Ok("check access.log".into()));

        dispatch(&mut copilot, Intent::Next).await.unwrap();
        let reasoning = copilot.reasoning_output.clone().unwrap();
        assert_eq!(reasoning, join_with_divider("updated IRT", "check access.log"));
        assert_eq!(copilot.session().decision_history.len(), 1);
    }

    #[tokio::test]
    async fn test_reflect_invalid_k_falls_back_to_one() {
        let script = Arc::new(ScriptedLlmClient::default().with_fallback("reflection"));
        let mut copilot = ready(script.clone(), vec!["thoughts", "many"]).await;

        dispatch(&mut copilot, Intent::Reflect).await.unwrap();
        let shown = copilot.operator().shown();
        assert!(shown.iter().any(|s| s == "Invalid input. Using default value."));
        assert!(shown.iter().any(|s| s.contains("reflection")));
    }

    #[tokio::test]
    async fn test_sub_task_loops_until_exit() {
        let script = Arc::new(ScriptedLlmClient::default().with_fallback("ok"));
        let mut copilot = ready(
            script.clone(),
            vec!["help", "discuss", "what is this pid", "exit"],
        )
        .await;
        copilot.generation_output = Some("guidance".into());
        let generator = copilot.conversation(AgentRole::Generator).unwrap().to_string();
        let before = copilot.store().message_count(&generator);

        dispatch(&mut copilot, Intent::SubTask).await.unwrap();

        // 三轮各一次本地任务引导，外加一次 discuss
        assert_eq!(copilot.store().message_count(&generator), before + 4);
        assert!(copilot
            .operator()
            .shown()
            .iter()
            .any(|s| s == "Exit the local task and continue the main task."));
    }

    #[tokio::test]
    async fn test_run_menu_records_exception_and_stops() {
        let script = Arc::new(ScriptedLlmClient::default().with_fallback("Yes"));
        let mut copilot = ready(script, vec!["help"]).await;

        let outcome = run_menu(&mut copilot).await;
        assert!(matches!(outcome, RunOutcome::Aborted(_)));
        assert_eq!(
            copilot
                .log()
                .entries(crate::session::LogBucket::Exception)
                .len(),
            1
        );
    }
}
