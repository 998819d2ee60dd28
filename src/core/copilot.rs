//! 编排核心：四个 Agent、对话存储、会话快照、运行日志与操作员
//!
//! 自动图（graph.rs）与交互菜单（menu.rs）只决定「下一步做什么」，实际的 Agent 调用与状态更新都在这里。

use std::path::{Path, PathBuf};

use crate::agent::{AgentRole, AgentSession};
use crate::core::error::{CopilotError, Result};
use crate::core::operator::Operator;
use crate::core::prompts::PromptSet;
use crate::llm::ResolvedModel;
use crate::memory::ConversationStore;
use crate::session::{LogBucket, RunLog, SessionPersistence, SessionState};

const DIVIDER_WIDTH: usize = 100;

/// 拼接两段模型输出，中间一行分隔线
pub fn join_with_divider(first: &str, second: &str) -> String {
    format!("{first}\n{}\n{second}", "-".repeat(DIVIDER_WIDTH))
}

pub struct Copilot<O: Operator> {
    prompts: PromptSet,
    planner: AgentSession,
    generator: AgentSession,
    reflector: AgentSession,
    /// 与 Planner 共用推理对话
    analyst: AgentSession,
    store: ConversationStore,
    session: SessionState,
    log: RunLog,
    operator: O,

    /// 最近一次推理输出（IRT + 任务选择），菜单中 generate_commands 的输入
    pub reasoning_output: Option<String>,
    /// 最近一次生成输出，菜单中 sub-task 的前提
    pub generation_output: Option<String>,
}

impl<O: Operator> Copilot<O> {
    /// Planner 与 Analyst 共用一个客户端（同一历史窗口），Generator、Reflector 各自独立
    pub fn new(model: &ResolvedModel, prompts: PromptSet, operator: O) -> Self {
        let options = model.options().clone();
        let reasoning = model.client();
        Self {
            prompts,
            planner: AgentSession::new(AgentRole::Planner, reasoning.clone(), options.clone()),
            generator: AgentSession::new(AgentRole::Generator, model.client(), options.clone()),
            reflector: AgentSession::new(AgentRole::Reflector, model.client(), options.clone()),
            analyst: AgentSession::new(AgentRole::Analyst, reasoning, options),
            store: ConversationStore::new(),
            session: SessionState::default(),
            log: RunLog::new(),
            operator,
            reasoning_output: None,
            generation_output: None,
        }
    }

    pub fn prompts(&self) -> &PromptSet {
        &self.prompts
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionState {
        &mut self.session
    }

    pub fn log(&self) -> &RunLog {
        &self.log
    }

    pub fn operator(&self) -> &O {
        &self.operator
    }

    pub fn operator_mut(&mut self) -> &mut O {
        &mut self.operator
    }

    pub fn conversation(&self, role: AgentRole) -> Option<&str> {
        self.agent(role).conversation_id()
    }

    fn agent(&self, role: AgentRole) -> &AgentSession {
        match role {
            AgentRole::Planner => &self.planner,
            AgentRole::Generator => &self.generator,
            AgentRole::Reflector => &self.reflector,
            AgentRole::Analyst => &self.analyst,
        }
    }

    // ---- 操作员交互（同时写入运行日志） ----

    /// 系统提示：显示并记入 IRCopilot 桶
    pub fn say(&mut self, text: &str) {
        self.operator.show(text);
        self.log.record(LogBucket::System, text);
    }

    /// 显示 Agent 回复
    pub fn respond(&mut self, text: &str) {
        self.operator.show(&format!("IRCopilot:\n{text}\n"));
        self.log.record(LogBucket::System, text);
    }

    /// 提示后读取操作员输入，记入 user 桶
    pub async fn hear(&mut self, prompt: &str) -> Result<String> {
        self.log.record(LogBucket::System, prompt);
        let input = self.operator.ask(prompt).await?;
        self.log.record(LogBucket::User, input.as_str());
        Ok(input)
    }

    pub async fn choose(&mut self, title: &str, choices: &[(&str, &str)]) -> Result<String> {
        let key = self.operator.select(title, choices).await?;
        self.log.record(LogBucket::User, key.as_str());
        Ok(key)
    }

    /// 捕获到的顶层错误：写入 exception 桶并告知操作员
    pub fn record_exception(&mut self, err: &CopilotError) {
        tracing::error!(error = %err, "Run aborted");
        self.log.record(LogBucket::Exception, err.to_string());
        self.operator.show(&format!("Exception: {err}"));
    }

    // ---- Agent 调用 ----

    /// 在某个 Agent 的对话上发送一条消息，回复记入该 Agent 的日志桶
    pub async fn talk(&mut self, role: AgentRole, text: &str) -> Result<String> {
        let agent = match role {
            AgentRole::Planner => &self.planner,
            AgentRole::Generator => &self.generator,
            AgentRole::Reflector => &self.reflector,
            AgentRole::Analyst => &self.analyst,
        };
        let reply = agent.send(&mut self.store, text).await?;
        self.log.record(role, reply.as_str());
        Ok(reply)
    }

    /// 更新 IRT 后选择下一任务；返回 (拼接后的完整输出, 任务选择)
    pub async fn reasoning_handler(&mut self, text: &str) -> Result<(String, String)> {
        let request = format!("{}{}", self.prompts.process_results, text);
        self.reason_with(&request).await
    }

    /// 发送给定请求，再追加一次任务选择
    async fn reason_with(&mut self, request: &str) -> Result<(String, String)> {
        let updated_irt = self.talk(AgentRole::Planner, request).await?;
        let task_selection = self.prompts.task_selection.clone();
        let decision = self.talk(AgentRole::Planner, &task_selection).await?;
        Ok((join_with_divider(&updated_irt, &decision), decision))
    }

    pub async fn generation_handler(&mut self, text: &str) -> Result<String> {
        self.talk(AgentRole::Generator, text).await
    }

    /// 按执行结果 / 文件更新 IRT 并选择任务，结果记入动作与决策历史
    pub async fn analyse(&mut self, prefix: &str, input: &str) -> Result<String> {
        self.session.record_action(input);
        let request = format!("{prefix}{input}");
        let (combined, _) = self.reason_with(&request).await?;
        self.session.record_decision(combined.as_str());
        self.reasoning_output = Some(combined.clone());
        Ok(combined)
    }

    /// 反思：最近 k 条决策 + 最近 k 条执行结果 + 操作员的想法
    pub async fn reflect(&mut self, k: usize, thoughts: &str) -> Result<String> {
        let recent_tasks = self.session.recent_decisions(k).join("\n\n");
        let recent_actions = self.session.recent_actions(k).join("\n\n");
        let request = format!(
            "{}Your previously designed Incident Response Tree (IRT) and the decisions you made based on the IRT: {}\n\n\
Results of the incident response steps: \n{}\n\n\
Analyst's thoughts or your previous reflections (can be empty): \n{}",
            self.prompts.reflect_input, recent_tasks, recent_actions, thoughts
        );
        self.talk(AgentRole::Reflector, &request).await
    }

    // ---- 初始化与持久化 ----

    /// 恢复已有会话，或新开三个对话并完成 Agent 预热。
    ///
    /// 句柄不全的快照按新会话处理。返回是否恢复了已有会话。
    pub async fn initialize(&mut self, previous: Option<SessionState>) -> Result<bool> {
        if let Some(mut state) = previous {
            if state.is_resumable() {
                self.store = ConversationStore::from_snapshot(std::mem::take(&mut state.conversations));
                for role in AgentRole::ALL {
                    if let Some(id) = state.conversation(role) {
                        let id = id.to_string();
                        match role {
                            AgentRole::Planner => self.planner.attach(id),
                            AgentRole::Generator => self.generator.attach(id),
                            AgentRole::Reflector => self.reflector.attach(id),
                            AgentRole::Analyst => self.analyst.attach(id),
                        }
                    }
                }
                tracing::info!(conversations = self.store.len(), "Session resumed");
                self.session = state;
                let task_log = format!("Task log: {:?}", self.session.task_log);
                self.say(&task_log);
                self.say("You may use 'discuss' to remind the task.");
                return Ok(true);
            }
            self.say("Error: the previous session ids are invalid. Loading new sessions");
        }

        let prompts = self.prompts.clone();

        let (_, generation_id) = self
            .generator
            .start(&mut self.store, &prompts.generator_init)
            .await?;
        self.say(&format!("Generation session : {generation_id}"));

        let (_, reasoning_id) = self
            .planner
            .start(&mut self.store, &prompts.planner_init)
            .await?;
        self.analyst.attach(reasoning_id.clone());
        self.say(&format!("Reasoning session : {reasoning_id}"));

        let (_, reflection_id) = self
            .reflector
            .start(&mut self.store, &prompts.reflector_init)
            .await?;
        self.reflector
            .send(&mut self.store, &prompts.bad_example)
            .await?;
        self.say(&format!("Reflection session: {reflection_id}"));

        self.session.set_conversation(AgentRole::Generator, generation_id);
        self.session.set_conversation(AgentRole::Planner, reasoning_id.clone());
        self.session.set_conversation(AgentRole::Analyst, reasoning_id);
        self.session.set_conversation(AgentRole::Reflector, reflection_id);

        self.say("- IRCopilot Agents Initialized.");
        Ok(false)
    }

    /// 询问事件描述并记入任务日志
    pub async fn ask_task_description(&mut self) -> Result<String> {
        let description = self
            .hear("Please describe the incident response task, including the system, task, incident type, etc.")
            .await?;
        self.session
            .task_log
            .insert("task description".to_string(), description.clone());
        Ok(description)
    }

    /// 交互模式的开场：描述 -> 初始 IRT + 任务选择 -> 初始指导
    pub async fn feed_init_prompts(&mut self) -> Result<String> {
        let description = self.ask_task_description().await?;

        let request = format!("{}{}", self.prompts.task_description, description);
        let (reasoning, _) = self.reason_with(&request).await?;
        self.session.record_decision(reasoning.as_str());

        let request = format!("{}{}", self.prompts.todo_to_command, reasoning);
        let generation = self.generation_handler(&request).await?;

        let response = format!("{reasoning}\n{generation}");
        self.operator.show(&format!("IRCopilot output: \n{response}"));
        self.log
            .record(LogBucket::System, format!("IRCopilot output: {response}"));

        self.reasoning_output = Some(reasoning);
        self.generation_output = Some(generation);
        Ok(response)
    }

    /// 写出运行日志；失败只告警
    pub fn write_run_log(&self, log_dir: &Path) -> Option<PathBuf> {
        match self.log.write(log_dir) {
            Ok(path) => {
                tracing::info!("Run log written to {}", path.display());
                Some(path)
            }
            Err(e) => {
                tracing::error!("Failed to write run log: {:#}", e);
                None
            }
        }
    }

    /// 启动时询问是否继续之前的会话；按序号（从 0 开始）选择已保存的会话。
    ///
    /// 无效选择、读取失败或句柄不全都返回 None，随后全新初始化。
    pub async fn preload_session(
        &mut self,
        persistence: &SessionPersistence,
    ) -> Result<Option<SessionState>> {
        match self
            .operator
            .confirm("Do you want to continue from previous session?")
            .await?
        {
            Some(true) => {}
            Some(false) => return Ok(None),
            None => {
                self.say("You input an invalid option. Will start a new session.");
                return Ok(None);
            }
        }

        let names = match persistence.list() {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!("Failed to list sessions in {}: {:#}", persistence.dir().display(), e);
                Vec::new()
            }
        };
        if names.is_empty() {
            self.say("No previous session found. Please start a new session.");
            return Ok(None);
        }

        let mut listing = String::from("Please select the previous session by its index (integer):");
        for (i, name) in names.iter().enumerate() {
            listing.push_str(&format!("\n{i}. {name}"));
        }
        self.say(&listing);

        let answer = self.hear("Please key in your option (integer): ").await?;
        let Some(name) = answer.trim().parse::<usize>().ok().and_then(|i| names.get(i)) else {
            self.say("You input an invalid option. Will start a new session.");
            return Ok(None);
        };
        self.say(&format!("You selected: {name}"));

        let state = persistence.load_resumable(name);
        if state.is_none() {
            self.say("Error when loading the previous session. Will start a new session.");
        }
        Ok(state)
    }

    /// 询问名称并保存会话（含本地对话记录）；返回保存的名称
    pub async fn save_session(&mut self, persistence: &SessionPersistence) -> Result<String> {
        self.operator
            .show("Before you quit, you may want to save the current session.");
        let name = self
            .operator
            .ask("Please enter the name of the current session. (Default with current timestamp)")
            .await
            .unwrap_or_default();

        let mut snapshot = self.session.clone();
        snapshot.conversations = self.store.snapshot();
        let saved = persistence
            .save(&snapshot, Some(name.as_str()))
            .map_err(|e| CopilotError::Persistence(format!("{e:#}")))?;
        self.operator
            .show(&format!("The current session is saved as {saved}"));
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::operator::ScriptedOperator;
    use crate::llm::{RetryConfig, ScriptedLlmClient};
    use std::sync::Arc;

    fn copilot(script: Arc<ScriptedLlmClient>, inputs: Vec<&str>) -> Copilot<ScriptedOperator> {
        let model = ResolvedModel::from_backend(script, RetryConfig::default(), 5);
        Copilot::new(&model, PromptSet::default(), ScriptedOperator::new(inputs))
    }

    #[test]
    fn test_join_with_divider() {
        let joined = join_with_divider("a", "b");
        assert_eq!(joined, format!("a\n{}\nb", "-".repeat(100)));
    }

    #[tokio::test]
    async fn test_initialize_starts_three_conversations() {
        let script = Arc::new(ScriptedLlmClient::default().with_fallback("Yes"));
        let mut copilot = copilot(script.clone(), vec![]);

        copilot.initialize(None).await.unwrap();

        // generator、planner、reflector 各一次 start，reflector 再喂一次反例
        assert_eq!(script.call_count(), 4);
        assert_eq!(copilot.store().len(), 3);
        assert!(copilot.session().is_resumable());
        assert_eq!(
            copilot.conversation(AgentRole::Analyst),
            copilot.conversation(AgentRole::Planner)
        );
        let reflection = copilot.conversation(AgentRole::Reflector).unwrap();
        assert_eq!(copilot.store().message_count(reflection), 2);
    }

    #[tokio::test]
    async fn test_partial_snapshot_triggers_fresh_initialization() {
        let script = Arc::new(ScriptedLlmClient::default().with_fallback("Yes"));
        let mut copilot = copilot(script.clone(), vec![]);

        let mut partial = SessionState::default();
        partial.set_conversation(AgentRole::Planner, "old-planner");
        assert!(!copilot.initialize(Some(partial)).await.unwrap());

        assert_eq!(script.call_count(), 4);
        assert_ne!(copilot.conversation(AgentRole::Planner), Some("old-planner"));
    }

    #[tokio::test]
    async fn test_resume_attaches_without_model_calls() {
        let script = Arc::new(ScriptedLlmClient::default().with_fallback("Yes"));
        let mut copilot = copilot(script.clone(), vec![]);

        let mut state = SessionState::default();
        for (role, id) in [
            (AgentRole::Planner, "p"),
            (AgentRole::Generator, "g"),
            (AgentRole::Reflector, "r"),
            (AgentRole::Analyst, "p"),
        ] {
            state.set_conversation(role, id);
        }
        assert!(copilot.initialize(Some(state)).await.unwrap());

        assert_eq!(script.call_count(), 0);
        assert_eq!(copilot.conversation(AgentRole::Generator), Some("g"));
        copilot.talk(AgentRole::Generator, "hello").await.unwrap();
        assert_eq!(copilot.store().message_count("g"), 1);
    }

    #[tokio::test]
    async fn test_feed_init_prompts_records_description() {
        let script = Arc::new(ScriptedLlmClient::default().with_fallback("ok"));
        let mut copilot = copilot(script.clone(), vec!["web defacement on 10.0.2.5"]);
        copilot.initialize(None).await.unwrap();

        copilot.feed_init_prompts().await.unwrap();

        assert_eq!(
            copilot.session().task_log.get("task description").map(String::as_str),
            Some("web defacement on 10.0.2.5")
        );
        // IRT、任务选择、初始指导
        assert_eq!(script.call_count(), 4 + 3);
        assert!(copilot.reasoning_output.is_some());
        assert_eq!(copilot.generation_output.as_deref(), Some("ok"));
        assert_eq!(copilot.session().decision_history.len(), 1);
    }

    #[tokio::test]
    async fn test_reflect_uses_recent_history() {
        let script = Arc::new(ScriptedLlmClient::default().with_fallback("noted"));
        let mut copilot = copilot(script.clone(), vec![]);
        copilot.initialize(None).await.unwrap();

        copilot.session_mut().record_decision("old decision");
        copilot.session_mut().record_decision("new decision");
        copilot.session_mut().record_action("ran netstat");

        copilot.reflect(1, "looks off").await.unwrap();
        let sent = script.last_history().unwrap();
        let request = sent.last().unwrap().text();
        assert!(request.contains("new decision"));
        assert!(!request.contains("old decision"));
        assert!(request.contains("ran netstat"));
        assert!(request.ends_with("looks off"));
    }
}
