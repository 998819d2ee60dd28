//! 提示词集合：内置默认文本，可由 `<prompts_dir>/<name>.txt` 覆盖

use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    pub generator_init: String,
    pub todo_to_command: String,
    pub planner_init: String,
    pub task_description: String,
    pub process_results: String,
    pub task_selection: String,
    pub regenerate: String,
    pub discussion: String,
    pub analysis_results: String,
    pub analysis_files: String,
    pub reflector_init: String,
    pub reflect_input: String,
    pub bad_example: String,
    pub local_task_init: String,
    pub local_task_prefix: String,
    pub local_task_brainstorm: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            generator_init: "You are a cybersecurity incident response assistant. Your superior assigns you sub-tasks; \
turn each one into concrete commands or step-by-step operational guidance. Explain what every command does \
and what output the analyst should look for. Reply with 'Yes' if you understand.".into(),
            todo_to_command: "You received incident response tasks. For the selected task, give the exact commands \
or GUI steps to perform it, one step at a time, and say what result to report back. The tasks are:\n".into(),
            planner_init: "You lead a cybersecurity incident response. You plan at a high level and maintain an \
Incident Response Tree (IRT): a numbered hierarchical list of tasks, each marked to-do, completed or \
not applicable. Keep the tree concise, do not invent results, and update it only from the analyst's \
findings. Reply with 'Yes' if you understand.".into(),
            task_description: "Build an Incident Response Tree (IRT) from the analyst's description below. List the \
top-level investigation phases with their sub-tasks, all marked to-do. The description is:\n".into(),
            process_results: "Revise the Incident Response Tree (IRT) using the analysis results below. Mark finished \
tasks as completed, add sub-tasks for new leads, and keep the rest unchanged. The results are:\n".into(),
            task_selection: "Based on the latest IRT, select the next to-do task. Prefer tasks that unblock others, \
then the most likely attack path. Explain the task in two or three sentences so a junior analyst \
can perform it.".into(),
            regenerate: "The analyst asks you to rebuild the Incident Response Tree (IRT) from scratch, keeping \
the verified findings. Their remarks are:\n".into(),
            discussion: "The analyst shares the following thoughts. Give your opinion and update the IRT if \
needed:\n".into(),
            analysis_results: "The analyst provides results from executing commands or guidance. Analyze them \
first, then update the IRT: mark completed tasks and add new tasks for the leads found. The results are:\n"
                .into(),
            analysis_files: "The analyst provides files (code, scripts, logs, traffic captures) for review. Analyze \
them first, then update the IRT with the findings. The files are:\n".into(),
            reflector_init: "You improve incident response work through reflection. You review the IRT and the \
decisions made from it, the results of the executed steps, and the analyst's remarks, then point out \
mistakes, their causes and how to correct them. Reply with 'Yes' if you understand.".into(),
            reflect_input: "Analyze the previous decisions and results to find errors and their causes. For each \
error give: the error, its cause, and the correction.\n".into(),
            bad_example: "The following is an incorrect example for review: the team marked 'check web server \
logs' as completed after viewing only the last 10 lines of access.log, and concluded there was no \
intrusion. Reflect on why this is wrong.".into(),
            local_task_init: "Ignore the previous tasks for now. You will help the analyst with one local \
question; answer only that question.".into(),
            local_task_prefix: "Continue the local task. The analyst shares these findings or questions:\n".into(),
            local_task_brainstorm: "Continue the local task. List every possible way to resolve the analyst's \
concern below, most promising first:\n".into(),
        }
    }
}

impl PromptSet {
    fn slots_mut(&mut self) -> [(&'static str, &mut String); 16] {
        [
            ("generator_init", &mut self.generator_init),
            ("todo_to_command", &mut self.todo_to_command),
            ("planner_init", &mut self.planner_init),
            ("task_description", &mut self.task_description),
            ("process_results", &mut self.process_results),
            ("task_selection", &mut self.task_selection),
            ("regenerate", &mut self.regenerate),
            ("discussion", &mut self.discussion),
            ("analysis_results", &mut self.analysis_results),
            ("analysis_files", &mut self.analysis_files),
            ("reflector_init", &mut self.reflector_init),
            ("reflect_input", &mut self.reflect_input),
            ("bad_example", &mut self.bad_example),
            ("local_task_init", &mut self.local_task_init),
            ("local_task_prefix", &mut self.local_task_prefix),
            ("local_task_brainstorm", &mut self.local_task_brainstorm),
        ]
    }

    /// 内置文本 + 目录中的同名覆盖文件；目录不存在时全部使用内置文本
    pub fn load(dir: &Path) -> Self {
        let mut prompts = Self::default();
        for (name, slot) in prompts.slots_mut() {
            let path = dir.join(format!("{name}.txt"));
            if let Ok(text) = std::fs::read_to_string(&path) {
                tracing::debug!("Prompt {} overridden by {}", name, path.display());
                *slot = text;
            }
        }
        prompts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_dir_uses_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let prompts = PromptSet::load(&dir.path().join("absent"));
        assert_eq!(prompts, PromptSet::default());
    }

    #[test]
    fn test_file_overrides_one_prompt() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("task_selection.txt"), "PICK ONE").unwrap();

        let prompts = PromptSet::load(dir.path());
        assert_eq!(prompts.task_selection, "PICK ONE");
        assert_eq!(prompts.planner_init, PromptSet::default().planner_init);
    }
}
