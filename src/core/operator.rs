//! 操作员 I/O：编排层只通过 Operator 与人交互
//!
//! - `ConsoleOperator`：终端（tokio stdin/stdout），多行输入以单独一行 `EOF` 结束；
//!   粘贴的命令输出里可以有空行
//! - `ScriptedOperator`：按顺序回放预设输入，记录所有输出

use std::collections::VecDeque;
use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin, Stdout};

/// 多行输入的结束行
pub const INPUT_TERMINATOR: &str = "EOF";

/// 一个可选项：(key, 说明)
pub type Choice<'a> = (&'a str, &'a str);

#[async_trait]
pub trait Operator: Send {
    /// 自由文本输入（可为空）
    async fn ask(&mut self, prompt: &str) -> io::Result<String>;

    /// 从 choices 中选一个，返回其 key
    async fn select(&mut self, title: &str, choices: &[Choice<'_>]) -> io::Result<String>;

    /// 是 / 否；无法识别的回答返回 None
    async fn confirm(&mut self, question: &str) -> io::Result<Option<bool>>;

    fn show(&mut self, text: &str);
}

fn parse_yes_no(answer: &str) -> Option<bool> {
    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

/// 按 key 或序号（从 1 开始）匹配选项
fn match_choice(input: &str, choices: &[Choice<'_>]) -> Option<String> {
    let input = input.trim();
    if let Some((key, _)) = choices.iter().find(|(key, _)| *key == input) {
        return Some(key.to_string());
    }
    input
        .parse::<usize>()
        .ok()
        .and_then(|i| i.checked_sub(1))
        .and_then(|i| choices.get(i))
        .map(|(key, _)| key.to_string())
}

fn input_closed() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "operator input closed")
}

pub struct ConsoleOperator<R = BufReader<Stdin>> {
    lines: Lines<R>,
    stdout: Stdout,
}

impl Default for ConsoleOperator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleOperator {
    pub fn new() -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin + Send> ConsoleOperator<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            stdout: tokio::io::stdout(),
        }
    }

    async fn prompt(&mut self, text: &str) -> io::Result<()> {
        self.stdout.write_all(text.as_bytes()).await?;
        self.stdout.flush().await
    }

    async fn read_line(&mut self) -> io::Result<String> {
        self.lines.next_line().await?.ok_or_else(input_closed)
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> Operator for ConsoleOperator<R> {
    async fn ask(&mut self, prompt: &str) -> io::Result<String> {
        self.prompt(&format!(
            "{prompt}\n(finish with a line containing only {INPUT_TERMINATOR})\n> "
        ))
        .await?;
        let mut collected: Vec<String> = Vec::new();
        loop {
            match self.lines.next_line().await? {
                Some(line) if line.trim() == INPUT_TERMINATOR => break,
                Some(line) => collected.push(line),
                None if collected.is_empty() => return Err(input_closed()),
                None => break,
            }
        }
        Ok(collected.join("\n"))
    }

    async fn select(&mut self, title: &str, choices: &[Choice<'_>]) -> io::Result<String> {
        let mut menu = format!("{title}\n");
        for (i, (key, label)) in choices.iter().enumerate() {
            menu.push_str(&format!("  {}. {:<24} {}\n", i + 1, key, label));
        }
        loop {
            self.prompt(&format!("{menu}> ")).await?;
            let line = self.read_line().await?;
            if let Some(key) = match_choice(&line, choices) {
                return Ok(key);
            }
            self.prompt("Please key in the correct options.\n").await?;
        }
    }

    async fn confirm(&mut self, question: &str) -> io::Result<Option<bool>> {
        self.prompt(&format!("{question} [y/n] ")).await?;
        let line = self.read_line().await?;
        Ok(parse_yes_no(&line))
    }

    fn show(&mut self, text: &str) {
        println!("{text}");
    }
}

/// 脚本操作员：输入用尽时返回 UnexpectedEof
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    inputs: VecDeque<String>,
    shown: Vec<String>,
}

impl ScriptedOperator {
    pub fn new<S: Into<String>>(inputs: impl IntoIterator<Item = S>) -> Self {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            shown: Vec::new(),
        }
    }

    pub fn shown(&self) -> &[String] {
        &self.shown
    }

    fn next(&mut self) -> io::Result<String> {
        self.inputs.pop_front().ok_or_else(input_closed)
    }
}

#[async_trait]
impl Operator for ScriptedOperator {
    async fn ask(&mut self, _prompt: &str) -> io::Result<String> {
        self.next()
    }

    async fn select(&mut self, title: &str, choices: &[Choice<'_>]) -> io::Result<String> {
        loop {
            let input = self.next()?;
            match match_choice(&input, choices) {
                Some(key) => return Ok(key),
                None => self
                    .shown
                    .push(format!("{title}: invalid option {input:?}")),
            }
        }
    }

    async fn confirm(&mut self, _question: &str) -> io::Result<Option<bool>> {
        Ok(parse_yes_no(&self.next()?))
    }

    fn show(&mut self, text: &str) {
        self.shown.push(text.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHOICES: [Choice<'static>; 3] = [
        ("continue", "Continue"),
        ("chat", "Chat"),
        ("exit", "Exit"),
    ];

    #[test]
    fn test_match_choice_by_key_or_index() {
        assert_eq!(match_choice("chat", &CHOICES).as_deref(), Some("chat"));
        assert_eq!(match_choice(" 3 ", &CHOICES).as_deref(), Some("exit"));
        assert_eq!(match_choice("0", &CHOICES), None);
        assert_eq!(match_choice("later", &CHOICES), None);
    }

    #[test]
    fn test_parse_yes_no() {
        assert_eq!(parse_yes_no("Y"), Some(true));
        assert_eq!(parse_yes_no("no"), Some(false));
        assert_eq!(parse_yes_no("maybe"), None);
    }

    fn console(input: &'static str) -> ConsoleOperator<BufReader<&'static [u8]>> {
        ConsoleOperator::from_reader(BufReader::new(input.as_bytes()))
    }

    #[tokio::test]
    async fn test_console_ask_keeps_blank_lines_until_terminator() {
        let mut op = console(
            "web server 10.0.2.5 defaced\n\nattacker uploaded shell.php via /upload\nEOF\n2\n",
        );
        let text = op.ask("Describe the incident").await.unwrap();
        assert_eq!(
            text,
            "web server 10.0.2.5 defaced\n\nattacker uploaded shell.php via /upload"
        );
        // 下一次选择读到的是操作员真正输入的选项
        assert_eq!(op.select("next", &CHOICES).await.unwrap(), "chat");
    }

    #[tokio::test]
    async fn test_console_ask_empty_and_closed_input() {
        let mut op = console("EOF\npartial line");
        assert_eq!(op.ask("results").await.unwrap(), "");
        // 输入流结束时保留已读内容
        assert_eq!(op.ask("results").await.unwrap(), "partial line");
        let err = op.ask("results").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_scripted_operator_skips_invalid_choices() {
        let mut op = ScriptedOperator::new(["bogus", "2", "free text"]);
        assert_eq!(op.select("next", &CHOICES).await.unwrap(), "chat");
        assert_eq!(op.ask("say").await.unwrap(), "free text");
        assert_eq!(op.shown().len(), 1);

        let err = op.ask("more").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
