//! 事件处理
//!
//! 轮询 crossterm 键盘事件，将快捷键转为 Command（Ctrl+T 语言、Ctrl+N 新会话、Ctrl+O 下一会话、Ctrl+Q 退出）
//! 或界面内动作（Ctrl+R 显示/隐藏推理轨迹、Ctrl+W 查看发给模型的上下文），其余按键交给 run_app 拼输入缓冲；
//! Enter 时 submit_input 解析斜杠命令或作为用户输入提交。

use std::path::PathBuf;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::sync::mpsc;

use crate::core::Command;

/// 应用事件：已发送的 Command、界面内动作或原始 KeyEvent
#[derive(Debug, Clone)]
pub enum AppEvent {
    Command(Command),
    ToggleReasoning,
    /// 上下文检视（投影后的历史）
    ToggleContext,
    Key(KeyEvent),
}

/// 事件处理器：持有 cmd_tx，poll 时读键盘并返回 AppEvent
pub struct EventHandler {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl EventHandler {
    pub fn new(cmd_tx: mpsc::UnboundedSender<Command>) -> Self {
        Self { cmd_tx }
    }

    pub fn poll(&self) -> anyhow::Result<Option<AppEvent>> {
        if event::poll(std::time::Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    return Ok(Some(self.handle_key(key)));
                }
            }
        }
        Ok(None)
    }

    fn handle_key(&self, key: KeyEvent) -> AppEvent {
        if !key.modifiers.contains(KeyModifiers::CONTROL) {
            return AppEvent::Key(key);
        }
        let cmd = match key.code {
            KeyCode::Char('t') => Command::ToggleLanguage,
            KeyCode::Char('n') => Command::NewSession,
            KeyCode::Char('o') => Command::NextSession,
            KeyCode::Char('q') | KeyCode::Char('c') => Command::Quit,
            KeyCode::Char('r') => return AppEvent::ToggleReasoning,
            KeyCode::Char('w') => return AppEvent::ToggleContext,
            _ => return AppEvent::Key(key),
        };
        self.send(cmd.clone());
        AppEvent::Command(cmd)
    }

    pub fn send(&self, cmd: Command) {
        if let Err(e) = self.cmd_tx.send(cmd) {
            tracing::warn!(command = ?e.0, "Runtime loop is gone, command dropped");
        }
    }

    /// 解析并发送一行输入；返回需要在状态栏显示的用法错误
    pub fn submit_input(&self, input: &str, active_id: &str) -> Result<Command, String> {
        let cmd = parse_input(input, active_id)?;
        self.send(cmd.clone());
        Ok(cmd)
    }
}

/// 普通文本为 Submit；以 / 开头的为斜杠命令
pub fn parse_input(input: &str, active_id: &str) -> Result<Command, String> {
    let input = input.trim();
    let Some(rest) = input.strip_prefix('/') else {
        return Ok(Command::Submit(input.to_string()));
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    match name.to_lowercase().as_str() {
        "export" if arg.is_empty() => Ok(Command::Export(None)),
        "export" => Ok(Command::Export(Some(PathBuf::from(arg)))),
        "import" if arg.is_empty() => Err("usage: /import <path>".to_string()),
        "import" => Ok(Command::Import(PathBuf::from(arg))),
        "rename" if arg.is_empty() => Err("usage: /rename <title>".to_string()),
        "rename" => Ok(Command::RenameSession(active_id.to_string(), arg.to_string())),
        "delete" => Ok(Command::DeleteSession(active_id.to_string())),
        "new" => Ok(Command::NewSession),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(format!("unknown command: /{other}")),
    }
}
