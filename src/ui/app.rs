//! TUI 应用主循环
//!
//! 进入全屏/原始模式，轮询 state / sessions / notice 通道与键盘事件，将用户输入与快捷键转为 Command
//! 发送给运行时，每帧用 draw 渲染。

use std::io::{self, Stdout};

use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use crate::core::{Command, RuntimeHandles};
use crate::ui::event::{AppEvent, EventHandler};
use crate::ui::render::{draw, View};

/// 运行 TUI：启用原始模式与全屏，循环 poll 事件 + 渲染，退出时恢复终端
pub async fn run_app(handles: RuntimeHandles, title: String) -> anyhow::Result<()> {
    let RuntimeHandles {
        cmd_tx,
        state_rx,
        sessions_rx,
        active_rx,
        notice_rx,
    } = handles;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let event_handler = EventHandler::new(cmd_tx);
    let mut input_buffer = String::new();
    let mut local_notice: Option<String> = None;
    let mut show_reasoning = false;
    let mut show_context = false;
    let mut conversation_scroll = 0usize;
    let mut last_len = 0usize;

    loop {
        let state = state_rx.borrow().clone();
        let sessions = sessions_rx.borrow().clone();
        let active_id = active_rx.borrow().clone();
        let notice = local_notice.clone().or_else(|| notice_rx.borrow().clone());

        // 新消息到达时滚到底部
        let displayed_len = state.displayed().len();
        if displayed_len != last_len {
            last_len = displayed_len;
            conversation_scroll = usize::MAX;
        }

        if let Ok(Some(ev)) = event_handler.poll() {
            match ev {
                AppEvent::Command(Command::Quit) => break,
                AppEvent::Command(_) => local_notice = None,
                AppEvent::ToggleReasoning => show_reasoning = !show_reasoning,
                AppEvent::ToggleContext => {
                    show_context = !show_context;
                    conversation_scroll = 0;
                }
                AppEvent::Key(key) => match key.code {
                    KeyCode::Enter if !state.is_loading => {
                        let input = std::mem::take(&mut input_buffer);
                        if !input.trim().is_empty() {
                            match event_handler.submit_input(&input, &active_id) {
                                Ok(Command::Quit) => break,
                                Ok(_) => local_notice = None,
                                Err(usage) => local_notice = Some(usage),
                            }
                        }
                    }
                    KeyCode::Backspace => {
                        input_buffer.pop();
                    }
                    KeyCode::Char(c) => input_buffer.push(c),
                    KeyCode::Up => conversation_scroll = conversation_scroll.saturating_sub(1),
                    KeyCode::Down => conversation_scroll = conversation_scroll.saturating_add(1),
                    KeyCode::PageUp => conversation_scroll = conversation_scroll.saturating_sub(10),
                    KeyCode::PageDown => conversation_scroll = conversation_scroll.saturating_add(10),
                    KeyCode::Home => conversation_scroll = 0,
                    KeyCode::End => conversation_scroll = usize::MAX,
                    _ => {}
                },
            }
        }

        let view = View {
            title: &title,
            state: &state,
            sessions: &sessions,
            active_id: &active_id,
            notice: notice.as_deref(),
            input: &input_buffer,
            show_reasoning,
            show_context,
            scroll: conversation_scroll,
        };
        let mut scroll_info = (0usize, 0usize);
        terminal.draw(|f| draw(f, &view, &mut scroll_info))?;
        let (total_lines, viewport_height) = scroll_info;
        conversation_scroll = conversation_scroll.min(total_lines.saturating_sub(viewport_height));

        tokio::task::yield_now().await;
    }

    restore_terminal(&mut terminal)?;
    Ok(())
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> anyhow::Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}
