//! 界面渲染
//!
//! 左侧为会话列表（当前会话高亮），右侧上方为活动语言的对话历史（可展开推理轨迹），
//! 标题栏显示语言、双语同步指示与加载阶段；右侧下方为输入框、错误与快捷键提示。
//! 上下文检视模式下，对话区改为显示投影后的历史，即下一次请求实际发给模型的内容。

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{
        Block, Borders, List, ListItem, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState,
        Wrap,
    },
    Frame,
};

use crate::core::{ChatState, Language, LoadingPhase};
use crate::llm::WireRole;
use crate::memory::{project_history, Message, Role, SessionSummary};

const SIDEBAR_WIDTH: u16 = 28;

/// 一帧所需的全部输入
pub struct View<'a> {
    pub title: &'a str,
    pub state: &'a ChatState,
    pub sessions: &'a [SessionSummary],
    pub active_id: &'a str,
    pub notice: Option<&'a str>,
    pub input: &'a str,
    pub show_reasoning: bool,
    /// 对话区显示投影后的上下文
    pub show_context: bool,
    pub scroll: usize,
}

/// 同步阶段进行中显示 SYNC_IN_PROGRESS，其余为 SYNCED
pub fn parity_label(state: &ChatState) -> &'static str {
    if state.loading_phase == Some(LoadingPhase::Synchronizing) {
        "SYNC_IN_PROGRESS"
    } else {
        "SYNCED"
    }
}

/// 将内容按宽度换行，支持 UTF-8（按字符数，避免在 UTF-8 中间截断）
fn wrap_text(s: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![s.to_string()];
    }
    let mut lines = Vec::new();
    for para in s.split('\n') {
        let mut line = String::new();
        for ch in para.chars() {
            if line.chars().count() >= width {
                lines.push(std::mem::take(&mut line));
            }
            line.push(ch);
        }
        lines.push(line);
    }
    lines
}

fn push_block(lines: &mut Vec<Line<'static>>, prefix: &'static str, style: Style, body: &str, width: usize) {
    for (i, line) in wrap_text(body, width).into_iter().enumerate() {
        let pref = if i == 0 { prefix } else { "       " };
        lines.push(Line::from(vec![
            Span::styled(pref, style.add_modifier(Modifier::BOLD)),
            Span::styled(line, style),
        ]));
    }
}

/// 对话区的所有行；show_reasoning 时在模型回答前展示推理轨迹
pub fn conversation_lines(messages: &[Message], show_reasoning: bool, width: usize) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for (idx, m) in messages.iter().enumerate() {
        if idx > 0 {
            lines.push(Line::from(""));
        }
        match m.role {
            Role::User => push_block(&mut lines, "INPUT  ", Style::default().fg(Color::Cyan), &m.content, width),
            Role::Model => {
                if let Some(reasoning) = m.reasoning.as_deref().filter(|r| show_reasoning && !r.is_empty()) {
                    push_block(&mut lines, "TRACE  ", Style::default().fg(Color::DarkGray), reasoning, width);
                }
                push_block(&mut lines, "OUTPUT ", Style::default().fg(Color::Green), &m.content, width);
            }
        }
    }
    lines
}

/// 上下文检视：按角色标注的投影块，末尾是等待中的下一次输入
pub fn context_lines(messages: &[Message], width: usize) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for block in project_history(messages) {
        let (label, style) = match block.role {
            WireRole::User => ("USER   ", Style::default().fg(Color::Cyan)),
            WireRole::Model => ("MODEL  ", Style::default().fg(Color::Yellow)),
        };
        push_block(&mut lines, label, style, &block.text, width);
        lines.push(Line::from(""));
    }
    push_block(
        &mut lines,
        "NEXT   ",
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        "(awaiting input…)",
        width,
    );
    lines
}

fn draw_sidebar(f: &mut Frame, area: Rect, view: &View) {
    let items: Vec<ListItem> = view
        .sessions
        .iter()
        .map(|s| {
            let style = if s.id == view.active_id {
                Style::default().fg(Color::Black).bg(Color::Yellow)
            } else {
                Style::default()
            };
            let title: String = s.title.chars().take(SIDEBAR_WIDTH as usize - 4).collect();
            ListItem::new(Line::from(Span::styled(title, style)))
        })
        .collect();
    let list = List::new(items).block(
        Block::default()
            .title(" Sessions ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(list, area);
}

/// 绘制一帧；将 (总行数, 可视高度) 写入 out 供外部 clamp 滚动
pub fn draw(f: &mut Frame, view: &View, out: &mut (usize, usize)) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(20)])
        .split(f.area());
    draw_sidebar(f, columns[0], view);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(5)])
        .split(columns[1]);

    let state = view.state;
    let conv_area = chunks[0];
    let content_width = conv_area.width.saturating_sub(3) as usize; // 边框 + 滚动条

    let phase = state
        .loading_phase
        .map(|p| format!(" │ {}…", p.label(state.language)))
        .unwrap_or_default();
    let title = if view.show_context {
        format!(
            " World State │ {} │ {} blocks sent as context ",
            state.language,
            state.displayed().len()
        )
    } else {
        format!(
            " {} │ {} │ {} segments │ {}{} ",
            view.title,
            state.language,
            state.displayed().len(),
            parity_label(state),
            phase
        )
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let text_lines = if view.show_context {
        context_lines(state.displayed(), content_width.max(20))
    } else {
        conversation_lines(state.displayed(), view.show_reasoning, content_width.max(20))
    };
    let content_height = conv_area.height.saturating_sub(2) as usize;
    let total_lines = text_lines.len();
    let scroll_offset = view.scroll.min(total_lines.saturating_sub(content_height));

    let inner = block.inner(conv_area);
    f.render_widget(block, conv_area);
    let paragraph = Paragraph::new(Text::from(text_lines)).scroll((scroll_offset as u16, 0));
    f.render_widget(paragraph, inner);

    if total_lines > content_height {
        let mut scrollbar_state = ScrollbarState::new(total_lines)
            .position(scroll_offset)
            .viewport_content_length(content_height);
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .thumb_symbol("█")
            .track_symbol(Some("░"));
        f.render_stateful_widget(scrollbar, inner, &mut scrollbar_state);
    }

    let (input_prompt, border_color) = if let Some(err) = &state.error {
        (format!(" ERROR: {} ", err.chars().take(60).collect::<String>()), Color::Red)
    } else if state.is_loading {
        let waiting = match state.language {
            Language::Ko => " 처리 중… ",
            Language::En => " PROCESSING… ",
        };
        (waiting.to_string(), Color::DarkGray)
    } else if let Some(notice) = view.notice {
        (format!(" {notice} "), Color::Blue)
    } else {
        (" INPUT ".to_string(), Color::Blue)
    };

    let hint = " Enter 发送 │ Ctrl+T 语言 │ Ctrl+R 推理 │ Ctrl+W 上下文 │ Ctrl+N 新会话 │ Ctrl+O 切换 │ Ctrl+Q 退出 ";
    let input_block = Block::default()
        .title(input_prompt)
        .title_bottom(Line::from(Span::styled(hint, Style::default().fg(Color::DarkGray))))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color));

    let input = Paragraph::new(view.input)
        .block(input_block)
        .wrap(Wrap { trim: false })
        .style(if state.is_loading {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default()
        });
    f.render_widget(input, chunks[1]);

    out.0 = total_lines;
    out.1 = content_height;
}
