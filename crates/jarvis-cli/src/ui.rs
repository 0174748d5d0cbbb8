//! UI rendering with ratatui.
//!
//! This module implements the two-column TUI layout: the project/chat sidebar
//! on the left, the transcript with its input line on the right, and an
//! optional tools panel under the sidebar.

use jarvis_client::ConversationStatus;
use jarvis_core::{PromptMode, Role};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style, Stylize};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{
    Block, Borders, Clear, List, ListItem, ListState, Paragraph, Scrollbar, ScrollbarOrientation,
    ScrollbarState, Wrap,
};
use ratatui::Frame;

use crate::app::{App, DeleteTarget, Focus, InputMode, SidebarRow};

/// Trailing cursor shown after a message that is still receiving text.
const STREAM_CURSOR: &str = "▌";

/// Render the UI.
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();

    // Main layout: vertical split for header, main content, and status bar
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Header bar
            Constraint::Min(5),    // Main content (two columns)
            Constraint::Length(1), // Status bar
        ])
        .split(area);

    render_header_bar(frame, app, main_layout[0]);

    let content_layout = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(30), // Left: Projects (+ tools)
            Constraint::Percentage(70), // Right: Chat + Input
        ])
        .split(main_layout[1]);

    if app.show_tools {
        let left = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(5), Constraint::Length(10)])
            .split(content_layout[0]);
        render_sidebar(frame, app, left[0]);
        render_tools_panel(frame, app, left[1]);
    } else {
        render_sidebar(frame, app, content_layout[0]);
    }
    render_chat_column(frame, app, content_layout[1]);
    render_status_bar(frame, app, main_layout[2]);

    match app.input_mode {
        InputMode::Normal => {}
        InputMode::CreatingProject => {
            render_input_dialog(frame, app, area, " New Project ", "Enter project name:");
        }
        InputMode::CreatingChat(_) => {
            render_input_dialog(frame, app, area, " New Chat ", "Enter chat title (blank for default):");
        }
        InputMode::RenamingChat(_) => {
            render_input_dialog(frame, app, area, " Rename Chat ", "Enter new title:");
        }
        InputMode::AddingTodo => {
            render_input_dialog(frame, app, area, " New Todo ", "What needs doing?");
        }
        InputMode::ConfirmingDelete(target) => render_confirm_delete_dialog(frame, app, target, area),
        InputMode::EditingPrompt(_) => render_prompt_editor(frame, app, area),
        InputMode::PickingModel => render_model_picker(frame, app, area),
    }
}

/// Truncate a string in the middle with ellipsis if it exceeds `max_len` characters.
fn truncate_middle(s: &str, max_len: usize) -> String {
    let len = s.chars().count();
    if len <= max_len {
        return s.to_string();
    }
    if max_len < 5 {
        return s.chars().take(max_len).collect();
    }
    let keep = (max_len - 3) / 2;
    let start: String = s.chars().take(keep).collect();
    let end: String = s.chars().skip(len - keep).collect();
    format!("{start}...{end}")
}

/// Render the header bar with the backend URL and current model.
fn render_header_bar(frame: &mut Frame, app: &App, area: Rect) {
    let title = "J.A.R.V.I.S.";
    let max_url_width = (area.width as usize / 2).saturating_sub(15);
    let display_url = truncate_middle(app.api_url(), max_url_width);
    let model = app.workspace.model();

    let right_text = format!("{display_url} [{model}]");
    let padding = (area.width as usize)
        .saturating_sub(title.chars().count() + right_text.chars().count());

    let line = Line::from(vec![
        Span::styled(title, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(" ".repeat(padding)),
        Span::raw(display_url),
        Span::raw(" ["),
        Span::styled(model, Style::default().fg(Color::Yellow)),
        Span::raw("]"),
    ]);

    let header = Paragraph::new(line).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

/// Render the project/chat tree.
fn render_sidebar(frame: &mut Frame, app: &App, area: Rect) {
    let is_focused = app.focus == Focus::Sidebar;

    let block = Block::default()
        .title(" Projects ")
        .borders(Borders::ALL)
        .border_style(if is_focused {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::Gray)
        });

    let active_chat = app.workspace.active_chat();
    let items: Vec<ListItem> = app
        .sidebar_rows()
        .into_iter()
        .map(|row| match row {
            SidebarRow::Project(project_id) => {
                let name = app
                    .workspace
                    .cache()
                    .project(project_id)
                    .map_or("?", |p| p.name.as_str());
                let marker = if app.expanded.contains(&project_id) { "▾ " } else { "▸ " };
                let style = if app.workspace.active_project_id() == Some(project_id) {
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
                } else {
                    Style::default().add_modifier(Modifier::BOLD)
                };
                ListItem::new(Line::from(vec![Span::raw(marker), Span::styled(name, style)]))
            }
            SidebarRow::Chat(_, chat_id) => {
                let title = app
                    .chat_summary(chat_id)
                    .map_or("?", |c| c.display_title());
                let mut spans = vec![Span::raw("    "), Span::raw(title)];
                if active_chat == Some(chat_id) {
                    spans[1] = Span::styled(title, Style::default().fg(Color::Green));
                }
                if app.workspace.is_in_flight(chat_id) {
                    spans.push(Span::styled(
                        format!(" {}", app.spinner_char()),
                        Style::default().fg(Color::Yellow),
                    ));
                }
                ListItem::new(Line::from(spans))
            }
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default();
    if !app.sidebar_rows().is_empty() {
        state.select(Some(app.selected_row));
    }

    frame.render_stateful_widget(list, area, &mut state);
}

/// Render todos and weather.
fn render_tools_panel(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(format!(" Tools ({} open) ", app.todos.open_count()))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Gray));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(1)])
        .split(inner);

    let weather = app.weather.as_deref().unwrap_or("Weather unavailable");
    frame.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled("☀ ", Style::default().fg(Color::Yellow)),
            Span::styled(weather, Style::default().fg(Color::Gray)),
        ])),
        layout[0],
    );

    let items: Vec<ListItem> = app
        .todos
        .items()
        .iter()
        .map(|todo| {
            let (check, style) = if todo.completed {
                ("[x] ", Style::default().fg(Color::DarkGray).add_modifier(Modifier::CROSSED_OUT))
            } else {
                ("[ ] ", Style::default())
            };
            ListItem::new(Line::from(vec![Span::raw(check), Span::styled(&todo.text, style)]))
        })
        .collect();

    let list = List::new(items).highlight_style(Style::default().fg(Color::Cyan));
    let mut state = ListState::default();
    state.select(app.selected_todo);
    frame.render_stateful_widget(list, layout[1], &mut state);
}

/// Horizontal padding for chat content.
const CHAT_PADDING: u16 = 2;

/// Render the right column containing chat and input as one unit.
fn render_chat_column(frame: &mut Frame, app: &App, area: Rect) {
    let is_focused = app.focus == Focus::Chat;

    let title = match app.workspace.active_chat().and_then(|id| app.chat_summary(id)) {
        Some(chat) => match chat.created_at {
            Some(created) => format!(
                " Chat: {} ({}) ",
                chat.display_title(),
                created.with_timezone(&chrono::Local).format("%b %d %H:%M")
            ),
            None => format!(" Chat: {} ", chat.display_title()),
        },
        None => " Chat ".to_string(),
    };

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(if is_focused {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::Gray)
        });

    let inner_area = block.inner(area);
    frame.render_widget(block, area);

    let inner_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),    // Chat messages
            Constraint::Length(1), // Separator line
            Constraint::Length(1), // Input line
        ])
        .split(inner_area);

    let chat_area_full = inner_layout[0];
    let separator_area = inner_layout[1];
    let input_area = inner_layout[2];

    let chat_area = Rect::new(
        chat_area_full.x + CHAT_PADDING,
        chat_area_full.y,
        chat_area_full.width.saturating_sub(CHAT_PADDING * 2 + 1), // +1 for scrollbar
        chat_area_full.height,
    );
    let content_width = chat_area.width as usize;

    let Some(conversation) = app.workspace.conversation() else {
        let help = if app.workspace.cache().projects().is_empty() {
            "Press Esc then p to create a project"
        } else {
            "Select a chat in the sidebar and press Enter"
        };
        frame.render_widget(
            Paragraph::new(help)
                .style(Style::default().fg(Color::DarkGray))
                .wrap(Wrap { trim: true }),
            chat_area,
        );
        render_input_line(frame, app, separator_area, input_area, is_focused);
        return;
    };

    if conversation.messages().is_empty() && conversation.is_idle() {
        frame.render_widget(
            Paragraph::new("Type a message and press Enter to send")
                .style(Style::default().fg(Color::DarkGray))
                .wrap(Wrap { trim: true }),
            chat_area,
        );
        render_input_line(frame, app, separator_area, input_area, is_focused);
        return;
    }

    let mut lines: Vec<Line> = Vec::new();
    let open = conversation.open_message();

    for (index, msg) in conversation.messages().iter().enumerate() {
        match msg.role {
            Role::User => {
                lines.push(Line::from(vec![Span::styled(
                    "[You]",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )]));
            }
            Role::Assistant => {
                lines.push(Line::from(vec![Span::styled(
                    "[Jarvis]",
                    Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
                )]));
            }
        }

        let is_error = msg.role == Role::Assistant
            && msg.content.contains(jarvis_client::ERROR_MARKER);
        let style = if is_error {
            Style::default().fg(Color::Red)
        } else {
            Style::default().fg(Color::White)
        };

        let mut body: Vec<Line> = msg
            .content
            .lines()
            .map(|l| Line::from(Span::styled(l.to_string(), style)))
            .collect();
        if open == Some(index) {
            let cursor = Span::styled(STREAM_CURSOR, Style::default().fg(Color::Yellow));
            match body.last_mut() {
                Some(last) if !msg.content.ends_with('\n') => last.spans.push(cursor),
                _ => body.push(Line::from(cursor)),
            }
        }
        lines.extend(body);
        lines.push(Line::from(""));
    }

    // Waiting for the response head
    if conversation.status() == ConversationStatus::Sending {
        lines.push(Line::from(vec![Span::styled(
            "[Jarvis]",
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        )]));
        lines.push(Line::from(vec![
            Span::styled(app.spinner_char(), Style::default().fg(Color::Yellow)),
            Span::styled(" thinking...", Style::default().fg(Color::DarkGray)),
        ]));
    }

    let text = Text::from(lines);
    let visible_lines = chat_area.height as usize;
    let total_wrapped_lines = calculate_wrapped_line_count(&text, content_width);

    // Max scroll is how far we can scroll up from the bottom
    let max_scroll = total_wrapped_lines.saturating_sub(visible_lines);
    let effective_scroll = app.chat_scroll.min(max_scroll);

    // chat_scroll counts from the bottom; Paragraph scrolls from the top
    let scroll_offset = max_scroll.saturating_sub(effective_scroll);

    let paragraph = Paragraph::new(text)
        .wrap(Wrap { trim: false })
        .scroll((u16::try_from(scroll_offset).unwrap_or(u16::MAX), 0));
    frame.render_widget(paragraph, chat_area);

    if total_wrapped_lines > visible_lines {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("▲"))
            .end_symbol(Some("▼"));
        let mut scrollbar_state = ScrollbarState::new(total_wrapped_lines)
            .position(scroll_offset)
            .viewport_content_length(visible_lines);
        frame.render_stateful_widget(scrollbar, chat_area_full, &mut scrollbar_state);
    }

    render_input_line(frame, app, separator_area, input_area, is_focused);
}

/// Render the input line at the bottom of the chat column.
fn render_input_line(frame: &mut Frame, app: &App, separator_area: Rect, input_area: Rect, is_focused: bool) {
    let separator = Paragraph::new("─".repeat(separator_area.width as usize))
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(separator, separator_area);

    // The dialog owns the input buffer while a modal is open
    let in_modal = app.input_mode != InputMode::Normal;

    let prompt = if app.command_mode {
        ": "
    } else if is_focused {
        "> "
    } else {
        "│ "
    };

    let input_text = if in_modal { "" } else { app.input.as_str() };

    let input_line = Line::from(vec![
        Span::styled(
            prompt,
            Style::default().fg(if is_focused && !app.command_mode {
                Color::Cyan
            } else {
                Color::DarkGray
            }),
        ),
        Span::styled(input_text, Style::default().fg(Color::White)),
    ]);
    frame.render_widget(Paragraph::new(input_line), input_area);

    if !in_modal && !app.command_mode {
        let before: String = app.input.chars().take(app.cursor_position).collect();
        let offset = Line::from(before).width() + 2;
        frame.set_cursor_position((
            input_area.x + u16::try_from(offset).unwrap_or(u16::MAX),
            input_area.y,
        ));
    }
}

/// Render the status bar.
fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let mode_indicator = if app.command_mode {
        Span::styled(" COMMAND ", Style::default().fg(Color::Black).bg(Color::Blue))
    } else if app.is_streaming() {
        Span::styled(" STREAMING ", Style::default().fg(Color::Black).bg(Color::Yellow))
    } else {
        Span::styled(" INSERT ", Style::default().fg(Color::Black).bg(Color::Green))
    };

    let status = if let Some(ref error) = app.error_message {
        Line::from(vec![
            mode_indicator,
            Span::styled(" ERROR: ", Style::default().fg(Color::Red).bold()),
            Span::styled(error, Style::default().fg(Color::Red)),
        ])
    } else if let Some(ref status) = app.status_message {
        Line::from(vec![
            mode_indicator,
            Span::styled(format!(" {status}"), Style::default().fg(Color::Green)),
        ])
    } else if app.command_mode {
        Line::from(vec![
            mode_indicator,
            Span::raw(" "),
            Span::styled("p", Style::default().fg(Color::Yellow)),
            Span::raw(":project "),
            Span::styled("n", Style::default().fg(Color::Yellow)),
            Span::raw(":chat "),
            Span::styled("r", Style::default().fg(Color::Yellow)),
            Span::raw(":rename "),
            Span::styled("d", Style::default().fg(Color::Yellow)),
            Span::raw(":delete "),
            Span::styled("e", Style::default().fg(Color::Yellow)),
            Span::raw(":prompt "),
            Span::styled("m", Style::default().fg(Color::Yellow)),
            Span::raw(":model "),
            Span::styled("t", Style::default().fg(Color::Yellow)),
            Span::raw(":tools "),
            Span::styled("q", Style::default().fg(Color::Yellow)),
            Span::raw(":quit"),
        ])
    } else {
        Line::from(vec![
            mode_indicator,
            Span::raw(" "),
            Span::styled("Enter", Style::default().fg(Color::Yellow)),
            Span::raw(":send/open "),
            Span::styled("↑↓", Style::default().fg(Color::Yellow)),
            Span::raw(":navigate "),
            Span::styled("Esc", Style::default().fg(Color::Yellow)),
            Span::raw(":stop/commands "),
            Span::styled("Tab", Style::default().fg(Color::Yellow)),
            Span::raw(":switch"),
        ])
    };

    let status_bar = Paragraph::new(status).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(status_bar, area);
}

/// Render a single-line text input dialog.
fn render_input_dialog(frame: &mut Frame, app: &App, area: Rect, title: &str, label: &str) {
    let dialog_width = 50.min(area.width.saturating_sub(4));
    let dialog_height = 9.min(area.height.saturating_sub(4));

    let dialog_area = Rect::new(
        area.x + (area.width.saturating_sub(dialog_width)) / 2,
        area.y + (area.height.saturating_sub(dialog_height)) / 2,
        dialog_width,
        dialog_height,
    );

    frame.render_widget(Clear, dialog_area);

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let inner = block.inner(dialog_area);
    frame.render_widget(block, dialog_area);

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Label
            Constraint::Length(1), // Spacer
            Constraint::Length(3), // Input box
            Constraint::Length(1), // Help text
        ])
        .split(inner);

    frame.render_widget(
        Paragraph::new(label).style(Style::default().fg(Color::White)),
        layout[0],
    );

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    frame.render_widget(
        Paragraph::new(app.input.as_str())
            .style(Style::default().fg(Color::Yellow))
            .block(input_block),
        layout[2],
    );

    frame.render_widget(
        Paragraph::new("Press Enter to confirm, Esc to cancel")
            .style(Style::default().fg(Color::DarkGray)),
        layout[3],
    );

    let before: String = app.input.chars().take(app.cursor_position).collect();
    let offset = Line::from(before).width() + 1;
    frame.set_cursor_position((
        layout[2].x + u16::try_from(offset).unwrap_or(u16::MAX),
        layout[2].y + 1,
    ));
}

/// Render the confirm delete dialog.
fn render_confirm_delete_dialog(frame: &mut Frame, app: &App, target: DeleteTarget, area: Rect) {
    let dialog_area = centered_rect(50, 25, area);
    frame.render_widget(Clear, dialog_area);

    let block = Block::default()
        .title(" Confirm Delete ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red));

    let inner = block.inner(dialog_area);
    frame.render_widget(block, dialog_area);

    let question = match target {
        DeleteTarget::Project(id) => {
            let name = app.workspace.cache().project(id).map_or("?", |p| p.name.as_str());
            format!("Delete project '{name}' and all its chats?")
        }
        DeleteTarget::Chat(id) => {
            let title = app.chat_summary(id).map_or("?", |c| c.display_title());
            format!("Delete chat '{title}'?")
        }
    };

    let text = Text::from(vec![
        Line::from(question),
        Line::from(""),
        Line::from("This action cannot be undone."),
        Line::from(""),
        Line::from(vec![
            Span::styled("[y]", Style::default().fg(Color::Red).bold()),
            Span::raw(" Yes  "),
            Span::styled("[n]", Style::default().fg(Color::Green).bold()),
            Span::raw(" No"),
        ]),
    ]);

    frame.render_widget(
        Paragraph::new(text)
            .style(Style::default().fg(Color::White))
            .wrap(Wrap { trim: true }),
        inner,
    );
}

/// Render the project prompt editor.
fn render_prompt_editor(frame: &mut Frame, app: &App, area: Rect) {
    let Some(editor) = app.prompt_editor.as_ref() else {
        return;
    };
    let dialog_area = centered_rect(70, 70, area);
    frame.render_widget(Clear, dialog_area);

    let block = Block::default()
        .title(" Project Settings & Prompt ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(dialog_area);
    frame.render_widget(block, dialog_area);

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Tabs
            Constraint::Length(1), // Description
            Constraint::Min(3),    // Editor
            Constraint::Length(1), // Help
        ])
        .split(inner);

    let (json_style, text_style) = match editor.mode() {
        PromptMode::JsonMerge => (Style::default().fg(Color::Cyan).bold(), Style::default().fg(Color::DarkGray)),
        PromptMode::TextAppend => (Style::default().fg(Color::DarkGray), Style::default().fg(Color::Cyan).bold()),
    };
    frame.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled(" Advanced JSON ", json_style),
            Span::raw("│"),
            Span::styled(" Quick Specification ", text_style),
        ])),
        layout[0],
    );

    let description = match editor.mode() {
        PromptMode::JsonMerge => "Edit the full system prompt JSON structure.",
        PromptMode::TextAppend => "Append a new instruction to the existing prompt.",
    };
    frame.render_widget(
        Paragraph::new(description).style(Style::default().fg(Color::DarkGray)),
        layout[1],
    );

    let mut body = editor.text().to_string();
    body.push_str(STREAM_CURSOR);
    frame.render_widget(
        Paragraph::new(body)
            .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Gray)))
            .wrap(Wrap { trim: false }),
        layout[2],
    );

    frame.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled("Tab", Style::default().fg(Color::Yellow)),
            Span::raw(":mode "),
            Span::styled("Ctrl+S", Style::default().fg(Color::Yellow)),
            Span::raw(":save "),
            Span::styled("Esc", Style::default().fg(Color::Yellow)),
            Span::raw(":cancel"),
        ])),
        layout[3],
    );
}

/// Render the model picker.
fn render_model_picker(frame: &mut Frame, app: &App, area: Rect) {
    let dialog_area = centered_rect(40, 40, area);
    frame.render_widget(Clear, dialog_area);

    let current = app.workspace.model();
    let items: Vec<ListItem> = app
        .workspace
        .models()
        .iter()
        .map(|model| {
            let marker = if model == current { "● " } else { "  " };
            ListItem::new(format!("{marker}{model}"))
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .title(" Select Model ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    let mut state = ListState::default();
    state.select(Some(app.model_cursor));
    frame.render_stateful_widget(list, dialog_area, &mut state);
}

/// Calculate the number of visual lines after text wrapping.
fn calculate_wrapped_line_count(text: &Text, available_width: usize) -> usize {
    if available_width == 0 {
        return text.lines.len();
    }

    text.lines
        .iter()
        .map(|line| match line.width() {
            0 => 1,
            width => width.div_ceil(available_width),
        })
        .sum()
}

/// Create a centered rectangle.
fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
