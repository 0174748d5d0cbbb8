//! Jarvis CLI - Terminal UI for chatting with a local assistant.
//!
//! This is the entry point for the `jarvis` binary.

mod app;
mod ui;

use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers,
    MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use jarvis_client::{ClientConfig, HttpBackend, TurnEvent, Workspace};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use app::{App, DeleteTarget, Focus, InputMode, SidebarRow, REFRESH_INTERVAL};

/// Jarvis CLI - Terminal UI for chatting with a local assistant.
#[derive(Parser, Debug)]
#[command(name = "jarvis")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backend URL.
    #[arg(long, env = "JARVIS_API", default_value = "http://localhost:8000")]
    api: String,

    /// Model used until another is picked.
    #[arg(long, env = "JARVIS_MODEL")]
    model: Option<String>,

    /// Number of recent messages sent as context.
    #[arg(long, env = "JARVIS_CONTEXT_WINDOW", default_value_t = 20)]
    context_window: usize,

    /// Write logs to this file instead of stderr.
    #[arg(long, env = "JARVIS_LOG")]
    log_file: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, default_value = "false")]
    debug: bool,
}

impl Args {
    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig {
            base_url: self.api.trim_end_matches('/').to_string(),
            context_window: self.context_window,
            ..ClientConfig::default()
        };
        if let Some(model) = &self.model {
            config.default_model.clone_from(model);
        }
        config
    }
}

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let filter = if args.debug {
        EnvFilter::new("jarvis_cli=debug,jarvis_client=debug,warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    // The TUI owns the terminal, so stderr output is only useful when redirected
    match &args.log_file {
        Some(path) => {
            let file = File::create(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None if args.debug => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
        None => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse arguments
    let args = Args::parse();

    init_logging(&args)?;

    // Create client
    let config = args.client_config();
    let backend = Arc::new(HttpBackend::new(&config)?);
    let (workspace, turn_rx) = Workspace::new(backend, config);
    tracing::info!(api = %args.api, "Starting jarvis");

    // Setup terminal with mouse capture enabled
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Create app
    let mut app = App::new(workspace);
    app.load_initial().await;

    // Run the event loop
    let result = run_event_loop(&mut terminal, &mut app, turn_rx).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    result
}

/// Main event loop with real-time streaming support.
///
/// The event loop immediately redraws on every turn event for smooth streaming.
async fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    mut turn_rx: mpsc::UnboundedReceiver<TurnEvent>,
) -> anyhow::Result<()> {
    // Refresh timer
    let mut refresh_interval = tokio::time::interval(REFRESH_INTERVAL);

    loop {
        // Tick animation frame
        app.tick_animation();

        // Render
        terminal.draw(|f| ui::render(f, app))?;

        // Use a shorter tick rate during streaming for responsiveness
        let tick_rate = if app.needs_immediate_redraw() {
            Duration::from_millis(80)
        } else {
            Duration::from_millis(100)
        };

        // Handle events
        tokio::select! {
            // Terminal events - poll with short timeout
            () = tokio::time::sleep(tick_rate) => {
                while event::poll(Duration::from_millis(0)).unwrap_or(false) {
                    if let Ok(evt) = event::read() {
                        handle_input(app, evt).await;
                    }
                }
            }

            // Turn events - immediate redraw for real-time streaming
            Some(event) = turn_rx.recv() => {
                if app.handle_turn_event(event) {
                    terminal.draw(|f| ui::render(f, app))?;
                }
            }

            // Periodic refresh (only when not streaming)
            _ = refresh_interval.tick() => {
                if app.input_mode == InputMode::Normal && !app.is_streaming() {
                    app.refresh_tools().await;
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

/// Handle input events.
async fn handle_input(app: &mut App, event: Event) {
    match event {
        Event::Key(key) => {
            // Only handle key press events
            if key.kind != KeyEventKind::Press {
                return;
            }

            match app.input_mode {
                InputMode::Normal => handle_normal_mode(app, key.code, key.modifiers).await,
                InputMode::CreatingProject
                | InputMode::CreatingChat(_)
                | InputMode::RenamingChat(_)
                | InputMode::AddingTodo => handle_text_dialog(app, key.code).await,
                InputMode::ConfirmingDelete(target) => {
                    handle_confirm_delete_mode(app, target, key.code).await;
                }
                InputMode::EditingPrompt(project_id) => {
                    handle_prompt_editor(app, project_id, key.code, key.modifiers).await;
                }
                InputMode::PickingModel => handle_model_picker(app, key.code),
            }
        }
        Event::Mouse(mouse) => match mouse.kind {
            MouseEventKind::ScrollUp => app.scroll_chat_up(3),
            MouseEventKind::ScrollDown => app.scroll_chat_down(3),
            _ => {}
        },
        _ => {}
    }
}

/// Handle input in normal mode.
///
/// Unified input model:
/// - Up/Down always navigate the sidebar
/// - Typing goes directly to input (when not in command mode)
/// - ESC stops a streaming reply, otherwise enters command mode (a send that
///   is still waiting for its response cannot be stopped)
async fn handle_normal_mode(app: &mut App, code: KeyCode, modifiers: KeyModifiers) {
    if code == KeyCode::Esc {
        if app.command_mode {
            app.command_mode = false;
        } else if app.can_stop() {
            app.stop_streaming();
        } else if app.error_message.is_some() {
            app.clear_error();
        } else {
            app.command_mode = true;
        }
        return;
    }

    match code {
        KeyCode::PageUp => app.scroll_chat_up(10),
        KeyCode::PageDown => app.scroll_chat_down(10),
        KeyCode::Up => app.select_prev_row(),
        KeyCode::Down => app.select_next_row(),
        KeyCode::Tab => app.focus = app.focus.next(),
        _ if app.command_mode => handle_command_mode(app, code).await,
        _ => handle_input_mode(app, code, modifiers).await,
    }
}

/// Handle input in command mode (ESC was pressed).
async fn handle_command_mode(app: &mut App, code: KeyCode) {
    match code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('p') => app.enter_dialog_mode(InputMode::CreatingProject),
        KeyCode::Char('n') => {
            if let Some(project_id) = app.target_project().map(|p| p.id) {
                app.enter_dialog_mode(InputMode::CreatingChat(project_id));
            } else {
                app.set_error("Create a project first");
            }
        }
        KeyCode::Char('r') => {
            let chat_id = match app.selected_row() {
                Some(SidebarRow::Chat(_, chat_id)) => Some(chat_id),
                _ => app.workspace.active_chat(),
            };
            if let Some(chat_id) = chat_id {
                let title = app
                    .chat_summary(chat_id)
                    .and_then(|c| c.title.clone())
                    .unwrap_or_default();
                app.enter_dialog_with(InputMode::RenamingChat(chat_id), &title);
            }
        }
        KeyCode::Char('d') => {
            let target = match app.selected_row() {
                Some(SidebarRow::Project(project_id)) => DeleteTarget::Project(project_id),
                Some(SidebarRow::Chat(_, chat_id)) => DeleteTarget::Chat(chat_id),
                None => return,
            };
            app.enter_dialog_mode(InputMode::ConfirmingDelete(target));
        }
        KeyCode::Char('e') => {
            if let Some(project_id) = app.target_project().map(|p| p.id) {
                app.open_prompt_editor(project_id);
            }
        }
        KeyCode::Char('m') => app.open_model_picker(),
        KeyCode::Char('M') => {
            if let Some(model) = app.workspace.cycle_model().map(str::to_string) {
                app.set_status(format!("Model: {model}"));
            }
        }
        KeyCode::Char('c') => {
            app.workspace.close_chat();
            app.focus = Focus::Sidebar;
        }
        KeyCode::Char('R') => {
            app.workspace.refresh_projects().await;
            app.workspace.refresh_models().await;
            app.refresh_tools().await;
            app.set_status("Refreshed");
        }
        KeyCode::Char('t') => app.show_tools = !app.show_tools,
        KeyCode::Char('a') => app.enter_dialog_mode(InputMode::AddingTodo),
        KeyCode::Char('[') => app.select_todo(false),
        KeyCode::Char(']') => app.select_todo(true),
        KeyCode::Char('x') => app.toggle_todo().await,
        KeyCode::Char('D') => app.remove_todo().await,
        KeyCode::Char('j') => app.scroll_chat_down(1),
        KeyCode::Char('k') => app.scroll_chat_up(1),
        KeyCode::Enter => app.command_mode = false,
        _ => {}
    }
}

/// Handle input in normal input mode (typing goes to input).
async fn handle_input_mode(app: &mut App, code: KeyCode, modifiers: KeyModifiers) {
    match code {
        KeyCode::Enter => {
            if app.input.trim().is_empty() {
                app.activate_selected().await;
            } else if app.workspace.active_chat().is_some() {
                app.send_input();
            } else {
                app.set_error("No chat open");
            }
        }
        KeyCode::Char(c) if modifiers.contains(KeyModifiers::CONTROL) => match c {
            'a' => app.move_cursor_start(),
            'e' => app.move_cursor_end(),
            'u' => app.clear_input(),
            'w' => app.delete_word(),
            _ => {}
        },
        KeyCode::Char(c) => app.insert_char(c),
        KeyCode::Backspace => app.delete_char(),
        KeyCode::Delete => app.delete_char_forward(),
        KeyCode::Left => app.move_cursor_left(),
        KeyCode::Right => app.move_cursor_right(),
        KeyCode::Home => app.move_cursor_start(),
        KeyCode::End => app.move_cursor_end(),
        _ => {}
    }
}

/// Handle input in the single-line dialogs.
async fn handle_text_dialog(app: &mut App, code: KeyCode) {
    match code {
        KeyCode::Esc => app.exit_dialog_mode(),
        KeyCode::Enter => {
            let mode = app.input_mode;
            let text = app.take_input();
            // Exit dialog mode (restores chat input)
            app.exit_dialog_mode();
            match mode {
                InputMode::CreatingProject => app.create_project(&text).await,
                InputMode::CreatingChat(project_id) => app.create_chat(project_id, &text).await,
                InputMode::RenamingChat(chat_id) => app.rename_chat(chat_id, &text).await,
                InputMode::AddingTodo => app.add_todo(&text).await,
                _ => {}
            }
        }
        KeyCode::Char(c) => app.insert_char(c),
        KeyCode::Backspace => app.delete_char(),
        KeyCode::Left => app.move_cursor_left(),
        KeyCode::Right => app.move_cursor_right(),
        _ => {}
    }
}

/// Handle input in confirm delete mode.
async fn handle_confirm_delete_mode(app: &mut App, target: DeleteTarget, code: KeyCode) {
    match code {
        KeyCode::Char('y' | 'Y') => {
            app.exit_dialog_mode();
            app.delete(target).await;
        }
        KeyCode::Char('n' | 'N') | KeyCode::Esc => app.exit_dialog_mode(),
        _ => {}
    }
}

/// Handle input in the prompt editor.
async fn handle_prompt_editor(
    app: &mut App,
    project_id: jarvis_core::ProjectId,
    code: KeyCode,
    modifiers: KeyModifiers,
) {
    if code == KeyCode::Char('s') && modifiers.contains(KeyModifiers::CONTROL) {
        app.save_prompt(project_id).await;
        return;
    }
    if code == KeyCode::Esc {
        app.exit_dialog_mode();
        return;
    }
    let Some(editor) = app.prompt_editor.as_mut() else {
        return;
    };
    match code {
        KeyCode::Tab => editor.toggle_mode(),
        KeyCode::Enter => editor.text_mut().push('\n'),
        KeyCode::Backspace => {
            editor.text_mut().pop();
        }
        KeyCode::Char(c) => editor.text_mut().push(c),
        _ => return,
    }
    app.clear_error();
}

/// Handle input in the model picker.
fn handle_model_picker(app: &mut App, code: KeyCode) {
    let len = app.workspace.models().len();
    match code {
        KeyCode::Up if len > 0 => {
            app.model_cursor = (app.model_cursor + len - 1) % len;
        }
        KeyCode::Down if len > 0 => {
            app.model_cursor = (app.model_cursor + 1) % len;
        }
        KeyCode::Enter => app.pick_model(),
        KeyCode::Esc => app.exit_dialog_mode(),
        _ => {}
    }
}
