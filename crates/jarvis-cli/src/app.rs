//! Application state.
//!
//! This module holds the TUI state and turns user intents into `Workspace`
//! operations. Streaming replies arrive as `TurnEvent`s from the event loop and
//! are applied through [`App::handle_turn_event`], which reports whether the
//! screen needs an immediate redraw.

use std::collections::HashSet;
use std::time::Duration;

use jarvis_client::{
    tools, ConversationStatus, PromptEditor, StreamOutcome, TodoList, Transition, TurnEvent,
    Workspace,
};
use jarvis_core::{ChatId, ChatSummary, Project, ProjectId};

/// Which UI column has focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    /// Left column: projects and chats.
    #[default]
    Sidebar,
    /// Right column: transcript with input.
    Chat,
}

impl Focus {
    /// Toggle to the other column.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Sidebar => Self::Chat,
            Self::Chat => Self::Sidebar,
        }
    }
}

/// One line of the sidebar tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidebarRow {
    /// A project header.
    Project(ProjectId),
    /// A chat under an expanded project.
    Chat(ProjectId, ChatId),
}

/// What a pending delete confirmation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteTarget {
    /// A project and all its chats.
    Project(ProjectId),
    /// A single chat.
    Chat(ChatId),
}

/// Input mode for special operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    /// Normal operation mode.
    #[default]
    Normal,
    /// Prompting for a new project name.
    CreatingProject,
    /// Prompting for a new chat title.
    CreatingChat(ProjectId),
    /// Prompting for a chat's new title.
    RenamingChat(ChatId),
    /// Confirming a deletion.
    ConfirmingDelete(DeleteTarget),
    /// Editing a project's system prompt.
    EditingPrompt(ProjectId),
    /// Choosing the model.
    PickingModel,
    /// Prompting for a new todo.
    AddingTodo,
}

/// Application state.
pub struct App {
    /// Projects, chats and the open conversation.
    pub workspace: Workspace,
    /// Projects whose chat lists are shown.
    pub expanded: HashSet<ProjectId>,
    /// Selected sidebar row.
    pub selected_row: usize,
    /// Current input buffer.
    pub input: String,
    /// Cursor position in input, in characters.
    pub cursor_position: usize,
    /// Which panel has focus.
    pub focus: Focus,
    /// Current input mode.
    pub input_mode: InputMode,
    /// Whether single-key commands are active instead of typing.
    pub command_mode: bool,
    /// Prompt editor draft, while the editor is open.
    pub prompt_editor: Option<PromptEditor>,
    /// Highlighted entry of the model picker.
    pub model_cursor: usize,
    /// Todo widget.
    pub todos: TodoList,
    /// Highlighted todo.
    pub selected_todo: Option<usize>,
    /// Weather summary, if available.
    pub weather: Option<String>,
    /// Whether the tools panel is shown.
    pub show_tools: bool,
    /// Chat scroll position, in lines from the bottom.
    pub chat_scroll: usize,
    /// Status message to display.
    pub status_message: Option<String>,
    /// Error message to display.
    pub error_message: Option<String>,
    /// Whether the app should quit.
    pub should_quit: bool,
    /// Animation frame counter for loading indicators.
    pub animation_frame: usize,
    /// Saved chat input when entering a dialog mode.
    saved_chat_input: Option<(String, usize)>,
}

impl App {
    /// Create a new application.
    #[must_use]
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            expanded: HashSet::new(),
            selected_row: 0,
            input: String::new(),
            cursor_position: 0,
            focus: Focus::Sidebar,
            input_mode: InputMode::Normal,
            command_mode: false,
            prompt_editor: None,
            model_cursor: 0,
            todos: TodoList::new(),
            selected_todo: None,
            weather: None,
            show_tools: true,
            chat_scroll: 0,
            status_message: None,
            error_message: None,
            should_quit: false,
            animation_frame: 0,
            saved_chat_input: None,
        }
    }

    /// Load everything shown at startup. Failures degrade to empty panels.
    pub async fn load_initial(&mut self) {
        self.workspace.refresh_projects().await;
        self.workspace.refresh_models().await;
        self.refresh_tools().await;
        if self.workspace.cache().projects().is_empty() {
            self.set_status("No projects yet. Esc then p to create one");
        }
    }

    /// Reload the tools panel.
    pub async fn refresh_tools(&mut self) {
        let backend = self.workspace.backend();
        self.todos.refresh(backend.as_ref()).await;
        self.weather = tools::fetch_weather(backend.as_ref()).await;
        self.clamp_todo_selection();
    }

    /// Enter a dialog mode, saving the current chat input.
    pub fn enter_dialog_mode(&mut self, mode: InputMode) {
        self.saved_chat_input = Some((std::mem::take(&mut self.input), self.cursor_position));
        self.cursor_position = 0;
        self.input_mode = mode;
        self.command_mode = false;
    }

    /// Enter a dialog mode with the input prefilled.
    pub fn enter_dialog_with(&mut self, mode: InputMode, text: &str) {
        self.enter_dialog_mode(mode);
        self.input = text.to_string();
        self.move_cursor_end();
    }

    /// Exit dialog mode, restoring the saved chat input.
    pub fn exit_dialog_mode(&mut self) {
        self.input_mode = InputMode::Normal;
        self.prompt_editor = None;
        if let Some((input, cursor)) = self.saved_chat_input.take() {
            self.input = input;
            self.cursor_position = cursor;
        } else {
            self.clear_input();
        }
    }

    /// Tick the animation frame (call on each render).
    pub fn tick_animation(&mut self) {
        self.animation_frame = self.animation_frame.wrapping_add(1);
    }

    /// Get current spinner character for loading animation.
    #[must_use]
    pub fn spinner_char(&self) -> &'static str {
        const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
        SPINNER[self.animation_frame % SPINNER.len()]
    }

    /// Backend base URL for display.
    #[must_use]
    pub fn api_url(&self) -> &str {
        &self.workspace.config().base_url
    }

    /// Set the status message (also clears any error).
    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
        self.error_message = None;
    }

    /// Set the error message.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
    }

    /// Clear the error message.
    pub fn clear_error(&mut self) {
        self.error_message = None;
    }

    // =========================================================================
    // Sidebar
    // =========================================================================

    /// Rows of the sidebar tree, top to bottom.
    #[must_use]
    pub fn sidebar_rows(&self) -> Vec<SidebarRow> {
        let cache = self.workspace.cache();
        let mut rows = Vec::new();
        for project in cache.projects() {
            rows.push(SidebarRow::Project(project.id));
            if self.expanded.contains(&project.id) {
                rows.extend(
                    cache
                        .chats(project.id)
                        .iter()
                        .map(|chat| SidebarRow::Chat(project.id, chat.id)),
                );
            }
        }
        rows
    }

    /// The row under the selection.
    #[must_use]
    pub fn selected_row(&self) -> Option<SidebarRow> {
        self.sidebar_rows().get(self.selected_row).copied()
    }

    /// Project of the selected row, falling back to the active project.
    #[must_use]
    pub fn target_project(&self) -> Option<&Project> {
        let id = match self.selected_row() {
            Some(SidebarRow::Project(id) | SidebarRow::Chat(id, _)) => Some(id),
            None => self.workspace.active_project_id(),
        }?;
        self.workspace.cache().project(id)
    }

    /// Chat summary for a row.
    #[must_use]
    pub fn chat_summary(&self, chat_id: ChatId) -> Option<&ChatSummary> {
        self.workspace.cache().find_chat(chat_id)
    }

    /// Move selection up in the sidebar.
    pub fn select_prev_row(&mut self) {
        let len = self.sidebar_rows().len();
        if len == 0 {
            return;
        }
        self.selected_row = match self.selected_row {
            0 => len - 1,
            i => (i - 1).min(len - 1),
        };
    }

    /// Move selection down in the sidebar.
    pub fn select_next_row(&mut self) {
        let len = self.sidebar_rows().len();
        if len == 0 {
            return;
        }
        self.selected_row = if self.selected_row + 1 >= len {
            0
        } else {
            self.selected_row + 1
        };
    }

    fn clamp_selection(&mut self) {
        let len = self.sidebar_rows().len();
        self.selected_row = self.selected_row.min(len.saturating_sub(1));
    }

    fn select(&mut self, target: SidebarRow) {
        if let Some(i) = self.sidebar_rows().iter().position(|row| *row == target) {
            self.selected_row = i;
        }
    }

    /// Expand or collapse a project, or open a chat.
    pub async fn activate_selected(&mut self) {
        match self.selected_row() {
            Some(SidebarRow::Project(project_id)) => {
                if self.expanded.remove(&project_id) {
                    self.clamp_selection();
                } else {
                    self.workspace.select_project(project_id).await;
                    self.expanded.insert(project_id);
                }
            }
            Some(SidebarRow::Chat(_, chat_id)) => self.open_chat(chat_id).await,
            None => {}
        }
    }

    // =========================================================================
    // Chat Scrolling
    // =========================================================================

    /// Scroll chat up (view older messages).
    pub fn scroll_chat_up(&mut self, amount: usize) {
        self.chat_scroll = self.chat_scroll.saturating_add(amount);
    }

    /// Scroll chat down (view newer messages).
    pub fn scroll_chat_down(&mut self, amount: usize) {
        self.chat_scroll = self.chat_scroll.saturating_sub(amount);
    }

    // =========================================================================
    // Input Handling
    // =========================================================================

    fn byte_index(&self) -> usize {
        self.input
            .char_indices()
            .nth(self.cursor_position)
            .map_or(self.input.len(), |(i, _)| i)
    }

    fn input_len(&self) -> usize {
        self.input.chars().count()
    }

    /// Insert a character at the cursor position.
    pub fn insert_char(&mut self, c: char) {
        let at = self.byte_index();
        self.input.insert(at, c);
        self.cursor_position += 1;
    }

    /// Delete the character before the cursor.
    pub fn delete_char(&mut self) {
        if self.cursor_position > 0 {
            self.cursor_position -= 1;
            let at = self.byte_index();
            self.input.remove(at);
        }
    }

    /// Delete the character at the cursor.
    pub fn delete_char_forward(&mut self) {
        if self.cursor_position < self.input_len() {
            let at = self.byte_index();
            self.input.remove(at);
        }
    }

    /// Delete back to the previous space.
    pub fn delete_word(&mut self) {
        while self.cursor_position > 0 {
            self.delete_char();
            if self.cursor_position > 0 {
                let prev_char = self.input.chars().nth(self.cursor_position - 1);
                if prev_char == Some(' ') {
                    break;
                }
            }
        }
    }

    /// Move cursor left.
    pub fn move_cursor_left(&mut self) {
        self.cursor_position = self.cursor_position.saturating_sub(1);
    }

    /// Move cursor right.
    pub fn move_cursor_right(&mut self) {
        if self.cursor_position < self.input_len() {
            self.cursor_position += 1;
        }
    }

    /// Move cursor to the start.
    pub fn move_cursor_start(&mut self) {
        self.cursor_position = 0;
    }

    /// Move cursor to the end.
    pub fn move_cursor_end(&mut self) {
        self.cursor_position = self.input_len();
    }

    /// Clear the input.
    pub fn clear_input(&mut self) {
        self.input.clear();
        self.cursor_position = 0;
    }

    /// Take the current input (clears it).
    pub fn take_input(&mut self) -> String {
        let input = std::mem::take(&mut self.input);
        self.cursor_position = 0;
        input
    }

    // =========================================================================
    // Projects & Chats
    // =========================================================================

    /// Create a project from the dialog input.
    pub async fn create_project(&mut self, name: &str) {
        match self.workspace.create_project(name, "", "").await {
            Ok(project_id) => {
                self.expanded.insert(project_id);
                if let Some(chat_id) = self.workspace.active_chat() {
                    self.select(SidebarRow::Chat(project_id, chat_id));
                }
                self.focus = Focus::Chat;
                self.set_status(format!("Created project: {}", name.trim()));
            }
            Err(e) => self.set_error(e.to_string()),
        }
    }

    /// Create a chat from the dialog input.
    pub async fn create_chat(&mut self, project_id: ProjectId, title: &str) {
        self.workspace.expand_project(project_id).await;
        match self.workspace.create_chat(project_id, title).await {
            Ok(chat_id) => {
                self.expanded.insert(project_id);
                self.select(SidebarRow::Chat(project_id, chat_id));
                self.focus = Focus::Chat;
                self.chat_scroll = 0;
                self.set_status("Chat created");
            }
            Err(e) => self.set_error(e.to_string()),
        }
    }

    /// Open a chat.
    pub async fn open_chat(&mut self, chat_id: ChatId) {
        match self.workspace.open_chat(chat_id).await {
            Ok(()) => {
                self.focus = Focus::Chat;
                self.chat_scroll = 0;
                self.status_message = None;
            }
            Err(e) => self.set_error(format!("Failed to open chat: {e}")),
        }
    }

    /// Rename a chat from the dialog input.
    pub async fn rename_chat(&mut self, chat_id: ChatId, title: &str) {
        match self.workspace.rename_chat(chat_id, title).await {
            Ok(()) => self.set_status("Chat renamed"),
            Err(e) => self.set_error(e.to_string()),
        }
    }

    /// Carry out a confirmed deletion.
    pub async fn delete(&mut self, target: DeleteTarget) {
        let result = match target {
            DeleteTarget::Project(project_id) => {
                let result = self.workspace.delete_project(project_id).await;
                if result.is_ok() {
                    self.expanded.remove(&project_id);
                }
                result
            }
            DeleteTarget::Chat(chat_id) => self.workspace.delete_chat(chat_id).await,
        };
        match result {
            Ok(()) => {
                self.clamp_selection();
                self.set_status("Deleted");
            }
            Err(e) => self.set_error(e.to_string()),
        }
    }

    /// Open the prompt editor for a project.
    pub fn open_prompt_editor(&mut self, project_id: ProjectId) {
        let Some(project) = self.workspace.cache().project(project_id) else {
            return;
        };
        let editor = PromptEditor::seeded(&project.system_prompt);
        self.enter_dialog_mode(InputMode::EditingPrompt(project_id));
        self.prompt_editor = Some(editor);
    }

    /// Validate and save the prompt editor. The editor stays open on failure.
    pub async fn save_prompt(&mut self, project_id: ProjectId) {
        let Some(editor) = self.prompt_editor.as_ref() else {
            return;
        };
        let update = match editor.build() {
            Ok(update) => update,
            Err(e) => {
                self.set_error(e.to_string());
                return;
            }
        };
        match self.workspace.update_prompt(project_id, &update).await {
            Ok(()) => {
                self.exit_dialog_mode();
                self.set_status("Prompt saved");
            }
            Err(e) => self.set_error(e.to_string()),
        }
    }

    /// Open the model picker on the current model.
    pub fn open_model_picker(&mut self) {
        if self.workspace.models().is_empty() {
            self.set_error("No models available");
            return;
        }
        let current = self.workspace.model().to_string();
        self.model_cursor = self
            .workspace
            .models()
            .iter()
            .position(|m| *m == current)
            .unwrap_or(0);
        self.enter_dialog_mode(InputMode::PickingModel);
    }

    /// Use the model under the picker cursor.
    pub fn pick_model(&mut self) {
        if let Some(model) = self.workspace.models().get(self.model_cursor).cloned() {
            self.set_status(format!("Model: {model}"));
            self.workspace.set_model(model);
        }
        self.exit_dialog_mode();
    }

    // =========================================================================
    // Messaging
    // =========================================================================

    /// Whether the open conversation is waiting for or receiving a reply.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.workspace
            .conversation()
            .is_some_and(|c| c.status() != ConversationStatus::Idle)
    }

    /// Send the input as a message. The input is kept if the send is rejected.
    pub fn send_input(&mut self) {
        match self.workspace.submit(&self.input) {
            Ok(_) => {
                self.clear_input();
                self.chat_scroll = 0;
                self.set_status("Sending...");
            }
            Err(e) => self.set_error(e.to_string()),
        }
    }

    /// Whether Esc should stop a reply. A send still waiting for its
    /// response head cannot be stopped yet.
    #[must_use]
    pub fn can_stop(&self) -> bool {
        let streaming = self.workspace.conversation().is_some_and(|c| {
            c.status() == ConversationStatus::Streaming && !c.is_stopping()
        });
        streaming || self.workspace.has_detached_turn()
    }

    /// Stop the streaming reply.
    pub fn stop_streaming(&mut self) {
        if self.workspace.request_stop().is_some() {
            self.set_status("Stopping...");
        }
    }

    /// Apply a turn event.
    ///
    /// Returns `true` if the UI should be redrawn right away.
    pub fn handle_turn_event(&mut self, event: TurnEvent) -> bool {
        let Some(transition) = self.workspace.apply_turn_event(event) else {
            return false;
        };
        match transition {
            Transition::StreamOpened => self.set_status("Jarvis is responding... (Esc to stop)"),
            Transition::Finished(StreamOutcome::Completed) => self.set_status("Response complete"),
            Transition::Finished(StreamOutcome::Cancelled) => self.set_status("Stopped"),
            Transition::Finished(StreamOutcome::Failed) => {
                self.set_error("Failed to get response");
            }
            Transition::Submitted | Transition::DeltaApplied | Transition::StopRequested => {}
        }
        // Keep scrolled to bottom
        self.chat_scroll = 0;
        true
    }

    /// Check if UI needs high-frequency redraws (during streaming).
    #[must_use]
    pub fn needs_immediate_redraw(&self) -> bool {
        self.is_streaming()
    }

    // =========================================================================
    // Tools
    // =========================================================================

    fn clamp_todo_selection(&mut self) {
        let len = self.todos.items().len();
        self.selected_todo = match self.selected_todo {
            _ if len == 0 => None,
            Some(i) => Some(i.min(len - 1)),
            None => Some(0),
        };
    }

    /// Move the todo highlight.
    pub fn select_todo(&mut self, forward: bool) {
        let len = self.todos.items().len();
        if len == 0 {
            return;
        }
        self.selected_todo = Some(match (self.selected_todo, forward) {
            (Some(i), true) => (i + 1) % len,
            (Some(0) | None, false) => len - 1,
            (Some(i), false) => i - 1,
            (None, true) => 0,
        });
    }

    /// Add a todo from the dialog input.
    pub async fn add_todo(&mut self, text: &str) {
        let backend = self.workspace.backend();
        match self.todos.add(backend.as_ref(), text).await {
            Ok(true) => {
                self.selected_todo = Some(self.todos.items().len() - 1);
                self.set_status("Todo added");
            }
            Ok(false) => {}
            Err(e) => self.set_error(format!("Failed to add todo: {e}")),
        }
    }

    /// Toggle the highlighted todo.
    pub async fn toggle_todo(&mut self) {
        let Some(index) = self.selected_todo else {
            return;
        };
        let backend = self.workspace.backend();
        if let Err(e) = self.todos.toggle(backend.as_ref(), index).await {
            self.set_error(format!("Failed to update todo: {e}"));
        }
    }

    /// Delete the highlighted todo.
    pub async fn remove_todo(&mut self) {
        let Some(index) = self.selected_todo else {
            return;
        };
        let backend = self.workspace.backend();
        match self.todos.remove(backend.as_ref(), index).await {
            Ok(()) => self.clamp_todo_selection(),
            Err(e) => self.set_error(format!("Failed to delete todo: {e}")),
        }
    }
}

/// Refresh interval for the tools panel.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(60);
