//! In-memory backend for tests.
//!
//! `MockBackend` keeps projects, chats and todos in memory, serves scripted
//! replies to sends, counts calls per endpoint and records every send request.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use jarvis_core::{
    Chat, ChatId, ChatSummary, CreateChatRequest, CreateProjectRequest, Message, NewTodo, Project,
    ProjectId, PromptMode, PromptUpdate, PromptUpdateResponse, RenameChatRequest,
    SendMessageRequest, TodoItem, TodoPatch, WeatherReport,
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StreamError, TransportError};
use crate::transport::{Backend, ByteStream};

/// One item of a scripted body.
#[derive(Debug, Clone)]
pub enum MockChunk {
    /// Raw bytes delivered as one chunk.
    Bytes(Vec<u8>),
    /// A read failure.
    Error(String),
}

/// Scripted reply to a send.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Accept the request and deliver a body.
    Stream {
        /// Body items in delivery order.
        chunks: Vec<MockChunk>,
        /// Keep the body open after the last chunk instead of ending it.
        hang: bool,
    },
    /// Answer with a non-success status.
    Reject {
        /// HTTP status.
        status: u16,
        /// Response body.
        body: String,
    },
    /// Never deliver the response head; only cancellation ends the call.
    Hang,
}

impl MockReply {
    /// A body that delivers the given chunks and ends.
    pub fn chunks<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        Self::Stream {
            chunks: chunks
                .into_iter()
                .map(|c| MockChunk::Bytes(c.as_ref().to_vec()))
                .collect(),
            hang: false,
        }
    }

    /// A body that delivers the given chunks and then stays open.
    pub fn chunks_then_hang<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        match Self::chunks(chunks) {
            Self::Stream { chunks, .. } => Self::Stream { chunks, hang: true },
            other => other,
        }
    }

    /// A body that delivers the given chunks and then fails.
    pub fn chunks_then_error<I, C>(chunks: I, error: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        match Self::chunks(chunks) {
            Self::Stream { mut chunks, hang } => {
                chunks.push(MockChunk::Error(error.into()));
                Self::Stream { chunks, hang }
            }
            other => other,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    projects: Vec<Project>,
    chats: Vec<Chat>,
    todos: Vec<TodoItem>,
    models: Vec<String>,
    replies: VecDeque<MockReply>,
    sent: Vec<(ChatId, SendMessageRequest)>,
    calls: HashMap<&'static str, usize>,
    failing: HashMap<&'static str, u16>,
    next_id: i64,
}

impl MockState {
    fn hit(&mut self, endpoint: &'static str) -> Result<()> {
        *self.calls.entry(endpoint).or_default() += 1;
        match self.failing.get(endpoint) {
            Some(&status) => Err(TransportError::Status {
                status,
                body: format!("{endpoint} unavailable"),
            }),
            None => Ok(()),
        }
    }

    fn allocate(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn not_found(what: &str) -> TransportError {
        TransportError::Status {
            status: 404,
            body: format!(r#"{{"detail":"{what} not found"}}"#),
        }
    }
}

/// In-memory `Backend`.
#[derive(Debug, Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a project and return it.
    pub fn seed_project(&self, name: &str) -> Project {
        let mut state = self.state.lock();
        let project = Project {
            id: ProjectId::new(state.allocate()),
            name: name.to_string(),
            description: String::new(),
            system_prompt: String::new(),
            created_at: None,
        };
        state.projects.push(project.clone());
        project
    }

    /// Seed a chat with messages and return its summary.
    pub fn seed_chat(&self, project_id: ProjectId, title: &str, messages: Vec<Message>) -> ChatSummary {
        let mut state = self.state.lock();
        let chat = Chat {
            id: ChatId::new(state.allocate()),
            project_id,
            title: Some(title.to_string()),
            created_at: None,
            messages,
        };
        let summary = chat.summary();
        state.chats.push(chat);
        summary
    }

    /// Set the model list.
    pub fn set_models(&self, models: &[&str]) {
        self.state.lock().models = models.iter().map(ToString::to_string).collect();
    }

    /// Queue a reply for the next send.
    pub fn push_reply(&self, reply: MockReply) {
        self.state.lock().replies.push_back(reply);
    }

    /// Make an endpoint fail with the given status until cleared.
    pub fn fail(&self, endpoint: &'static str, status: u16) {
        self.state.lock().failing.insert(endpoint, status);
    }

    /// Stop failing an endpoint.
    pub fn recover(&self, endpoint: &'static str) {
        self.state.lock().failing.remove(endpoint);
    }

    /// Number of calls made to an endpoint (named after the `Backend` method).
    #[must_use]
    pub fn calls(&self, endpoint: &str) -> usize {
        self.state.lock().calls.get(endpoint).copied().unwrap_or(0)
    }

    /// Every send request received so far.
    #[must_use]
    pub fn sent(&self) -> Vec<(ChatId, SendMessageRequest)> {
        self.state.lock().sent.clone()
    }

    /// Whether the backend still stores a chat.
    #[must_use]
    pub fn has_chat(&self, chat_id: ChatId) -> bool {
        self.state.lock().chats.iter().any(|c| c.id == chat_id)
    }

    /// Current todos.
    #[must_use]
    pub fn todos(&self) -> Vec<TodoItem> {
        self.state.lock().todos.clone()
    }

    /// Store a todo, optionally without a key.
    pub fn seed_todo(&self, id: Option<&str>, text: &str) {
        self.state.lock().todos.push(TodoItem {
            id: id.map(str::to_string),
            text: text.to_string(),
            completed: false,
        });
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn list_projects(&self) -> Result<Vec<Project>> {
        let mut state = self.state.lock();
        state.hit("list_projects")?;
        Ok(state.projects.clone())
    }

    async fn get_project(&self, project_id: ProjectId) -> Result<Project> {
        let mut state = self.state.lock();
        state.hit("get_project")?;
        state
            .projects
            .iter()
            .find(|p| p.id == project_id)
            .cloned()
            .ok_or_else(|| MockState::not_found("Project"))
    }

    async fn create_project(&self, request: &CreateProjectRequest) -> Result<Project> {
        let mut state = self.state.lock();
        state.hit("create_project")?;
        let system_prompt = if request.system_prompt.is_empty() {
            "You are J.A.R.V.I.S.".to_string()
        } else {
            request.system_prompt.clone()
        };
        let project = Project {
            id: ProjectId::new(state.allocate()),
            name: request.name.clone(),
            description: request.description.clone(),
            system_prompt,
            created_at: None,
        };
        state.projects.push(project.clone());
        Ok(project)
    }

    async fn update_prompt(
        &self,
        project_id: ProjectId,
        update: &PromptUpdate,
    ) -> Result<PromptUpdateResponse> {
        let mut state = self.state.lock();
        state.hit("update_prompt")?;
        let project = state
            .projects
            .iter_mut()
            .find(|p| p.id == project_id)
            .ok_or_else(|| MockState::not_found("Project"))?;
        match update.mode {
            PromptMode::JsonMerge => project.system_prompt.clone_from(&update.content),
            PromptMode::TextAppend => {
                if !project.system_prompt.is_empty() {
                    project.system_prompt.push('\n');
                }
                project.system_prompt.push_str(&update.content);
            }
        }
        Ok(PromptUpdateResponse {
            status: Some("success".to_string()),
            system_prompt: Some(project.system_prompt.clone()),
        })
    }

    async fn delete_project(&self, project_id: ProjectId) -> Result<()> {
        let mut state = self.state.lock();
        state.hit("delete_project")?;
        let before = state.projects.len();
        state.projects.retain(|p| p.id != project_id);
        if state.projects.len() == before {
            return Err(MockState::not_found("Project"));
        }
        state.chats.retain(|c| c.project_id != project_id);
        Ok(())
    }

    async fn list_chats(&self, project_id: ProjectId) -> Result<Vec<ChatSummary>> {
        let mut state = self.state.lock();
        state.hit("list_chats")?;
        // Newest first, like the backend.
        Ok(state
            .chats
            .iter()
            .rev()
            .filter(|c| c.project_id == project_id)
            .map(Chat::summary)
            .collect())
    }

    async fn create_chat(&self, request: &CreateChatRequest) -> Result<ChatSummary> {
        let mut state = self.state.lock();
        state.hit("create_chat")?;
        if !state.projects.iter().any(|p| p.id == request.project_id) {
            return Err(MockState::not_found("Project"));
        }
        let chat = Chat {
            id: ChatId::new(state.allocate()),
            project_id: request.project_id,
            title: Some(request.title.clone()),
            created_at: None,
            messages: Vec::new(),
        };
        let summary = chat.summary();
        state.chats.push(chat);
        Ok(summary)
    }

    async fn get_chat(&self, chat_id: ChatId) -> Result<Chat> {
        let mut state = self.state.lock();
        state.hit("get_chat")?;
        state
            .chats
            .iter()
            .find(|c| c.id == chat_id)
            .cloned()
            .ok_or_else(|| MockState::not_found("Chat"))
    }

    async fn rename_chat(
        &self,
        chat_id: ChatId,
        request: &RenameChatRequest,
    ) -> Result<Option<ChatSummary>> {
        let mut state = self.state.lock();
        state.hit("rename_chat")?;
        let chat = state
            .chats
            .iter_mut()
            .find(|c| c.id == chat_id)
            .ok_or_else(|| MockState::not_found("Chat"))?;
        // project_id in the body is ignored, as on the real server.
        chat.title = Some(request.title.clone());
        Ok(Some(chat.summary()))
    }

    async fn delete_chat(&self, chat_id: ChatId) -> Result<()> {
        let mut state = self.state.lock();
        state.hit("delete_chat")?;
        let before = state.chats.len();
        state.chats.retain(|c| c.id != chat_id);
        if state.chats.len() == before {
            return Err(MockState::not_found("Chat"));
        }
        Ok(())
    }

    async fn send_message(
        &self,
        chat_id: ChatId,
        request: &SendMessageRequest,
        cancel: &CancellationToken,
    ) -> Result<ByteStream> {
        let reply = {
            let mut state = self.state.lock();
            state.hit("send_message")?;
            state.sent.push((chat_id, request.clone()));
            state
                .replies
                .pop_front()
                .unwrap_or_else(|| MockReply::chunks(Vec::<Vec<u8>>::new()))
        };

        match reply {
            MockReply::Reject { status, body } => Err(TransportError::Status { status, body }),
            MockReply::Hang => {
                cancel.cancelled().await;
                Err(TransportError::Cancelled)
            }
            MockReply::Stream { chunks, hang } => {
                let items: Vec<std::result::Result<Vec<u8>, StreamError>> = chunks
                    .into_iter()
                    .map(|chunk| match chunk {
                        MockChunk::Bytes(bytes) => Ok(bytes),
                        MockChunk::Error(e) => Err(StreamError::new(e)),
                    })
                    .collect();
                let body = stream::iter(items);
                if hang {
                    Ok(body.chain(stream::pending()).boxed())
                } else {
                    Ok(body.boxed())
                }
            }
        }
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        state.hit("list_models")?;
        Ok(state.models.clone())
    }

    async fn list_todos(&self) -> Result<Vec<TodoItem>> {
        let mut state = self.state.lock();
        state.hit("list_todos")?;
        Ok(state.todos.clone())
    }

    async fn add_todo(&self, todo: &NewTodo) -> Result<TodoItem> {
        let mut state = self.state.lock();
        state.hit("add_todo")?;
        let item = TodoItem {
            id: Some(format!("todo-{}", state.allocate())),
            text: todo.text.clone(),
            completed: false,
        };
        state.todos.push(item.clone());
        Ok(item)
    }

    async fn update_todo(&self, todo_id: &str, patch: &TodoPatch) -> Result<TodoItem> {
        let mut state = self.state.lock();
        state.hit("update_todo")?;
        let item = state
            .todos
            .iter_mut()
            .find(|t| t.id.as_deref() == Some(todo_id))
            .ok_or_else(|| MockState::not_found("Todo"))?;
        if let Some(text) = &patch.text {
            item.text.clone_from(text);
        }
        if let Some(completed) = patch.completed {
            item.completed = completed;
        }
        Ok(item.clone())
    }

    async fn delete_todo(&self, todo_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.hit("delete_todo")?;
        let before = state.todos.len();
        state.todos.retain(|t| t.id.as_deref() != Some(todo_id));
        if state.todos.len() == before {
            return Err(MockState::not_found("Todo"));
        }
        Ok(())
    }

    async fn weather(&self) -> Result<WeatherReport> {
        let mut state = self.state.lock();
        state.hit("weather")?;
        Ok(WeatherReport {
            summary: "Clear skies, 21°C".to_string(),
        })
    }
}
