//! HTTP client for the Jarvis backend REST API.
//!
//! This module provides the `Backend` trait, one method per REST resource, and
//! `HttpBackend`, its reqwest implementation. Every method is free of client-side
//! state: callers own cache and transcript updates.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use jarvis_core::{
    Chat, ChatId, ChatSummary, CreateChatRequest, CreateProjectRequest, ModelsResponse, NewTodo,
    Project, ProjectId, PromptUpdate, PromptUpdateResponse, RenameChatRequest,
    SendMessageRequest, TodoItem, TodoPatch, WeatherReport,
};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::{Result, StreamError, TransportError};

/// Raw response body of a streaming send, delivered chunk by chunk.
pub type ByteStream = BoxStream<'static, std::result::Result<Vec<u8>, StreamError>>;

/// Trait for backend communication.
///
/// This trait abstracts the transport so the cache, the conversation state machine
/// and the pipeline can be exercised against an in-memory backend in tests.
#[async_trait]
pub trait Backend: Send + Sync {
    // =========================================================================
    // Projects
    // =========================================================================

    /// List all projects.
    async fn list_projects(&self) -> Result<Vec<Project>>;

    /// Fetch one project.
    async fn get_project(&self, project_id: ProjectId) -> Result<Project>;

    /// Create a project.
    async fn create_project(&self, request: &CreateProjectRequest) -> Result<Project>;

    /// Update a project's system prompt.
    async fn update_prompt(
        &self,
        project_id: ProjectId,
        update: &PromptUpdate,
    ) -> Result<PromptUpdateResponse>;

    /// Delete a project. The backend deletes its chats as well.
    async fn delete_project(&self, project_id: ProjectId) -> Result<()>;

    // =========================================================================
    // Chats
    // =========================================================================

    /// List the chat summaries of a project.
    async fn list_chats(&self, project_id: ProjectId) -> Result<Vec<ChatSummary>>;

    /// Create a chat.
    async fn create_chat(&self, request: &CreateChatRequest) -> Result<ChatSummary>;

    /// Fetch a chat with its full message list.
    async fn get_chat(&self, chat_id: ChatId) -> Result<Chat>;

    /// Rename a chat.
    ///
    /// Returns the server's view of the chat when the response body describes one.
    async fn rename_chat(
        &self,
        chat_id: ChatId,
        request: &RenameChatRequest,
    ) -> Result<Option<ChatSummary>>;

    /// Delete a chat.
    async fn delete_chat(&self, chat_id: ChatId) -> Result<()>;

    /// Send a conversation and return the raw response body without buffering it.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Status` if the initial response is not successful and
    /// `TransportError::Cancelled` if `cancel` fires before the response head arrives.
    async fn send_message(
        &self,
        chat_id: ChatId,
        request: &SendMessageRequest,
        cancel: &CancellationToken,
    ) -> Result<ByteStream>;

    // =========================================================================
    // Models & Tools
    // =========================================================================

    /// List available model identifiers.
    async fn list_models(&self) -> Result<Vec<String>>;

    /// List todos.
    async fn list_todos(&self) -> Result<Vec<TodoItem>>;

    /// Add a todo.
    async fn add_todo(&self, todo: &NewTodo) -> Result<TodoItem>;

    /// Update a todo.
    async fn update_todo(&self, todo_id: &str, patch: &TodoPatch) -> Result<TodoItem>;

    /// Delete a todo.
    async fn delete_todo(&self, todo_id: &str) -> Result<()>;

    /// Fetch the weather summary.
    async fn weather(&self) -> Result<WeatherReport>;
}

/// Client for the Jarvis REST API.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    request_timeout: std::time::Duration,
}

impl HttpBackend {
    /// Create a new backend client.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;

        Ok(Self::with_client(client, config))
    }

    /// Create a new backend client with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: Client, config: &ClientConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout(),
        }
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn a non-success response into a `TransportError::Status`.
    async fn check(response: Response) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status, body = %body, "Backend returned an error status");
        Err(TransportError::Status { status, body })
    }

    /// Send a bounded request and decode its JSON body.
    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.timeout(self.request_timeout).send().await?;
        let response = Self::check(response).await?;

        response
            .json()
            .await
            .map_err(|e| TransportError::Parse(e.to_string()))
    }

    /// Send a bounded request whose body is not needed.
    async fn execute(&self, request: RequestBuilder) -> Result<()> {
        let response = request.timeout(self.request_timeout).send().await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn list_projects(&self) -> Result<Vec<Project>> {
        self.fetch(self.client.get(self.url("/api/projects/"))).await
    }

    async fn get_project(&self, project_id: ProjectId) -> Result<Project> {
        let url = self.url(&format!("/api/projects/{project_id}"));
        self.fetch(self.client.get(url)).await
    }

    async fn create_project(&self, request: &CreateProjectRequest) -> Result<Project> {
        let project: Project = self
            .fetch(self.client.post(self.url("/api/projects/")).json(request))
            .await?;
        tracing::debug!(project_id = %project.id, name = %project.name, "Created project");
        Ok(project)
    }

    async fn update_prompt(
        &self,
        project_id: ProjectId,
        update: &PromptUpdate,
    ) -> Result<PromptUpdateResponse> {
        let url = self.url(&format!("/api/projects/{project_id}/prompt"));
        self.fetch(self.client.put(url).json(update)).await
    }

    async fn delete_project(&self, project_id: ProjectId) -> Result<()> {
        let url = self.url(&format!("/api/projects/{project_id}"));
        self.execute(self.client.delete(url)).await?;
        tracing::debug!(project_id = %project_id, "Deleted project");
        Ok(())
    }

    async fn list_chats(&self, project_id: ProjectId) -> Result<Vec<ChatSummary>> {
        let url = self.url(&format!("/api/chat/history/{project_id}"));
        self.fetch(self.client.get(url)).await
    }

    async fn create_chat(&self, request: &CreateChatRequest) -> Result<ChatSummary> {
        let chat: ChatSummary = self
            .fetch(self.client.post(self.url("/api/chat/new")).json(request))
            .await?;
        tracing::debug!(chat_id = %chat.id, project_id = %chat.project_id, "Created chat");
        Ok(chat)
    }

    async fn get_chat(&self, chat_id: ChatId) -> Result<Chat> {
        let url = self.url(&format!("/api/chat/{chat_id}"));
        self.fetch(self.client.get(url)).await
    }

    async fn rename_chat(
        &self,
        chat_id: ChatId,
        request: &RenameChatRequest,
    ) -> Result<Option<ChatSummary>> {
        let url = self.url(&format!("/api/chat/{chat_id}"));
        let response = self
            .client
            .put(url)
            .json(request)
            .timeout(self.request_timeout)
            .send()
            .await?;
        let response = Self::check(response).await?;

        // The response shape of this endpoint is not pinned down; take it if it
        // looks like a chat, otherwise fall back to the requested values.
        let body = response.text().await?;
        Ok(serde_json::from_str::<ChatSummary>(&body).ok())
    }

    async fn delete_chat(&self, chat_id: ChatId) -> Result<()> {
        let url = self.url(&format!("/api/chat/{chat_id}"));
        self.execute(self.client.delete(url)).await?;
        tracing::debug!(chat_id = %chat_id, "Deleted chat");
        Ok(())
    }

    async fn send_message(
        &self,
        chat_id: ChatId,
        request: &SendMessageRequest,
        cancel: &CancellationToken,
    ) -> Result<ByteStream> {
        let url = self.url(&format!("/api/chat/{chat_id}/message"));

        // No total timeout here: the body is read for as long as the model talks.
        let pending = self.client.post(url).json(request).send();
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(TransportError::Cancelled),
            response = pending => response?,
        };
        let response = Self::check(response).await?;

        tracing::debug!(
            chat_id = %chat_id,
            model = %request.model,
            context = request.messages.len(),
            "Message accepted, streaming response"
        );

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(StreamError::new))
            .boxed())
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let body: ModelsResponse = self.fetch(self.client.get(self.url("/api/models/"))).await?;
        Ok(body.models)
    }

    async fn list_todos(&self) -> Result<Vec<TodoItem>> {
        self.fetch(self.client.get(self.url("/api/tools/todos"))).await
    }

    async fn add_todo(&self, todo: &NewTodo) -> Result<TodoItem> {
        self.fetch(self.client.post(self.url("/api/tools/todos")).json(todo))
            .await
    }

    async fn update_todo(&self, todo_id: &str, patch: &TodoPatch) -> Result<TodoItem> {
        let url = self.url(&format!("/api/tools/todos/{todo_id}"));
        self.fetch(self.client.patch(url).json(patch)).await
    }

    async fn delete_todo(&self, todo_id: &str) -> Result<()> {
        let url = self.url(&format!("/api/tools/todos/{todo_id}"));
        self.execute(self.client.delete(url)).await
    }

    async fn weather(&self) -> Result<WeatherReport> {
        self.fetch(self.client.get(self.url("/api/tools/weather")))
            .await
    }
}
