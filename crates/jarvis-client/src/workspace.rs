//! Workspace facade.
//!
//! `Workspace` owns the session cache, the active project and chat references,
//! the conversation of the active chat and the model selection. The view layer
//! calls its operations and re-reads state afterwards; it never mutates the
//! cache directly.
//!
//! Sends run on background tasks. Their events come back on the channel
//! returned by [`Workspace::new`] and must be fed to
//! [`Workspace::apply_turn_event`] in the order they arrive.

use std::collections::HashMap;
use std::sync::Arc;

use jarvis_core::{
    ChatId, CreateChatRequest, CreateProjectRequest, Project, ProjectId, PromptUpdate,
    RenameChatRequest, ValidationError,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cache::SessionCache;
use crate::config::ClientConfig;
use crate::conversation::{Conversation, Transition};
use crate::error::TransportError;
use crate::pipeline::{self, TurnEvent, TurnTag};
use crate::transport::Backend;

/// Errors returned by workspace operations.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// The backend call failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The input was rejected before any request was made.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The chat is not in the session cache.
    #[error("unknown chat: {0}")]
    UnknownChat(ChatId),

    /// No chat is open.
    #[error("no chat is open")]
    NoActiveChat,
}

/// A result type using `WorkspaceError`.
pub type Result<T> = std::result::Result<T, WorkspaceError>;

/// Client-side state of one session.
pub struct Workspace {
    backend: Arc<dyn Backend>,
    config: ClientConfig,
    cache: SessionCache,
    models: Vec<String>,
    model: String,
    active_project: Option<ProjectId>,
    active_chat: Option<ChatId>,
    conversation: Option<Conversation>,
    in_flight: HashMap<ChatId, (TurnTag, CancellationToken)>,
    events: mpsc::UnboundedSender<TurnEvent>,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("active_project", &self.active_project)
            .field("active_chat", &self.active_chat)
            .field("model", &self.model)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl Workspace {
    /// Create a workspace and the receiver its turn events are delivered on.
    #[must_use]
    pub fn new(
        backend: Arc<dyn Backend>,
        config: ClientConfig,
    ) -> (Self, mpsc::UnboundedReceiver<TurnEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let workspace = Self {
            backend,
            model: config.default_model.clone(),
            config,
            cache: SessionCache::new(),
            models: Vec::new(),
            active_project: None,
            active_chat: None,
            conversation: None,
            in_flight: HashMap::new(),
            events,
        };
        (workspace, rx)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The session cache.
    #[must_use]
    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    /// Backend handle.
    #[must_use]
    pub fn backend(&self) -> Arc<dyn Backend> {
        Arc::clone(&self.backend)
    }

    /// Active project, if any.
    #[must_use]
    pub fn active_project(&self) -> Option<&Project> {
        self.active_project.and_then(|id| self.cache.project(id))
    }

    /// Id of the active project.
    #[must_use]
    pub const fn active_project_id(&self) -> Option<ProjectId> {
        self.active_project
    }

    /// Id of the open chat.
    #[must_use]
    pub const fn active_chat(&self) -> Option<ChatId> {
        self.active_chat
    }

    /// Conversation of the open chat.
    #[must_use]
    pub fn conversation(&self) -> Option<&Conversation> {
        self.conversation.as_ref()
    }

    /// Available models; empty if they could not be fetched.
    #[must_use]
    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Model sent with new messages.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Whether a send is still running for a chat.
    #[must_use]
    pub fn is_in_flight(&self, chat_id: ChatId) -> bool {
        self.in_flight.contains_key(&chat_id)
    }

    // =========================================================================
    // Read-only fetches
    // =========================================================================

    /// Reload the project list.
    ///
    /// References to projects that no longer exist are cleared.
    pub async fn refresh_projects(&mut self) {
        self.cache.load_projects(self.backend.as_ref()).await;
        if let Some(id) = self.active_project {
            if self.cache.project(id).is_none() {
                self.active_project = None;
            }
        }
    }

    /// Reload the model list. A failure leaves it empty.
    pub async fn refresh_models(&mut self) {
        match self.backend.list_models().await {
            Ok(models) => {
                tracing::debug!(count = models.len(), "Loaded models");
                self.models = models;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load models");
                self.models.clear();
            }
        }
    }

    /// Load a project's chat list if it has not been loaded yet.
    ///
    /// Returns true if a fetch was issued.
    pub async fn expand_project(&mut self, project_id: ProjectId) -> bool {
        self.cache
            .load_project_chats(self.backend.as_ref(), project_id)
            .await
    }

    /// Make a project active and make sure its chats are loaded.
    pub async fn select_project(&mut self, project_id: ProjectId) {
        self.active_project = Some(project_id);
        self.expand_project(project_id).await;
    }

    // =========================================================================
    // Projects
    // =========================================================================

    /// Create a project together with its first chat and open that chat.
    ///
    /// # Errors
    ///
    /// `EmptyName` for a blank name, or the transport error of either request.
    /// If only the chat creation fails, the project stays cached and active.
    pub async fn create_project(
        &mut self,
        name: &str,
        description: &str,
        system_prompt: &str,
    ) -> Result<ProjectId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }

        let request = CreateProjectRequest {
            name: name.to_string(),
            description: description.trim().to_string(),
            system_prompt: system_prompt.to_string(),
        };
        let project = self.backend.create_project(&request).await?;
        let project_id = project.id;
        tracing::info!(project_id = %project_id, name = %project.name, "Project created");

        self.cache.add_project(project);
        self.active_project = Some(project_id);

        let title = self.config.default_chat_title.clone();
        self.create_chat(project_id, &title).await?;
        Ok(project_id)
    }

    /// Delete a project and everything cached under it.
    ///
    /// # Errors
    ///
    /// Returns the transport error; the cache is untouched in that case.
    pub async fn delete_project(&mut self, project_id: ProjectId) -> Result<()> {
        self.backend.delete_project(project_id).await?;

        let removed = self.cache.remove_project(project_id);
        if self.active_project == Some(project_id) {
            self.active_project = None;
        }
        if let Some(chat_id) = self.active_chat {
            let owned = removed.contains(&chat_id)
                || self.cache.find_chat(chat_id).is_none();
            if owned {
                self.close_chat();
            }
        }

        tracing::info!(project_id = %project_id, chats = removed.len(), "Project deleted");
        Ok(())
    }

    /// Apply a prompt update and write the stored prompt back to the cache.
    ///
    /// # Errors
    ///
    /// Returns the transport error of the update or of the follow-up fetch.
    pub async fn update_prompt(&mut self, project_id: ProjectId, update: &PromptUpdate) -> Result<()> {
        let response = self.backend.update_prompt(project_id, update).await?;

        let prompt = match response.system_prompt {
            Some(prompt) => prompt,
            None => self.backend.get_project(project_id).await?.system_prompt,
        };
        self.cache
            .update_project(project_id, |project| project.system_prompt = prompt);

        tracing::info!(project_id = %project_id, mode = ?update.mode, "Prompt updated");
        Ok(())
    }

    // =========================================================================
    // Chats
    // =========================================================================

    /// Create a chat under a project and open it.
    ///
    /// A blank title becomes the configured default title.
    ///
    /// # Errors
    ///
    /// Returns the transport error; nothing is cached in that case.
    pub async fn create_chat(&mut self, project_id: ProjectId, title: &str) -> Result<ChatId> {
        let title = match title.trim() {
            "" => self.config.default_chat_title.clone(),
            t => t.to_string(),
        };
        let request = CreateChatRequest { project_id, title };
        let chat = self.backend.create_chat(&request).await?;
        let chat_id = chat.id;
        tracing::info!(chat_id = %chat_id, project_id = %project_id, "Chat created");

        self.cache.add_chat(chat);
        self.active_project = Some(project_id);
        self.active_chat = Some(chat_id);
        self.conversation = Some(Conversation::new(chat_id, self.config.context_window));
        Ok(chat_id)
    }

    /// Fetch a chat with its messages and make it the open chat.
    ///
    /// Opening the chat that is already open does nothing.
    ///
    /// # Errors
    ///
    /// Returns the transport error; the previously open chat stays open.
    pub async fn open_chat(&mut self, chat_id: ChatId) -> Result<()> {
        if self.conversation.as_ref().map(Conversation::chat_id) == Some(chat_id) {
            return Ok(());
        }

        let chat = self.backend.get_chat(chat_id).await?;
        self.cache.reconcile_chat(&chat);

        let owner = self
            .cache
            .find_chat(chat_id)
            .map_or(chat.project_id, |summary| summary.project_id);
        self.active_project = Some(owner);
        self.active_chat = Some(chat_id);
        self.conversation = Some(Conversation::from_chat(&chat, self.config.context_window));

        tracing::debug!(chat_id = %chat_id, messages = chat.messages.len(), "Chat opened");
        Ok(())
    }

    /// Close the open chat. A running send keeps going in the background.
    pub fn close_chat(&mut self) {
        self.active_chat = None;
        self.conversation = None;
    }

    /// Rename a chat.
    ///
    /// The request always carries the chat's cached owner; a rename never moves
    /// a chat between projects.
    ///
    /// # Errors
    ///
    /// `EmptyTitle` for a blank title, `UnknownChat` if the chat is not cached,
    /// or the transport error.
    pub async fn rename_chat(&mut self, chat_id: ChatId, title: &str) -> Result<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyTitle.into());
        }
        let project_id = self
            .cache
            .find_chat(chat_id)
            .map(|summary| summary.project_id)
            .ok_or(WorkspaceError::UnknownChat(chat_id))?;

        let request = RenameChatRequest {
            project_id,
            title: title.to_string(),
        };
        let confirmed = self.backend.rename_chat(chat_id, &request).await?;
        if let Some(summary) = confirmed {
            if summary.project_id != project_id {
                tracing::warn!(
                    chat_id = %chat_id,
                    sent = %project_id,
                    reported = %summary.project_id,
                    "Rename reported a different project"
                );
            }
        }

        self.cache.rename_chat(chat_id, title);
        tracing::debug!(chat_id = %chat_id, "Chat renamed");
        Ok(())
    }

    /// Delete a chat, closing it if it is open.
    ///
    /// # Errors
    ///
    /// Returns the transport error; the cache is untouched in that case.
    pub async fn delete_chat(&mut self, chat_id: ChatId) -> Result<()> {
        self.backend.delete_chat(chat_id).await?;
        self.cache.remove_chat(chat_id);
        if self.active_chat == Some(chat_id) {
            self.close_chat();
        }
        tracing::info!(chat_id = %chat_id, "Chat deleted");
        Ok(())
    }

    // =========================================================================
    // Messaging
    // =========================================================================

    /// Submit a message in the open chat and start streaming the reply.
    ///
    /// # Errors
    ///
    /// `NoActiveChat`, or `Busy`/`EmptyMessage` from validation. Transport
    /// failures are not returned; they end up in the transcript.
    pub fn submit(&mut self, text: &str) -> Result<TurnTag> {
        let conversation = self.conversation.as_mut().ok_or(WorkspaceError::NoActiveChat)?;
        let chat_id = conversation.chat_id();
        if self.in_flight.contains_key(&chat_id) {
            return Err(ValidationError::Busy.into());
        }

        let turn = conversation.submit(text, &self.model)?;
        let tag = turn.tag;
        self.in_flight.insert(chat_id, (tag, turn.cancel.clone()));
        pipeline::spawn_turn(Arc::clone(&self.backend), turn, self.events.clone());
        Ok(tag)
    }

    /// Apply an event received from a running turn.
    ///
    /// Events of turns whose chat is no longer open are dropped.
    pub fn apply_turn_event(&mut self, event: TurnEvent) -> Option<Transition> {
        let TurnEvent { tag, event } = event;
        let running = self.in_flight.get(&tag.chat_id).is_some_and(|(t, _)| *t == tag);
        if event.is_terminal() && running {
            self.in_flight.remove(&tag.chat_id);
        }
        self.conversation
            .as_mut()
            .filter(|c| c.chat_id() == tag.chat_id)?
            .apply(tag, event)
    }

    /// Stop the reply streaming into the open chat.
    ///
    /// If the chat was closed and reopened while its send kept running, the
    /// open conversation no longer owns that send; its token is cancelled
    /// directly so the chat unlocks once the cancellation event arrives.
    pub fn request_stop(&mut self) -> Option<Transition> {
        let conversation = self.conversation.as_mut()?;
        if !conversation.is_idle() {
            return conversation.request_stop();
        }
        let (tag, cancel) = self.in_flight.get(&conversation.chat_id())?;
        if cancel.is_cancelled() {
            return None;
        }
        cancel.cancel();
        tracing::debug!(turn = %tag, "Stop requested for a detached turn");
        Some(Transition::StopRequested)
    }

    /// Whether the open chat has a send that was started before the chat was
    /// last reopened.
    #[must_use]
    pub fn has_detached_turn(&self) -> bool {
        self.conversation
            .as_ref()
            .is_some_and(|c| c.is_idle() && self.in_flight.contains_key(&c.chat_id()))
    }

    // =========================================================================
    // Models
    // =========================================================================

    /// Use a specific model for new messages.
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    /// Switch to the next model of the fetched list.
    ///
    /// Returns the new model, or `None` when there is nothing to choose from.
    pub fn cycle_model(&mut self) -> Option<&str> {
        if self.models.is_empty() {
            return None;
        }
        let next = self
            .models
            .iter()
            .position(|m| *m == self.model)
            .map_or(0, |i| (i + 1) % self.models.len());
        self.model.clone_from(&self.models[next]);
        Some(&self.model)
    }
}
