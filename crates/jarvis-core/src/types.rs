//! Data model and wire payloads.
//!
//! These types mirror the JSON exchanged with the Jarvis backend. Response types
//! tolerate `null` in optional text columns and ignore fields the client does not
//! use (message ids, timestamps on messages, nested chat lists on projects).

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::ids::{ChatId, ProjectId};

/// Title shown for a chat whose title is unset.
pub const UNTITLED_CHAT: &str = "Untitled Chat";

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts RFC 3339 timestamps as well as the naive UTC timestamps the backend
/// emits. Anything unparseable becomes `None` rather than failing the whole body.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    Ok(NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc()))
}

// =============================================================================
// Messages
// =============================================================================

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Typed by the user.
    User,
    /// Produced by the model.
    Assistant,
}

impl Role {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who wrote the message.
    pub role: Role,
    /// Message text.
    #[serde(deserialize_with = "null_as_empty")]
    pub content: String,
}

impl Message {
    /// Create a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Check if this is a user message.
    #[must_use]
    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

// =============================================================================
// Projects
// =============================================================================

/// A project groups chats under a shared system prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Backend key.
    pub id: ProjectId,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    /// System prompt prepended by the backend to every conversation.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub system_prompt: String,
    /// Creation timestamp, if the backend reported one.
    #[serde(default, deserialize_with = "lenient_timestamp", skip_serializing)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Request to create a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateProjectRequest {
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// System prompt; empty lets the backend apply its default persona.
    pub system_prompt: String,
}

/// How a prompt update is applied on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptMode {
    /// Merge a JSON document into the structured prompt.
    JsonMerge,
    /// Append free text as an additional specification.
    TextAppend,
}

/// Payload of `PUT /api/projects/{id}/prompt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptUpdate {
    /// Merge strategy.
    pub mode: PromptMode,
    /// Editor content.
    pub content: String,
}

/// Response of a prompt update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PromptUpdateResponse {
    /// Outcome reported by the server.
    #[serde(default)]
    pub status: Option<String>,
    /// The prompt as stored after the update.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

// =============================================================================
// Chats
// =============================================================================

/// A chat as listed under its project, without messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSummary {
    /// Backend key.
    pub id: ChatId,
    /// Owning project; never changes after creation.
    pub project_id: ProjectId,
    /// Title, if one was set.
    #[serde(default)]
    pub title: Option<String>,
    /// Creation timestamp, if the backend reported one.
    #[serde(default, deserialize_with = "lenient_timestamp", skip_serializing)]
    pub created_at: Option<DateTime<Utc>>,
}

impl ChatSummary {
    /// Title for display, falling back to a placeholder.
    #[must_use]
    pub fn display_title(&self) -> &str {
        match self.title.as_deref() {
            Some(title) if !title.trim().is_empty() => title,
            _ => UNTITLED_CHAT,
        }
    }
}

/// A chat hydrated with its full message list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Chat {
    /// Backend key.
    pub id: ChatId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Title, if one was set.
    #[serde(default)]
    pub title: Option<String>,
    /// Creation timestamp, if the backend reported one.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    /// Messages in conversation order.
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Chat {
    /// Project this chat onto its summary form.
    #[must_use]
    pub fn summary(&self) -> ChatSummary {
        ChatSummary {
            id: self.id,
            project_id: self.project_id,
            title: self.title.clone(),
            created_at: self.created_at,
        }
    }
}

/// Request to create a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateChatRequest {
    /// Project to create the chat under.
    pub project_id: ProjectId,
    /// Initial title.
    pub title: String,
}

/// Request to rename a chat.
///
/// The backend requires `project_id` in the body. It is always the chat's current
/// project; a rename never moves a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenameChatRequest {
    /// Current owning project.
    pub project_id: ProjectId,
    /// New title.
    pub title: String,
}

/// Body of `POST /api/chat/{id}/message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendMessageRequest {
    /// Model identifier.
    pub model: String,
    /// Outbound context, oldest first, ending with the new user message.
    pub messages: Vec<Message>,
    /// Always `true`; the response body is plain incremental text.
    pub stream: bool,
}

/// Response of `GET /api/models/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ModelsResponse {
    /// Available model identifiers.
    #[serde(default)]
    pub models: Vec<String>,
}

// =============================================================================
// Tools
// =============================================================================

/// An entry of the todo widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    /// Server-assigned key. Items stored without one decode as `None`.
    #[serde(default)]
    pub id: Option<String>,
    /// Todo text.
    pub text: String,
    /// Whether the todo is done.
    #[serde(default)]
    pub completed: bool,
}

/// Request to add a todo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTodo {
    /// Todo text.
    pub text: String,
}

/// Partial update of a todo.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TodoPatch {
    /// Replacement text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Replacement completion flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

/// Response of `GET /api/tools/weather`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WeatherReport {
    /// Human-readable forecast.
    pub summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_tolerates_nulls() {
        let json = r#"{
            "id": 1,
            "name": "Demo",
            "description": null,
            "system_prompt": null,
            "created_at": "2024-05-01T10:20:30.123456",
            "chats": []
        }"#;
        let project: Project = serde_json::from_str(json).unwrap();
        assert_eq!(project.id, ProjectId::new(1));
        assert_eq!(project.description, "");
        assert_eq!(project.system_prompt, "");
        assert!(project.created_at.is_some());
    }

    #[test]
    fn bad_timestamp_is_dropped_not_fatal() {
        let json = r#"{"id": 3, "project_id": 1, "title": "x", "created_at": "yesterday"}"#;
        let chat: ChatSummary = serde_json::from_str(json).unwrap();
        assert!(chat.created_at.is_none());
    }

    #[test]
    fn chat_ignores_message_metadata() {
        let json = r#"{
            "id": 4,
            "project_id": 2,
            "title": null,
            "created_at": "2024-05-01T10:20:30Z",
            "messages": [
                {"id": 1, "chat_id": 4, "role": "user", "content": "hi", "created_at": "2024-05-01T10:20:31"},
                {"id": 2, "chat_id": 4, "role": "assistant", "content": "hello"}
            ]
        }"#;
        let chat: Chat = serde_json::from_str(json).unwrap();
        assert_eq!(chat.messages, vec![Message::user("hi"), Message::assistant("hello")]);
        assert_eq!(chat.summary().display_title(), UNTITLED_CHAT);
    }

    #[test]
    fn send_request_shape() {
        let request = SendMessageRequest {
            model: "m".into(),
            messages: vec![Message::user("ping")],
            stream: true,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "model": "m",
                "messages": [{"role": "user", "content": "ping"}],
                "stream": true
            })
        );
    }

    #[test]
    fn prompt_mode_wire_names() {
        let update = PromptUpdate {
            mode: PromptMode::TextAppend,
            content: "be brief".into(),
        };
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value["mode"], "text_append");
        assert_eq!(
            serde_json::to_value(PromptMode::JsonMerge).unwrap(),
            "json_merge"
        );
    }

    #[test]
    fn todo_without_id_still_decodes() {
        let json = r#"[
            {"id": null, "text": "legacy", "completed": false},
            {"text": "no key"},
            {"id": "a1", "text": "walk", "completed": true}
        ]"#;
        let todos: Vec<TodoItem> = serde_json::from_str(json).unwrap();
        assert_eq!(todos.len(), 3);
        assert_eq!(todos[0].id, None);
        assert_eq!(todos[1].id, None);
        assert_eq!(todos[2].id.as_deref(), Some("a1"));
    }

    #[test]
    fn todo_patch_omits_unset_fields() {
        let patch = TodoPatch {
            completed: Some(true),
            ..TodoPatch::default()
        };
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            serde_json::json!({"completed": true})
        );
    }
}
