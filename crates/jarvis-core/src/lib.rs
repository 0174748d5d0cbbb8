//! Core types for the Jarvis chat client.
//!
//! This crate provides the foundational types shared by the client library and the
//! terminal front end:
//!
//! - **Identifiers**: Strongly-typed IDs for projects and chats
//! - **Data model**: Projects, chat summaries, hydrated chats and messages
//! - **Wire payloads**: Request/response bodies of the backend REST API
//! - **Validation errors**: Rejections raised synchronously by forms and the composer
//!
//! # Example
//!
//! ```
//! use jarvis_core::{ChatId, Message, ProjectId, Role};
//!
//! let project_id = ProjectId::new(7);
//! let chat_id: ChatId = "42".parse().unwrap();
//!
//! let message = Message::user("hello");
//! assert_eq!(message.role, Role::User);
//! assert_eq!(project_id.get(), 7);
//! assert_eq!(chat_id.to_string(), "42");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod types;

pub use error::ValidationError;
pub use ids::{ChatId, IdError, ProjectId};
pub use types::{
    Chat, ChatSummary, CreateChatRequest, CreateProjectRequest, Message, ModelsResponse,
    NewTodo, Project, PromptMode, PromptUpdate, PromptUpdateResponse, RenameChatRequest, Role,
    SendMessageRequest, TodoItem, TodoPatch, WeatherReport,
};
