//! Client library for the Jarvis chat backend.
//!
//! This crate holds everything between the network and the view:
//!
//! - **Transport**: [`Backend`] trait and its reqwest implementation [`HttpBackend`]
//! - **Stream consumer**: incremental decoding of streamed reply bodies with
//!   cooperative cancellation
//! - **Conversation**: the `Idle → Sending → Streaming → Idle` state machine of
//!   the open chat
//! - **Session cache**: projects and lazily loaded, memoized chat lists
//! - **Workspace**: the facade the view layer drives
//!
//! # Architecture
//!
//! ```text
//!   view ──► Workspace ──► SessionCache
//!              │  ▲
//!      submit  │  │ TurnEvent (mpsc)
//!              ▼  │
//!           pipeline ──► Backend::send_message ──► stream::consume
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use jarvis_client::{ClientConfig, HttpBackend, Workspace};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::default();
//! let backend = Arc::new(HttpBackend::new(&config)?);
//! let (mut workspace, mut events) = Workspace::new(backend, config);
//!
//! workspace.refresh_projects().await;
//! let project_id = workspace.create_project("Demo", "", "").await?;
//! workspace.submit("hello")?;
//!
//! while let Some(event) = events.recv().await {
//!     let done = event.event.is_terminal();
//!     workspace.apply_turn_event(event);
//!     if done {
//!         break;
//!     }
//! }
//! # let _ = project_id;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod config;
pub mod conversation;
pub mod error;
pub mod pipeline;
pub mod prompt;
pub mod stream;
pub mod tools;
pub mod transport;
pub mod workspace;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use cache::SessionCache;
pub use config::ClientConfig;
pub use conversation::{Conversation, ConversationStatus, Transition, ERROR_MARKER};
pub use error::{StreamError, TransportError};
pub use pipeline::{SendEvent, TurnEvent, TurnRequest, TurnTag};
pub use prompt::PromptEditor;
pub use stream::{StreamEvent, StreamOutcome, Utf8Decoder};
pub use tools::TodoList;
pub use transport::{Backend, ByteStream, HttpBackend};
pub use workspace::{Workspace, WorkspaceError};
