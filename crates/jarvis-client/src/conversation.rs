//! Conversation state machine.
//!
//! A `Conversation` owns the transcript of the active chat and moves between
//! `Idle`, `Sending` and `Streaming` as turn events are applied. Each applied
//! event yields a `Transition` the view can redraw on.

use jarvis_core::{Chat, ChatId, Message, SendMessageRequest, ValidationError};
use tokio_util::sync::CancellationToken;

use crate::pipeline::{SendEvent, TurnRequest, TurnTag};
use crate::stream::StreamOutcome;

/// Text written into the transcript when a turn fails.
pub const ERROR_MARKER: &str = "Error: Failed to get response.";

/// Where a conversation is in its send cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationStatus {
    /// Ready to accept a message.
    #[default]
    Idle,
    /// The request is out; no response yet.
    Sending,
    /// The assistant's reply is being appended.
    Streaming,
}

impl ConversationStatus {
    /// Short label for status bars.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Sending => "sending",
            Self::Streaming => "streaming",
        }
    }
}

/// State change produced by a conversation operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A user message was appended and the request is going out.
    Submitted,
    /// The placeholder assistant message was opened.
    StreamOpened,
    /// Text was appended to the open message.
    DeltaApplied,
    /// The turn ended and the conversation is idle again.
    Finished(StreamOutcome),
    /// Stop was signalled; the turn ends once the consumer notices.
    StopRequested,
}

/// The in-flight send, if any.
#[derive(Debug)]
struct StreamSession {
    tag: TurnTag,
    cancel: CancellationToken,
    /// Position of the open assistant message.
    message_index: Option<usize>,
    /// Whether any non-empty delta was applied.
    received: bool,
    stopping: bool,
}

/// Transcript and send state of one chat.
#[derive(Debug)]
pub struct Conversation {
    chat_id: ChatId,
    messages: Vec<Message>,
    status: ConversationStatus,
    context_window: usize,
    session: Option<StreamSession>,
}

impl Conversation {
    /// Create an empty conversation.
    #[must_use]
    pub fn new(chat_id: ChatId, context_window: usize) -> Self {
        Self {
            chat_id,
            messages: Vec::new(),
            status: ConversationStatus::Idle,
            context_window,
            session: None,
        }
    }

    /// Create a conversation from a hydrated chat.
    #[must_use]
    pub fn from_chat(chat: &Chat, context_window: usize) -> Self {
        Self {
            messages: chat.messages.clone(),
            ..Self::new(chat.id, context_window)
        }
    }

    /// Chat this conversation belongs to.
    #[must_use]
    pub const fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    /// Transcript in order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> ConversationStatus {
        self.status
    }

    /// Whether a new message can be submitted.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.status == ConversationStatus::Idle
    }

    /// Tag of the in-flight turn.
    #[must_use]
    pub fn active_turn(&self) -> Option<TurnTag> {
        self.session.as_ref().map(|s| s.tag)
    }

    /// Index of the message currently receiving deltas.
    #[must_use]
    pub fn open_message(&self) -> Option<usize> {
        if self.status != ConversationStatus::Streaming {
            return None;
        }
        self.session.as_ref().and_then(|s| s.message_index)
    }

    /// Whether stop has been requested for the in-flight turn.
    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.stopping)
    }

    /// Submit a user message.
    ///
    /// Appends the message, moves to `Sending` and returns the turn to run. The
    /// outbound context is the last `context_window` messages of the transcript,
    /// ending with the new one.
    ///
    /// # Errors
    ///
    /// `EmptyMessage` for blank text and `Busy` when not idle. Neither changes
    /// any state.
    pub fn submit(&mut self, text: &str, model: &str) -> Result<TurnRequest, ValidationError> {
        if text.trim().is_empty() {
            return Err(ValidationError::EmptyMessage);
        }
        if !self.is_idle() {
            return Err(ValidationError::Busy);
        }

        self.messages.push(Message::user(text));

        let tag = TurnTag::next(self.chat_id);
        let cancel = CancellationToken::new();
        self.session = Some(StreamSession {
            tag,
            cancel: cancel.clone(),
            message_index: None,
            received: false,
            stopping: false,
        });
        self.status = ConversationStatus::Sending;

        tracing::debug!(turn = %tag, model, "Message submitted");

        Ok(TurnRequest {
            tag,
            request: SendMessageRequest {
                model: model.to_string(),
                messages: self.context().to_vec(),
                stream: true,
            },
            cancel,
        })
    }

    /// The most recent messages, bounded by the context window.
    #[must_use]
    pub fn context(&self) -> &[Message] {
        let window = self.context_window.max(1);
        let start = self.messages.len().saturating_sub(window);
        &self.messages[start..]
    }

    /// Apply an event from the pipeline.
    ///
    /// Events whose tag does not match the in-flight turn are ignored and return
    /// `None`, as are deltas that arrive after stop was requested.
    pub fn apply(&mut self, tag: TurnTag, event: SendEvent) -> Option<Transition> {
        let session = self.session.as_mut().filter(|s| s.tag == tag);
        let Some(session) = session else {
            tracing::debug!(turn = %tag, "Ignoring event for a turn that is not active");
            return None;
        };

        match event {
            SendEvent::Accepted => {
                if self.status != ConversationStatus::Sending {
                    return None;
                }
                self.messages.push(Message::assistant(""));
                session.message_index = Some(self.messages.len() - 1);
                self.status = ConversationStatus::Streaming;
                Some(Transition::StreamOpened)
            }
            SendEvent::Delta(text) => {
                if session.stopping || session.cancel.is_cancelled() {
                    return None;
                }
                let index = session.message_index?;
                debug_assert_eq!(index + 1, self.messages.len(), "open message must be last");
                let message = self.messages.get_mut(index)?;
                message.content.push_str(&text);
                session.received |= !text.is_empty();
                Some(Transition::DeltaApplied)
            }
            SendEvent::Completed => Some(self.finish(StreamOutcome::Completed)),
            SendEvent::Failed(detail) => {
                if session.stopping {
                    // The user asked to stop; whatever broke afterwards is not news.
                    return Some(self.finish(StreamOutcome::Cancelled));
                }
                let marker = if detail.is_empty() {
                    ERROR_MARKER.to_string()
                } else {
                    format!("{ERROR_MARKER}\n{detail}")
                };
                let open = session.message_index.and_then(|i| self.messages.get_mut(i));
                match open {
                    Some(message) if session.received => {
                        message.content.push_str("\n\n");
                        message.content.push_str(&marker);
                    }
                    Some(message) => message.content = marker,
                    None => self.messages.push(Message::assistant(marker)),
                }
                Some(self.finish(StreamOutcome::Failed))
            }
            SendEvent::Cancelled => Some(self.finish(StreamOutcome::Cancelled)),
        }
    }

    /// Ask the in-flight turn to stop.
    ///
    /// Only valid while streaming. The transcript is left as it is; the turn
    /// returns to `Idle` when its cancellation event is applied.
    pub fn request_stop(&mut self) -> Option<Transition> {
        if self.status != ConversationStatus::Streaming {
            return None;
        }
        let session = self.session.as_mut()?;
        if session.stopping {
            return None;
        }
        session.stopping = true;
        session.cancel.cancel();
        tracing::debug!(turn = %session.tag, "Stop requested");
        Some(Transition::StopRequested)
    }

    fn finish(&mut self, outcome: StreamOutcome) -> Transition {
        if let Some(session) = self.session.take() {
            tracing::debug!(turn = %session.tag, ?outcome, "Turn finished");
        }
        self.status = ConversationStatus::Idle;
        Transition::Finished(outcome)
    }
}
