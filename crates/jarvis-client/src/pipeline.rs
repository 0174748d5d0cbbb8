//! The send pipeline.
//!
//! A turn is one send: the request goes out through the `Backend`, the response
//! body is fed through `stream::consume`, and everything that happens is reported
//! as an ordered sequence of `TurnEvent`s tagged with the turn that produced them.
//! The conversation state machine applies those events; it never talks to the
//! network itself.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use jarvis_core::{ChatId, SendMessageRequest};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::stream::{self, StreamEvent, StreamOutcome};
use crate::transport::Backend;

static NEXT_TURN: AtomicU64 = AtomicU64::new(1);

/// Identity of one send.
///
/// Turn numbers are unique for the life of the process, so events from a turn
/// started by a conversation that has since been replaced never match the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TurnTag {
    /// Chat the turn belongs to.
    pub chat_id: ChatId,
    /// Process-wide turn number.
    pub turn: u64,
}

impl TurnTag {
    /// Allocate a fresh tag for a chat.
    #[must_use]
    pub fn next(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            turn: NEXT_TURN.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl fmt::Display for TurnTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.chat_id, self.turn)
    }
}

/// What happened during a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendEvent {
    /// The backend accepted the request; the body is about to be read.
    Accepted,
    /// Text appended to the assistant's reply.
    Delta(String),
    /// The reply ended normally.
    Completed,
    /// The request or the body read failed.
    Failed(String),
    /// The user stopped the turn. Not a failure.
    Cancelled,
}

impl SendEvent {
    /// Whether this event ends the turn.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_) | Self::Cancelled)
    }
}

/// A `SendEvent` together with the turn that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnEvent {
    /// Originating turn.
    pub tag: TurnTag,
    /// The event.
    pub event: SendEvent,
}

/// Everything needed to run a turn, produced by a successful submit.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// Turn identity.
    pub tag: TurnTag,
    /// Request body.
    pub request: SendMessageRequest,
    /// Token that stops the turn.
    pub cancel: CancellationToken,
}

/// Run a turn to completion, reporting every step through `emit`.
///
/// Exactly one terminal event is emitted. Events arrive in the order the
/// underlying chunks were read.
pub async fn run_turn<F>(backend: &dyn Backend, turn: &TurnRequest, mut emit: F) -> StreamOutcome
where
    F: FnMut(SendEvent),
{
    let chat_id = turn.tag.chat_id;

    let body = match backend
        .send_message(chat_id, &turn.request, &turn.cancel)
        .await
    {
        Ok(body) => body,
        Err(e) if e.is_cancelled() => {
            tracing::debug!(turn = %turn.tag, "Turn cancelled before the response arrived");
            emit(SendEvent::Cancelled);
            return StreamOutcome::Cancelled;
        }
        Err(e) => {
            tracing::warn!(turn = %turn.tag, error = %e, "Send failed");
            emit(SendEvent::Failed(e.to_string()));
            return StreamOutcome::Failed;
        }
    };

    if turn.cancel.is_cancelled() {
        emit(SendEvent::Cancelled);
        return StreamOutcome::Cancelled;
    }
    emit(SendEvent::Accepted);

    let outcome = stream::consume(body, &turn.cancel, |event| match event {
        StreamEvent::Delta(text) => emit(SendEvent::Delta(text)),
        StreamEvent::Done => emit(SendEvent::Completed),
        StreamEvent::Error(e) => emit(SendEvent::Failed(e.detail().to_string())),
    })
    .await;

    if outcome == StreamOutcome::Cancelled {
        tracing::debug!(turn = %turn.tag, "Turn stopped by user");
        emit(SendEvent::Cancelled);
    }
    outcome
}

/// Run a turn on a background task, forwarding events to `tx`.
///
/// The channel is unbounded so a slow consumer never causes deltas to be
/// dropped; ordering is preserved because a single task produces all events of
/// a turn. A closed receiver does not stop the turn.
pub fn spawn_turn(
    backend: Arc<dyn Backend>,
    turn: TurnRequest,
    tx: mpsc::UnboundedSender<TurnEvent>,
) -> JoinHandle<StreamOutcome> {
    tokio::spawn(async move {
        let tag = turn.tag;
        run_turn(backend.as_ref(), &turn, |event| {
            // The UI may be gone; the backend still gets to finish the reply.
            let _ = tx.send(TurnEvent { tag, event });
        })
        .await
    })
}
