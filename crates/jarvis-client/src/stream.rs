//! Incremental consumer for streamed response bodies.
//!
//! The backend answers a send with plain text delivered over chunked transfer.
//! `consume` reads that body chunk by chunk, decodes it to text with a decoder
//! whose state survives across chunks, and reports each decoded piece as a
//! `StreamEvent`. Cancellation is a silent stop: once the token fires, no further
//! events are emitted at all.

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::StreamError;

/// Event produced while consuming a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Text decoded from one chunk, never overlapping earlier deltas.
    Delta(String),
    /// The body ended normally.
    Done,
    /// Reading the body failed.
    Error(StreamError),
}

/// How a `consume` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// `StreamEvent::Done` was emitted.
    Completed,
    /// `StreamEvent::Error` was emitted.
    Failed,
    /// The token fired; no terminal event was emitted.
    Cancelled,
}

/// UTF-8 decoder that holds back incomplete sequences until the next chunk.
///
/// Invalid bytes decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Create a decoder with no buffered bytes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a chunk, prefixed by any bytes held back from the previous one.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    if let Ok(valid) = std::str::from_utf8(valid) {
                        out.push_str(valid);
                    }
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            // Truncated sequence at the end of the chunk.
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush bytes left over at end of input.
    ///
    /// Returns a replacement character if an incomplete sequence was pending.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        self.pending.clear();
        Some(char::REPLACEMENT_CHARACTER.to_string())
    }

    /// Whether bytes are being held back.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Consume a byte stream until it ends, fails, or `cancel` fires.
///
/// `emit` receives one `Delta` per chunk read, in read order, followed by exactly
/// one `Done` or `Error`. On cancellation nothing further is emitted; the token
/// is checked before each read, while a read is pending, and again after a read
/// completes so that a chunk racing the cancellation is discarded.
pub async fn consume<S, B, F>(mut stream: S, cancel: &CancellationToken, mut emit: F) -> StreamOutcome
where
    S: Stream<Item = Result<B, StreamError>> + Unpin,
    B: AsRef<[u8]>,
    F: FnMut(StreamEvent),
{
    let mut decoder = Utf8Decoder::new();

    loop {
        if cancel.is_cancelled() {
            tracing::debug!("Stream cancelled before read");
            return StreamOutcome::Cancelled;
        }

        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!("Stream cancelled during read");
                return StreamOutcome::Cancelled;
            }
            next = stream.next() => next,
        };

        if cancel.is_cancelled() {
            tracing::debug!("Discarding chunk that raced cancellation");
            return StreamOutcome::Cancelled;
        }

        match next {
            Some(Ok(chunk)) => {
                emit(StreamEvent::Delta(decoder.decode(chunk.as_ref())));
            }
            Some(Err(err)) => {
                tracing::warn!(error = %err, "Response stream failed");
                emit(StreamEvent::Error(err));
                return StreamOutcome::Failed;
            }
            None => {
                if let Some(tail) = decoder.finish() {
                    emit(StreamEvent::Delta(tail));
                }
                emit(StreamEvent::Done);
                return StreamOutcome::Completed;
            }
        }
    }
}
