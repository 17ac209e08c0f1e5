//! Dispatch Gate — single-flight chat submission.
//!
//! The gate is the only path from user text (typed or transcribed) to the
//! chat backend.  It
//!
//! * rejects a second submission immediately while one is in flight,
//! * attaches and adopts the chat session identifier, and
//! * normalizes the backend's reply into one [`ChatReply`] shape.
//!
//! It never retries; resending is a user action.

pub mod gate;
pub mod wire;

use async_trait::async_trait;
use thiserror::Error;

pub use gate::{Delivery, DispatchFuture, DispatchGate};
pub use wire::{ChatRequest, ChatResponseBody};

/// Shown when the backend gave no detail of its own.
pub const GENERIC_FAILURE_MESSAGE: &str =
    "Could not reach the assistant. Check your connection and try again.";

// ---------------------------------------------------------------------------
// Reply types
// ---------------------------------------------------------------------------

/// Image attached to a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyImage {
    /// Base64 image data.
    Inline {
        mime_type: String,
        data_base64: String,
    },
    /// Link to a hosted image.
    Url(String),
}

/// A reply in canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub text: String,
    /// Session identifier issued or confirmed by the backend.
    pub session_id: Option<String>,
    pub image: Option<ReplyImage>,
}

// ---------------------------------------------------------------------------
// DispatchError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Another submission is still in flight.  Nothing was sent.
    #[error("a message is already being sent")]
    AlreadySending,

    /// Blank text is never submitted.
    #[error("message is empty")]
    EmptyMessage,

    /// Non-success status, with the backend's `detail` when it sent one.
    #[error("backend returned status {status}")]
    Backend { status: u16, detail: Option<String> },

    /// The request never completed.
    #[error("could not reach the backend: {0}")]
    Connectivity(String),

    /// The request exceeded the configured timeout.
    #[error("the backend did not answer in time")]
    Timeout,

    /// A success status with a body that has no reply in it.
    #[error("backend reply was malformed: {0}")]
    Malformed(String),
}

impl DispatchError {
    /// Backend detail verbatim when present, else a generic message.
    pub fn user_message(&self) -> String {
        match self {
            Self::AlreadySending => "Still waiting for the previous reply.".into(),
            Self::EmptyMessage => "Type or say something first.".into(),
            Self::Backend {
                detail: Some(detail),
                ..
            } if !detail.trim().is_empty() => detail.clone(),
            _ => GENERIC_FAILURE_MESSAGE.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// ChatBackend
// ---------------------------------------------------------------------------

/// Transport to the chat service.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatReply, DispatchError>;
}
