//! HTTP adapter for the assistant backend.
//!
//! One [`HttpBackend`] implements every network port the orchestrator uses:
//!
//! | Port | Endpoint |
//! |------|----------|
//! | [`ChatBackend`](crate::dispatch::ChatBackend) | `POST /api/chat` |
//! | [`Transcriber`](crate::transcription::Transcriber) | `POST /api/transcribe` (multipart `audio`) |
//! | [`PremiumSynthesizer`](crate::synthesis::PremiumSynthesizer) | `POST /api/tts` |
//! | [`AvailabilityProbe`](crate::registry::AvailabilityProbe) | `GET /api/status` |
//!
//! Transport failures are collected in [`BackendError`] and then converted
//! into each port's own error type.

pub mod http;

use thiserror::Error;

use crate::dispatch::DispatchError;
use crate::registry::ProbeError;
use crate::synthesis::PremiumError;
use crate::transcription::TranscriptionError;

pub use http::HttpBackend;

// ---------------------------------------------------------------------------
// BackendError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Connection or transport failure.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The request did not complete within its timeout.
    #[error("request timed out")]
    Timeout,

    /// Non-success status; `detail` is the backend's own message if any.
    #[error("backend returned status {status}")]
    Status { status: u16, detail: Option<String> },

    /// The body was not the JSON we expected.
    #[error("failed to parse backend response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BackendError::Timeout
        } else if e.is_decode() {
            BackendError::Parse(e.to_string())
        } else {
            BackendError::Request(e.to_string())
        }
    }
}

impl From<BackendError> for DispatchError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Request(detail) => DispatchError::Connectivity(detail),
            BackendError::Timeout => DispatchError::Timeout,
            BackendError::Status { status, detail } => DispatchError::Backend { status, detail },
            BackendError::Parse(detail) => DispatchError::Malformed(detail),
        }
    }
}

impl From<BackendError> for TranscriptionError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Status {
                detail: Some(detail),
                ..
            } => TranscriptionError::Failed(detail),
            other => TranscriptionError::Failed(other.to_string()),
        }
    }
}

impl From<BackendError> for PremiumError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Status { status, .. } => PremiumError::from_status(status),
            BackendError::Parse(detail) => PremiumError::Rejected(detail),
            other => PremiumError::Transport(other.to_string()),
        }
    }
}

impl From<BackendError> for ProbeError {
    fn from(e: BackendError) -> Self {
        ProbeError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_with_detail_maps_to_dispatch_backend() {
        let e: DispatchError = BackendError::Status {
            status: 429,
            detail: Some("slow down".into()),
        }
        .into();
        assert_eq!(e.user_message(), "slow down");
    }

    #[test]
    fn premium_status_classification() {
        let auth: PremiumError = BackendError::Status {
            status: 401,
            detail: None,
        }
        .into();
        assert!(auth.is_definitive());

        let server: PremiumError = BackendError::Status {
            status: 503,
            detail: Some("Voice agent not initialized".into()),
        }
        .into();
        assert!(server.is_definitive());

        let timeout: PremiumError = BackendError::Timeout.into();
        assert!(!timeout.is_definitive());
    }

    #[test]
    fn transcription_prefers_detail() {
        let e: TranscriptionError = BackendError::Status {
            status: 500,
            detail: Some("Groq API key not configured".into()),
        }
        .into();
        assert_eq!(e, TranscriptionError::Failed("Groq API key not configured".into()));
    }
}
