//! Voice conversation orchestrator.
//!
//! Turns a text chat backend into a spoken, hands-free conversation:
//! microphone capture, transcription, single-flight chat dispatch and spoken
//! replies with premium → local voice fallback, tied together by
//! [`conversation::ConversationLoop`].

pub mod audio;
pub mod backend;
pub mod capture;
pub mod config;
pub mod conversation;
pub mod dispatch;
pub mod registry;
pub mod session;
pub mod stt;
pub mod synthesis;
pub mod transcription;
