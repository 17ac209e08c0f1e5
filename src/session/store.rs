//! Persisted chat session identifier.
//!
//! The session identifier is the only orchestrator state that survives a
//! restart.  It lives under a single well-known key in `session.json` inside
//! the platform config directory (see [`AppPaths`](crate::config::AppPaths)):
//!
//! ```json
//! { "chat_session_id": "7f1c…" }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AppPaths;

/// The single key the identifier is stored under.
pub const SESSION_KEY: &str = "chat_session_id";

// ---------------------------------------------------------------------------
// SessionStoreError
// ---------------------------------------------------------------------------

/// Errors raised while reading or writing `session.json`.
#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("session store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("session store is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredSession {
    #[serde(rename = "chat_session_id", default, skip_serializing_if = "Option::is_none")]
    chat_session_id: Option<String>,
}

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

/// Reads and writes the persisted chat session identifier.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Store located in the platform config directory.
    pub fn new() -> Self {
        Self::at(AppPaths::new().session_file)
    }

    /// Store backed by an explicit file (useful for tests).
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored identifier.
    ///
    /// A missing file is not an error; it simply means no session has been
    /// created yet.
    pub fn load(&self) -> Result<Option<String>, SessionStoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&self.path)?;
        let stored: StoredSession = serde_json::from_str(&data)?;
        Ok(stored.chat_session_id.filter(|id| !id.is_empty()))
    }

    /// Persist `session_id`, creating parent directories as needed.
    pub fn save(&self, session_id: &str) -> Result<(), SessionStoreError> {
        self.write(&StoredSession {
            chat_session_id: Some(session_id.to_string()),
        })
    }

    /// Drop the stored identifier so the next start begins a new session.
    pub fn forget(&self) -> Result<(), SessionStoreError> {
        if self.path.exists() {
            self.write(&StoredSession::default())?;
        }
        Ok(())
    }

    fn write(&self, stored: &StoredSession) -> Result<(), SessionStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(stored)?)?;
        Ok(())
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
