//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings + persisted session):
//!   Windows: %APPDATA%\voice-conversation\
//!   macOS:   ~/Library/Application Support/voice-conversation/
//!   Linux:   ~/.config/voice-conversation/
//!
//! Data dir (on-device recognition models):
//!   Windows: %LOCALAPPDATA%\voice-conversation\
//!   macOS:   ~/Library/Application Support/voice-conversation/
//!   Linux:   ~/.local/share/voice-conversation/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml` and `session.json`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Full path to `session.json` (persisted chat session identifier).
    pub session_file: PathBuf,
    /// Directory for GGML models used by the on-device recognizer.
    pub models_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "voice-conversation";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let settings_file = config_dir.join("settings.toml");
        let session_file = config_dir.join("session.json");
        let models_dir = data_dir.join("models");

        Self {
            config_dir,
            settings_file,
            session_file,
            models_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
