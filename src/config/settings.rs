//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.
//! Missing keys fall back to their defaults, so a hand-written
//! `settings.toml` only needs the values it changes.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// CaptureStrategy
// ---------------------------------------------------------------------------

/// How the microphone is turned into a transcript.
///
/// This is a configuration toggle, never auto-detected.
///
/// | Variant  | Capture                        | Network step           |
/// |----------|--------------------------------|------------------------|
/// | Inline   | streaming on-device recognizer | none                   |
/// | RawClip  | record a clip (≤ 30 s)         | upload to `/api/transcribe` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureStrategy {
    /// Streaming recognition with interim text and one final transcript per
    /// utterance.
    Inline,
    /// Record a raw audio clip and hand it to the transcription service.
    RawClip,
}

impl Default for CaptureStrategy {
    fn default() -> Self {
        Self::RawClip
    }
}

// ---------------------------------------------------------------------------
// BackendConfig
// ---------------------------------------------------------------------------

/// Connection settings for the chat / transcription / synthesis backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the backend, without a trailing slash
    /// (e.g. `http://localhost:8000`).
    pub base_url: String,
    /// Seconds to wait for a chat reply or premium synthesis before treating
    /// the request as failed.
    pub request_timeout_secs: u64,
    /// Seconds to wait for the transcription upload.
    pub transcription_timeout_secs: u64,
    /// Seconds to wait for the availability probe.
    pub probe_timeout_secs: u64,
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn transcription_timeout(&self) -> Duration {
        Duration::from_secs(self.transcription_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            request_timeout_secs: 20,
            transcription_timeout_secs: 60,
            probe_timeout_secs: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// CaptureConfig
// ---------------------------------------------------------------------------

/// Settings for microphone capture and utterance detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Inline recognition vs raw-clip recording.
    pub strategy: CaptureStrategy,
    /// Hard cap on a single capture in seconds.  RawClip captures are
    /// force-stopped and submitted when it elapses.  Inline captures only
    /// wait this long for speech to start.
    pub max_listen_secs: u64,
    /// Trailing silence (ms) that ends an utterance in Inline mode.
    pub silence_timeout_ms: u64,
    /// RMS amplitude above which a 30 ms frame counts as speech.
    pub vad_threshold: f32,
    /// Clips shorter than this are reported as "no speech" without upload.
    pub min_clip_secs: f32,
    /// How often (ms of ongoing speech) the Inline recognizer emits interim
    /// text.
    pub interim_interval_ms: u64,
}

impl CaptureConfig {
    pub fn max_listen(&self) -> Duration {
        Duration::from_secs(self.max_listen_secs)
    }

    pub fn silence_timeout(&self) -> Duration {
        Duration::from_millis(self.silence_timeout_ms)
    }

    pub fn interim_interval(&self) -> Duration {
        Duration::from_millis(self.interim_interval_ms)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            strategy: CaptureStrategy::default(),
            max_listen_secs: 30,
            silence_timeout_ms: 1_200,
            vad_threshold: 0.01,
            min_clip_secs: 0.3,
            interim_interval_ms: 1_500,
        }
    }
}

// ---------------------------------------------------------------------------
// SynthesisConfig
// ---------------------------------------------------------------------------

/// Settings for spoken replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Voice name sent to the premium provider (`rachel`, `josh`, `bella`,
    /// `adam`, `antoni`).
    pub voice: String,
    /// Longer replies are truncated (with `...`) before synthesis.
    pub max_chars: usize,
    /// Program used for local voice rendering.  `None` picks the platform
    /// default (`say`, PowerShell `System.Speech`, or `espeak-ng`).
    pub local_voice_command: Option<String>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            voice: "josh".into(),
            max_chars: 5_000,
            local_voice_command: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ConversationConfig
// ---------------------------------------------------------------------------

/// Startup defaults for the loop controller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Enter hands-free mode immediately on startup.
    pub hands_free: bool,
    /// Speak replies even when hands-free mode is off.
    pub auto_speak: bool,
}

// ---------------------------------------------------------------------------
// SttConfig
// ---------------------------------------------------------------------------

/// Settings for the on-device recognizer used by the Inline strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// GGML model name / file stem (e.g. `"base.en"`), resolved inside
    /// [`AppPaths::models_dir`] as `ggml-<model>.bin`.
    pub model: String,
    /// ISO-639-1 code, or `"auto"` for language detection.
    pub language: String,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model: "base.en".into(),
            language: "en".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use voice_conversation::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Backend connection settings.
    pub backend: BackendConfig,
    /// Microphone capture settings.
    pub capture: CaptureConfig,
    /// Speech synthesis settings.
    pub synthesis: SynthesisConfig,
    /// Loop controller defaults.
    pub conversation: ConversationConfig,
    /// On-device recognizer settings.
    pub stt: SttConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(original.backend.base_url, loaded.backend.base_url);
        assert_eq!(
            original.backend.request_timeout_secs,
            loaded.backend.request_timeout_secs
        );
        assert_eq!(original.capture.strategy, loaded.capture.strategy);
        assert_eq!(original.capture.max_listen_secs, loaded.capture.max_listen_secs);
        assert_eq!(original.capture.vad_threshold, loaded.capture.vad_threshold);
        assert_eq!(original.synthesis.voice, loaded.synthesis.voice);
        assert_eq!(original.synthesis.max_chars, loaded.synthesis.max_chars);
        assert_eq!(original.conversation.hands_free, loaded.conversation.hands_free);
        assert_eq!(original.stt.model, loaded.stt.model);
    }

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config.backend.base_url, BackendConfig::default().base_url);
        assert_eq!(config.capture.strategy, CaptureStrategy::RawClip);
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.backend.base_url, "http://localhost:8000");
        assert_eq!(cfg.backend.request_timeout(), Duration::from_secs(20));
        assert_eq!(cfg.capture.strategy, CaptureStrategy::RawClip);
        assert_eq!(cfg.capture.max_listen(), Duration::from_secs(30));
        assert_eq!(cfg.capture.silence_timeout(), Duration::from_millis(1_200));
        assert_eq!(cfg.synthesis.voice, "josh");
        assert_eq!(cfg.synthesis.max_chars, 5_000);
        assert!(cfg.synthesis.local_voice_command.is_none());
        assert!(!cfg.conversation.hands_free);
        assert!(!cfg.conversation.auto_speak);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(
            &path,
            "[capture]\nstrategy = \"Inline\"\n\n[backend]\nbase_url = \"https://chat.example\"\n",
        )
        .expect("write");

        let cfg = AppConfig::load_from(&path).expect("load");
        assert_eq!(cfg.capture.strategy, CaptureStrategy::Inline);
        assert_eq!(cfg.capture.max_listen_secs, 30);
        assert_eq!(cfg.backend.base_url, "https://chat.example");
        assert_eq!(cfg.backend.request_timeout_secs, 20);
        assert_eq!(cfg.synthesis.voice, "josh");
    }

    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modified.toml");

        let mut cfg = AppConfig::default();
        cfg.capture.strategy = CaptureStrategy::Inline;
        cfg.backend.base_url = "https://chat.example".into();
        cfg.backend.request_timeout_secs = 15;
        cfg.synthesis.voice = "rachel".into();
        cfg.synthesis.local_voice_command = Some("espeak".into());
        cfg.conversation.hands_free = true;

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded.capture.strategy, CaptureStrategy::Inline);
        assert_eq!(loaded.backend.base_url, "https://chat.example");
        assert_eq!(loaded.backend.request_timeout_secs, 15);
        assert_eq!(loaded.synthesis.voice, "rachel");
        assert_eq!(loaded.synthesis.local_voice_command.as_deref(), Some("espeak"));
        assert!(loaded.conversation.hands_free);
    }
}
