//! Configuration module for the voice conversation orchestrator.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for each component,
//! `AppPaths` for cross-platform data directories, and TOML persistence via
//! `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, BackendConfig, CaptureConfig, CaptureStrategy, ConversationConfig, SttConfig,
    SynthesisConfig,
};
