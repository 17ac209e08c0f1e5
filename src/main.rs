//! Application entry point — terminal voice conversation.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create the [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Seed the [`Session`] with the persisted chat session identifier.
//! 5. Build the HTTP backend, microphone, recognizer and voice adapters.
//! 6. Spawn the [`ConversationLoop`] and an event printer.
//! 7. Read commands from stdin until `/quit` or end of input.

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use voice_conversation::{
    audio::{MicrophoneRecorder, RodioPlayer},
    backend::HttpBackend,
    capture::{CaptureController, SpeechRecognizer},
    config::{AppConfig, AppPaths},
    conversation::{ConversationLoop, LoopCommand, LoopEvent, LoopState},
    dispatch::{DispatchGate, ReplyImage},
    registry::ProviderRegistry,
    session::{new_shared_session, Session, SessionStore},
    stt::UnsupportedRecognizer,
    synthesis::{SynthesisOrchestrator, SystemVoice},
    transcription::TranscriptionPipeline,
};

const HELP: &str = "\
commands:
  <text>          send a message
  /voice on|off   hands-free mode
  /mic            start listening (interrupts speech)
  /stop           finish listening
  /speak <text>   speak text aloud
  /help           show this help
  /quit           exit";

// ---------------------------------------------------------------------------
// Input parsing
// ---------------------------------------------------------------------------

/// One line of terminal input.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Command(LoopCommand),
    Help,
    Unknown(String),
    Empty,
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    if !line.starts_with('/') {
        return Input::Command(LoopCommand::SendText(line.to_string()));
    }

    let (name, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    match (name, rest) {
        ("/voice", "on") => Input::Command(LoopCommand::EnableHandsFree),
        ("/voice", "off") => Input::Command(LoopCommand::DisableHandsFree),
        ("/mic", "") => Input::Command(LoopCommand::StartCapture),
        ("/stop", "") => Input::Command(LoopCommand::StopCapture),
        ("/speak", text) if !text.is_empty() => Input::Command(LoopCommand::Speak(text.into())),
        ("/quit" | "/exit", "") => Input::Command(LoopCommand::Shutdown),
        ("/help", _) => Input::Help,
        _ => Input::Unknown(line.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Event printer
// ---------------------------------------------------------------------------

async fn print_events(mut events: mpsc::UnboundedReceiver<LoopEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            LoopEvent::StateChanged(LoopState::Idle) => {}
            LoopEvent::StateChanged(state) => println!("[{state}]"),
            LoopEvent::Interim(text) => println!("  ... {text}"),
            LoopEvent::Transcript(text) => println!("you: {text}"),
            LoopEvent::Reply(reply) => {
                println!("assistant: {}", reply.text);
                match reply.image {
                    Some(ReplyImage::Url(url)) => println!("  [image] {url}"),
                    Some(ReplyImage::Inline { mime_type, data_base64 }) => {
                        println!("  [image] {mime_type}, {} base64 chars", data_base64.len())
                    }
                    None => {}
                }
            }
            LoopEvent::SessionStarted(id) => log::info!("chat session {id}"),
            LoopEvent::SpeakingStarted { engine, .. } => println!("  (speaking, {engine} voice)"),
            LoopEvent::PlaybackFinished(_) | LoopEvent::TurnComplete(_) => {}
            LoopEvent::Error { message, .. } => eprintln!("! {message}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Recognizer
// ---------------------------------------------------------------------------

#[cfg(feature = "whisper")]
fn build_recognizer(config: &AppConfig, paths: &AppPaths) -> Arc<dyn SpeechRecognizer> {
    use voice_conversation::stt::{model_path, LocalRecognizer, WhisperEngine};

    let path = model_path(&paths.models_dir, &config.stt.model);
    match WhisperEngine::load(&path, &config.stt.language) {
        Ok(engine) => {
            log::info!("Whisper model loaded: {}", path.display());
            Arc::new(LocalRecognizer::new(Arc::new(engine), &config.capture))
        }
        Err(e) => {
            log::warn!("Could not load Whisper model ({e}); inline recognition disabled");
            Arc::new(UnsupportedRecognizer)
        }
    }
}

#[cfg(not(feature = "whisper"))]
fn build_recognizer(_config: &AppConfig, _paths: &AppPaths) -> Arc<dyn SpeechRecognizer> {
    Arc::new(UnsupportedRecognizer)
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("voice conversation starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    let new_session = std::env::args().any(|arg| arg == "--new-session");
    rt.block_on(run(config, AppPaths::new(), new_session))
}

async fn run(config: AppConfig, paths: AppPaths, new_session: bool) -> anyhow::Result<()> {
    // 4. Session
    let store = SessionStore::at(&paths.session_file);
    if new_session {
        store.forget().context("failed to clear the saved session")?;
    }
    let saved_id = store.load().unwrap_or_else(|e| {
        log::warn!("Ignoring saved session ({e})");
        None
    });
    let mut session = Session::new(config.capture.strategy, config.conversation.auto_speak)
        .with_session_id(saved_id);
    session.hands_free = config.conversation.hands_free;
    let session = new_shared_session(session);

    // 5. Adapters
    let backend = Arc::new(HttpBackend::from_config(
        &config.backend,
        &config.synthesis.voice,
    ));
    log::info!(
        "backend {} ({:?} capture, {} voice)",
        config.backend.base_url,
        config.capture.strategy,
        config.synthesis.voice
    );

    let registry = Arc::new(ProviderRegistry::new(Arc::clone(&session), backend.clone()));
    let capture = CaptureController::new(
        Arc::clone(&session),
        build_recognizer(&config, &paths),
        Arc::new(MicrophoneRecorder),
        &config.capture,
    );
    let transcription = TranscriptionPipeline::new(backend.clone());
    let gate = DispatchGate::new(backend.clone(), Arc::clone(&session), Some(store));
    let synth = SynthesisOrchestrator::new(
        Arc::clone(&registry),
        backend,
        Arc::new(RodioPlayer),
        Arc::new(SystemVoice::new(config.synthesis.local_voice_command.clone())),
        config.synthesis.max_chars,
    );

    // 6. Loop + printer
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (commands_tx, commands_rx) = mpsc::channel::<LoopCommand>(16);
    let conversation = ConversationLoop::new(
        session,
        registry,
        capture,
        transcription,
        gate,
        synth,
        events_tx,
    );
    let loop_task = tokio::spawn(conversation.run(commands_rx));
    let printer = tokio::spawn(print_events(events_rx));

    // 7. Stdin
    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match parse_input(&line) {
            Input::Command(command) => command,
            Input::Help => {
                println!("{HELP}");
                continue;
            }
            Input::Unknown(text) => {
                eprintln!("unknown command: {text} (try /help)");
                continue;
            }
            Input::Empty => continue,
        };
        let quit = command == LoopCommand::Shutdown;
        if commands_tx.send(command).await.is_err() || quit {
            break;
        }
    }

    drop(commands_tx);
    loop_task.await.context("conversation loop panicked")?;
    printer.await.context("event printer panicked")?;
    log::info!("bye");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_sent() {
        assert_eq!(
            parse_input("  hello there "),
            Input::Command(LoopCommand::SendText("hello there".into()))
        );
    }

    #[test]
    fn slash_commands() {
        assert_eq!(
            parse_input("/voice on"),
            Input::Command(LoopCommand::EnableHandsFree)
        );
        assert_eq!(
            parse_input("/voice off"),
            Input::Command(LoopCommand::DisableHandsFree)
        );
        assert_eq!(parse_input("/mic"), Input::Command(LoopCommand::StartCapture));
        assert_eq!(parse_input("/stop"), Input::Command(LoopCommand::StopCapture));
        assert_eq!(
            parse_input("/speak read this"),
            Input::Command(LoopCommand::Speak("read this".into()))
        );
        assert_eq!(parse_input("/quit"), Input::Command(LoopCommand::Shutdown));
        assert_eq!(parse_input("/help"), Input::Help);
    }

    #[test]
    fn malformed_commands_are_unknown() {
        assert!(matches!(parse_input("/voice maybe"), Input::Unknown(_)));
        assert!(matches!(parse_input("/speak"), Input::Unknown(_)));
        assert!(matches!(parse_input("/dance"), Input::Unknown(_)));
        assert_eq!(parse_input("   "), Input::Empty);
    }
}
