//! Local voice rendering through the platform's speech program.
//!
//! | Platform | Program |
//! |----------|---------|
//! | macOS | `say <text>` |
//! | Windows | PowerShell `System.Speech.Synthesis.SpeechSynthesizer` |
//! | other | `espeak-ng <text>` |
//!
//! `synthesis.local_voice_command` in `settings.toml` replaces the platform
//! program; the text is appended as the final argument.

use std::process::Stdio;
use std::sync::{Mutex, PoisonError};

use tokio::process::Command;
use tokio::sync::oneshot;

use super::ports::{LocalVoice, PlaybackControl, PlaybackDone, PlaybackError};

/// Spawns one speech process per utterance.
#[derive(Debug, Clone, Default)]
pub struct SystemVoice {
    command: Option<String>,
}

impl SystemVoice {
    /// `command` overrides the platform default when set.
    pub fn new(command: Option<String>) -> Self {
        Self {
            command: command.filter(|c| !c.trim().is_empty()),
        }
    }

    /// Program and arguments that will speak `text`.
    pub fn invocation(&self, text: &str) -> (String, Vec<String>) {
        if let Some(custom) = &self.command {
            let mut parts = custom.split_whitespace().map(str::to_string);
            let program = parts.next().unwrap_or_default();
            let mut args: Vec<String> = parts.collect();
            args.push(text.to_string());
            return (program, args);
        }
        platform_invocation(text)
    }
}

#[cfg(target_os = "macos")]
fn platform_invocation(text: &str) -> (String, Vec<String>) {
    ("say".into(), vec![text.to_string()])
}

#[cfg(target_os = "windows")]
fn platform_invocation(text: &str) -> (String, Vec<String>) {
    let quoted = text.replace('\'', "''");
    let script = format!(
        "Add-Type -AssemblyName System.Speech; \
         (New-Object System.Speech.Synthesis.SpeechSynthesizer).Speak('{quoted}')"
    );
    (
        "powershell".into(),
        vec!["-NoProfile".into(), "-Command".into(), script],
    )
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn platform_invocation(text: &str) -> (String, Vec<String>) {
    ("espeak-ng".into(), vec![text.to_string()])
}

impl LocalVoice for SystemVoice {
    /// Must be called from within a tokio runtime.
    fn speak(
        &self,
        text: &str,
        done: PlaybackDone,
    ) -> Result<Box<dyn PlaybackControl>, PlaybackError> {
        let (program, args) = self.invocation(text);
        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PlaybackError(format!("could not start `{program}`: {e}")))?;

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => match status {
                    Ok(status) if status.success() => done.ended(),
                    Ok(status) => done.failed(format!("`{program}` exited with {status}")),
                    Err(e) => done.failed(format!("`{program}` failed: {e}")),
                },
                _ = stop_rx => {
                    let _ = child.kill().await;
                }
            }
        });

        Ok(Box::new(ProcessControl {
            stop_tx: Mutex::new(Some(stop_tx)),
        }))
    }
}

struct ProcessControl {
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl PlaybackControl for ProcessControl {
    fn stop(&self) {
        if let Some(tx) = self
            .stop_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_command_appends_text() {
        let voice = SystemVoice::new(Some("espeak-ng -v en-us".into()));
        let (program, args) = voice.invocation("hello there");
        assert_eq!(program, "espeak-ng");
        assert_eq!(args, vec!["-v", "en-us", "hello there"]);
    }

    #[test]
    fn blank_command_uses_platform_default() {
        let voice = SystemVoice::new(Some("   ".into()));
        let (program, _) = voice.invocation("hi");
        assert!(!program.is_empty());
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    #[test]
    fn linux_uses_espeak() {
        let (program, args) = SystemVoice::default().invocation("hi");
        assert_eq!(program, "espeak-ng");
        assert_eq!(args, vec!["hi"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_exit_reports_ended() {
        use crate::synthesis::{PlaybackId, PlaybackOutcome, SynthesisEngine};
        use std::sync::atomic::AtomicBool;
        use std::sync::Arc;

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let done = PlaybackDone::new(
            PlaybackId(1),
            SynthesisEngine::Local,
            Arc::new(AtomicBool::new(false)),
            tx,
        );
        // `true` ignores its arguments and exits 0.
        let voice = SystemVoice::new(Some("true".into()));
        let _control = voice.speak("ignored", done).expect("spawn");
        let t = rx.recv().await.expect("terminal");
        assert_eq!(t.outcome, PlaybackOutcome::Ended);
    }

    #[tokio::test]
    async fn missing_program_fails_to_start() {
        use crate::synthesis::{PlaybackId, SynthesisEngine};
        use std::sync::atomic::AtomicBool;
        use std::sync::Arc;

        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let done = PlaybackDone::new(
            PlaybackId(1),
            SynthesisEngine::Local,
            Arc::new(AtomicBool::new(false)),
            tx,
        );
        let voice = SystemVoice::new(Some("definitely-not-a-speech-program-xyz".into()));
        assert!(voice.speak("hi", done).is_err());
    }
}
