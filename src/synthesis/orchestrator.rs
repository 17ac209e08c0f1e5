use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use super::ports::{AudioPlayer, LocalVoice, PlaybackControl, PlaybackDone, PremiumSynthesizer};
use super::text::clean_for_speech;
use super::{PlaybackId, PlaybackOutcome, PlaybackTerminal, SynthesisEngine};
use crate::registry::ProviderRegistry;

/// Boxed, `'static` preparation future so the loop can hold it across
/// iterations of its select loop.
pub type PrepareFuture = Pin<Box<dyn Future<Output = PreparedSpeech> + Send + 'static>>;

// ---------------------------------------------------------------------------
// PreparedSpeech
// ---------------------------------------------------------------------------

/// Text cleaned for speech plus premium audio, if the premium engine
/// produced any.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSpeech {
    id: PlaybackId,
    text: String,
    premium_audio: Option<Vec<u8>>,
}

impl PreparedSpeech {
    /// Playback identity assigned when preparation began.
    pub fn id(&self) -> PlaybackId {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn has_premium_audio(&self) -> bool {
        self.premium_audio.is_some()
    }
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

struct ActivePlayback {
    id: PlaybackId,
    engine: SynthesisEngine,
    settled: Arc<AtomicBool>,
    control: Box<dyn PlaybackControl>,
}

enum Attempt {
    Premium(Vec<u8>),
    Local,
}

impl Attempt {
    fn engine(&self) -> SynthesisEngine {
        match self {
            Self::Premium(_) => SynthesisEngine::Premium,
            Self::Local => SynthesisEngine::Local,
        }
    }
}

// ---------------------------------------------------------------------------
// SynthesisOrchestrator
// ---------------------------------------------------------------------------

/// Owns the single playback handle and the premium → local fallback chain.
pub struct SynthesisOrchestrator {
    registry: Arc<ProviderRegistry>,
    premium: Arc<dyn PremiumSynthesizer>,
    player: Arc<dyn AudioPlayer>,
    local: Arc<dyn LocalVoice>,
    max_chars: usize,
    last_id: u64,
    active: Option<ActivePlayback>,
    terminals_tx: mpsc::UnboundedSender<PlaybackTerminal>,
    terminals_rx: mpsc::UnboundedReceiver<PlaybackTerminal>,
}

impl SynthesisOrchestrator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        premium: Arc<dyn PremiumSynthesizer>,
        player: Arc<dyn AudioPlayer>,
        local: Arc<dyn LocalVoice>,
        max_chars: usize,
    ) -> Self {
        let (terminals_tx, terminals_rx) = mpsc::unbounded_channel();
        Self {
            registry,
            premium,
            player,
            local,
            max_chars,
            last_id: 0,
            active: None,
            terminals_tx,
            terminals_rx,
        }
    }

    /// Engines to try, in order, given the current circuit-breaker state.
    pub fn engine_order(&self) -> Vec<SynthesisEngine> {
        match self.preferred_engine() {
            SynthesisEngine::Premium => vec![SynthesisEngine::Premium, SynthesisEngine::Local],
            SynthesisEngine::Local => vec![SynthesisEngine::Local],
        }
    }

    /// First engine that would be tried right now.
    pub fn preferred_engine(&self) -> SynthesisEngine {
        if self.registry.is_available() {
            SynthesisEngine::Premium
        } else {
            SynthesisEngine::Local
        }
    }

    /// Cancel any active playback, then speak `text`.
    ///
    /// Exactly one [`PlaybackTerminal`] for the returned id will be yielded
    /// by [`next_terminal`](Self::next_terminal).
    pub async fn speak(&mut self, text: &str) -> PlaybackId {
        self.cancel();
        let (_, preparing) = self.prepare(text);
        let prepared = preparing.await;
        self.start(prepared)
    }

    /// Assign the next playback id, then clean `text` and fetch premium audio
    /// for it when the provider is still enabled.
    ///
    /// The id is fixed now so a caller that drops the future before it
    /// resolves can still report a terminal for it.  Premium failures are
    /// absorbed here: the result simply carries no premium audio and playback
    /// falls through to the local voice.  Authorization or server-class
    /// failures trip the circuit breaker.
    pub fn prepare(&mut self, text: &str) -> (PlaybackId, PrepareFuture) {
        self.last_id += 1;
        let id = PlaybackId(self.last_id);
        let text = clean_for_speech(text, self.max_chars);
        let registry = Arc::clone(&self.registry);
        let premium = Arc::clone(&self.premium);

        let future = Box::pin(async move {
            if text.is_empty() || !registry.is_available() {
                return PreparedSpeech {
                    id,
                    text,
                    premium_audio: None,
                };
            }

            let premium_audio = match premium.synthesize(&text).await {
                Ok(audio) => Some(audio),
                Err(e) => {
                    log::warn!("synthesis: {e}; falling back to local voice");
                    if e.is_definitive() {
                        registry.mark_unavailable();
                    }
                    None
                }
            };
            PreparedSpeech {
                id,
                text,
                premium_audio,
            }
        });
        (id, future)
    }

    /// Start rendering `prepared` under the id it was prepared with,
    /// cancelling any active playback first.
    pub fn start(&mut self, prepared: PreparedSpeech) -> PlaybackId {
        self.cancel();
        let id = prepared.id;

        if prepared.text.is_empty() {
            log::debug!("synthesis: {id} nothing speakable");
            self.emit(id, SynthesisEngine::Local, PlaybackOutcome::Ended);
            return id;
        }

        let mut attempts = Vec::with_capacity(2);
        if let Some(audio) = prepared.premium_audio {
            attempts.push(Attempt::Premium(audio));
        }
        attempts.push(Attempt::Local);

        let mut last_error = String::new();
        for attempt in attempts {
            let engine = attempt.engine();
            let settled = Arc::new(AtomicBool::new(false));
            let done = PlaybackDone::new(id, engine, Arc::clone(&settled), self.terminals_tx.clone());

            let started = match attempt {
                Attempt::Premium(audio) => self.player.play(audio, done),
                Attempt::Local => self.local.speak(&prepared.text, done),
            };

            match started {
                Ok(control) => {
                    log::info!("synthesis: {id} speaking with {engine} voice");
                    self.active = Some(ActivePlayback {
                        id,
                        engine,
                        settled,
                        control,
                    });
                    return id;
                }
                Err(e) => {
                    log::warn!("synthesis: {engine} playback could not start: {e}");
                    last_error = e.to_string();
                }
            }
        }

        self.emit(id, SynthesisEngine::Local, PlaybackOutcome::Errored(last_error));
        id
    }

    /// Stop the active playback.  Returns its id when a `Cancelled` terminal
    /// was emitted; `None` when nothing was playing or it had already
    /// finished on its own.
    pub fn cancel(&mut self) -> Option<PlaybackId> {
        let active = self.active.take()?;
        if active.settled.swap(true, Ordering::SeqCst) {
            return None;
        }
        active.control.stop();
        log::debug!("synthesis: {} cancelled", active.id);
        self.emit(active.id, active.engine, PlaybackOutcome::Cancelled);
        Some(active.id)
    }

    /// Next terminal event, in emission order.  Cancel-safe.
    pub async fn next_terminal(&mut self) -> PlaybackTerminal {
        let Some(terminal) = self.terminals_rx.recv().await else {
            // The orchestrator holds a sender, so the channel never closes.
            return std::future::pending().await;
        };
        if self.active.as_ref().map(|a| a.id) == Some(terminal.id) {
            self.active = None;
        }
        terminal
    }

    pub fn is_speaking(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_id(&self) -> Option<PlaybackId> {
        self.active.as_ref().map(|a| a.id)
    }

    /// Engine rendering the active playback.
    pub fn active_engine(&self) -> Option<SynthesisEngine> {
        self.active.as_ref().map(|a| a.engine)
    }

    fn emit(&self, id: PlaybackId, engine: SynthesisEngine, outcome: PlaybackOutcome) {
        let _ = self.terminals_tx.send(PlaybackTerminal {
            id,
            engine,
            outcome,
        });
    }
}

impl Drop for SynthesisOrchestrator {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
