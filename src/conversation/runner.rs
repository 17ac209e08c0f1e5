//! Hands-free loop controller: drives capture → transcription → dispatch →
//! synthesis → capture.
//!
//! [`ConversationLoop`] owns every stage component and reacts to two kinds of
//! input inside one `tokio::select!`:
//!
//! * [`LoopCommand`]s from the front-end, and
//! * completions of whichever stage is active (capture events, the
//!   transcription upload, the chat request, speech preparation, playback
//!   terminals).
//!
//! Stage work is held as boxed futures in `Option` slots so it can be
//! abandoned by simply dropping the slot.  Every completion is checked
//! against the slot or handle identity it belongs to before it is acted on,
//! so a late event from a cancelled stage is dropped.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::capture::{CaptureController, CaptureError, CaptureEvent, Transcript};
use crate::dispatch::{ChatReply, Delivery, DispatchError, DispatchFuture, DispatchGate};
use crate::registry::ProviderRegistry;
use crate::session::{lock_session, SharedSession};
use crate::synthesis::{
    PlaybackId, PlaybackOutcome, PlaybackTerminal, PrepareFuture, PreparedSpeech,
    SynthesisEngine, SynthesisOrchestrator,
};
use crate::transcription::{TranscribeFuture, TranscriptionError, TranscriptionPipeline};

use super::state::{ErrorKind, LoopCommand, LoopEvent, LoopState, Turn};

// ---------------------------------------------------------------------------
// Stage slots
// ---------------------------------------------------------------------------

/// A turn waiting for its reply to be spoken.
#[derive(Debug, Clone)]
struct PendingTurn {
    input: String,
    reply: ChatReply,
}

impl PendingTurn {
    fn complete(self, spoken_with: Option<SynthesisEngine>) -> Turn {
        Turn {
            input: self.input,
            reply: self.reply,
            spoken_with,
        }
    }
}

struct InFlightDispatch {
    input: String,
    future: DispatchFuture,
    /// Hands-free was turned off while the request was in flight; the
    /// reply is shown but not spoken.
    detached: bool,
}

struct Preparing {
    id: PlaybackId,
    /// Engine the preparation started with, reported if it is cancelled.
    engine: SynthesisEngine,
    future: PrepareFuture,
    turn: Option<PendingTurn>,
}

struct Speaking {
    id: PlaybackId,
    engine: SynthesisEngine,
    turn: Option<PendingTurn>,
}

/// Await the future in `slot`, or pend forever when the slot is empty.
///
/// Cancel-safe: dropping the returned future leaves the slot untouched.
async fn next_output<F>(slot: &mut Option<F>) -> F::Output
where
    F: Future + Unpin,
{
    match slot.as_mut() {
        Some(future) => future.await,
        None => std::future::pending().await,
    }
}

async fn next_dispatch(slot: &mut Option<InFlightDispatch>) -> Result<Delivery, DispatchError> {
    match slot.as_mut() {
        Some(in_flight) => (&mut in_flight.future).await,
        None => std::future::pending().await,
    }
}

async fn next_prepared(slot: &mut Option<Preparing>) -> PreparedSpeech {
    match slot.as_mut() {
        Some(preparing) => (&mut preparing.future).await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// ConversationLoop
// ---------------------------------------------------------------------------

/// The hands-free loop controller.
///
/// Create with [`ConversationLoop::new`], then spawn [`run`](Self::run) as a
/// tokio task.
///
/// ```rust,no_run
/// # use voice_conversation::conversation::{ConversationLoop, LoopCommand};
/// # async fn example(conversation: ConversationLoop) {
/// let (commands, rx) = tokio::sync::mpsc::channel(16);
/// let task = tokio::spawn(conversation.run(rx));
///
/// commands.send(LoopCommand::EnableHandsFree).await.unwrap();
/// // ... later
/// commands.send(LoopCommand::Shutdown).await.unwrap();
/// task.await.unwrap();
/// # }
/// ```
pub struct ConversationLoop {
    session: SharedSession,
    registry: Arc<ProviderRegistry>,
    capture: CaptureController,
    transcription: TranscriptionPipeline,
    gate: DispatchGate,
    synth: SynthesisOrchestrator,
    events: mpsc::UnboundedSender<LoopEvent>,
    state: LoopState,

    transcribing: Option<TranscribeFuture>,
    dispatching: Option<InFlightDispatch>,
    preparing: Option<Preparing>,
    speaking: Option<Speaking>,
}

impl ConversationLoop {
    pub fn new(
        session: SharedSession,
        registry: Arc<ProviderRegistry>,
        capture: CaptureController,
        transcription: TranscriptionPipeline,
        gate: DispatchGate,
        synth: SynthesisOrchestrator,
        events: mpsc::UnboundedSender<LoopEvent>,
    ) -> Self {
        Self {
            session,
            registry,
            capture,
            transcription,
            gate,
            synth,
            events,
            state: LoopState::Idle,
            transcribing: None,
            dispatching: None,
            preparing: None,
            speaking: None,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Run until `commands` is closed or [`LoopCommand::Shutdown`] arrives.
    ///
    /// Everything still active is cancelled on the way out.
    pub async fn run(mut self, mut commands: mpsc::Receiver<LoopCommand>) {
        let hands_free = lock_session(&self.session).hands_free;
        if hands_free {
            self.enable_hands_free().await;
        }

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(LoopCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                event = self.capture.next_event() => self.on_capture_event(event),
                result = next_output(&mut self.transcribing) => {
                    self.transcribing = None;
                    self.on_transcribed(result);
                }
                result = next_dispatch(&mut self.dispatching) => {
                    if let Some(in_flight) = self.dispatching.take() {
                        self.on_dispatched(in_flight, result);
                    }
                }
                prepared = next_prepared(&mut self.preparing) => {
                    if let Some(preparing) = self.preparing.take() {
                        self.on_prepared(prepared, preparing.turn);
                    }
                }
                terminal = self.synth.next_terminal() => self.on_terminal(terminal),
            }
        }

        self.capture.cancel();
        self.transcribing = None;
        self.stop_speaking();
        log::info!("conversation: loop stopped");
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    async fn handle_command(&mut self, command: LoopCommand) {
        log::debug!("conversation: {command:?} in {}", self.state);
        match command {
            LoopCommand::EnableHandsFree => self.enable_hands_free().await,
            LoopCommand::DisableHandsFree => self.disable_hands_free(),
            LoopCommand::StartCapture => self.start_capture(),
            LoopCommand::StopCapture => self.stop_capture(),
            LoopCommand::SendText(text) => self.begin_dispatch(text),
            LoopCommand::Speak(text) => self.speak(&text),
            LoopCommand::Shutdown => {}
        }
    }

    async fn enable_hands_free(&mut self) {
        lock_session(&self.session).hands_free = true;
        let premium = self.registry.check_availability().await;
        log::info!(
            "conversation: hands-free on ({} voice first)",
            if premium { "premium" } else { "local" }
        );

        // A turn still in flight finishes first; its end re-arms capture.
        if let Some(in_flight) = self.dispatching.as_mut() {
            in_flight.detached = false;
            self.set_state(LoopState::Dispatching);
        } else if self.state == LoopState::Idle {
            self.arm_capture();
        }
    }

    /// Leaves an in-flight chat request alone; its reply is still shown.
    fn disable_hands_free(&mut self) {
        lock_session(&self.session).hands_free = false;
        if let Some(in_flight) = self.dispatching.as_mut() {
            in_flight.detached = true;
        }
        self.supersede_capture();
        self.stop_speaking();
        log::info!("conversation: hands-free off");
        self.set_state(LoopState::Idle);
    }

    fn start_capture(&mut self) {
        if self.capture.is_active() {
            self.report(ErrorKind::Capture, CaptureError::CaptureInProgress.user_message());
            return;
        }
        if self.dispatching.is_some() {
            self.report(ErrorKind::Dispatch, DispatchError::AlreadySending.user_message());
            return;
        }

        // Barge-in: playback is cancelled before the microphone is acquired.
        self.stop_speaking();
        self.transcribing = None;
        self.arm_capture();
    }

    fn stop_capture(&mut self) {
        match self.capture.stop_capture() {
            Some(event) => self.on_capture_event(event),
            None => {
                if self.state == LoopState::Listening {
                    self.set_state(LoopState::Idle);
                }
            }
        }
    }

    fn speak(&mut self, text: &str) {
        if self.dispatching.is_some() {
            self.report(ErrorKind::Dispatch, DispatchError::AlreadySending.user_message());
            return;
        }
        self.supersede_capture();
        self.stop_speaking();
        self.begin_speech(text, None);
        self.set_state(LoopState::Speaking);
    }

    // -----------------------------------------------------------------------
    // Stage completions
    // -----------------------------------------------------------------------

    fn on_capture_event(&mut self, event: CaptureEvent) {
        match event {
            CaptureEvent::Interim(text) => self.emit(LoopEvent::Interim(text)),
            CaptureEvent::Final(transcript) => self.accept_transcript(transcript),
            CaptureEvent::Clip(clip) => {
                if clip.timed_out {
                    log::info!("conversation: listen limit reached, submitting partial clip");
                }
                self.transcribing = Some(self.transcription.transcribe(clip));
                self.set_state(LoopState::Transcribing);
            }
            CaptureEvent::NoSpeech => self.on_no_speech(),
            CaptureEvent::Failed(e) => self.on_capture_failed(e),
        }
    }

    fn on_transcribed(&mut self, result: Result<Transcript, TranscriptionError>) {
        match result {
            Ok(transcript) => self.accept_transcript(transcript),
            Err(TranscriptionError::NoSpeech) => self.on_no_speech(),
            Err(e) => {
                log::error!("conversation: {e}");
                self.report(ErrorKind::Transcription, e.user_message());
                self.set_state(LoopState::Idle);
            }
        }
    }

    fn accept_transcript(&mut self, transcript: Transcript) {
        if !self.capture.is_authoritative(&transcript) {
            log::warn!(
                "conversation: dropping superseded transcript #{}",
                transcript.seq()
            );
            return;
        }
        let text = transcript.into_text();
        self.emit(LoopEvent::Transcript(text.clone()));
        self.begin_dispatch(text);
    }

    /// Claim the dispatch gate for `text`.  Once claimed, the turn
    /// supersedes any armed capture and interrupts speech.
    fn begin_dispatch(&mut self, text: String) {
        let future = match self.gate.begin(&text) {
            Ok(future) => future,
            Err(e) => {
                self.report(ErrorKind::Dispatch, e.user_message());
                let stranded = matches!(self.state, LoopState::Listening | LoopState::Transcribing)
                    && !self.capture.is_active()
                    && self.transcribing.is_none();
                if stranded {
                    self.set_state(LoopState::Idle);
                }
                return;
            }
        };

        self.supersede_capture();
        self.stop_speaking();
        self.dispatching = Some(InFlightDispatch {
            input: text.trim().to_string(),
            future,
            detached: false,
        });
        self.set_state(LoopState::Dispatching);
    }

    fn on_dispatched(
        &mut self,
        in_flight: InFlightDispatch,
        result: Result<Delivery, DispatchError>,
    ) {
        let delivery = match result {
            Ok(delivery) => delivery,
            Err(e) => {
                self.report(ErrorKind::Dispatch, e.user_message());
                if self.state == LoopState::Dispatching {
                    self.set_state(LoopState::Idle);
                }
                return;
            }
        };

        if delivery.session_started {
            if let Some(id) = &delivery.reply.session_id {
                self.emit(LoopEvent::SessionStarted(id.clone()));
            }
        }
        self.emit(LoopEvent::Reply(delivery.reply.clone()));

        let turn = PendingTurn {
            input: in_flight.input,
            reply: delivery.reply,
        };

        let speak = !in_flight.detached && lock_session(&self.session).auto_speak();
        if speak {
            let text = turn.reply.text.clone();
            self.begin_speech(&text, Some(turn));
            self.set_state(LoopState::Speaking);
        } else {
            self.emit(LoopEvent::TurnComplete(turn.complete(None)));
            if self.state == LoopState::Dispatching {
                self.set_state(LoopState::Idle);
            }
        }
    }

    fn on_prepared(&mut self, prepared: PreparedSpeech, turn: Option<PendingTurn>) {
        let id = self.synth.start(prepared);
        match self.synth.active_engine() {
            Some(engine) => {
                self.emit(LoopEvent::SpeakingStarted { id, engine });
                self.speaking = Some(Speaking { id, engine, turn });
            }
            // Nothing could start; the terminal is already queued.
            None => {
                self.speaking = Some(Speaking {
                    id,
                    engine: SynthesisEngine::Local,
                    turn,
                });
            }
        }
    }

    fn on_terminal(&mut self, terminal: PlaybackTerminal) {
        if self.speaking.as_ref().map(|s| s.id) != Some(terminal.id) {
            log::debug!(
                "conversation: ignoring stale terminal for playback {}",
                terminal.id
            );
            return;
        }
        let Some(speaking) = self.speaking.take() else {
            return;
        };

        let spoken_with = match &terminal.outcome {
            PlaybackOutcome::Ended => Some(terminal.engine),
            PlaybackOutcome::Errored(reason) => {
                log::warn!("conversation: playback {} failed: {reason}", terminal.id);
                self.report(
                    ErrorKind::Synthesis,
                    "The reply couldn't be spoken. It is shown as text.".into(),
                );
                None
            }
            PlaybackOutcome::Cancelled => None,
        };
        let cancelled = terminal.is_cancelled();

        self.emit(LoopEvent::PlaybackFinished(terminal));
        if let Some(turn) = speaking.turn {
            self.emit(LoopEvent::TurnComplete(turn.complete(spoken_with)));
        }

        if !cancelled && self.state == LoopState::Speaking {
            self.after_turn();
        }
    }

    fn on_no_speech(&mut self) {
        if lock_session(&self.session).hands_free {
            log::debug!("conversation: no speech, listening again");
            self.arm_capture();
        } else {
            self.report(
                ErrorKind::Capture,
                CaptureError::NoSpeechDetected.user_message(),
            );
            self.set_state(LoopState::Idle);
        }
    }

    fn on_capture_failed(&mut self, e: CaptureError) {
        log::error!("conversation: capture failed: {e}");
        if e.is_terminal() {
            lock_session(&self.session).hands_free = false;
            log::warn!("conversation: hands-free off until the user acts");
        }
        self.report(ErrorKind::Capture, e.user_message());
        self.set_state(LoopState::Idle);
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Re-arm after a turn finished speaking, or go idle.
    fn after_turn(&mut self) {
        if lock_session(&self.session).hands_free {
            self.arm_capture();
        } else {
            self.set_state(LoopState::Idle);
        }
    }

    fn arm_capture(&mut self) {
        match self.capture.start_capture() {
            Ok(_) => self.set_state(LoopState::Listening),
            Err(CaptureError::CaptureInProgress) => self.set_state(LoopState::Listening),
            Err(e) => self.on_capture_failed(e),
        }
    }

    /// Cancel the armed capture and any upload so no transcript issued so
    /// far can reach dispatch.
    fn supersede_capture(&mut self) {
        self.capture.cancel();
        self.transcribing = None;
    }

    /// Start preparing `text` for speech.  The playback id is fixed now.
    fn begin_speech(&mut self, text: &str, turn: Option<PendingTurn>) {
        let engine = self.synth.preferred_engine();
        let (id, future) = self.synth.prepare(text);
        self.preparing = Some(Preparing {
            id,
            engine,
            future,
            turn,
        });
    }

    /// Cancel preparation and playback.  Either way the request gets its one
    /// `Cancelled` terminal and the turn completes unspoken right away; a
    /// late terminal from the renderer is dropped as stale.
    fn stop_speaking(&mut self) {
        if let Some(preparing) = self.preparing.take() {
            log::debug!("conversation: playback {} cancelled before it started", preparing.id);
            self.emit(LoopEvent::PlaybackFinished(PlaybackTerminal {
                id: preparing.id,
                engine: preparing.engine,
                outcome: PlaybackOutcome::Cancelled,
            }));
            if let Some(turn) = preparing.turn {
                self.emit(LoopEvent::TurnComplete(turn.complete(None)));
            }
        }

        let Some(speaking) = self.speaking.take() else {
            return;
        };
        if self.synth.cancel().is_none() {
            log::debug!(
                "conversation: playback {} had already finished",
                speaking.id
            );
        }
        self.emit(LoopEvent::PlaybackFinished(PlaybackTerminal {
            id: speaking.id,
            engine: speaking.engine,
            outcome: PlaybackOutcome::Cancelled,
        }));
        if let Some(turn) = speaking.turn {
            self.emit(LoopEvent::TurnComplete(turn.complete(None)));
        }
    }

    fn set_state(&mut self, state: LoopState) {
        if self.state != state {
            log::debug!("conversation: {} → {}", self.state, state);
            self.state = state;
            self.emit(LoopEvent::StateChanged(state));
        }
    }

    fn report(&self, kind: ErrorKind, message: String) {
        self.emit(LoopEvent::Error { kind, message });
    }

    fn emit(&self, event: LoopEvent) {
        // A front-end that stopped listening is not our failure.
        let _ = self.events.send(event);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
