//! Premium audio playback via `rodio`.
//!
//! `rodio::OutputStream` is not `Send`, so each playback gets its own thread
//! that opens the default output device, decodes the audio, and blocks on
//! `Sink::sleep_until_end`.  The thread reports whether decoding succeeded
//! before anything is audible so the caller can fall back to another engine.
//!
//! Stopping calls `Sink::stop`, which makes `sleep_until_end` return at once;
//! the [`PlaybackDone`] token has already been settled by the canceller, so
//! no `Ended` terminal follows.

use std::io::Cursor;
use std::sync::mpsc;
use std::sync::Arc;

use rodio::{Decoder, OutputStream, Sink};

use crate::synthesis::{AudioPlayer, PlaybackControl, PlaybackDone, PlaybackError};

/// Plays encoded (MP3/WAV) audio on the default output device.
#[derive(Debug, Default, Clone, Copy)]
pub struct RodioPlayer;

impl AudioPlayer for RodioPlayer {
    fn play(
        &self,
        audio: Vec<u8>,
        done: PlaybackDone,
    ) -> Result<Box<dyn PlaybackControl>, PlaybackError> {
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<Arc<Sink>, PlaybackError>>(1);
        let id = done.id();

        std::thread::Builder::new()
            .name("playback".into())
            .spawn(move || {
                let (_stream, handle) = match OutputStream::try_default() {
                    Ok(pair) => pair,
                    Err(e) => {
                        let _ = ready_tx.send(Err(PlaybackError(format!("no output device: {e}"))));
                        return;
                    }
                };
                let sink = match Sink::try_new(&handle) {
                    Ok(sink) => sink,
                    Err(e) => {
                        let _ = ready_tx.send(Err(PlaybackError(format!("could not open sink: {e}"))));
                        return;
                    }
                };
                let source = match Decoder::new(Cursor::new(audio)) {
                    Ok(source) => source,
                    Err(e) => {
                        let _ = ready_tx.send(Err(PlaybackError(format!("could not decode audio: {e}"))));
                        return;
                    }
                };

                sink.append(source);
                let sink = Arc::new(sink);
                if ready_tx.send(Ok(Arc::clone(&sink))).is_err() {
                    sink.stop();
                    return;
                }

                sink.sleep_until_end();
                log::debug!("audio: playback {id} drained");
                done.ended();
            })
            .map_err(|e| PlaybackError(format!("could not start playback thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(sink)) => Ok(Box::new(RodioControl { sink })),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(PlaybackError("playback thread exited during startup".into())),
        }
    }
}

struct RodioControl {
    sink: Arc<Sink>,
}

impl PlaybackControl for RodioControl {
    fn stop(&self) {
        self.sink.stop();
    }
}
