//! Microphone input via `cpal`.
//!
//! `cpal::Stream` is not `Send` on every platform, so each
//! [`MicrophoneStream`] owns a dedicated OS thread that builds the stream and
//! parks until it is told to stop.  Opening returns as soon as that thread
//! exists: the device may sit behind an OS permission prompt, and callers run
//! on the async loop.  Failures to open are handed to a callback instead.
//! Every callback buffer is converted to 16 kHz mono before it reaches the
//! caller.
//!
//! [`MicrophoneRecorder`] is the RawClip [`ClipRecorder`] built on top of it.

use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::mpsc::UnboundedSender;

use super::resample::{downmix, Resampler};
use super::TARGET_SAMPLE_RATE;
use crate::capture::{CaptureError, ClipRecorder, Recording};

// ---------------------------------------------------------------------------
// MicrophoneStream
// ---------------------------------------------------------------------------

/// RAII guard for the default input device.  Dropping it signals the input
/// thread to release the device; nothing waits for it.
pub struct MicrophoneStream {
    stop_tx: Option<mpsc::Sender<()>>,
}

impl MicrophoneStream {
    /// Open the default input device and deliver 16 kHz mono buffers to
    /// `on_samples` from the audio thread.
    ///
    /// Only a failure to spawn the input thread is returned here.  If the
    /// device then fails to open, `on_failure` runs on the input thread.
    pub fn open(
        on_samples: impl FnMut(&[f32]) + Send + 'static,
        on_failure: impl FnOnce(CaptureError) + Send + 'static,
    ) -> Result<Self, CaptureError> {
        Self::spawn(move || build_stream(on_samples), on_failure)
    }

    fn spawn<S: 'static>(
        build: impl FnOnce() -> Result<S, CaptureError> + Send + 'static,
        on_failure: impl FnOnce(CaptureError) + Send + 'static,
    ) -> Result<Self, CaptureError> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        std::thread::Builder::new()
            .name("mic-input".into())
            .spawn(move || {
                let stream = match build() {
                    Ok(stream) => stream,
                    Err(e) => {
                        log::warn!("audio: input device failed to open: {e}");
                        on_failure(e);
                        return;
                    }
                };
                log::debug!("audio: input stream open");
                // Returns on explicit stop or when the sender is dropped.
                let _ = stop_rx.recv();
                drop(stream);
                log::debug!("audio: input stream closed");
            })
            .map_err(|e| CaptureError::Device(format!("could not start input thread: {e}")))?;

        Ok(Self {
            stop_tx: Some(stop_tx),
        })
    }

    /// Tell the input thread to release the device.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MicrophoneStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn build_stream(
    mut on_samples: impl FnMut(&[f32]) + Send + 'static,
) -> Result<cpal::Stream, CaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| CaptureError::Device("no input device found".into()))?;

    let supported = device
        .default_input_config()
        .map_err(|e| classify_device_error(&e.to_string()))?;
    let channels = supported.channels();
    let sample_rate = supported.sample_rate().0;
    let config: cpal::StreamConfig = supported.into();
    let mut resampler = Resampler::new(sample_rate, TARGET_SAMPLE_RATE);

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                on_samples(&resampler.process(&downmix(data, channels)));
            },
            |err: cpal::StreamError| {
                log::error!("audio: input stream error: {err}");
            },
            None,
        )
        .map_err(|e| classify_device_error(&e.to_string()))?;

    stream
        .play()
        .map_err(|e| classify_device_error(&e.to_string()))?;
    Ok(stream)
}

/// Backends report refused microphone access as free-form text.
fn classify_device_error(detail: &str) -> CaptureError {
    let lower = detail.to_lowercase();
    let refused = ["permission", "denied", "not authorized", "unauthorized"]
        .iter()
        .any(|needle| lower.contains(needle));
    if refused {
        CaptureError::PermissionDenied
    } else {
        CaptureError::Device(detail.to_string())
    }
}

// ---------------------------------------------------------------------------
// MicrophoneRecorder
// ---------------------------------------------------------------------------

/// Records the default input device into memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct MicrophoneRecorder;

impl ClipRecorder for MicrophoneRecorder {
    fn start(
        &self,
        failures: UnboundedSender<CaptureError>,
    ) -> Result<Box<dyn Recording>, CaptureError> {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let stream = MicrophoneStream::open(
            move |samples| {
                sink.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(samples);
            },
            move |e| {
                let _ = failures.send(e);
            },
        )?;
        Ok(Box::new(MicrophoneRecording { stream, buffer }))
    }
}

struct MicrophoneRecording {
    stream: MicrophoneStream,
    buffer: Arc<Mutex<Vec<f32>>>,
}

impl Recording for MicrophoneRecording {
    fn finish(self: Box<Self>) -> Result<Vec<f32>, CaptureError> {
        let MicrophoneRecording { stream, buffer } = *self;
        stream.close();
        let samples = std::mem::take(&mut *buffer.lock().unwrap_or_else(PoisonError::into_inner));
        Ok(samples)
    }

    fn abort(self: Box<Self>) {
        self.stream.close();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn permission_text_maps_to_permission_denied() {
        assert_eq!(
            classify_device_error("Access denied by the operating system"),
            CaptureError::PermissionDenied
        );
        assert_eq!(
            classify_device_error("The app is not authorized to use the microphone"),
            CaptureError::PermissionDenied
        );
    }

    #[test]
    fn other_text_is_device_error() {
        assert_eq!(
            classify_device_error("device disconnected"),
            CaptureError::Device("device disconnected".into())
        );
    }

    #[test]
    fn open_returns_before_the_device_is_ready() {
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let (built_tx, built_rx) = mpsc::channel::<()>();
        let stream = MicrophoneStream::spawn(
            move || {
                let _ = gate_rx.recv();
                let _ = built_tx.send(());
                Ok(())
            },
            |_| {},
        )
        .expect("input thread");

        assert!(built_rx.try_recv().is_err());
        gate_tx.send(()).expect("gate");
        built_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("device opened after open() returned");
        stream.close();
    }

    #[test]
    fn device_failure_is_reported_through_the_callback() {
        let (failed_tx, failed_rx) = mpsc::channel();
        let _stream = MicrophoneStream::spawn(
            || Err::<(), _>(CaptureError::PermissionDenied),
            move |e| {
                let _ = failed_tx.send(e);
            },
        )
        .expect("input thread");

        assert_eq!(
            failed_rx.recv_timeout(Duration::from_secs(5)),
            Ok(CaptureError::PermissionDenied)
        );
    }

    #[test]
    fn recorder_handles_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<MicrophoneStream>();
        assert_send::<MicrophoneRecording>();
    }
}
