//! Speech playback controller.
//!
//! Enforces a single concurrently-playing utterance process-wide: starting
//! a new utterance unconditionally interrupts the current one
//! (stop-then-start, never queued). The controller tracks which message is
//! currently playing so the UI shows exactly one active indicator, and
//! clears the marker on natural completion, interruption, or error.

use crate::error::{PracticeError, Result};
use crate::transport::SpeechBackend;
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Output device seam.
///
/// Blocks until natural completion or cancellation; the controller calls it
/// from a blocking task. [`CpalSink`] is the real implementation.
pub trait AudioSink: Send + Sync {
    /// Play mono samples at the given rate.
    ///
    /// Returns `Ok(())` on natural completion and on cancellation.
    ///
    /// # Errors
    ///
    /// Returns an error if the output stream cannot be created or played.
    fn play(&self, samples: &[f32], sample_rate: u32, cancel: &CancellationToken) -> Result<()>;
}

struct Utterance {
    message_id: Uuid,
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct PlayState {
    generation: u64,
    current: Option<Utterance>,
}

/// Single-utterance speech playback over a backend and an output sink.
///
/// Cheap to clone; clones share the currently-playing marker, so the UI and
/// the session controller can hold their own handles.
#[derive(Clone)]
pub struct PlaybackController {
    backend: Arc<dyn SpeechBackend>,
    sink: Arc<dyn AudioSink>,
    /// Varispeed factor applied to the output rate (pitch setting).
    varispeed: f32,
    state: Arc<Mutex<PlayState>>,
}

impl PlaybackController {
    /// Create a controller over the given backend and sink.
    #[must_use]
    pub fn new(backend: Arc<dyn SpeechBackend>, sink: Arc<dyn AudioSink>, varispeed: f32) -> Self {
        Self {
            backend,
            sink,
            varispeed,
            state: Arc::new(Mutex::new(PlayState::default())),
        }
    }

    /// Synthesize `text` and play it, attributed to `message_id`.
    ///
    /// Any utterance already playing is interrupted first. Resolves when
    /// playback completes naturally, is interrupted, or fails; the
    /// currently-playing marker is cleared in every case.
    ///
    /// # Errors
    ///
    /// Returns [`PracticeError::Synthesis`] if synthesis fails and
    /// [`PracticeError::Audio`] if the sink fails. Both are non-fatal to the
    /// conversation — the text stays visible even if audio fails.
    pub async fn play(&self, text: &str, message_id: Uuid) -> Result<()> {
        let (generation, cancel) = {
            let mut state = self.lock();
            if let Some(current) = state.current.take() {
                debug!("interrupting utterance for message {}", current.message_id);
                current.cancel.cancel();
            }
            state.generation += 1;
            let cancel = CancellationToken::new();
            state.current = Some(Utterance {
                message_id,
                generation: state.generation,
                cancel: cancel.clone(),
            });
            (state.generation, cancel)
        };

        let speech = match self.backend.synthesize(text).await {
            Ok(speech) => speech,
            Err(e) => {
                self.clear_marker(generation);
                return Err(e);
            }
        };

        // Interrupted while the synthesis call was in flight.
        if cancel.is_cancelled() {
            self.clear_marker(generation);
            return Ok(());
        }

        let rate = (speech.sample_rate as f32 * self.varispeed).round() as u32;
        info!(
            "speaking message {message_id} ({:.1}s of audio)",
            speech.duration().as_secs_f32()
        );

        let sink = Arc::clone(&self.sink);
        let samples = speech.samples;
        let sink_cancel = cancel.clone();
        let played =
            tokio::task::spawn_blocking(move || sink.play(&samples, rate, &sink_cancel)).await;

        self.clear_marker(generation);

        match played {
            Ok(result) => result,
            Err(e) => Err(PracticeError::Audio(format!("playback task failed: {e}"))),
        }
    }

    /// Stop the current utterance, if any.
    ///
    /// Idempotent: stopping when nothing plays is a no-op.
    pub fn stop(&self) {
        let mut state = self.lock();
        if let Some(current) = state.current.take() {
            debug!("stopping utterance for message {}", current.message_id);
            current.cancel.cancel();
        }
    }

    /// The message currently being synthesized or played, if any.
    #[must_use]
    pub fn currently_playing(&self) -> Option<Uuid> {
        self.lock().current.as_ref().map(|u| u.message_id)
    }

    /// Clear the marker, unless a newer utterance has already replaced it.
    fn clear_marker(&self, generation: u64) {
        let mut state = self.lock();
        if state
            .current
            .as_ref()
            .is_some_and(|u| u.generation == generation)
        {
            state.current = None;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PlayState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Speaker output via cpal.
///
/// A fresh output stream is built per utterance so each one can use the
/// sample rate (and varispeed) of its decoded audio.
pub struct CpalSink {
    device: cpal::Device,
}

impl CpalSink {
    /// Create a sink on the default output device.
    ///
    /// # Errors
    ///
    /// Returns an error if no output device is available.
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PracticeError::Audio("no default output device".into()))?;

        let device_name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".into());
        info!("using output device: {device_name}");

        Ok(Self { device })
    }
}

impl AudioSink for CpalSink {
    fn play(&self, samples: &[f32], sample_rate: u32, cancel: &CancellationToken) -> Result<()> {
        let stream_config = StreamConfig {
            channels: 1,
            sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let buffer = Arc::new(Mutex::new(PlaybackBuffer {
            samples: samples.to_vec(),
            position: 0,
            finished: false,
        }));
        let buffer_clone = Arc::clone(&buffer);

        let stream = self
            .device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    let mut buf = match buffer_clone.lock() {
                        Ok(b) => b,
                        Err(_) => return,
                    };

                    for sample in data.iter_mut() {
                        if buf.position < buf.samples.len() {
                            *sample = buf.samples[buf.position];
                            buf.position += 1;
                        } else {
                            *sample = 0.0;
                            buf.finished = true;
                        }
                    }
                },
                move |err| {
                    warn!("audio output stream error: {err}");
                },
                None,
            )
            .map_err(|e| PracticeError::Audio(format!("failed to build output stream: {e}")))?;

        stream
            .play()
            .map_err(|e| PracticeError::Audio(format!("failed to start output stream: {e}")))?;

        // Wait for natural completion or interruption.
        loop {
            if cancel.is_cancelled() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
            let buf = buffer
                .lock()
                .map_err(|e| PracticeError::Audio(format!("playback buffer lock poisoned: {e}")))?;
            if buf.finished {
                break;
            }
        }

        drop(stream);
        Ok(())
    }
}

/// Internal buffer for tracking playback progress.
struct PlaybackBuffer {
    samples: Vec<f32>,
    position: usize,
    finished: bool,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::test_utils::{FakeSink, StubBackend};
    use std::time::Duration;

    fn controller(sink: FakeSink) -> PlaybackController {
        PlaybackController::new(Arc::new(StubBackend::new()), Arc::new(sink), 1.0)
    }

    #[tokio::test]
    async fn marker_cleared_after_natural_completion() {
        let playback = controller(FakeSink::instant());
        let id = Uuid::new_v4();

        playback.play("hello", id).await.unwrap();

        assert_eq!(playback.currently_playing(), None);
    }

    #[tokio::test]
    async fn new_play_interrupts_current() {
        let playback = controller(FakeSink::until_cancelled());
        let id1 = Uuid::new_v4();
        let id2 = Uuid::new_v4();

        let first = {
            let playback = playback.clone();
            tokio::spawn(async move { playback.play("first", id1).await })
        };

        // Wait until the first utterance is marked as playing.
        while playback.currently_playing() != Some(id1) {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let second = {
            let playback = playback.clone();
            tokio::spawn(async move { playback.play("second", id2).await })
        };

        // The first play resolves cleanly once interrupted.
        first.await.unwrap().unwrap();

        // Only the second utterance is marked while it plays.
        while playback.currently_playing().is_none() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(playback.currently_playing(), Some(id2));

        playback.stop();
        second.await.unwrap().unwrap();
        assert_eq!(playback.currently_playing(), None);
    }

    #[tokio::test]
    async fn stop_when_idle_is_a_no_op() {
        let playback = controller(FakeSink::instant());
        playback.stop();
        playback.stop();
        assert_eq!(playback.currently_playing(), None);
    }

    #[tokio::test]
    async fn synthesis_failure_clears_marker() {
        let backend = StubBackend::new().with_synthesis_error();
        let playback =
            PlaybackController::new(Arc::new(backend), Arc::new(FakeSink::instant()), 1.0);

        let err = playback.play("hello", Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, PracticeError::Synthesis(_)));
        assert_eq!(playback.currently_playing(), None);
    }

    #[tokio::test]
    async fn sink_failure_clears_marker() {
        let playback = controller(FakeSink::failing());

        let err = playback.play("hello", Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, PracticeError::Audio(_)));
        assert_eq!(playback.currently_playing(), None);
    }
}
