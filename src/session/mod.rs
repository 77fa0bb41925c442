//! Conversation session controller.
//!
//! Owns the pipeline state machine and sequences one practice turn at a
//! time: capture → transcription → inference → playback. All pipeline
//! steps run as a sequence of awaited operations on one logical thread of
//! control; the single-flight guard rejects overlapping turns instead of
//! queueing them, and every failure path returns the machine to `Idle`.

pub mod messages;

use crate::audio::capture::CaptureController;
use crate::audio::playback::{CpalSink, PlaybackController};
use crate::audio::{AudioSession, CpalRecorder};
use crate::config::AppConfig;
use crate::error::{PracticeError, Result};
use crate::session::messages::{Message, Role, Topic};
use crate::store::ConversationStore;
use crate::transport::{OpenAiBackend, SpeechBackend};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Fixed assistant reply substituted when inference fails.
///
/// The conversation always shows a reply, even a generic apology, so the
/// dialogue never visibly breaks. The fallback is appended as text only and
/// never played aloud.
pub const FALLBACK_REPLY: &str =
    "Sorry, I can't respond right now. Please try again in a moment.";

/// Where the pipeline is in the current turn.
///
/// At most one non-`Idle` state is active at any time, and `Recording` and
/// `Speaking` are mutually exclusive by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    /// No turn in progress.
    Idle,
    /// Microphone capture active.
    Recording,
    /// Waiting on speech-to-text.
    Transcribing,
    /// Waiting on the tutor reply.
    AwaitingReply,
    /// Playing the reply aloud.
    Speaking,
    /// A turn just failed; published transiently before returning to `Idle`.
    Failed(String),
}

impl PipelineState {
    /// Short state name for logs and errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Recording => "Recording",
            Self::Transcribing => "Transcribing",
            Self::AwaitingReply => "AwaitingReply",
            Self::Speaking => "Speaking",
            Self::Failed(_) => "Failed",
        }
    }
}

/// How a completed turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The turn produced a user message and an assistant reply.
    Completed,
    /// The recording was empty or transcribed to nothing; no message was
    /// appended.
    DroppedEmpty,
}

/// Orchestrates the record → transcribe → infer → speak pipeline for one
/// conversation.
pub struct SessionController {
    store: Arc<ConversationStore>,
    backend: Arc<dyn SpeechBackend>,
    capture: CaptureController,
    playback: PlaybackController,
    auto_play: bool,
    state: PipelineState,
    state_tx: watch::Sender<PipelineState>,
}

impl SessionController {
    /// Create a controller over explicit components.
    #[must_use]
    pub fn new(
        store: Arc<ConversationStore>,
        backend: Arc<dyn SpeechBackend>,
        capture: CaptureController,
        playback: PlaybackController,
        auto_play: bool,
    ) -> Self {
        let (state_tx, _) = watch::channel(PipelineState::Idle);
        Self {
            store,
            backend,
            capture,
            playback,
            auto_play,
            state: PipelineState::Idle,
            state_tx,
        }
    }

    /// Wire up a controller from configuration, using the real microphone,
    /// speaker, and HTTP backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or no output
    /// device is available.
    pub fn from_config(config: &AppConfig, store: Arc<ConversationStore>) -> Result<Self> {
        let backend: Arc<dyn SpeechBackend> = Arc::new(OpenAiBackend::new(
            config.api.clone(),
            config.conversation.clone(),
            config.speech.clone(),
        )?);

        let session = AudioSession::new();
        let capture = CaptureController::new(
            Box::new(CpalRecorder::new(config.audio.clone())),
            session,
        );
        let playback = PlaybackController::new(
            Arc::clone(&backend),
            Arc::new(CpalSink::new()?),
            config.speech.pitch.varispeed_factor(),
        );

        Ok(Self::new(
            store,
            backend,
            capture,
            playback,
            config.speech.auto_play,
        ))
    }

    /// Begin a practice turn by starting microphone capture.
    ///
    /// Valid only from `Idle`.
    ///
    /// # Errors
    ///
    /// - [`PracticeError::InvalidState`] if a turn is already in progress.
    /// - Capture errors ([`PracticeError::PermissionDenied`],
    ///   [`PracticeError::DeviceBusy`], [`PracticeError::Audio`]); the
    ///   machine stays in `Idle` and the turn can be retried.
    pub fn start_turn(&mut self) -> Result<()> {
        if self.state != PipelineState::Idle {
            return Err(self.invalid_state("Idle"));
        }

        if let Err(e) = self.capture.begin_capture() {
            self.fail(&e);
            return Err(e);
        }

        self.store.set_recording(true);
        self.set_state(PipelineState::Recording);
        Ok(())
    }

    /// Finish the recording and run the rest of the pipeline.
    ///
    /// Valid only from `Recording`. An empty recording or an empty
    /// transcription silently drops the turn ([`TurnOutcome::DroppedEmpty`])
    /// so noise never pollutes the history. Inference failure is absorbed:
    /// the fixed [`FALLBACK_REPLY`] is appended instead and the turn still
    /// counts as completed. Playback failure is non-fatal — the reply text
    /// stays visible.
    ///
    /// # Errors
    ///
    /// - [`PracticeError::InvalidState`] if no recording is in progress.
    /// - Capture finalization and transcription errors; the machine returns
    ///   to `Idle` and the partial turn is discarded.
    pub async fn complete_turn(&mut self) -> Result<TurnOutcome> {
        if self.state != PipelineState::Recording {
            return Err(self.invalid_state("Recording"));
        }

        self.store.set_recording(false);
        self.store.set_processing(true);
        self.set_state(PipelineState::Transcribing);

        let audio = match self.capture.end_capture() {
            Ok(audio) => audio,
            Err(PracticeError::HandleUnavailable(reason)) => {
                info!("dropping turn: {reason}");
                return Ok(self.drop_turn());
            }
            Err(e) => {
                self.abort_turn(&e);
                return Err(e);
            }
        };

        let text = match self.backend.transcribe(&audio).await {
            Ok(text) => text,
            Err(e) => {
                self.abort_turn(&e);
                return Err(e);
            }
        };

        if text.trim().is_empty() {
            info!("dropping turn: empty transcription");
            return Ok(self.drop_turn());
        }

        self.store.append(Message::new(Role::User, text, Some(audio)));
        self.set_state(PipelineState::AwaitingReply);

        let history = self.store.history();
        let topic = self.store.topic();

        let reply = match self.backend.infer(&history, topic).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("inference failed, substituting fallback reply: {e}");
                self.store
                    .append(Message::new(Role::Assistant, FALLBACK_REPLY, None));
                self.store.set_processing(false);
                self.set_state(PipelineState::Idle);
                return Ok(TurnOutcome::Completed);
            }
        };

        let assistant = Message::new(Role::Assistant, reply.clone(), None);
        let assistant_id = assistant.id;
        self.store.append(assistant);
        self.store.set_processing(false);

        if self.auto_play {
            self.set_state(PipelineState::Speaking);
            if let Err(e) = self.playback.play(&reply, assistant_id).await {
                warn!("reply playback failed: {e}");
            }
        }

        self.set_state(PipelineState::Idle);
        Ok(TurnOutcome::Completed)
    }

    /// Speak an existing message again.
    ///
    /// An unknown id is ignored. Valid only between turns; playback of a
    /// previous replay is interrupted by the playback controller.
    ///
    /// # Errors
    ///
    /// Returns [`PracticeError::InvalidState`] while a turn is in flight.
    pub async fn replay(&mut self, message_id: Uuid) -> Result<()> {
        if self.state != PipelineState::Idle {
            return Err(self.invalid_state("Idle"));
        }

        let Some(message) = self.store.message(message_id) else {
            debug!("replay requested for unknown message {message_id}");
            return Ok(());
        };

        self.set_state(PipelineState::Speaking);
        if let Err(e) = self.playback.play(&message.content, message_id).await {
            warn!("replay failed: {e}");
        }
        self.set_state(PipelineState::Idle);
        Ok(())
    }

    /// Stop any reply audio currently playing.
    ///
    /// Idempotent; delegates to the playback controller.
    pub fn stop_speaking(&self) {
        self.playback.stop();
    }

    /// Empty the conversation.
    ///
    /// The selected topic is retained. Valid only between turns.
    ///
    /// # Errors
    ///
    /// Returns [`PracticeError::InvalidState`] while a turn is in flight.
    pub fn clear(&mut self) -> Result<()> {
        if self.state != PipelineState::Idle {
            return Err(self.invalid_state("Idle"));
        }
        self.playback.stop();
        self.store.clear();
        Ok(())
    }

    /// Change the practice topic.
    pub fn set_topic(&self, topic: Topic) {
        self.store.set_topic(topic);
    }

    /// Current pipeline state.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state.clone()
    }

    /// Subscribe to pipeline state transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<PipelineState> {
        self.state_tx.subscribe()
    }

    /// The conversation store this controller writes to.
    #[must_use]
    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Handle to the playback controller, for UI-driven stop and replay
    /// indicators.
    #[must_use]
    pub fn playback(&self) -> PlaybackController {
        self.playback.clone()
    }

    /// Time the active recording has been running, for the UI timer.
    #[must_use]
    pub fn recording_elapsed(&self) -> Option<Duration> {
        self.capture.elapsed()
    }

    fn set_state(&mut self, next: PipelineState) {
        if self.state != next {
            debug!("session state: {} -> {}", self.state.name(), next.name());
        }
        self.state = next.clone();
        self.state_tx.send_replace(next);
    }

    /// Drop the current turn without appending anything.
    fn drop_turn(&mut self) -> TurnOutcome {
        self.store.set_processing(false);
        self.set_state(PipelineState::Idle);
        TurnOutcome::DroppedEmpty
    }

    /// Abort the current turn on an error, returning the machine to `Idle`.
    fn abort_turn(&mut self, err: &PracticeError) {
        self.store.set_processing(false);
        self.fail(err);
    }

    /// Publish the failure transiently, then return to `Idle`.
    fn fail(&mut self, err: &PracticeError) {
        warn!("turn aborted: {err}");
        self.set_state(PipelineState::Failed(err.to_string()));
        self.set_state(PipelineState::Idle);
    }

    fn invalid_state(&self, expected: &'static str) -> PracticeError {
        PracticeError::InvalidState {
            expected,
            actual: self.state.name().to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::test_utils::{FakeRecorder, FakeSink, StubBackend};

    fn controller(backend: StubBackend, recorder: FakeRecorder) -> SessionController {
        let store = Arc::new(ConversationStore::new());
        let backend: Arc<dyn SpeechBackend> = Arc::new(backend);
        let capture = CaptureController::new(Box::new(recorder), AudioSession::new());
        let playback =
            PlaybackController::new(Arc::clone(&backend), Arc::new(FakeSink::instant()), 1.0);
        SessionController::new(store, backend, capture, playback, true)
    }

    #[tokio::test]
    async fn complete_without_start_is_invalid_state() {
        let mut session = controller(StubBackend::new(), FakeRecorder::returning("rec.wav"));
        let err = session.complete_turn().await.unwrap_err();
        assert!(matches!(
            err,
            PracticeError::InvalidState {
                expected: "Recording",
                ..
            }
        ));
        assert_eq!(session.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn start_twice_is_invalid_state() {
        let mut session = controller(StubBackend::new(), FakeRecorder::returning("rec.wav"));
        session.start_turn().unwrap();
        let err = session.start_turn().unwrap_err();
        assert!(matches!(err, PracticeError::InvalidState { .. }));
        assert_eq!(session.state(), PipelineState::Recording);
    }

    #[tokio::test]
    async fn state_transitions_are_published() {
        let mut session = controller(StubBackend::new(), FakeRecorder::returning("rec.wav"));
        let rx = session.subscribe_state();

        session.start_turn().unwrap();
        assert_eq!(*rx.borrow(), PipelineState::Recording);

        session.complete_turn().await.unwrap();
        assert_eq!(*rx.borrow(), PipelineState::Idle);
    }

    #[test]
    fn state_names_cover_every_variant() {
        assert_eq!(PipelineState::Idle.name(), "Idle");
        assert_eq!(PipelineState::Failed("x".into()).name(), "Failed");
    }
}
