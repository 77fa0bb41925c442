//! End-to-end turn scenarios over a scripted backend and fake audio devices.
//!
//! Exercises the full session controller pipeline — single-flight guards,
//! message ordering, the dropped-turn policy, the fallback reply, and the
//! indicator flags the UI consumes.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use parlo::audio::AudioSession;
use parlo::audio::capture::CaptureController;
use parlo::audio::playback::PlaybackController;
use parlo::session::messages::Role;
use parlo::test_utils::{FakeRecorder, FakeSink, StubBackend};
use parlo::{
    ConversationStore, FALLBACK_REPLY, PipelineState, PracticeError, SessionController,
    SpeechBackend, StoreEvent, Topic, TurnOutcome,
};
use std::sync::Arc;

struct Harness {
    session: SessionController,
    store: Arc<ConversationStore>,
    backend: Arc<StubBackend>,
}

fn harness(backend: StubBackend, recorder: FakeRecorder, auto_play: bool) -> Harness {
    let store = Arc::new(ConversationStore::new());
    let backend = Arc::new(backend);
    let dyn_backend: Arc<dyn SpeechBackend> = backend.clone();

    let capture = CaptureController::new(Box::new(recorder), AudioSession::new());
    let playback = PlaybackController::new(
        Arc::clone(&dyn_backend),
        Arc::new(FakeSink::instant()),
        1.0,
    );
    let session = SessionController::new(
        Arc::clone(&store),
        dyn_backend,
        capture,
        playback,
        auto_play,
    );

    Harness {
        session,
        store,
        backend,
    }
}

fn default_harness() -> Harness {
    harness(StubBackend::new(), FakeRecorder::returning("rec.wav"), true)
}

#[tokio::test]
async fn completed_turn_appends_user_then_assistant() {
    let mut h = default_harness();

    h.session.start_turn().unwrap();
    let outcome = h.session.complete_turn().await.unwrap();

    assert_eq!(outcome, TurnOutcome::Completed);
    let messages = h.store.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, "Hello");
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, "Hi there!");
    assert_eq!(h.session.state(), PipelineState::Idle);
}

#[tokio::test]
async fn user_message_carries_the_recording() {
    let mut h = default_harness();

    h.session.start_turn().unwrap();
    h.session.complete_turn().await.unwrap();

    let messages = h.store.messages();
    let audio = messages[0].audio.as_ref().unwrap();
    assert_eq!(audio.path, std::path::PathBuf::from("rec.wav"));
    assert!(messages[1].audio.is_none());
}

#[tokio::test]
async fn inference_sees_history_including_new_user_message() {
    let mut h = default_harness();
    h.session.set_topic(Topic::Travel);

    h.session.start_turn().unwrap();
    h.session.complete_turn().await.unwrap();

    let histories = h.backend.infer_history.lock().unwrap();
    assert_eq!(histories.len(), 1);
    let history = &histories[0];
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].content, "Hello");

    let topics = h.backend.infer_topics.lock().unwrap();
    assert_eq!(topics[0], Topic::Travel);
}

#[tokio::test]
async fn auto_play_speaks_the_reply() {
    let mut h = default_harness();

    h.session.start_turn().unwrap();
    h.session.complete_turn().await.unwrap();

    let spoken = h.backend.synthesized.lock().unwrap();
    assert_eq!(spoken.as_slice(), ["Hi there!"]);
}

#[tokio::test]
async fn auto_play_off_skips_playback() {
    let mut h = harness(StubBackend::new(), FakeRecorder::returning("rec.wav"), false);

    h.session.start_turn().unwrap();
    h.session.complete_turn().await.unwrap();

    assert!(h.backend.synthesized.lock().unwrap().is_empty());
    assert_eq!(h.store.len(), 2);
}

#[tokio::test]
async fn empty_transcription_drops_the_turn() {
    let mut h = harness(
        StubBackend::new().with_transcription("   "),
        FakeRecorder::returning("rec.wav"),
        true,
    );

    h.session.start_turn().unwrap();
    let outcome = h.session.complete_turn().await.unwrap();

    assert_eq!(outcome, TurnOutcome::DroppedEmpty);
    assert!(h.store.is_empty());
    assert_eq!(h.session.state(), PipelineState::Idle);
    assert!(!h.store.is_processing());
}

#[tokio::test]
async fn empty_recording_drops_the_turn() {
    let mut h = harness(StubBackend::new(), FakeRecorder::empty(), true);

    h.session.start_turn().unwrap();
    let outcome = h.session.complete_turn().await.unwrap();

    assert_eq!(outcome, TurnOutcome::DroppedEmpty);
    assert!(h.store.is_empty());
    assert_eq!(h.session.state(), PipelineState::Idle);
}

#[tokio::test]
async fn inference_failure_substitutes_fallback_without_playback() {
    let mut h = harness(
        StubBackend::new().with_infer_error(),
        FakeRecorder::returning("rec.wav"),
        true,
    );

    h.session.start_turn().unwrap();
    let outcome = h.session.complete_turn().await.unwrap();

    assert_eq!(outcome, TurnOutcome::Completed);
    let messages = h.store.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, FALLBACK_REPLY);
    assert_eq!(h.session.state(), PipelineState::Idle);
    // The apology is appended as text only, never spoken.
    assert!(h.backend.synthesized.lock().unwrap().is_empty());
}

#[tokio::test]
async fn transcription_error_aborts_back_to_idle() {
    let mut h = harness(
        StubBackend::new().with_transcription_error(),
        FakeRecorder::returning("rec.wav"),
        true,
    );

    h.session.start_turn().unwrap();
    let err = h.session.complete_turn().await.unwrap_err();

    assert!(matches!(err, PracticeError::Transcription(_)));
    assert!(h.store.is_empty());
    assert_eq!(h.session.state(), PipelineState::Idle);
    assert!(!h.store.is_processing());

    // The turn is retryable immediately.
    h.session.start_turn().unwrap();
    assert_eq!(h.session.state(), PipelineState::Recording);
}

#[tokio::test]
async fn permission_denied_leaves_idle() {
    let mut h = harness(StubBackend::new(), FakeRecorder::denied(), true);

    let err = h.session.start_turn().unwrap_err();
    assert!(matches!(err, PracticeError::PermissionDenied(_)));
    assert_eq!(h.session.state(), PipelineState::Idle);
    assert!(!h.store.is_recording());
}

#[tokio::test]
async fn playback_failure_keeps_the_reply_text() {
    let store = Arc::new(ConversationStore::new());
    let backend = Arc::new(StubBackend::new().with_synthesis_error());
    let dyn_backend: Arc<dyn SpeechBackend> = backend.clone();
    let capture = CaptureController::new(
        Box::new(FakeRecorder::returning("rec.wav")),
        AudioSession::new(),
    );
    let playback = PlaybackController::new(
        Arc::clone(&dyn_backend),
        Arc::new(FakeSink::instant()),
        1.0,
    );
    let mut session =
        SessionController::new(Arc::clone(&store), dyn_backend, capture, playback, true);

    session.start_turn().unwrap();
    let outcome = session.complete_turn().await.unwrap();

    assert_eq!(outcome, TurnOutcome::Completed);
    assert_eq!(store.messages()[1].content, "Hi there!");
    assert_eq!(session.state(), PipelineState::Idle);
    assert_eq!(session.playback().currently_playing(), None);
}

#[tokio::test]
async fn operations_rejected_while_turn_in_flight() {
    let mut h = default_harness();
    h.session.start_turn().unwrap();

    assert!(matches!(
        h.session.clear(),
        Err(PracticeError::InvalidState { .. })
    ));
    assert!(matches!(
        h.session.replay(uuid::Uuid::new_v4()).await,
        Err(PracticeError::InvalidState { .. })
    ));
    // The recording is unaffected by the rejected calls.
    assert_eq!(h.session.state(), PipelineState::Recording);
}

#[tokio::test]
async fn store_flags_follow_the_turn() {
    let mut h = default_harness();
    let mut rx = h.store.subscribe();

    h.session.start_turn().unwrap();
    h.session.complete_turn().await.unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    let shape: Vec<&'static str> = events
        .iter()
        .map(|e| match e {
            StoreEvent::RecordingChanged(true) => "rec+",
            StoreEvent::RecordingChanged(false) => "rec-",
            StoreEvent::ProcessingChanged(true) => "proc+",
            StoreEvent::ProcessingChanged(false) => "proc-",
            StoreEvent::MessageAppended(_) => "msg",
            _ => "other",
        })
        .collect();
    assert_eq!(shape, ["rec+", "rec-", "proc+", "msg", "msg", "proc-"]);
}

#[tokio::test]
async fn clear_empties_messages_but_keeps_topic() {
    let mut h = default_harness();
    h.session.set_topic(Topic::JobInterview);

    h.session.start_turn().unwrap();
    h.session.complete_turn().await.unwrap();
    assert_eq!(h.store.len(), 2);

    h.session.clear().unwrap();

    assert!(h.store.is_empty());
    assert_eq!(h.store.topic(), Topic::JobInterview);
}

#[tokio::test]
async fn replay_speaks_an_existing_message() {
    let mut h = default_harness();

    h.session.start_turn().unwrap();
    h.session.complete_turn().await.unwrap();
    let assistant_id = h.store.messages()[1].id;

    h.session.replay(assistant_id).await.unwrap();

    let spoken = h.backend.synthesized.lock().unwrap();
    assert_eq!(spoken.as_slice(), ["Hi there!", "Hi there!"]);
}

#[tokio::test]
async fn replay_of_unknown_id_is_a_no_op() {
    let mut h = default_harness();

    h.session.replay(uuid::Uuid::new_v4()).await.unwrap();

    assert!(h.backend.synthesized.lock().unwrap().is_empty());
    assert_eq!(h.session.state(), PipelineState::Idle);
}

#[tokio::test]
async fn consecutive_turns_accumulate_history_in_order() {
    let mut h = default_harness();

    h.session.start_turn().unwrap();
    h.session.complete_turn().await.unwrap();
    h.session.start_turn().unwrap();
    h.session.complete_turn().await.unwrap();

    let messages = h.store.messages();
    assert_eq!(messages.len(), 4);
    let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        [Role::User, Role::Assistant, Role::User, Role::Assistant]
    );

    // The second inference call saw the first full exchange plus the new
    // user message.
    let histories = h.backend.infer_history.lock().unwrap();
    assert_eq!(histories[1].len(), 3);
}
