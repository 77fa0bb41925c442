//! Shared test doubles used by unit tests and the integration suite.
//!
//! Fakes for the three device/remote seams: [`Recorder`], [`AudioSink`],
//! and [`SpeechBackend`]. Not part of the public API.

use crate::audio::capture::{RecordedAudio, Recorder};
use crate::audio::playback::AudioSink;
use crate::error::{PracticeError, Result};
use crate::session::messages::{AudioHandle, ChatTurn, SynthesizedSpeech, Topic};
use crate::transport::SpeechBackend;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Scripted recorder.
pub struct FakeRecorder {
    mode: FakeRecorderMode,
    started: bool,
}

enum FakeRecorderMode {
    /// `finish` yields an artifact at this path.
    Returning(PathBuf),
    /// `finish` yields no artifact.
    Empty,
    /// `request_permission` fails.
    Denied,
    /// `start` fails.
    StartFails,
}

impl FakeRecorder {
    /// Recorder whose finalized artifact lives at `path`.
    pub fn returning(path: impl Into<PathBuf>) -> Self {
        Self {
            mode: FakeRecorderMode::Returning(path.into()),
            started: false,
        }
    }

    /// Recorder that captures nothing retrievable.
    pub fn empty() -> Self {
        Self {
            mode: FakeRecorderMode::Empty,
            started: false,
        }
    }

    /// Recorder whose permission request is refused.
    pub fn denied() -> Self {
        Self {
            mode: FakeRecorderMode::Denied,
            started: false,
        }
    }

    /// Recorder whose input stream cannot be created.
    pub fn start_fails() -> Self {
        Self {
            mode: FakeRecorderMode::StartFails,
            started: false,
        }
    }
}

impl Recorder for FakeRecorder {
    fn request_permission(&mut self) -> Result<()> {
        if matches!(self.mode, FakeRecorderMode::Denied) {
            return Err(PracticeError::PermissionDenied(
                "stubbed refusal".to_owned(),
            ));
        }
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if matches!(self.mode, FakeRecorderMode::StartFails) {
            return Err(PracticeError::Audio("stubbed stream failure".to_owned()));
        }
        self.started = true;
        Ok(())
    }

    fn finish(&mut self) -> Result<Option<RecordedAudio>> {
        if !self.started {
            return Err(PracticeError::NoActiveCapture);
        }
        self.started = false;
        match &self.mode {
            FakeRecorderMode::Returning(path) => Ok(Some(RecordedAudio {
                path: path.clone(),
                duration: Duration::from_secs(1),
            })),
            _ => Ok(None),
        }
    }
}

/// Scripted output sink.
pub struct FakeSink {
    mode: FakeSinkMode,
}

enum FakeSinkMode {
    /// Completes immediately.
    Instant,
    /// Blocks until the cancellation token fires.
    UntilCancelled,
    /// Fails to open the stream.
    Failing,
}

impl FakeSink {
    /// Sink that completes every utterance immediately.
    #[must_use]
    pub fn instant() -> Self {
        Self {
            mode: FakeSinkMode::Instant,
        }
    }

    /// Sink that plays forever until interrupted.
    #[must_use]
    pub fn until_cancelled() -> Self {
        Self {
            mode: FakeSinkMode::UntilCancelled,
        }
    }

    /// Sink whose stream cannot be created.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            mode: FakeSinkMode::Failing,
        }
    }
}

impl AudioSink for FakeSink {
    fn play(&self, _samples: &[f32], _sample_rate: u32, cancel: &CancellationToken) -> Result<()> {
        match self.mode {
            FakeSinkMode::Instant => Ok(()),
            FakeSinkMode::UntilCancelled => {
                while !cancel.is_cancelled() {
                    std::thread::sleep(Duration::from_millis(2));
                }
                Ok(())
            }
            FakeSinkMode::Failing => {
                Err(PracticeError::Audio("stubbed output failure".to_owned()))
            }
        }
    }
}

/// Scripted backend recording every call it receives.
pub struct StubBackend {
    transcription: Outcome,
    reply: Outcome,
    synthesis_fails: bool,
    /// History snapshots passed to `infer`, in call order.
    pub infer_history: Mutex<Vec<Vec<ChatTurn>>>,
    /// Topics passed to `infer`, in call order.
    pub infer_topics: Mutex<Vec<Topic>>,
    /// Texts passed to `synthesize`, in call order.
    pub synthesized: Mutex<Vec<String>>,
}

enum Outcome {
    Text(String),
    Fails,
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StubBackend {
    /// Backend that transcribes to `"Hello"` and replies `"Hi there!"`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            transcription: Outcome::Text("Hello".to_owned()),
            reply: Outcome::Text("Hi there!".to_owned()),
            synthesis_fails: false,
            infer_history: Mutex::new(Vec::new()),
            infer_topics: Mutex::new(Vec::new()),
            synthesized: Mutex::new(Vec::new()),
        }
    }

    /// Script the transcription result.
    #[must_use]
    pub fn with_transcription(mut self, text: impl Into<String>) -> Self {
        self.transcription = Outcome::Text(text.into());
        self
    }

    /// Make every transcription call fail.
    #[must_use]
    pub fn with_transcription_error(mut self) -> Self {
        self.transcription = Outcome::Fails;
        self
    }

    /// Script the tutor reply.
    #[must_use]
    pub fn with_reply(mut self, text: impl Into<String>) -> Self {
        self.reply = Outcome::Text(text.into());
        self
    }

    /// Make every inference call fail.
    #[must_use]
    pub fn with_infer_error(mut self) -> Self {
        self.reply = Outcome::Fails;
        self
    }

    /// Make every synthesis call fail.
    #[must_use]
    pub fn with_synthesis_error(mut self) -> Self {
        self.synthesis_fails = true;
        self
    }
}

#[async_trait]
impl SpeechBackend for StubBackend {
    async fn transcribe(&self, _audio: &AudioHandle) -> Result<String> {
        match &self.transcription {
            Outcome::Text(text) => Ok(text.clone()),
            Outcome::Fails => Err(PracticeError::Transcription(
                "stubbed transcription failure".to_owned(),
            )),
        }
    }

    async fn infer(&self, history: &[ChatTurn], topic: Topic) -> Result<String> {
        self.infer_history
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(history.to_vec());
        self.infer_topics
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(topic);
        match &self.reply {
            Outcome::Text(text) => Ok(text.clone()),
            Outcome::Fails => Err(PracticeError::Inference(
                "stubbed inference failure".to_owned(),
            )),
        }
    }

    async fn synthesize(&self, text: &str) -> Result<SynthesizedSpeech> {
        if self.synthesis_fails {
            return Err(PracticeError::Synthesis(
                "stubbed synthesis failure".to_owned(),
            ));
        }
        self.synthesized
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(text.to_owned());
        Ok(SynthesizedSpeech {
            samples: vec![0.0; 320],
            sample_rate: 16_000,
        })
    }
}
