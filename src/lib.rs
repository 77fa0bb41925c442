//! Parlo: turn-based voice conversation practice engine.
//!
//! This crate is the core of a conversational practice app: the user
//! speaks, speech is transcribed, a language model produces a tutor reply,
//! and the reply is synthesized back to speech.
//!
//! # Architecture
//!
//! One turn flows through four components owned by the session controller:
//! - **Audio capture**: Records a push-to-talk turn from the microphone via
//!   `cpal` into a WAV artifact
//! - **Transport**: Sends transcription, chat completion, and speech
//!   synthesis requests to an OpenAI-compatible backend via `reqwest`
//! - **Playback**: Plays the synthesized reply via `cpal`, one utterance at
//!   a time process-wide
//! - **Store**: Holds the ordered message log and UI indicator flags behind
//!   an observer subscription
//!
//! The session controller enforces the single-flight invariant — at most
//! one turn in progress, never recording and speaking at once — and returns
//! the pipeline to idle on every failure path.

pub mod audio;
pub mod config;
pub mod error;
pub mod session;
pub mod store;
pub mod transport;

#[doc(hidden)]
pub mod test_utils;

pub use config::AppConfig;
pub use error::{PracticeError, Result};
pub use session::messages::{AudioHandle, Message, Role, Topic};
pub use session::{FALLBACK_REPLY, PipelineState, SessionController, TurnOutcome};
pub use store::{ConversationStore, StoreEvent};
pub use transport::SpeechBackend;
