//! Error types for the conversation practice pipeline.

/// Top-level error type for the practice session system.
#[derive(Debug, thiserror::Error)]
pub enum PracticeError {
    /// Microphone permission was refused or revoked.
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    /// A recording unit is already active.
    #[error("recording device busy: {0}")]
    DeviceBusy(String),

    /// `end_capture` was called with no recording in progress.
    #[error("no active capture")]
    NoActiveCapture,

    /// The recorder finalized without producing a retrievable artifact.
    #[error("recording handle unavailable: {0}")]
    HandleUnavailable(String),

    /// Speech-to-text request failed.
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Chat completion request failed.
    #[error("inference error: {0}")]
    Inference(String),

    /// Text-to-speech request or decode failed.
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// A session operation was issued in a state that does not accept it.
    #[error("invalid session state: expected {expected}, was {actual}")]
    InvalidState {
        /// The state the operation requires.
        expected: &'static str,
        /// The state the controller was actually in.
        actual: String,
    },

    /// Audio device or stream error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PracticeError {
    /// Returns true if this error represents a transient failure that the
    /// user can resolve by retrying the turn.
    ///
    /// Capture and remote-call failures are transient (try the turn again);
    /// state-machine misuse and configuration problems are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::PermissionDenied(_)
            | Self::DeviceBusy(_)
            | Self::HandleUnavailable(_)
            | Self::Transcription(_)
            | Self::Inference(_)
            | Self::Synthesis(_)
            | Self::Audio(_)
            | Self::Io(_) => true,
            Self::NoActiveCapture | Self::InvalidState { .. } | Self::Config(_) => false,
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, PracticeError>;
