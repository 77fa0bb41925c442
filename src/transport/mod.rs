//! Remote backend adapter for the three pipeline operations.
//!
//! One trait wraps transcription, chat completion, and speech synthesis
//! behind a uniform asynchronous contract with typed failures. The adapter
//! performs exactly one remote call per operation and classifies its
//! outcome — retry policy belongs to the session controller.

pub mod openai;

pub use openai::OpenAiBackend;

use crate::error::Result;
use crate::session::messages::{AudioHandle, ChatTurn, SynthesizedSpeech, Topic};
use async_trait::async_trait;

/// Asynchronous contract to the speech/chat backend.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Transcribe a finalized recording to text.
    ///
    /// The audio handle is only read, never consumed — on failure it remains
    /// valid for a retry.
    ///
    /// # Errors
    ///
    /// Returns [`PracticeError::Transcription`](crate::PracticeError::Transcription)
    /// on network failure, a non-success status, or a malformed response.
    async fn transcribe(&self, audio: &AudioHandle) -> Result<String>;

    /// Produce the tutor reply for the given history and topic.
    ///
    /// The full ordered history is sent together with the fixed tutor
    /// persona as the system message.
    ///
    /// # Errors
    ///
    /// Returns [`PracticeError::Inference`](crate::PracticeError::Inference);
    /// callers substitute a fallback reply rather than surfacing the raw
    /// failure in the message log.
    async fn infer(&self, history: &[ChatTurn], topic: Topic) -> Result<String>;

    /// Convert text into decoded speech samples.
    ///
    /// # Errors
    ///
    /// Returns [`PracticeError::Synthesis`](crate::PracticeError::Synthesis).
    async fn synthesize(&self, text: &str) -> Result<SynthesizedSpeech>;
}

/// Build the tutor persona system prompt for the selected topic.
#[must_use]
pub fn tutor_system_prompt(topic: Topic) -> String {
    format!(
        "You are a friendly, patient spoken-language tutor. Your goal is to \
         help the student improve their conversational skills. Reply in \
         simple, natural language, gently correct the student's mistakes, \
         and offer advice on pronunciation, grammar, and phrasing when it \
         helps. Keep your replies short enough to be spoken aloud. Today's \
         practice topic is {}.",
        topic.prompt_hint()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_mentions_topic() {
        let prompt = tutor_system_prompt(Topic::JobInterview);
        assert!(prompt.contains("job interview"));
    }

    #[test]
    fn system_prompt_differs_per_topic() {
        assert_ne!(
            tutor_system_prompt(Topic::Travel),
            tutor_system_prompt(Topic::Shopping)
        );
    }
}
