//! Value types passed between the session components.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Who authored a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The practicing user.
    User,
    /// The tutor reply.
    Assistant,
}

impl Role {
    /// Wire name used by the chat completion API.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single immutable entry in the conversation log.
///
/// Messages are append-only and owned by the [`ConversationStore`]; ordering
/// is creation order.
///
/// [`ConversationStore`]: crate::store::ConversationStore
#[derive(Debug, Clone)]
pub struct Message {
    /// Unique opaque identifier.
    pub id: Uuid,
    /// Author of the message.
    pub role: Role,
    /// Textual content.
    pub content: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// The recording this message was transcribed from, if any.
    pub audio: Option<AudioHandle>,
}

impl Message {
    /// Create a new message stamped with a fresh id and the current time.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>, audio: Option<AudioHandle>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            audio,
        }
    }

    /// Role/content projection sent to the chat completion API.
    #[must_use]
    pub fn as_chat_turn(&self) -> ChatTurn {
        ChatTurn {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// One role/content pair of the history sent to the inference backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    /// Author role.
    pub role: Role,
    /// Message text.
    pub content: String,
}

/// Reference to a finalized, storage-backed recording.
///
/// Created when capture finalizes; consumed by transcription; kept on the
/// user message so the recording can be replayed later. The file's lifetime
/// is tied to device storage, not to the pipeline step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioHandle {
    /// Location of the WAV artifact on disk.
    pub path: PathBuf,
    /// Recorded duration.
    pub duration: Duration,
}

/// Synthesized speech returned by the text-to-speech backend, decoded and
/// ready for the output sink.
#[derive(Debug, Clone)]
pub struct SynthesizedSpeech {
    /// Mono f32 samples.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl SynthesizedSpeech {
    /// Playback duration of the decoded audio.
    #[must_use]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

/// Practice topic selected by the user.
///
/// A fixed set; purely a prompt-shaping parameter. The selection survives
/// clearing the conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// Everyday small talk.
    #[default]
    DailyLife,
    /// Trips, directions, hotels.
    Travel,
    /// Interview questions and answers.
    JobInterview,
    /// Stores, prices, returns.
    Shopping,
    /// Ordering at a restaurant.
    DiningOut,
    /// Parties, invitations, meeting people.
    SocialEvents,
    /// Seminar-style discussion.
    AcademicDiscussion,
    /// Describing symptoms, appointments.
    MedicalConsultation,
}

impl Topic {
    /// Every selectable topic, in display order.
    pub const ALL: [Self; 8] = [
        Self::DailyLife,
        Self::Travel,
        Self::JobInterview,
        Self::Shopping,
        Self::DiningOut,
        Self::SocialEvents,
        Self::AcademicDiscussion,
        Self::MedicalConsultation,
    ];

    /// Human-readable label for topic chips.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::DailyLife => "Daily life",
            Self::Travel => "Travel",
            Self::JobInterview => "Job interview",
            Self::Shopping => "Shopping",
            Self::DiningOut => "Dining out",
            Self::SocialEvents => "Social events",
            Self::AcademicDiscussion => "Academic discussion",
            Self::MedicalConsultation => "Medical consultation",
        }
    }

    /// Phrase woven into the tutor system prompt to steer the conversation.
    #[must_use]
    pub fn prompt_hint(self) -> &'static str {
        match self {
            Self::DailyLife => "everyday small talk",
            Self::Travel => "travel situations such as airports, hotels, and asking for directions",
            Self::JobInterview => "job interview questions and answers",
            Self::Shopping => "shopping conversations about products, prices, and returns",
            Self::DiningOut => "ordering food and talking with restaurant staff",
            Self::SocialEvents => "social events, invitations, and meeting new people",
            Self::AcademicDiscussion => "academic discussion and presenting opinions",
            Self::MedicalConsultation => "describing symptoms and talking to medical staff",
        }
    }
}
