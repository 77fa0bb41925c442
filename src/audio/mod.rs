//! Audio capture and playback via cpal.

pub mod capture;
pub mod playback;

pub use capture::{CaptureController, CpalRecorder, Recorder};
pub use playback::{AudioSink, CpalSink, PlaybackController};

use std::sync::{Arc, Mutex};

/// Audio routing profile for the process-wide audio session.
///
/// The microphone/audio-session configuration is an exclusive resource:
/// only the capture and playback controllers may reconfigure it, and they
/// never hold conflicting profiles at the same time. Reconfiguration is
/// part of `begin_capture`/`end_capture`, so outside an active capture the
/// session is always in the playback-only profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionProfile {
    /// Output-only routing; recording disabled.
    #[default]
    PlaybackOnly,
    /// Recording enabled, silent-mode override active.
    Capture,
}

/// Shared handle to the process-wide audio session profile.
#[derive(Debug, Clone, Default)]
pub struct AudioSession {
    profile: Arc<Mutex<SessionProfile>>,
}

impl AudioSession {
    /// Create a session in the playback-only profile.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch the session to the given profile.
    pub fn configure(&self, profile: SessionProfile) {
        *self.lock() = profile;
    }

    /// The currently active profile.
    #[must_use]
    pub fn profile(&self) -> SessionProfile {
        *self.lock()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionProfile> {
        self.profile
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
