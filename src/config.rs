//! Configuration types for the practice session engine.

use crate::error::{PracticeError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
///
/// Persisted externally by the settings collaborator; the engine reads the
/// resolved values at call time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Remote backend settings (host, key, models).
    pub api: ApiConfig,
    /// Speech output settings (voice, rate, pitch, auto-play).
    pub speech: SpeechSettings,
    /// Audio capture settings.
    pub audio: AudioConfig,
    /// Conversation shaping settings.
    pub conversation: ConversationConfig,
}

/// Remote backend configuration.
///
/// One OpenAI-style backend serves all three operations (transcription,
/// chat completion, speech synthesis); any compatible host works.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Backend base URL.
    pub api_url: String,
    /// Bearer token reference.
    pub api_key: ApiSecret,
    /// Chat completion model.
    pub chat_model: String,
    /// Speech-to-text model.
    pub transcription_model: String,
    /// Text-to-speech model.
    pub speech_model: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com".to_owned(),
            api_key: ApiSecret::None,
            chat_model: "gpt-4-turbo".to_owned(),
            transcription_model: "whisper-1".to_owned(),
            speech_model: "tts-1".to_owned(),
        }
    }
}

/// Secret reference for the backend API key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiSecret {
    /// No API key.
    #[default]
    None,
    /// Inline literal key (discouraged; use env when possible).
    Literal { value: String },
    /// Resolve the key from an environment variable.
    Env { var: String },
}

impl ApiSecret {
    /// Resolve the secret to a key string, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if an `Env` reference names a missing or empty
    /// variable.
    pub fn resolve(&self) -> Result<Option<String>> {
        match self {
            Self::None => Ok(None),
            Self::Literal { value } => Ok(Some(value.clone())),
            Self::Env { var } => {
                let value = std::env::var(var).map_err(|_| {
                    PracticeError::Config(format!("api key env var is missing: {var}"))
                })?;
                if value.trim().is_empty() {
                    return Err(PracticeError::Config(format!(
                        "api key env var is empty: {var}"
                    )));
                }
                Ok(Some(value))
            }
        }
    }
}

/// Speech output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechSettings {
    /// Play the tutor reply aloud as soon as it arrives.
    pub auto_play: bool,
    /// Synthesis voice name.
    pub voice: String,
    /// Playback speed.
    pub rate: SpeechRate,
    /// Playback pitch.
    pub pitch: SpeechPitch,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            auto_play: true,
            voice: "alloy".to_owned(),
            rate: SpeechRate::Normal,
            pitch: SpeechPitch::Normal,
        }
    }
}

/// Speech rate presets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechRate {
    /// Slower than natural, for careful listening.
    Slow,
    /// Natural pace.
    #[default]
    Normal,
    /// Faster than natural.
    Fast,
}

impl SpeechRate {
    /// Speed multiplier sent to the synthesis backend.
    #[must_use]
    pub fn speed_factor(self) -> f32 {
        match self {
            Self::Slow => 0.8,
            Self::Normal => 1.0,
            Self::Fast => 1.25,
        }
    }
}

/// Speech pitch presets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechPitch {
    /// Lower voice.
    Low,
    /// Unmodified voice.
    #[default]
    Normal,
    /// Higher voice.
    High,
}

impl SpeechPitch {
    /// Varispeed factor applied at the output sink.
    ///
    /// The synthesis API has no pitch parameter, so pitch shifting is done
    /// by scaling the playback rate.
    #[must_use]
    pub fn varispeed_factor(self) -> f32 {
        match self {
            Self::Low => 0.85,
            Self::Normal => 1.0,
            Self::High => 1.15,
        }
    }
}

/// Audio capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Target sample rate for recordings in Hz.
    pub input_sample_rate: u32,
    /// Input device name (None = system default).
    pub input_device: Option<String>,
    /// Directory for finalized recordings (None = platform data dir).
    pub recordings_dir: Option<PathBuf>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16_000,
            input_device: None,
            recordings_dir: None,
        }
    }
}

impl AudioConfig {
    /// Directory where finalized recordings are written.
    #[must_use]
    pub fn resolved_recordings_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.recordings_dir {
            return dir.clone();
        }
        dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("parlo")
            .join("recordings")
    }
}

/// Conversation shaping configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Sampling temperature for the tutor reply (0.0 = greedy).
    pub temperature: f64,
    /// Maximum history messages sent with each inference call (0 = unlimited).
    pub max_history_messages: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_history_messages: 24,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// missing fields, and validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if a value
    /// is out of range.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| PracticeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot
    /// be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| PracticeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/parlo/config.toml`.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("parlo")
            .join("config.toml")
    }

    /// Check every recognized option for a usable value.
    ///
    /// # Errors
    ///
    /// Returns the first out-of-range or empty value found.
    pub fn validate(&self) -> Result<()> {
        if self.api.api_url.trim().is_empty() {
            return Err(PracticeError::Config("api_url is empty".to_owned()));
        }
        if self.api.chat_model.trim().is_empty() {
            return Err(PracticeError::Config("chat_model is empty".to_owned()));
        }
        if self.api.transcription_model.trim().is_empty() {
            return Err(PracticeError::Config(
                "transcription_model is empty".to_owned(),
            ));
        }
        if self.api.speech_model.trim().is_empty() {
            return Err(PracticeError::Config("speech_model is empty".to_owned()));
        }
        if self.speech.voice.trim().is_empty() {
            return Err(PracticeError::Config("voice is empty".to_owned()));
        }
        if self.audio.input_sample_rate == 0 {
            return Err(PracticeError::Config(
                "input_sample_rate must be positive".to_owned(),
            ));
        }
        if !(0.0..=2.0).contains(&self.conversation.temperature) {
            return Err(PracticeError::Config(format!(
                "temperature out of range (0.0..=2.0): {}",
                self.conversation.temperature
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    struct EnvGuard {
        key: &'static str,
        old: Option<std::ffi::OsString>,
    }

    impl EnvGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let old = std::env::var_os(key);
            unsafe { std::env::set_var(key, value) };
            Self { key, old }
        }

        fn unset(key: &'static str) -> Self {
            let old = std::env::var_os(key);
            unsafe { std::env::remove_var(key) };
            Self { key, old }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.old {
                Some(v) => unsafe { std::env::set_var(self.key, v) },
                None => unsafe { std::env::remove_var(self.key) },
            }
        }
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert!(config.speech.auto_play);
        assert_eq!(config.audio.input_sample_rate, 16_000);
        assert!((config.conversation.temperature - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.speech.rate = SpeechRate::Fast;
        config.speech.auto_play = false;
        config.conversation.temperature = 0.9;
        config.save_to_file(&path).unwrap();

        let loaded = AppConfig::from_file(&path).unwrap();
        assert_eq!(loaded.speech.rate, SpeechRate::Fast);
        assert!(!loaded.speech.auto_play);
        assert!((loaded.conversation.temperature - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[speech]\nauto_play = false\n").unwrap();

        let loaded = AppConfig::from_file(&path).unwrap();
        assert!(!loaded.speech.auto_play);
        assert_eq!(loaded.api.transcription_model, "whisper-1");
    }

    #[test]
    fn validate_rejects_out_of_range_temperature() {
        let mut config = AppConfig::default();
        config.conversation.temperature = 3.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_api_url() {
        let mut config = AppConfig::default();
        config.api.api_url = "  ".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn secret_env_resolves() {
        let _env = EnvGuard::set("PARLO_TEST_API_KEY", "sk-test-123");
        let secret = ApiSecret::Env {
            var: "PARLO_TEST_API_KEY".to_owned(),
        };
        assert_eq!(secret.resolve().unwrap(), Some("sk-test-123".to_owned()));
    }

    #[test]
    fn secret_env_missing_errors() {
        let _env = EnvGuard::unset("PARLO_TEST_API_KEY_MISSING");
        let secret = ApiSecret::Env {
            var: "PARLO_TEST_API_KEY_MISSING".to_owned(),
        };
        assert!(secret.resolve().is_err());
    }

    #[test]
    fn secret_none_resolves_to_none() {
        assert_eq!(ApiSecret::None.resolve().unwrap(), None);
    }

    #[test]
    fn rate_and_pitch_factors_are_ordered() {
        assert!(SpeechRate::Slow.speed_factor() < SpeechRate::Normal.speed_factor());
        assert!(SpeechRate::Normal.speed_factor() < SpeechRate::Fast.speed_factor());
        assert!(SpeechPitch::Low.varispeed_factor() < SpeechPitch::High.varispeed_factor());
    }

    #[test]
    fn recordings_dir_override_wins() {
        let mut config = AudioConfig::default();
        config.recordings_dir = Some(PathBuf::from("/tmp/practice-recordings"));
        assert_eq!(
            config.resolved_recordings_dir(),
            PathBuf::from("/tmp/practice-recordings")
        );
    }
}
