//! OpenAI-compatible backend for transcription, chat completion, and
//! speech synthesis.
//!
//! Works against any host implementing the OpenAI audio and chat APIs.
//! All three operations authenticate with a bearer token resolved from the
//! configured secret at call time.

use crate::config::{ApiConfig, ConversationConfig, SpeechSettings};
use crate::error::{PracticeError, Result};
use crate::session::messages::{AudioHandle, ChatTurn, SynthesizedSpeech, Topic};
use crate::transport::{SpeechBackend, tutor_system_prompt};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Request timeout for all backend calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Backend using an OpenAI-compatible HTTP API.
pub struct OpenAiBackend {
    api: ApiConfig,
    conversation: ConversationConfig,
    speech: SpeechSettings,
    client: reqwest::Client,
}

impl OpenAiBackend {
    /// Create a backend from the configured sections.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        api: ApiConfig,
        conversation: ConversationConfig,
        speech: SpeechSettings,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PracticeError::Config(format!("cannot build HTTP client: {e}")))?;

        info!("backend configured: {} chat={}", api.api_url, api.chat_model);

        Ok(Self {
            api,
            conversation,
            speech,
            client,
        })
    }

    /// Resolve the bearer token and attach it to a request builder.
    fn authorize(&self, req: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        match self.api.api_key.resolve()? {
            Some(key) if !key.is_empty() => Ok(req.bearer_auth(key)),
            _ => Ok(req),
        }
    }

    fn url(&self, path: &str) -> String {
        endpoint(&self.api.api_url, path)
    }

    /// Trim the history to the configured window, keeping the most recent
    /// messages.
    fn windowed<'a>(&self, history: &'a [ChatTurn]) -> &'a [ChatTurn] {
        let max = self.conversation.max_history_messages;
        if max == 0 || history.len() <= max {
            history
        } else {
            &history[history.len() - max..]
        }
    }
}

#[async_trait]
impl SpeechBackend for OpenAiBackend {
    async fn transcribe(&self, audio: &AudioHandle) -> Result<String> {
        let bytes = tokio::fs::read(&audio.path)
            .await
            .map_err(|e| PracticeError::Transcription(format!("cannot read recording: {e}")))?;

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name("recording.wav")
            .mime_str("audio/wav")
            .map_err(|e| PracticeError::Transcription(format!("bad multipart: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.api.transcription_model.clone());

        let started = Instant::now();
        let req = self.client.post(self.url("/v1/audio/transcriptions"));
        let response = self
            .authorize(req)?
            .multipart(form)
            .send()
            .await
            .map_err(|e| PracticeError::Transcription(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PracticeError::Transcription(format!(
                "backend returned {status}: {body}"
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PracticeError::Transcription(format!("malformed response: {e}")))?;
        let text = body["text"]
            .as_str()
            .ok_or_else(|| {
                PracticeError::Transcription("response is missing `text`".to_owned())
            })?
            .to_owned();

        info!(
            "transcribed {:.1}s recording in {:.0}ms: \"{text}\"",
            audio.duration.as_secs_f32(),
            started.elapsed().as_millis()
        );
        Ok(text)
    }

    async fn infer(&self, history: &[ChatTurn], topic: Topic) -> Result<String> {
        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": tutor_system_prompt(topic),
        })];
        messages.extend(self.windowed(history).iter().map(|turn| {
            serde_json::json!({
                "role": turn.role.as_str(),
                "content": turn.content,
            })
        }));

        let body = serde_json::json!({
            "model": self.api.chat_model,
            "messages": messages,
            "temperature": self.conversation.temperature,
        });

        let started = Instant::now();
        let req = self.client.post(self.url("/v1/chat/completions"));
        let response = self
            .authorize(req)?
            .json(&body)
            .send()
            .await
            .map_err(|e| PracticeError::Inference(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PracticeError::Inference(format!(
                "backend returned {status}: {body}"
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PracticeError::Inference(format!("malformed response: {e}")))?;
        let reply = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                PracticeError::Inference("response is missing message content".to_owned())
            })?
            .trim()
            .to_owned();

        info!(
            "tutor reply in {:.1}s ({} history messages)",
            started.elapsed().as_secs_f64(),
            history.len()
        );
        Ok(reply)
    }

    async fn synthesize(&self, text: &str) -> Result<SynthesizedSpeech> {
        let body = serde_json::json!({
            "model": self.api.speech_model,
            "input": text,
            "voice": self.speech.voice,
            "response_format": "wav",
            "speed": self.speech.rate.speed_factor(),
        });

        let started = Instant::now();
        let req = self.client.post(self.url("/v1/audio/speech"));
        let response = self
            .authorize(req)?
            .json(&body)
            .send()
            .await
            .map_err(|e| PracticeError::Synthesis(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PracticeError::Synthesis(format!(
                "backend returned {status}: {body}"
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PracticeError::Synthesis(format!("cannot read audio body: {e}")))?;

        let speech = decode_wav(&bytes)?;
        debug!(
            "synthesized {:.1}s of speech in {:.0}ms",
            speech.duration().as_secs_f32(),
            started.elapsed().as_millis()
        );
        Ok(speech)
    }
}

/// Join the configured base URL with an API path, tolerating bases that
/// already carry a `/v1` suffix or a trailing slash.
fn endpoint(base: &str, path: &str) -> String {
    let base = base.strip_suffix("/v1").unwrap_or(base);
    let base = base.trim_end_matches('/');
    format!("{base}{path}")
}

/// Decode a WAV body into mono f32 samples.
fn decode_wav(bytes: &[u8]) -> Result<SynthesizedSpeech> {
    let reader = hound::WavReader::new(std::io::Cursor::new(bytes))
        .map_err(|e| PracticeError::Synthesis(format!("bad WAV body: {e}")))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| PracticeError::Synthesis(format!("bad WAV samples: {e}")))?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| PracticeError::Synthesis(format!("bad WAV samples: {e}")))?
        }
    };

    let samples = if spec.channels > 1 {
        to_mono(&interleaved, spec.channels)
    } else {
        interleaved
    };

    Ok(SynthesizedSpeech {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Convert interleaved multi-channel audio to mono by averaging channels.
fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    let ch = channels as usize;
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}
