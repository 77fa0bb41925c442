//! Microphone capture controller.
//!
//! Owns the recording-unit lifecycle: permission acquisition, the
//! {NotCapturing} → {Capturing} → {NotCapturing} state machine, and the
//! finalized WAV artifact. The concrete recorder sits behind the
//! [`Recorder`] trait so tests can inject a fake; [`CpalRecorder`] is the
//! real implementation, capturing at the device's native sample rate and
//! downsampling to the configured rate.

use crate::audio::{AudioSession, SessionProfile};
use crate::config::AudioConfig;
use crate::error::{PracticeError, Result};
use crate::session::messages::AudioHandle;
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Device-facing recording backend.
///
/// One recording unit at a time; the controller enforces the lifecycle.
pub trait Recorder: Send {
    /// Acquire (or verify) microphone permission.
    ///
    /// # Errors
    ///
    /// Returns [`PracticeError::PermissionDenied`] if the microphone is not
    /// available to this process.
    fn request_permission(&mut self) -> Result<()>;

    /// Start a new recording unit.
    ///
    /// # Errors
    ///
    /// Returns an error if the input stream cannot be created.
    fn start(&mut self) -> Result<()>;

    /// Finalize the recording unit and return the artifact location.
    ///
    /// `Ok(None)` means the recorder produced no retrievable audio (for
    /// example, zero captured frames); the caller treats this as an empty
    /// result, not a crash.
    ///
    /// # Errors
    ///
    /// Returns an error if finalization itself fails.
    fn finish(&mut self) -> Result<Option<RecordedAudio>>;
}

/// Finalized artifact produced by a [`Recorder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAudio {
    /// Location of the WAV file.
    pub path: PathBuf,
    /// Recorded duration, derived from the captured frame count.
    pub duration: Duration,
}

enum CaptureState {
    NotCapturing,
    Capturing { started_at: Instant },
}

/// Recording lifecycle controller.
///
/// No nested or concurrent capture sessions: `begin_capture` while a unit
/// is active is a usage error, not silently ignored.
pub struct CaptureController {
    recorder: Box<dyn Recorder>,
    session: AudioSession,
    state: CaptureState,
}

impl CaptureController {
    /// Create a controller over the given recorder and shared audio session.
    #[must_use]
    pub fn new(recorder: Box<dyn Recorder>, session: AudioSession) -> Self {
        Self {
            recorder,
            session,
            state: CaptureState::NotCapturing,
        }
    }

    /// Begin a new recording unit.
    ///
    /// Requests microphone permission if not already granted, switches the
    /// audio session to the capture profile, and starts recording.
    ///
    /// # Errors
    ///
    /// - [`PracticeError::DeviceBusy`] if a unit is already active.
    /// - [`PracticeError::PermissionDenied`] if the microphone is refused.
    /// - [`PracticeError::Audio`] if the input stream cannot be created.
    pub fn begin_capture(&mut self) -> Result<()> {
        if matches!(self.state, CaptureState::Capturing { .. }) {
            return Err(PracticeError::DeviceBusy(
                "a recording unit is already active".to_owned(),
            ));
        }

        self.recorder.request_permission()?;
        self.session.configure(SessionProfile::Capture);

        if let Err(e) = self.recorder.start() {
            // Failed to record: hand the audio session straight back.
            self.session.configure(SessionProfile::PlaybackOnly);
            return Err(e);
        }

        self.state = CaptureState::Capturing {
            started_at: Instant::now(),
        };
        info!("recording started");
        Ok(())
    }

    /// Finalize the active recording unit and return its audio handle.
    ///
    /// The audio session is restored to the playback-only profile whether or
    /// not finalization succeeds.
    ///
    /// # Errors
    ///
    /// - [`PracticeError::NoActiveCapture`] if nothing is in progress.
    /// - [`PracticeError::HandleUnavailable`] if the recorder produced no
    ///   retrievable artifact.
    pub fn end_capture(&mut self) -> Result<AudioHandle> {
        if !matches!(self.state, CaptureState::Capturing { .. }) {
            return Err(PracticeError::NoActiveCapture);
        }
        self.state = CaptureState::NotCapturing;

        let finished = self.recorder.finish();
        self.session.configure(SessionProfile::PlaybackOnly);

        match finished? {
            Some(recorded) => {
                info!(
                    "recording finalized: {:.1}s at {}",
                    recorded.duration.as_secs_f32(),
                    recorded.path.display()
                );
                Ok(AudioHandle {
                    path: recorded.path,
                    duration: recorded.duration,
                })
            }
            None => Err(PracticeError::HandleUnavailable(
                "recorder produced no audio".to_owned(),
            )),
        }
    }

    /// Whether a recording unit is currently active.
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        matches!(self.state, CaptureState::Capturing { .. })
    }

    /// Time since the active recording unit started, for the UI timer.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        match self.state {
            CaptureState::Capturing { started_at } => Some(started_at.elapsed()),
            CaptureState::NotCapturing => None,
        }
    }
}

/// Commands sent to the capture thread.
enum RecorderCommand {
    Stop,
}

struct ActiveStream {
    cmd_tx: mpsc::Sender<RecorderCommand>,
    join: std::thread::JoinHandle<()>,
    samples: Arc<Mutex<Vec<f32>>>,
}

/// Microphone recorder using cpal.
///
/// The cpal stream is not `Send`, so it lives on a dedicated thread for the
/// duration of the recording unit; samples accumulate in a shared buffer
/// and are written out as a WAV file on `finish`.
pub struct CpalRecorder {
    config: AudioConfig,
    active: Option<ActiveStream>,
}

impl CpalRecorder {
    /// Create a recorder for the configured input device.
    #[must_use]
    pub fn new(config: AudioConfig) -> Self {
        Self {
            config,
            active: None,
        }
    }

    fn open_device(config: &AudioConfig) -> Result<cpal::Device> {
        let host = cpal::default_host();
        if let Some(ref name) = config.input_device {
            host.input_devices()
                .map_err(|e| PracticeError::Audio(format!("cannot enumerate devices: {e}")))?
                .find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name() == name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| PracticeError::Audio(format!("input device '{name}' not found")))
        } else {
            host.default_input_device().ok_or_else(|| {
                PracticeError::PermissionDenied("no input device available".to_owned())
            })
        }
    }
}

impl Recorder for CpalRecorder {
    fn request_permission(&mut self) -> Result<()> {
        // Desktop hosts surface a refused or revoked microphone permission
        // as an absent input device.
        Self::open_device(&self.config).map(|_| ())
    }

    fn start(&mut self) -> Result<()> {
        if self.active.is_some() {
            return Err(PracticeError::DeviceBusy(
                "recorder already started".to_owned(),
            ));
        }

        let config = self.config.clone();
        let samples = Arc::new(Mutex::new(Vec::new()));
        let samples_thread = Arc::clone(&samples);
        let (cmd_tx, cmd_rx) = mpsc::channel::<RecorderCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

        let join = std::thread::spawn(move || {
            let stream = match build_input_stream(&config, samples_thread) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(PracticeError::Audio(format!(
                    "failed to start input stream: {e}"
                ))));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            // Hold the stream alive until told to stop.
            let _ = cmd_rx.recv();
            drop(stream);
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.active = Some(ActiveStream {
                    cmd_tx,
                    join,
                    samples,
                });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = join.join();
                Err(e)
            }
            Err(_) => {
                let _ = join.join();
                Err(PracticeError::Audio("capture thread died".to_owned()))
            }
        }
    }

    fn finish(&mut self) -> Result<Option<RecordedAudio>> {
        let Some(active) = self.active.take() else {
            return Err(PracticeError::NoActiveCapture);
        };

        let _ = active.cmd_tx.send(RecorderCommand::Stop);
        if active.join.join().is_err() {
            warn!("capture thread panicked during shutdown");
        }

        let samples = match Arc::try_unwrap(active.samples) {
            Ok(mutex) => mutex.into_inner().unwrap_or_default(),
            Err(shared) => shared
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone(),
        };

        if samples.is_empty() {
            debug!("recording finalized with no captured frames");
            return Ok(None);
        }

        let rate = self.config.input_sample_rate;
        let duration = Duration::from_secs_f64(samples.len() as f64 / f64::from(rate));

        let dir = self.config.resolved_recordings_dir();
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("rec-{}.wav", uuid::Uuid::new_v4()));
        write_wav(&path, &samples, rate)?;

        Ok(Some(RecordedAudio { path, duration }))
    }
}

/// Build the cpal input stream, converting to mono at the target rate.
fn build_input_stream(
    config: &AudioConfig,
    samples: Arc<Mutex<Vec<f32>>>,
) -> Result<cpal::Stream> {
    let device = CpalRecorder::open_device(config)?;

    let device_name = device
        .description()
        .map(|d| d.name().to_owned())
        .unwrap_or_else(|_| "<unknown>".into());
    info!("using input device: {device_name}");

    // Use the device's default config for best compatibility, then
    // downsample in software.
    let default_config = device
        .default_input_config()
        .map_err(|e| PracticeError::Audio(format!("no default input config: {e}")))?;
    let native_rate = default_config.sample_rate();
    let native_channels = default_config.channels();
    let target_rate = config.input_sample_rate;

    let stream_config = StreamConfig {
        channels: native_channels,
        sample_rate: native_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    if native_rate != target_rate {
        info!("will downsample from {native_rate}Hz to {target_rate}Hz");
    }

    device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                let mono = if native_channels > 1 {
                    to_mono(data, native_channels)
                } else {
                    data.to_vec()
                };
                let chunk = if native_rate != target_rate {
                    downsample(&mono, native_rate, target_rate)
                } else {
                    mono
                };
                if let Ok(mut buf) = samples.lock() {
                    buf.extend_from_slice(&chunk);
                }
            },
            move |err| {
                warn!("audio input stream error: {err}");
            },
            None,
        )
        .map_err(|e| PracticeError::Audio(format!("failed to build input stream: {e}")))
}

/// Write mono f32 samples as a 16-bit PCM WAV file.
fn write_wav(path: &std::path::Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| PracticeError::Audio(format!("cannot create WAV file: {e}")))?;
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        writer
            .write_sample(value)
            .map_err(|e| PracticeError::Audio(format!("cannot write WAV sample: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| PracticeError::Audio(format!("cannot finalize WAV file: {e}")))?;
    Ok(())
}

/// Convert interleaved multi-channel audio to mono by averaging channels.
fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    let ch = channels as usize;
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Simple linear-interpolation downsampler.
///
/// Sufficient quality for speech capture — no anti-alias filter needed
/// since human speech energy is below 8kHz.
fn downsample(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = f64::from(src_rate) / f64::from(dst_rate);
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            f64::from(samples[idx]) * (1.0 - frac) + f64::from(samples[idx + 1]) * frac
        } else {
            f64::from(samples[idx.min(samples.len() - 1)])
        };

        output.push(sample as f32);
    }

    output
}
