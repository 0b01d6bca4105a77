//! Device capture and playback.
//!
//! [`MediaSource`] is the getUserMedia-equivalent seam: acquiring returns a
//! [`MediaStream`] of live tracks, or a typed error when no device is
//! available or permission is denied. [`DeviceSource`] is the real
//! implementation over cpal; tests substitute their own source.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use unitynets_shared::types::CallType;

use crate::stream::{MediaStream, MediaTrack, TrackKind};

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No input device available")]
    NoInputDevice,

    #[error("No output device available")]
    NoOutputDevice,

    #[error("Audio device error: {0}")]
    DeviceError(String),

    #[error("Audio stream error: {0}")]
    StreamError(String),
}

#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub frame_size_ms: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 1,
            frame_size_ms: 20,
        }
    }
}

impl AudioConfig {
    pub fn frame_size_samples(&self) -> usize {
        (self.sample_rate as usize * self.frame_size_ms as usize) / 1000
    }
}

/// Acquire local capture streams for a call attempt.
///
/// Exactly one acquisition happens per call attempt, and every exit path of
/// the call must stop the returned tracks.
pub trait MediaSource: Send + Sync {
    fn acquire(&self, call_type: CallType) -> Result<MediaStream, CaptureError>;
}

/// Outbound frame channel depth between the device callback and the
/// connection that drains it.
const FRAME_BUFFER: usize = 64;

/// Real device source over cpal.
///
/// Acquisition starts microphone capture immediately (the acquired track's
/// flags mute and stop it); captured frames flow out through the receiver
/// returned by [`DeviceSource::new`], which the embedding connection
/// drains. The camera side carries only the track handle; video frame
/// capture is the platform pipeline's job.
pub struct DeviceSource {
    engine: CaptureEngine,
    frame_tx: tokio::sync::mpsc::Sender<Vec<f32>>,
}

impl DeviceSource {
    pub fn new(config: AudioConfig) -> (Self, tokio::sync::mpsc::Receiver<Vec<f32>>) {
        let (frame_tx, frame_rx) = tokio::sync::mpsc::channel(FRAME_BUFFER);
        (
            Self {
                engine: CaptureEngine::new(config),
                frame_tx,
            },
            frame_rx,
        )
    }

    /// Play remote audio frames on the default output device until `live`
    /// is cleared (the remote audio track's liveness).
    pub fn play_remote(
        &self,
        frames: tokio::sync::mpsc::Receiver<Vec<f32>>,
        live: Arc<AtomicBool>,
    ) -> Result<(), CaptureError> {
        self.engine.start_playback(frames, live)
    }
}

impl MediaSource for DeviceSource {
    fn acquire(&self, call_type: CallType) -> Result<MediaStream, CaptureError> {
        let audio = MediaTrack::new(TrackKind::Audio);
        self.engine.start_capture(&audio, self.frame_tx.clone())?;

        let mut tracks = vec![audio];
        if call_type.has_video() {
            tracks.push(MediaTrack::new(TrackKind::Video));
        }

        debug!(call_type = %call_type, tracks = tracks.len(), "acquired local media");
        Ok(MediaStream::new(tracks))
    }
}

/// Pumps microphone frames and speaker playback for a connected call.
pub struct CaptureEngine {
    config: AudioConfig,
}

impl CaptureEngine {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }

    /// Start capturing the given audio track into `frame_tx`.
    ///
    /// The device callback honors the track's shared flags: a stopped track
    /// turns the callback into a no-op, a disabled track produces silence so
    /// playback timing on the far side stays intact.
    pub fn start_capture(
        &self,
        track: &MediaTrack,
        frame_tx: tokio::sync::mpsc::Sender<Vec<f32>>,
    ) -> Result<(), CaptureError> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(CaptureError::NoInputDevice)?;

        info!(device = ?device.name(), "Using input device");

        let config = cpal::StreamConfig {
            channels: self.config.channels,
            sample_rate: cpal::SampleRate(self.config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let frame_size = self.config.frame_size_samples();
        let mut buffer = Vec::with_capacity(frame_size);
        let enabled = track.enabled_flag();
        let live = track.live_flag();

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    if !live.load(Ordering::Relaxed) {
                        return;
                    }
                    if enabled.load(Ordering::Relaxed) {
                        buffer.extend_from_slice(data);
                    } else {
                        // Muted: send silence so playback stays in sync
                        let silence_to = buffer.len() + data.len();
                        buffer.resize(silence_to, 0.0f32);
                    }
                    while buffer.len() >= frame_size {
                        let frame: Vec<f32> = buffer.drain(..frame_size).collect();
                        if frame_tx.try_send(frame).is_err() {
                            warn!("Audio frame channel full, dropping frame");
                        }
                    }
                },
                move |err| {
                    error!("Audio input error: {err}");
                },
                None,
            )
            .map_err(|e| CaptureError::StreamError(e.to_string()))?;

        stream
            .play()
            .map_err(|e| CaptureError::StreamError(e.to_string()))?;

        // Keep stream alive (cleaned up via the live flag — callback becomes a no-op)
        std::mem::forget(stream);

        debug!("Audio capture started");
        Ok(())
    }

    /// Start playing remote audio frames on the default output device.
    ///
    /// `live` gates the bridge task; it is the remote stream's audio-track
    /// liveness, cleared when the call tears down.
    pub fn start_playback(
        &self,
        mut frame_rx: tokio::sync::mpsc::Receiver<Vec<f32>>,
        live: Arc<AtomicBool>,
    ) -> Result<(), CaptureError> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(CaptureError::NoOutputDevice)?;

        info!(device = ?device.name(), "Using output device");

        let config = cpal::StreamConfig {
            channels: self.config.channels,
            sample_rate: cpal::SampleRate(self.config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (playback_tx, playback_rx) = std::sync::mpsc::channel::<Vec<f32>>();

        // Bridge tokio channel to std channel for the audio callback
        let live_bridge = live.clone();
        tokio::spawn(async move {
            while live_bridge.load(Ordering::Relaxed) {
                match frame_rx.recv().await {
                    Some(frame) => {
                        if playback_tx.send(frame).is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        });

        let mut play_buffer: std::collections::VecDeque<f32> = std::collections::VecDeque::new();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    // Drain available frames into play buffer
                    while let Ok(frame) = playback_rx.try_recv() {
                        play_buffer.extend(frame.iter());
                    }

                    for sample in data.iter_mut() {
                        *sample = play_buffer.pop_front().unwrap_or(0.0);
                    }
                },
                move |err| {
                    error!("Audio output error: {err}");
                },
                None,
            )
            .map_err(|e| CaptureError::StreamError(e.to_string()))?;

        stream
            .play()
            .map_err(|e| CaptureError::StreamError(e.to_string()))?;

        std::mem::forget(stream);
        debug!("Audio playback started");
        Ok(())
    }
}
