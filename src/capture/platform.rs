use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use thiserror::Error;
use tokio::sync::mpsc;

use super::source::{CaptureSource, MicDevice};
use super::stream::{MediaStream, MediaTrack};

/// Upper bound on the frame rate requested for non-interactive screen capture.
pub const SCREEN_FRAME_RATE_CAP: u32 = 30;

/// Capture-layer failures surfaced by platform collaborators.
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error("permission denied for {0}")]
    PermissionDenied(String),

    #[error("no matching capture device: {0}")]
    DeviceUnavailable(String),

    #[error("screen share prompt was dismissed")]
    PickerDismissed,

    #[error("capture backend failure: {0}")]
    Backend(String),
}

/// How a microphone stream is requested. Attempts are made in this order and
/// stop at the first success (see `StreamAcquirer::acquire_mic`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MicConstraint {
    /// Require this exact device id; fails if it no longer exists
    Exact(String),
    /// Prefer this device id but accept the platform's substitute
    Preferred(String),
    /// Any microphone the platform offers
    Any,
}

/// Parameters for a direct (non-interactive) screen capture call.
#[derive(Debug, Clone)]
pub struct ScreenRequest {
    /// Concrete enumerated source id
    pub source_id: String,
    /// Frame-rate cap applied to the video track
    pub frame_rate_cap: u32,
    /// Whether to also capture system audio into the stream
    pub system_audio: bool,
}

impl ScreenRequest {
    pub fn new(source_id: impl Into<String>, system_audio: bool) -> Self {
        Self {
            source_id: source_id.into(),
            frame_rate_cap: SCREEN_FRAME_RATE_CAP,
            system_audio,
        }
    }
}

/// State of a platform recorder instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Inactive,
    Recording,
}

/// Platform media collaborator.
///
/// One implementation per capture engine:
/// - native engines wrap the OS screen/mic APIs and hardware encoder
/// - `SimulatedPlatform` synthesizes everything deterministically for
///   development and tests
#[async_trait::async_trait]
pub trait MediaPlatform: Send + Sync {
    /// Enumerate shareable screens and windows. Errors are recovered by the
    /// registry, which degrades to a fallback list.
    async fn enumerate_screens(&self) -> Result<Vec<CaptureSource>>;

    /// Enumerate audio input devices. Labels may be empty until microphone
    /// permission has been granted once.
    async fn enumerate_mics(&self) -> Result<Vec<MicDevice>>;

    /// Request a microphone stream under the given constraint.
    async fn request_mic(&self, constraint: MicConstraint) -> Result<MediaStream, CaptureError>;

    /// Non-interactive capture of a concrete enumerated source.
    async fn request_screen(&self, request: ScreenRequest) -> Result<MediaStream, CaptureError>;

    /// Show the interactive "share a screen" prompt. Resolves when the user
    /// picks a source or dismisses the prompt.
    async fn prompt_picker(&self) -> Result<MediaStream, CaptureError>;

    /// Whether `enumerate_screens` is meaningful here. When false, the
    /// registry advertises a single picker entry instead.
    fn supports_screen_enumeration(&self) -> bool;

    /// Create the audio-processing context used to mix two audio sources
    /// into one track. Created lazily, at most once per session.
    fn create_mixer(&self) -> Result<Box<dyn AudioMixer>, CaptureError>;

    /// Create a fresh recorder instance for one session.
    fn create_recorder(&self) -> Box<dyn StreamRecorder>;

    /// Container extension of recorder output (e.g. "webm").
    fn output_extension(&self) -> &'static str;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Audio mixing context: both audio sources feed one destination whose
/// output track goes into the combined stream.
pub trait AudioMixer: Send {
    /// Connect one source track into the mix. A failure here degrades the
    /// mix; it must not abort the session.
    fn connect(&mut self, track: &MediaTrack) -> Result<(), CaptureError>;

    /// The single mixed output track.
    fn output_track(&self) -> MediaTrack;

    /// Disconnect the destination and release graph resources. Idempotent.
    fn shutdown(&mut self);
}

/// Platform recorder (encoder) driving one session.
///
/// `start` returns a channel receiver delivering encoded chunks roughly every
/// `chunk_interval`; the channel closes once the recorder has stopped and
/// flushed its final chunk.
#[async_trait::async_trait]
pub trait StreamRecorder: Send + Sync {
    async fn start(
        &mut self,
        stream: &MediaStream,
        chunk_interval: Duration,
    ) -> Result<mpsc::Receiver<Vec<u8>>, CaptureError>;

    /// Stop capture and flush. Idempotent once stopped.
    async fn stop(&mut self) -> Result<(), CaptureError>;

    fn state(&self) -> RecorderState;

    /// Container extension of the emitted data.
    fn output_extension(&self) -> &'static str;
}

/// Media platform factory
pub struct PlatformFactory;

impl PlatformFactory {
    /// Create a platform backend by configured name. `screen_names` seeds the
    /// simulated backend's synthetic inventory; native engines enumerate the
    /// OS and ignore it.
    pub fn create(backend: &str, screen_names: &[String]) -> Result<Arc<dyn MediaPlatform>> {
        match backend {
            "simulated" => {
                let mut platform = super::simulated::SimulatedPlatform::new();
                if !screen_names.is_empty() {
                    let screens = screen_names
                        .iter()
                        .enumerate()
                        .map(|(index, name)| CaptureSource {
                            id: format!("screen:{}", index),
                            name: name.clone(),
                            thumbnail: None,
                        })
                        .collect();
                    platform = platform.with_screens(screens);
                }
                Ok(Arc::new(platform))
            }
            other => anyhow::bail!(
                "unknown capture backend '{}' (available: simulated)",
                other
            ),
        }
    }
}
