//! Media capture layer
//!
//! This module provides everything between the session controller and the
//! platform capture engine:
//! - Track and stream handles with stop/ended lifecycle
//! - Source and microphone discovery with picker fallback
//! - Stream acquisition (permission priming, device fallback, picker cache)
//! - Audio composition into a single recordable stream
//! - The platform trait seam and the simulated in-process implementation

pub mod acquire;
pub mod compose;
pub mod platform;
pub mod registry;
pub mod simulated;
pub mod source;
pub mod stream;

pub use acquire::{StreamAcquirer, PERMISSION_PRIME_WAIT};
pub use compose::{compose, Composition};
pub use platform::{
    AudioMixer, CaptureError, MediaPlatform, MicConstraint, PlatformFactory, RecorderState,
    ScreenRequest, StreamRecorder, SCREEN_FRAME_RATE_CAP,
};
pub use registry::SourceRegistry;
pub use simulated::{PickerBehavior, SimulatedPlatform};
pub use source::{CaptureMode, CaptureSource, MicDevice, PICKER_SOURCE_ID};
pub use stream::{EndedSignal, MediaStream, MediaTrack, TrackKind};
