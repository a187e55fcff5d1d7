use serde::{Deserialize, Serialize};

/// Sentinel source id meaning "defer to the interactive OS share picker"
/// instead of a concrete enumerated screen or window.
pub const PICKER_SOURCE_ID: &str = "picker://screen";

/// A shareable screen or window, as returned by one enumeration call.
/// Identity is `id`; the snapshot is immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSource {
    /// Opaque platform identifier (e.g. "screen:0", "window:1234")
    pub id: String,
    /// Display name shown in the UI
    pub name: String,
    /// Optional preview image bytes (PNG/JPEG), platform-dependent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Vec<u8>>,
}

impl CaptureSource {
    /// Synthetic entry signalling "prompt interactively at record time",
    /// used on platforms without non-interactive screen enumeration.
    pub fn picker_entry() -> Self {
        Self {
            id: PICKER_SOURCE_ID.to_string(),
            name: "Choose at record time".to_string(),
            thumbnail: None,
        }
    }

    pub fn is_picker(&self) -> bool {
        self.id == PICKER_SOURCE_ID
    }
}

/// An audio input device. `device_id` may be a platform default sentinel
/// (empty, "default", "communications"); `label` may be empty until
/// microphone permission has been granted at least once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MicDevice {
    pub device_id: String,
    pub label: String,
}

impl MicDevice {
    /// Whether this device id means "let the platform choose".
    pub fn is_default_sentinel(id: &str) -> bool {
        matches!(id, "" | "default" | "communications")
    }
}

/// Which raw streams a session requests and how they combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Screen video plus microphone audio
    VideoMic,
    /// Screen video only, no audio requested
    VideoOnly,
    /// Microphone only; the combined stream is exactly the mic stream
    AudioOnly,
    /// Screen video plus system audio plus microphone, mixed into one track
    VideoSystem,
}

impl CaptureMode {
    pub fn wants_video(&self) -> bool {
        !matches!(self, CaptureMode::AudioOnly)
    }

    pub fn wants_mic(&self) -> bool {
        matches!(
            self,
            CaptureMode::VideoMic | CaptureMode::AudioOnly | CaptureMode::VideoSystem
        )
    }

    pub fn wants_system_audio(&self) -> bool {
        matches!(self, CaptureMode::VideoSystem)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureMode::VideoMic => "video_mic",
            CaptureMode::VideoOnly => "video_only",
            CaptureMode::AudioOnly => "audio_only",
            CaptureMode::VideoSystem => "video_system",
        }
    }
}

impl std::fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Default for CaptureMode {
    fn default() -> Self {
        CaptureMode::VideoMic
    }
}
