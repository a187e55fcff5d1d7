// Source discovery with graceful degradation.

use std::sync::Arc;

use tracing::warn;

use super::platform::MediaPlatform;
use super::source::{CaptureSource, MicDevice};

/// Lists capturable screens and microphones for the selection UI.
///
/// Enumeration is best-effort: platforms that cannot list screens (or fail
/// while doing so) degrade to a single picker entry, and microphone listing
/// failures degrade to an empty list. Neither path surfaces an error to the
/// caller, since source listing backs a dropdown and not a recording.
pub struct SourceRegistry {
    platform: Arc<dyn MediaPlatform>,
}

impl SourceRegistry {
    pub fn new(platform: Arc<dyn MediaPlatform>) -> Self {
        Self { platform }
    }

    /// Screens and windows available for capture, newest enumeration wins.
    ///
    /// Always returns at least one entry: when the platform cannot enumerate,
    /// the list degrades to the single system picker entry so the user can
    /// still choose a surface at start time.
    pub async fn screen_sources(&self) -> Vec<CaptureSource> {
        if !self.platform.supports_screen_enumeration() {
            return vec![CaptureSource::picker_entry()];
        }

        match self.platform.enumerate_screens().await {
            Ok(sources) if sources.is_empty() => {
                warn!("screen enumeration returned no sources, falling back to picker");
                vec![CaptureSource::picker_entry()]
            }
            Ok(sources) => sources,
            Err(e) => {
                warn!("screen enumeration failed: {:#}, falling back to picker", e);
                vec![CaptureSource::picker_entry()]
            }
        }
    }

    /// Microphone devices, empty when enumeration fails.
    pub async fn mic_devices(&self) -> Vec<MicDevice> {
        match self.platform.enumerate_mics().await {
            Ok(devices) => devices,
            Err(e) => {
                warn!("microphone enumeration failed: {:#}", e);
                Vec::new()
            }
        }
    }
}
