// Stream acquisition: permission priming, device fallback, picker caching.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::select_all;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::platform::{CaptureError, MediaPlatform, MicConstraint, ScreenRequest};
use super::source::MicDevice;
use super::stream::MediaStream;

/// Settle time after an unconstrained permission request, before the device
/// list is trusted to carry labels.
pub const PERMISSION_PRIME_WAIT: Duration = Duration::from_millis(120);

/// A picker-shared stream held until the next recording start claims it.
struct PendingShare {
    stream: MediaStream,
    watcher: JoinHandle<()>,
}

/// Acquires microphone and screen streams from the platform.
///
/// Microphone acquisition runs a fallback chain so a stale saved device id
/// never blocks recording: the exact device first, then the platform's loose
/// match for it, then any available microphone. Screen shares picked ahead of
/// time are cached here and invalidated the moment their surface goes away.
pub struct StreamAcquirer {
    platform: Arc<dyn MediaPlatform>,
    pending: Arc<Mutex<Option<PendingShare>>>,
}

impl StreamAcquirer {
    pub fn new(platform: Arc<dyn MediaPlatform>) -> Self {
        Self {
            platform,
            pending: Arc::new(Mutex::new(None)),
        }
    }

    /// Acquire a microphone stream, honoring a saved device preference.
    ///
    /// Tries the preferred device as an exact constraint, then as a loose
    /// one, then falls back to any microphone. Individual failures are logged
    /// and swallowed; only exhausting the whole chain is an error.
    pub async fn acquire_mic(
        &self,
        preferred: Option<&str>,
    ) -> Result<MediaStream, CaptureError> {
        self.prime_permission_if_needed().await;

        let mut attempts = Vec::new();
        if let Some(id) = preferred {
            if !MicDevice::is_default_sentinel(id) {
                attempts.push(MicConstraint::Exact(id.to_string()));
                attempts.push(MicConstraint::Preferred(id.to_string()));
            }
        }
        attempts.push(MicConstraint::Any);

        let mut last_err = None;
        for constraint in attempts {
            match self.platform.request_mic(constraint.clone()).await {
                Ok(stream) => {
                    debug!("microphone acquired via {:?}", constraint);
                    return Ok(stream);
                }
                Err(e) => {
                    warn!("microphone request {:?} failed: {}", constraint, e);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| CaptureError::DeviceUnavailable("no microphone".to_string())))
    }

    /// Acquire a screen stream for an enumerated source id.
    pub async fn acquire_screen(
        &self,
        source_id: &str,
        system_audio: bool,
    ) -> Result<MediaStream, CaptureError> {
        self.platform
            .request_screen(ScreenRequest::new(source_id, system_audio))
            .await
    }

    /// Prompt the system share picker.
    pub async fn prompt_picker(&self) -> Result<MediaStream, CaptureError> {
        self.platform.prompt_picker().await
    }

    /// Prompt the picker and hold the shared stream for the next start.
    ///
    /// The cached stream is dropped automatically if its surface ends before
    /// anyone claims it (the shared window closes, the share is revoked).
    pub async fn prompt_and_cache(&self) -> Result<(), CaptureError> {
        let stream = self.platform.prompt_picker().await?;
        let watcher = self.spawn_ended_watcher(&stream);

        let mut pending = self.pending.lock().unwrap();
        if let Some(old) = pending.take() {
            debug!("replacing previously cached picker share");
            old.watcher.abort();
            old.stream.stop_all();
        }
        *pending = Some(PendingShare { stream, watcher });
        Ok(())
    }

    pub fn has_pending(&self) -> bool {
        self.pending.lock().unwrap().is_some()
    }

    /// Claim the cached picker stream, if one is still alive.
    pub fn take_pending(&self) -> Option<MediaStream> {
        let share = self.pending.lock().unwrap().take()?;
        share.watcher.abort();
        Some(share.stream)
    }

    /// Discard the cached picker stream and stop its tracks.
    pub fn release_pending(&self) {
        if let Some(share) = self.pending.lock().unwrap().take() {
            share.watcher.abort();
            share.stream.stop_all();
        }
    }

    /// Unconstrained microphone request that exists only to surface the
    /// permission prompt, taken when every enumerated label is blank. The
    /// granted stream is stopped immediately; a short settle wait follows so
    /// re-enumeration sees labeled devices.
    async fn prime_permission_if_needed(&self) {
        let devices = match self.platform.enumerate_mics().await {
            Ok(devices) => devices,
            Err(e) => {
                warn!("microphone enumeration failed before priming: {:#}", e);
                return;
            }
        };
        if devices.is_empty() || devices.iter().any(|d| !d.label.is_empty()) {
            return;
        }

        debug!("all microphone labels blank, priming permission");
        match self.platform.request_mic(MicConstraint::Any).await {
            Ok(stream) => stream.stop_all(),
            Err(e) => warn!("permission priming request failed: {}", e),
        }
        tokio::time::sleep(PERMISSION_PRIME_WAIT).await;
    }

    fn spawn_ended_watcher(&self, stream: &MediaStream) -> JoinHandle<()> {
        let signals: Vec<_> = stream
            .tracks()
            .iter()
            .map(|t| Box::pin(t.on_ended().fired()))
            .collect();
        let stream_id = stream.id().to_string();
        let pending = Arc::clone(&self.pending);

        tokio::spawn(async move {
            if signals.is_empty() {
                return;
            }
            select_all(signals).await;

            let mut guard = pending.lock().unwrap();
            let matches = guard
                .as_ref()
                .map(|share| share.stream.id() == stream_id)
                .unwrap_or(false);
            if matches {
                if let Some(share) = guard.take() {
                    info!("cached picker share ended before use, discarding");
                    share.stream.stop_all();
                }
            }
        })
    }
}
