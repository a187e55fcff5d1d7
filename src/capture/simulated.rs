// Deterministic in-process media platform.
//
// Stands in for a native capture engine during development and in tests: it
// synthesizes enumerable sources, hands out real track handles, and its
// recorder emits deterministic chunk bytes on the configured interval.
// Quirk switches (denied permissions, busy recorder, failing mixer) exist so
// the degraded paths of the capture layer can be driven without a real OS.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::platform::{
    AudioMixer, CaptureError, MediaPlatform, MicConstraint, RecorderState, ScreenRequest,
    StreamRecorder,
};
use super::source::{CaptureSource, MicDevice};
use super::stream::{MediaStream, MediaTrack, TrackKind};

/// Payload bytes per synthesized chunk, excluding the 8-byte header.
const CHUNK_PAYLOAD_BYTES: usize = 1024;

/// What the simulated share picker does when prompted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerBehavior {
    /// Share the screen at this inventory index, optionally with audio
    Share { source_index: usize, with_audio: bool },
    /// The user dismisses the prompt
    Cancel,
}

/// Simulated media platform with a configurable device inventory.
pub struct SimulatedPlatform {
    screens: Mutex<Vec<CaptureSource>>,
    mics: Mutex<Vec<MicDevice>>,
    picker: Mutex<PickerBehavior>,

    mic_permission_granted: AtomicBool,
    deny_mic_permission: AtomicBool,
    deny_screen_capture: AtomicBool,
    busy_recorder: AtomicBool,
    fail_mixer_create: AtomicBool,
    mixer_connect_failures: Mutex<HashSet<String>>,

    // Observability for tests: every request and granted stream is recorded.
    mic_requests: Mutex<Vec<MicConstraint>>,
    screen_requests: Mutex<Vec<ScreenRequest>>,
    picker_prompts: AtomicUsize,
    mixers_created: AtomicUsize,
    granted: Mutex<Vec<MediaStream>>,
}

impl SimulatedPlatform {
    pub fn new() -> Self {
        let screens = vec![
            CaptureSource {
                id: "screen:0".to_string(),
                name: "Entire Screen".to_string(),
                thumbnail: Some(thumbnail_bytes(0)),
            },
            CaptureSource {
                id: "window:1".to_string(),
                name: "Application Window".to_string(),
                thumbnail: None,
            },
        ];
        let mics = vec![
            MicDevice {
                device_id: "default".to_string(),
                label: "Default - Built-in Microphone".to_string(),
            },
            MicDevice {
                device_id: "mic-builtin".to_string(),
                label: "Built-in Microphone".to_string(),
            },
            MicDevice {
                device_id: "mic-usb".to_string(),
                label: "USB Condenser Microphone".to_string(),
            },
        ];

        Self {
            screens: Mutex::new(screens),
            mics: Mutex::new(mics),
            picker: Mutex::new(PickerBehavior::Share {
                source_index: 0,
                with_audio: false,
            }),
            mic_permission_granted: AtomicBool::new(false),
            deny_mic_permission: AtomicBool::new(false),
            deny_screen_capture: AtomicBool::new(false),
            busy_recorder: AtomicBool::new(false),
            fail_mixer_create: AtomicBool::new(false),
            mixer_connect_failures: Mutex::new(HashSet::new()),
            mic_requests: Mutex::new(Vec::new()),
            screen_requests: Mutex::new(Vec::new()),
            picker_prompts: AtomicUsize::new(0),
            mixers_created: AtomicUsize::new(0),
            granted: Mutex::new(Vec::new()),
        }
    }

    pub fn with_screens(self, screens: Vec<CaptureSource>) -> Self {
        *self.screens.lock().unwrap() = screens;
        self
    }

    pub fn with_mics(self, mics: Vec<MicDevice>) -> Self {
        *self.mics.lock().unwrap() = mics;
        self
    }

    pub fn set_picker_behavior(&self, behavior: PickerBehavior) {
        *self.picker.lock().unwrap() = behavior;
    }

    /// Pretend microphone permission was granted in an earlier run, so
    /// enumeration exposes labels without priming.
    pub fn grant_mic_permission(&self) {
        self.mic_permission_granted.store(true, Ordering::SeqCst);
    }

    pub fn set_deny_mic_permission(&self, deny: bool) {
        self.deny_mic_permission.store(deny, Ordering::SeqCst);
    }

    pub fn set_deny_screen_capture(&self, deny: bool) {
        self.deny_screen_capture.store(deny, Ordering::SeqCst);
    }

    /// Make every recorder created from here report a non-inactive state.
    pub fn set_busy_recorder(&self, busy: bool) {
        self.busy_recorder.store(busy, Ordering::SeqCst);
    }

    pub fn set_fail_mixer_create(&self, fail: bool) {
        self.fail_mixer_create.store(fail, Ordering::SeqCst);
    }

    /// Connecting a track with this label into the mixer will fail.
    pub fn add_mixer_connect_failure(&self, label: impl Into<String>) {
        self.mixer_connect_failures
            .lock()
            .unwrap()
            .insert(label.into());
    }

    pub fn mic_requests(&self) -> Vec<MicConstraint> {
        self.mic_requests.lock().unwrap().clone()
    }

    pub fn screen_requests(&self) -> Vec<ScreenRequest> {
        self.screen_requests.lock().unwrap().clone()
    }

    pub fn picker_prompt_count(&self) -> usize {
        self.picker_prompts.load(Ordering::SeqCst)
    }

    pub fn mixers_created(&self) -> usize {
        self.mixers_created.load(Ordering::SeqCst)
    }

    /// Every stream this platform has handed out, in grant order.
    pub fn granted_streams(&self) -> Vec<MediaStream> {
        self.granted.lock().unwrap().clone()
    }

    fn grant(&self, stream: MediaStream) -> MediaStream {
        self.granted.lock().unwrap().push(stream.clone());
        stream
    }

    fn resolve_mic(&self, constraint: &MicConstraint) -> Result<MicDevice, CaptureError> {
        let mics = self.mics.lock().unwrap();
        if mics.is_empty() {
            return Err(CaptureError::DeviceUnavailable(
                "no microphone devices".to_string(),
            ));
        }
        match constraint {
            MicConstraint::Exact(id) => mics
                .iter()
                .find(|d| &d.device_id == id)
                .cloned()
                .ok_or_else(|| CaptureError::DeviceUnavailable(id.clone())),
            MicConstraint::Preferred(id) => Ok(mics
                .iter()
                .find(|d| &d.device_id == id)
                .or_else(|| mics.iter().find(|d| d.device_id == "default"))
                .unwrap_or(&mics[0])
                .clone()),
            MicConstraint::Any => Ok(mics
                .iter()
                .find(|d| d.device_id == "default")
                .unwrap_or(&mics[0])
                .clone()),
        }
    }
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MediaPlatform for SimulatedPlatform {
    async fn enumerate_screens(&self) -> Result<Vec<CaptureSource>> {
        Ok(self.screens.lock().unwrap().clone())
    }

    async fn enumerate_mics(&self) -> Result<Vec<MicDevice>> {
        let granted = self.mic_permission_granted.load(Ordering::SeqCst);
        let mics = self.mics.lock().unwrap();
        Ok(mics
            .iter()
            .map(|d| MicDevice {
                device_id: d.device_id.clone(),
                // Platforms withhold labels until permission is granted once
                label: if granted { d.label.clone() } else { String::new() },
            })
            .collect())
    }

    async fn request_mic(&self, constraint: MicConstraint) -> Result<MediaStream, CaptureError> {
        self.mic_requests.lock().unwrap().push(constraint.clone());

        if self.deny_mic_permission.load(Ordering::SeqCst) {
            return Err(CaptureError::PermissionDenied("microphone".to_string()));
        }

        let device = self.resolve_mic(&constraint)?;
        self.mic_permission_granted.store(true, Ordering::SeqCst);

        let label = if device.label.is_empty() {
            "Microphone".to_string()
        } else {
            device.label.clone()
        };
        debug!("simulated mic granted: {:?} -> {}", constraint, label);

        Ok(self.grant(MediaStream::new(vec![MediaTrack::new(
            TrackKind::Audio,
            label,
        )])))
    }

    async fn request_screen(&self, request: ScreenRequest) -> Result<MediaStream, CaptureError> {
        self.screen_requests.lock().unwrap().push(request.clone());

        if self.deny_screen_capture.load(Ordering::SeqCst) {
            return Err(CaptureError::PermissionDenied("screen capture".to_string()));
        }

        let source = {
            let screens = self.screens.lock().unwrap();
            screens
                .iter()
                .find(|s| s.id == request.source_id)
                .cloned()
                .ok_or_else(|| CaptureError::DeviceUnavailable(request.source_id.clone()))?
        };

        let mut tracks = vec![MediaTrack::new(TrackKind::Video, source.name.clone())];
        if request.system_audio {
            tracks.push(MediaTrack::new(TrackKind::Audio, "System Audio"));
        }
        debug!(
            "simulated screen capture granted: {} ({}fps cap, system_audio={})",
            source.id, request.frame_rate_cap, request.system_audio
        );

        Ok(self.grant(MediaStream::new(tracks)))
    }

    async fn prompt_picker(&self) -> Result<MediaStream, CaptureError> {
        self.picker_prompts.fetch_add(1, Ordering::SeqCst);
        let behavior = *self.picker.lock().unwrap();

        match behavior {
            PickerBehavior::Cancel => {
                info!("simulated picker dismissed by user");
                Err(CaptureError::PickerDismissed)
            }
            PickerBehavior::Share {
                source_index,
                with_audio,
            } => {
                let source = {
                    let screens = self.screens.lock().unwrap();
                    screens.get(source_index).cloned().ok_or_else(|| {
                        CaptureError::DeviceUnavailable(format!(
                            "picker index {} out of range",
                            source_index
                        ))
                    })?
                };
                let mut tracks = vec![MediaTrack::new(TrackKind::Video, source.name.clone())];
                if with_audio {
                    tracks.push(MediaTrack::new(TrackKind::Audio, "Shared Audio"));
                }
                info!("simulated picker shared: {}", source.name);
                Ok(self.grant(MediaStream::new(tracks)))
            }
        }
    }

    fn supports_screen_enumeration(&self) -> bool {
        true
    }

    fn create_mixer(&self) -> Result<Box<dyn AudioMixer>, CaptureError> {
        if self.fail_mixer_create.load(Ordering::SeqCst) {
            return Err(CaptureError::Backend(
                "audio mixing context unavailable".to_string(),
            ));
        }
        self.mixers_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SoftwareMixer::new(
            self.mixer_connect_failures.lock().unwrap().clone(),
        )))
    }

    fn create_recorder(&self) -> Box<dyn StreamRecorder> {
        Box::new(SimulatedRecorder::new(
            self.busy_recorder.load(Ordering::SeqCst),
        ))
    }

    fn output_extension(&self) -> &'static str {
        "webm"
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

/// Software stand-in for the platform audio graph.
struct SoftwareMixer {
    output: MediaTrack,
    connected: Vec<String>,
    fail_labels: HashSet<String>,
    shut_down: bool,
}

impl SoftwareMixer {
    fn new(fail_labels: HashSet<String>) -> Self {
        Self {
            output: MediaTrack::new(TrackKind::Audio, "Mixed Audio"),
            connected: Vec::new(),
            fail_labels,
            shut_down: false,
        }
    }
}

impl AudioMixer for SoftwareMixer {
    fn connect(&mut self, track: &MediaTrack) -> Result<(), CaptureError> {
        if self.shut_down {
            return Err(CaptureError::Backend("mixer already shut down".to_string()));
        }
        if self.fail_labels.contains(track.label()) {
            return Err(CaptureError::Backend(format!(
                "cannot route '{}' into the mix",
                track.label()
            )));
        }
        self.connected.push(track.id().to_string());
        debug!("mixer input connected: {}", track.label());
        Ok(())
    }

    fn output_track(&self) -> MediaTrack {
        self.output.clone()
    }

    fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.connected.clear();
        self.output.stop();
        debug!("mixer destination disconnected");
    }
}

/// Recorder that synthesizes one deterministic chunk per interval.
pub struct SimulatedRecorder {
    state: RecorderState,
    stop_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl SimulatedRecorder {
    fn new(busy: bool) -> Self {
        Self {
            state: if busy {
                RecorderState::Recording
            } else {
                RecorderState::Inactive
            },
            stop_tx: None,
            task: None,
        }
    }
}

fn chunk_bytes(seq: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity(CHUNK_PAYLOAD_BYTES + 8);
    data.extend_from_slice(b"DCHK");
    data.extend_from_slice(&seq.to_le_bytes());
    data.resize(CHUNK_PAYLOAD_BYTES + 8, (seq % 251) as u8);
    data
}

fn thumbnail_bytes(seed: u8) -> Vec<u8> {
    (0..64).map(|i| seed.wrapping_add(i)).collect()
}

#[async_trait::async_trait]
impl StreamRecorder for SimulatedRecorder {
    async fn start(
        &mut self,
        stream: &MediaStream,
        chunk_interval: Duration,
    ) -> Result<mpsc::Receiver<Vec<u8>>, CaptureError> {
        if self.state != RecorderState::Inactive {
            return Err(CaptureError::Backend(
                "recorder is not inactive".to_string(),
            ));
        }

        info!(
            "simulated recorder starting: {} tracks, {}ms chunks",
            stream.tracks().len(),
            chunk_interval.as_millis()
        );

        let (tx, rx) = mpsc::channel(64);
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now();
            let mut ticker = tokio::time::interval_at(start + chunk_interval, chunk_interval);
            let mut seq: u32 = 0;

            loop {
                tokio::select! {
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        if tx.send(chunk_bytes(seq)).await.is_err() {
                            return;
                        }
                        seq += 1;
                    }
                }
            }

            // Final flush on stop, mirroring a real encoder's last chunk
            let _ = tx.send(chunk_bytes(seq)).await;
            debug!("simulated recorder flushed {} chunks", seq + 1);
        });

        self.stop_tx = Some(stop_tx);
        self.task = Some(task);
        self.state = RecorderState::Recording;

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        if self.state == RecorderState::Inactive {
            return Ok(());
        }

        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("simulated recorder task panicked: {}", e);
            }
        }
        self.state = RecorderState::Inactive;
        Ok(())
    }

    fn state(&self) -> RecorderState {
        self.state
    }

    fn output_extension(&self) -> &'static str {
        "webm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recorder_emits_chunks_and_flushes_on_stop() {
        let platform = SimulatedPlatform::new();
        let stream = platform
            .request_screen(ScreenRequest::new("screen:0", false))
            .await
            .unwrap();

        let mut recorder = platform.create_recorder();
        assert_eq!(recorder.state(), RecorderState::Inactive);

        let mut rx = recorder
            .start(&stream, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(recorder.state(), RecorderState::Recording);

        let first = rx.recv().await.expect("first chunk");
        assert_eq!(&first[..4], b"DCHK");

        recorder.stop().await.unwrap();
        assert_eq!(recorder.state(), RecorderState::Inactive);

        // Channel drains the flush chunk and then closes
        let mut rest = 0;
        while rx.recv().await.is_some() {
            rest += 1;
        }
        assert!(rest >= 1, "expected at least the flush chunk, got {}", rest);
    }

    #[tokio::test]
    async fn busy_recorder_reports_non_inactive() {
        let platform = SimulatedPlatform::new();
        platform.set_busy_recorder(true);
        let recorder = platform.create_recorder();
        assert_eq!(recorder.state(), RecorderState::Recording);
    }

    #[tokio::test]
    async fn exact_constraint_fails_for_unknown_device() {
        let platform = SimulatedPlatform::new();
        let err = platform
            .request_mic(MicConstraint::Exact("gone".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::DeviceUnavailable(_)));

        // Loose constraint substitutes the default device instead
        let stream = platform
            .request_mic(MicConstraint::Preferred("gone".to_string()))
            .await
            .unwrap();
        assert_eq!(stream.audio_tracks().len(), 1);
    }

    #[tokio::test]
    async fn labels_hidden_until_permission_granted() {
        let platform = SimulatedPlatform::new();
        let before = platform.enumerate_mics().await.unwrap();
        assert!(before.iter().all(|d| d.label.is_empty()));

        platform.request_mic(MicConstraint::Any).await.unwrap();

        let after = platform.enumerate_mics().await.unwrap();
        assert!(after.iter().all(|d| !d.label.is_empty()));
    }

    #[test]
    fn mixer_connect_failure_is_isolated() {
        let platform = SimulatedPlatform::new();
        platform.add_mixer_connect_failure("Cursed Input");

        let mut mixer = platform.create_mixer().unwrap();
        let good = MediaTrack::new(TrackKind::Audio, "System Audio");
        let bad = MediaTrack::new(TrackKind::Audio, "Cursed Input");

        assert!(mixer.connect(&good).is_ok());
        assert!(mixer.connect(&bad).is_err());

        mixer.shutdown();
        mixer.shutdown(); // idempotent
        assert!(mixer.output_track().is_stopped());
    }
}
