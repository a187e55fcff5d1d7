// End-to-end tests for the recording session lifecycle
//
// These tests drive the session controller against the simulated platform
// with paused time: countdown, recording, stop, save, quota accounting, and
// the failure branches (busy recorder, dismissed picker, save errors,
// vanishing source tracks). Virtual time makes the countdown and the grace
// window deterministic.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use deskcast::capture::{
    CaptureError, CaptureMode, MediaPlatform, MediaStream, PickerBehavior, SimulatedPlatform,
    StreamAcquirer, PICKER_SOURCE_ID,
};
use deskcast::ledger::{UsageLedger, GUEST_RECORDING_LIMIT};
use deskcast::session::{
    EventBus, SessionController, SessionError, SessionEvent, SessionState, StartRequest,
};
use deskcast::storage::{FileSink, RecordingsLister, SavedRecording, StorageError, VideosDirSink};
use tempfile::TempDir;

struct Harness {
    platform: Arc<SimulatedPlatform>,
    acquirer: Arc<StreamAcquirer>,
    controller: SessionController,
    ledger: Arc<UsageLedger>,
    lister: Arc<RecordingsLister>,
    events: Arc<EventBus>,
    _tmp: TempDir,
}

fn harness() -> Harness {
    harness_with_sink(None)
}

fn harness_with_sink(sink: Option<Arc<dyn FileSink>>) -> Harness {
    let tmp = TempDir::new().unwrap();
    let recordings_dir = tmp.path().join("recordings");

    let platform = Arc::new(SimulatedPlatform::new());
    let dyn_platform: Arc<dyn MediaPlatform> = platform.clone();
    let acquirer = Arc::new(StreamAcquirer::new(dyn_platform.clone()));
    let ledger = Arc::new(UsageLedger::open(tmp.path().join("usage.json")));
    let sink = sink.unwrap_or_else(|| Arc::new(VideosDirSink::new(&recordings_dir)));
    let lister = Arc::new(RecordingsLister::new(&recordings_dir, "webm"));
    let events = Arc::new(EventBus::new());

    let controller = SessionController::new(
        dyn_platform,
        acquirer.clone(),
        ledger.clone(),
        sink,
        lister.clone(),
        events.clone(),
    );

    Harness {
        platform,
        acquirer,
        controller,
        ledger,
        lister,
        events,
        _tmp: tmp,
    }
}

fn start_screen(mode: CaptureMode) -> StartRequest {
    StartRequest {
        source_id: Some("screen:0".to_string()),
        mic_id: None,
        mode,
    }
}

async fn wait_for_state(controller: &SessionController, want: SessionState) {
    for _ in 0..4000 {
        if controller.state().await == want {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!(
        "session never reached {}, stuck in {}",
        want,
        controller.state().await
    );
}

fn published(events: &EventBus) -> Vec<SessionEvent> {
    events.since(None).into_iter().map(|e| e.event).collect()
}

/// The screen stream is the granted stream carrying video.
fn granted_screen(platform: &SimulatedPlatform) -> MediaStream {
    platform
        .granted_streams()
        .into_iter()
        .find(|s| s.has_video())
        .expect("no screen stream was granted")
}

#[tokio::test(start_paused = true)]
async fn test_full_lifecycle_records_saves_and_counts() {
    let h = harness();

    h.controller
        .start(start_screen(CaptureMode::VideoMic))
        .await
        .unwrap();

    // The countdown is visible immediately
    let status = h.controller.status().await;
    assert_eq!(status.state, SessionState::CountingDown);
    assert_eq!(status.countdown_remaining, 3);

    wait_for_state(&h.controller, SessionState::Recording).await;

    // Let a couple of seconds of recording pass
    tokio::time::sleep(Duration::from_millis(2500)).await;
    let status = h.controller.status().await;
    assert!(
        status.elapsed_secs >= 2,
        "elapsed should have ticked, got {}",
        status.elapsed_secs
    );

    h.controller.stop().await.unwrap();
    wait_for_state(&h.controller, SessionState::Idle).await;

    // Verify: counted once, against the guest allowance
    let usage = h.ledger.get().await;
    assert_eq!(usage.guest_count, 1);
    assert_eq!(usage.user_count, 0);

    // Verify: exactly one finished file, with the synthesized chunk bytes
    let entries = h.lister.list().await;
    assert_eq!(entries.len(), 1);
    assert!(entries[0].name.starts_with("recording-"));
    assert!(entries[0].name.ends_with(".webm"));
    let bytes = tokio::fs::read(&entries[0].path).await.unwrap();
    assert!(!bytes.is_empty());
    assert_eq!(&bytes[..4], b"DCHK");
    assert_eq!(entries[0].size, bytes.len() as u64);

    // Verify: the event feed tells the whole story in order
    let events = published(&h.events);
    let ticks: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::CountdownTick { remaining } => Some(*remaining),
            _ => None,
        })
        .collect();
    assert_eq!(ticks, vec![3, 2, 1]);
    assert!(events.contains(&SessionEvent::RecordingStarted));
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::ElapsedTick { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::RecordingSaved { size, .. } if *size > 0)));
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::ListingRefreshed { total: 1 })));
    assert!(!events
        .iter()
        .any(|e| matches!(e, SessionEvent::Failed { .. })));

    let status = h.controller.status().await;
    assert!(status.last_error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_back_to_back_sessions_accumulate() {
    let h = harness();

    for expected in 1..=2u32 {
        h.controller
            .start(start_screen(CaptureMode::VideoMic))
            .await
            .unwrap();
        wait_for_state(&h.controller, SessionState::Recording).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        h.controller.stop().await.unwrap();
        wait_for_state(&h.controller, SessionState::Idle).await;

        assert_eq!(h.ledger.get().await.guest_count, expected);
    }

    assert_eq!(h.lister.list().await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_rejected_until_recording() {
    let h = harness();

    // Nothing to stop while idle
    let err = h.controller.stop().await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidState { .. }));

    h.controller
        .start(start_screen(CaptureMode::VideoMic))
        .await
        .unwrap();

    // The countdown cannot be cancelled
    assert_eq!(h.controller.state().await, SessionState::CountingDown);
    let err = h.controller.stop().await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidState { .. }));

    wait_for_state(&h.controller, SessionState::Recording).await;
    h.controller.stop().await.unwrap();
    wait_for_state(&h.controller, SessionState::Idle).await;

    // The rejected stops had no effect on the finished recording
    assert_eq!(h.lister.list().await.len(), 1);
    assert_eq!(h.ledger.get().await.guest_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_start_is_rejected_while_a_session_is_active() {
    let h = harness();

    h.controller
        .start(start_screen(CaptureMode::VideoMic))
        .await
        .unwrap();

    let err = h
        .controller
        .start(start_screen(CaptureMode::VideoMic))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidState { .. }));

    wait_for_state(&h.controller, SessionState::Recording).await;
    let err = h
        .controller
        .start(start_screen(CaptureMode::VideoMic))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidState { .. }));

    h.controller.stop().await.unwrap();
    wait_for_state(&h.controller, SessionState::Idle).await;

    // Only the first start produced a recording
    assert_eq!(h.lister.list().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_video_start_without_source_is_rejected() {
    let h = harness();

    for source_id in [None, Some(String::new())] {
        let err = h
            .controller
            .start(StartRequest {
                source_id,
                mic_id: None,
                mode: CaptureMode::VideoMic,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NoSourceSelected));
    }
    assert_eq!(h.controller.state().await, SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_audio_only_session_needs_no_source() {
    let h = harness();

    h.controller
        .start(StartRequest {
            source_id: None,
            mic_id: None,
            mode: CaptureMode::AudioOnly,
        })
        .await
        .unwrap();

    wait_for_state(&h.controller, SessionState::Recording).await;
    assert!(h.platform.screen_requests().is_empty());

    tokio::time::sleep(Duration::from_secs(1)).await;
    h.controller.stop().await.unwrap();
    wait_for_state(&h.controller, SessionState::Idle).await;

    assert_eq!(h.lister.list().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_quota_exhausted_start_is_rejected() {
    let h = harness();
    for _ in 0..GUEST_RECORDING_LIMIT {
        h.ledger.record_saved().await;
    }

    let err = h
        .controller
        .start(start_screen(CaptureMode::VideoMic))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::QuotaExceeded));
    assert_eq!(h.controller.state().await, SessionState::Idle);
    assert!(published(&h.events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_busy_platform_recorder_aborts_quietly() {
    let h = harness();
    h.platform.set_busy_recorder(true);

    h.controller
        .start(start_screen(CaptureMode::VideoMic))
        .await
        .unwrap();
    wait_for_state(&h.controller, SessionState::Idle).await;

    // No recording, no error, no count: the session just never started
    let status = h.controller.status().await;
    assert!(status.last_error.is_none());
    let events = published(&h.events);
    assert!(!events.contains(&SessionEvent::RecordingStarted));
    assert!(!events
        .iter()
        .any(|e| matches!(e, SessionEvent::Failed { .. })));
    assert_eq!(h.ledger.get().await.guest_count, 0);
    assert!(h.lister.list().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dismissed_picker_aborts_the_start() {
    let h = harness();
    h.platform.set_picker_behavior(PickerBehavior::Cancel);

    let err = h
        .controller
        .start(StartRequest {
            source_id: Some(PICKER_SOURCE_ID.to_string()),
            mic_id: None,
            mode: CaptureMode::VideoMic,
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SessionError::Capture(CaptureError::PickerDismissed)
    ));
    assert_eq!(h.platform.picker_prompt_count(), 1);
    assert_eq!(h.controller.state().await, SessionState::Idle);
    assert!(published(&h.events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_primed_picker_share_is_claimed_without_reprompt() {
    let h = harness();
    h.platform.set_picker_behavior(PickerBehavior::Share {
        source_index: 1,
        with_audio: false,
    });

    // The UI primes the share ahead of the start call
    h.acquirer.prompt_and_cache().await.unwrap();
    assert!(h.acquirer.has_pending());
    assert_eq!(h.platform.picker_prompt_count(), 1);

    h.controller
        .start(StartRequest {
            source_id: Some(PICKER_SOURCE_ID.to_string()),
            mic_id: None,
            mode: CaptureMode::VideoMic,
        })
        .await
        .unwrap();

    assert!(!h.acquirer.has_pending(), "the cached share was claimed");

    wait_for_state(&h.controller, SessionState::Recording).await;
    assert_eq!(
        h.platform.picker_prompt_count(),
        1,
        "starting must not prompt again"
    );

    tokio::time::sleep(Duration::from_secs(1)).await;
    h.controller.stop().await.unwrap();
    wait_for_state(&h.controller, SessionState::Idle).await;
    assert_eq!(h.lister.list().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_mixed_audio_session_routes_through_one_mixer() {
    let h = harness();

    h.controller
        .start(start_screen(CaptureMode::VideoSystem))
        .await
        .unwrap();
    wait_for_state(&h.controller, SessionState::Recording).await;
    assert_eq!(h.platform.mixers_created(), 1);

    tokio::time::sleep(Duration::from_secs(1)).await;
    h.controller.stop().await.unwrap();
    wait_for_state(&h.controller, SessionState::Idle).await;

    let events = published(&h.events);
    assert!(
        !events.contains(&SessionEvent::NoAudioTracks),
        "a mixed session has audio"
    );
    assert_eq!(h.lister.list().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_video_only_session_flags_missing_audio() {
    let h = harness();

    h.controller
        .start(start_screen(CaptureMode::VideoOnly))
        .await
        .unwrap();
    wait_for_state(&h.controller, SessionState::Recording).await;

    assert!(published(&h.events).contains(&SessionEvent::NoAudioTracks));
    assert_eq!(h.platform.mixers_created(), 0);

    h.controller.stop().await.unwrap();
    wait_for_state(&h.controller, SessionState::Idle).await;

    // Silent recordings still save and count
    assert_eq!(h.lister.list().await.len(), 1);
    assert_eq!(h.ledger.get().await.guest_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_source_track_ending_stops_and_saves() {
    let h = harness();

    h.controller
        .start(start_screen(CaptureMode::VideoMic))
        .await
        .unwrap();
    wait_for_state(&h.controller, SessionState::Recording).await;

    // Run well past the grace window, then pull the shared surface away
    tokio::time::sleep(Duration::from_secs(2)).await;
    granted_screen(&h.platform).video_tracks()[0].mark_ended();

    wait_for_state(&h.controller, SessionState::Idle).await;

    // The interruption finalizes like a normal stop
    let events = published(&h.events);
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::RecordingSaved { .. })));
    assert!(!events
        .iter()
        .any(|e| matches!(e, SessionEvent::Failed { .. })));
    assert_eq!(h.lister.list().await.len(), 1);
    assert_eq!(h.ledger.get().await.guest_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_track_end_during_grace_window_is_ignored() {
    let h = harness();

    h.controller
        .start(start_screen(CaptureMode::VideoMic))
        .await
        .unwrap();
    wait_for_state(&h.controller, SessionState::Recording).await;

    // Recording begins about 200ms after the watch anchor, so this lands
    // inside the 700ms grace window
    granted_screen(&h.platform).video_tracks()[0].mark_ended();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(
        h.controller.state().await,
        SessionState::Recording,
        "an early platform blip must not end the session"
    );

    tokio::time::sleep(Duration::from_secs(1)).await;
    h.controller.stop().await.unwrap();
    wait_for_state(&h.controller, SessionState::Idle).await;

    assert_eq!(h.lister.list().await.len(), 1);
    assert!(!published(&h.events)
        .iter()
        .any(|e| matches!(e, SessionEvent::Failed { .. })));
}

/// Sink that always fails the write, standing in for a full disk.
struct FailingSink {
    dir: PathBuf,
}

#[async_trait::async_trait]
impl FileSink for FailingSink {
    async fn save(&self, filename: &str, _bytes: &[u8]) -> Result<SavedRecording, StorageError> {
        Err(StorageError::Write {
            path: self.dir.join(filename),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        })
    }

    fn dir(&self) -> &Path {
        &self.dir
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_save_reports_and_does_not_count() {
    let tmp = TempDir::new().unwrap();
    let h = harness_with_sink(Some(Arc::new(FailingSink {
        dir: tmp.path().to_path_buf(),
    })));

    h.controller
        .start(start_screen(CaptureMode::VideoMic))
        .await
        .unwrap();
    wait_for_state(&h.controller, SessionState::Recording).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    h.controller.stop().await.unwrap();
    wait_for_state(&h.controller, SessionState::Idle).await;

    // Verify: the failure is visible and nothing was counted
    let status = h.controller.status().await;
    let message = status.last_error.expect("the save failure should be kept");
    assert!(message.contains("disk full"), "unexpected error: {}", message);

    let events = published(&h.events);
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::Failed { message } if message.contains("disk full"))));
    assert!(!events
        .iter()
        .any(|e| matches!(e, SessionEvent::RecordingSaved { .. })));

    let usage = h.ledger.get().await;
    assert_eq!(usage.guest_count, 0);
    assert_eq!(usage.user_count, 0);
    assert!(h.lister.list().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_saves_count_to_the_signed_in_user() {
    let h = harness();
    h.ledger.set_login_state(true).await;

    h.controller
        .start(start_screen(CaptureMode::VideoMic))
        .await
        .unwrap();
    wait_for_state(&h.controller, SessionState::Recording).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    h.controller.stop().await.unwrap();
    wait_for_state(&h.controller, SessionState::Idle).await;

    let usage = h.ledger.get().await;
    assert_eq!(usage.guest_count, 0);
    assert_eq!(usage.user_count, 1);
}
