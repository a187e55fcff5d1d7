// Session lifecycle orchestration.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::capture::{
    compose, CaptureError, CaptureMode, Composition, MediaPlatform, MediaStream, RecorderState,
    StreamAcquirer, StreamRecorder, PICKER_SOURCE_ID,
};
use crate::ledger::UsageLedger;
use crate::storage::{FileSink, RecordingsLister, StorageError};

use super::events::{EventBus, SessionEvent};
use super::state::{SessionState, StopReason};
use super::supervisor::TrackSupervisor;
use super::timing::{
    CHUNK_INTERVAL, COUNTDOWN_SECS, COUNTDOWN_TICK, ELAPSED_TICK, RECORDER_WARMUP, TRACK_END_GRACE,
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot {action} while {state}")]
    InvalidState {
        state: SessionState,
        action: &'static str,
    },

    #[error("recording limit reached")]
    QuotaExceeded,

    #[error("no capture source selected")]
    NoSourceSelected,

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Save(#[from] StorageError),
}

/// What the UI submits to begin a session.
#[derive(Debug, Clone, Deserialize)]
pub struct StartRequest {
    /// Enumerated source id, or the picker sentinel. Required unless the
    /// mode is audio-only.
    pub source_id: Option<String>,
    /// Saved microphone preference; the acquisition fallback chain handles
    /// a stale id.
    pub mic_id: Option<String>,
    #[serde(default)]
    pub mode: CaptureMode,
}

/// Snapshot of the controller for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub countdown_remaining: u32,
    pub elapsed_secs: u64,
    pub last_error: Option<String>,
}

/// Screen acquisition decided at start time, executed after the countdown.
enum ScreenPlan {
    /// Audio-only session, no screen
    None,
    /// Stream already granted interactively (picker), held across the countdown
    Ready(MediaStream),
    /// Direct capture of an enumerated source once the countdown completes
    Acquire { source_id: String, system_audio: bool },
}

struct ControllerInner {
    state: SessionState,
    countdown_remaining: u32,
    elapsed_secs: u64,
    last_error: Option<String>,
    stop_tx: Option<mpsc::Sender<StopReason>>,
    drive_task: Option<JoinHandle<()>>,
}

impl ControllerInner {
    /// Clear anything left over from the previous session before a new one
    /// begins: a finished drive task, its stop channel, stale counters.
    fn reset_for_start(&mut self) {
        if let Some(task) = self.drive_task.take() {
            task.abort();
        }
        self.stop_tx = None;
        self.last_error = None;
        self.countdown_remaining = 0;
        self.elapsed_secs = 0;
    }
}

/// Everything a running session holds, torn down in one place.
///
/// Teardown is idempotent and keeps going past individual failures: the
/// supervisor detaches first so stopping tracks is not mistaken for them
/// ending, then the recorder, the mixer, and finally any source streams
/// that never made it into the composition.
#[derive(Default)]
struct SessionResources {
    screen: Option<MediaStream>,
    mic: Option<MediaStream>,
    composition: Option<Composition>,
    recorder: Option<Box<dyn StreamRecorder>>,
    supervisor: Option<TrackSupervisor>,
}

impl SessionResources {
    async fn teardown(&mut self) {
        if let Some(supervisor) = self.supervisor.take() {
            supervisor.cancel();
        }
        if let Some(mut recorder) = self.recorder.take() {
            if let Err(e) = recorder.stop().await {
                warn!("recorder stop during teardown failed: {}", e);
            }
        }
        if let Some(mut composition) = self.composition.take() {
            composition.shutdown();
        }
        if let Some(screen) = self.screen.take() {
            screen.stop_all();
        }
        if let Some(mic) = self.mic.take() {
            mic.stop_all();
        }
    }
}

/// Drives recording sessions through their lifecycle.
///
/// All state transitions go through one async mutex, so concurrent HTTP
/// calls serialize: exactly one session exists at a time, and a start racing
/// a stop resolves in some order rather than interleaving. The session body
/// runs on a spawned task; `start` returns as soon as the countdown begins.
#[derive(Clone)]
pub struct SessionController {
    platform: Arc<dyn MediaPlatform>,
    acquirer: Arc<StreamAcquirer>,
    ledger: Arc<UsageLedger>,
    sink: Arc<dyn FileSink>,
    lister: Arc<RecordingsLister>,
    events: Arc<EventBus>,
    inner: Arc<Mutex<ControllerInner>>,
}

impl SessionController {
    pub fn new(
        platform: Arc<dyn MediaPlatform>,
        acquirer: Arc<StreamAcquirer>,
        ledger: Arc<UsageLedger>,
        sink: Arc<dyn FileSink>,
        lister: Arc<RecordingsLister>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            platform,
            acquirer,
            ledger,
            sink,
            lister,
            events,
            inner: Arc::new(Mutex::new(ControllerInner {
                state: SessionState::Idle,
                countdown_remaining: 0,
                elapsed_secs: 0,
                last_error: None,
                stop_tx: None,
                drive_task: None,
            })),
        }
    }

    /// Begin a recording session.
    ///
    /// Pre-checks run in strict order before anything is visible: state,
    /// quota, source selection, and (for the picker sentinel with nothing
    /// cached) the interactive share prompt. Only then does the countdown
    /// start, on a background task. A dismissed picker aborts with no
    /// session and no side effects.
    pub async fn start(&self, request: StartRequest) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;

        if !inner.state.is_idle() {
            warn!("start rejected: session is {}", inner.state);
            return Err(SessionError::InvalidState {
                state: inner.state,
                action: "start",
            });
        }

        if !self.ledger.can_record().await {
            info!("start rejected: recording limit reached");
            return Err(SessionError::QuotaExceeded);
        }

        // Resolve the screen plan; the interactive prompt happens here so
        // the countdown only ever runs with a confirmed share.
        let screen_plan = if request.mode.wants_video() {
            let source_id = request
                .source_id
                .clone()
                .filter(|id| !id.is_empty())
                .ok_or(SessionError::NoSourceSelected)?;

            if source_id == PICKER_SOURCE_ID {
                match self.acquirer.take_pending() {
                    Some(stream) => {
                        info!("using screen share picked ahead of time");
                        ScreenPlan::Ready(stream)
                    }
                    None => {
                        let stream = self.acquirer.prompt_picker().await?;
                        ScreenPlan::Ready(stream)
                    }
                }
            } else {
                ScreenPlan::Acquire {
                    source_id,
                    system_audio: request.mode.wants_system_audio(),
                }
            }
        } else {
            ScreenPlan::None
        };

        inner.reset_for_start();
        inner.state = SessionState::CountingDown;
        inner.countdown_remaining = COUNTDOWN_SECS;
        info!("session starting in {} mode", request.mode);

        let (stop_tx, stop_rx) = mpsc::channel(4);
        inner.stop_tx = Some(stop_tx.clone());

        let this = self.clone();
        inner.drive_task = Some(tokio::spawn(async move {
            this.drive(request, screen_plan, stop_rx, stop_tx).await;
        }));

        Ok(())
    }

    /// Request the running session to stop and be saved.
    ///
    /// Only valid while recording: the countdown cannot be cancelled, and a
    /// session already finalizing will finish on its own.
    pub async fn stop(&self) -> Result<(), SessionError> {
        let stop_tx = {
            let inner = self.inner.lock().await;
            if !inner.state.can_stop() {
                return Err(SessionError::InvalidState {
                    state: inner.state,
                    action: "stop",
                });
            }
            inner.stop_tx.clone()
        };

        if let Some(tx) = stop_tx {
            let _ = tx.send(StopReason::Requested).await;
        }
        Ok(())
    }

    pub async fn status(&self) -> SessionStatus {
        let inner = self.inner.lock().await;
        SessionStatus {
            state: inner.state,
            countdown_remaining: inner.countdown_remaining,
            elapsed_secs: inner.elapsed_secs,
            last_error: inner.last_error.clone(),
        }
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// Session body, run on its own task. Whatever happens inside, the
    /// controller settles back to `Idle` with all resources released.
    async fn drive(
        self,
        request: StartRequest,
        screen_plan: ScreenPlan,
        stop_rx: mpsc::Receiver<StopReason>,
        stop_tx: mpsc::Sender<StopReason>,
    ) {
        let mut resources = SessionResources::default();
        let result = self
            .run_session(&request, screen_plan, &mut resources, stop_rx, stop_tx)
            .await;
        resources.teardown().await;

        let mut inner = self.inner.lock().await;
        if let Err(e) = result {
            error!("recording session failed: {}", e);
            inner.last_error = Some(e.to_string());
            self.events.publish(SessionEvent::Failed {
                message: e.to_string(),
            });
        }
        inner.state = SessionState::Idle;
        inner.stop_tx = None;
        inner.countdown_remaining = 0;
        inner.elapsed_secs = 0;
    }

    async fn run_session(
        &self,
        request: &StartRequest,
        screen_plan: ScreenPlan,
        resources: &mut SessionResources,
        mut stop_rx: mpsc::Receiver<StopReason>,
        stop_tx: mpsc::Sender<StopReason>,
    ) -> Result<(), SessionError> {
        // Countdown, published tick by tick
        for remaining in (1..=COUNTDOWN_SECS).rev() {
            self.inner.lock().await.countdown_remaining = remaining;
            self.events
                .publish(SessionEvent::CountdownTick { remaining });
            tokio::time::sleep(COUNTDOWN_TICK).await;
        }
        self.inner.lock().await.countdown_remaining = 0;

        // Acquire streams
        match screen_plan {
            ScreenPlan::None => {}
            ScreenPlan::Ready(stream) => {
                if stream.tracks().iter().any(|t| t.has_ended()) {
                    stream.stop_all();
                    return Err(CaptureError::DeviceUnavailable(
                        "shared surface ended before recording started".to_string(),
                    )
                    .into());
                }
                resources.screen = Some(stream);
            }
            ScreenPlan::Acquire {
                source_id,
                system_audio,
            } => {
                resources.screen =
                    Some(self.acquirer.acquire_screen(&source_id, system_audio).await?);
            }
        }
        if request.mode.wants_mic() {
            resources.mic = Some(self.acquirer.acquire_mic(request.mic_id.as_deref()).await?);
        }

        // Compose into the single recordable stream
        let composition = compose(
            self.platform.as_ref(),
            resources.screen.take(),
            resources.mic.take(),
        );
        if !composition.has_audio() {
            warn!("composed stream has no audio tracks");
            self.events.publish(SessionEvent::NoAudioTracks);
        }
        let record_stream = composition.stream().clone();
        let watched = composition.source_tracks();
        resources.composition = Some(composition);

        // Watch source tracks from here on; the grace window is anchored
        // before the warm-up so early platform blips fall inside it
        let session_start = Instant::now();
        resources.supervisor = Some(TrackSupervisor::watch(
            watched,
            session_start,
            TRACK_END_GRACE,
            stop_tx,
        ));

        // Recorder
        let mut recorder = self.platform.create_recorder();
        if recorder.state() != RecorderState::Inactive {
            warn!("platform recorder is already active, not starting");
            return Ok(());
        }
        tokio::time::sleep(RECORDER_WARMUP).await;
        let mut chunk_rx = recorder.start(&record_stream, CHUNK_INTERVAL).await?;
        resources.recorder = Some(recorder);

        self.inner.lock().await.state = SessionState::Recording;
        self.events.publish(SessionEvent::RecordingStarted);
        info!("recording started");

        // Collect chunks until a stop arrives
        let mut chunks: Vec<Vec<u8>> = Vec::new();
        let mut elapsed_ticker =
            tokio::time::interval_at(Instant::now() + ELAPSED_TICK, ELAPSED_TICK);
        let reason = loop {
            tokio::select! {
                maybe_chunk = chunk_rx.recv() => match maybe_chunk {
                    Some(chunk) => chunks.push(chunk),
                    None => {
                        warn!("recorder chunk stream closed unexpectedly");
                        break StopReason::TrackEnded;
                    }
                },
                maybe_stop = stop_rx.recv() => {
                    break maybe_stop.unwrap_or(StopReason::Requested);
                }
                _ = elapsed_ticker.tick() => {
                    let elapsed = {
                        let mut inner = self.inner.lock().await;
                        inner.elapsed_secs += 1;
                        inner.elapsed_secs
                    };
                    self.events.publish(SessionEvent::ElapsedTick {
                        elapsed_secs: elapsed,
                    });
                }
            }
        };

        // Finalize: flush the recorder, then save
        info!("stopping session ({:?})", reason);
        self.inner.lock().await.state = SessionState::Finalizing;

        if let Some(mut recorder) = resources.recorder.take() {
            if let Err(e) = recorder.stop().await {
                warn!("recorder stop failed: {}", e);
            }
        }
        while let Some(chunk) = chunk_rx.recv().await {
            chunks.push(chunk);
        }

        let blob = chunks.concat();
        let filename = format!(
            "recording-{}.{}",
            Utc::now().format("%Y%m%d-%H%M%S"),
            self.platform.output_extension()
        );
        info!("saving {} ({} chunks, {} bytes)", filename, chunks.len(), blob.len());

        let saved = self.sink.save(&filename, &blob).await?;

        // The save reached disk: count it, announce it, refresh the listing
        let usage = self.ledger.record_saved().await;
        self.events.publish(SessionEvent::RecordingSaved {
            name: saved.name.clone(),
            path: saved.path.clone(),
            size: saved.size,
        });
        let entries = self.lister.list().await;
        self.events.publish(SessionEvent::ListingRefreshed {
            total: entries.len(),
        });
        info!(
            "session complete: {} saved, usage guest={} user={}",
            saved.name, usage.guest_count, usage.user_count
        );

        Ok(())
    }
}
