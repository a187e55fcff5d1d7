// Track and stream handles shared between the capture layer and the session
// controller.
//
// A `MediaTrack` is a lightweight handle onto a platform-owned track: the
// engine can stop it locally, and the platform side can signal that it ended
// (device unplugged, user stopped sharing). Termination observers are
// explicit subscriptions so teardown is deterministic: dropping the returned
// `EndedSignal` unsubscribes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    pub fn is_audio(self) -> bool {
        self == TrackKind::Audio
    }

    pub fn is_video(self) -> bool {
        self == TrackKind::Video
    }
}

#[derive(Debug)]
struct TrackShared {
    id: String,
    kind: TrackKind,
    label: String,
    stopped: AtomicBool,
    ended_tx: watch::Sender<bool>,
}

/// Handle onto a single audio or video track
///
/// Clones share the same underlying track: stopping or ending one handle is
/// observed by all of them.
#[derive(Debug, Clone)]
pub struct MediaTrack {
    shared: Arc<TrackShared>,
}

impl MediaTrack {
    pub fn new(kind: TrackKind, label: impl Into<String>) -> Self {
        let (ended_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(TrackShared {
                id: uuid::Uuid::new_v4().to_string(),
                kind,
                label: label.into(),
                stopped: AtomicBool::new(false),
                ended_tx,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn kind(&self) -> TrackKind {
        self.shared.kind
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// Release the track locally. Idempotent; does not fire the ended signal
    /// (stopping your own track is not a termination event).
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    /// Platform-side termination: the source went away underneath us.
    pub fn mark_ended(&self) {
        let _ = self.shared.ended_tx.send(true);
    }

    pub fn has_ended(&self) -> bool {
        *self.shared.ended_tx.borrow()
    }

    pub fn is_live(&self) -> bool {
        !self.is_stopped() && !self.has_ended()
    }

    /// Subscribe to the termination event. The subscription is cancelled by
    /// dropping the returned signal.
    pub fn on_ended(&self) -> EndedSignal {
        EndedSignal {
            rx: self.shared.ended_tx.subscribe(),
        }
    }
}

/// One registered termination observer
#[derive(Debug)]
pub struct EndedSignal {
    rx: watch::Receiver<bool>,
}

impl EndedSignal {
    /// Resolves when the track fires its termination event. Also resolves if
    /// the track is dropped entirely, which counts as termination.
    pub async fn fired(mut self) {
        let _ = self.rx.wait_for(|ended| *ended).await;
    }
}

/// A bundle of tracks acquired together (one platform capture call)
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: String,
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn video_tracks(&self) -> Vec<MediaTrack> {
        self.tracks
            .iter()
            .filter(|t| t.kind() == TrackKind::Video)
            .cloned()
            .collect()
    }

    pub fn audio_tracks(&self) -> Vec<MediaTrack> {
        self.tracks
            .iter()
            .filter(|t| t.kind() == TrackKind::Audio)
            .cloned()
            .collect()
    }

    pub fn has_audio(&self) -> bool {
        self.tracks.iter().any(|t| t.kind() == TrackKind::Audio)
    }

    pub fn has_video(&self) -> bool {
        self.tracks.iter().any(|t| t.kind() == TrackKind::Video)
    }

    /// Stop every track in the stream. Idempotent.
    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_does_not_fire_ended() {
        let track = MediaTrack::new(TrackKind::Audio, "mic");
        track.stop();
        assert!(track.is_stopped());
        assert!(!track.has_ended());
    }

    #[tokio::test]
    async fn ended_signal_fires_for_all_subscribers() {
        let track = MediaTrack::new(TrackKind::Video, "screen");
        let first = track.on_ended();
        let second = track.on_ended();
        track.mark_ended();
        first.fired().await;
        second.fired().await;
        assert!(track.has_ended());
        assert!(!track.is_live());
    }

    #[tokio::test]
    async fn dropped_subscription_is_deterministic() {
        let track = MediaTrack::new(TrackKind::Audio, "mic");
        assert_eq!(track.shared.ended_tx.receiver_count(), 0);
        let signal = track.on_ended();
        assert_eq!(track.shared.ended_tx.receiver_count(), 1);
        drop(signal);
        assert_eq!(track.shared.ended_tx.receiver_count(), 0);
    }

    #[test]
    fn stream_splits_tracks_by_kind() {
        let stream = MediaStream::new(vec![
            MediaTrack::new(TrackKind::Video, "screen"),
            MediaTrack::new(TrackKind::Audio, "system"),
            MediaTrack::new(TrackKind::Audio, "mic"),
        ]);

        assert_eq!(stream.video_tracks().len(), 1);
        assert_eq!(stream.audio_tracks().len(), 2);
        assert!(stream.has_audio());
        assert!(stream.has_video());

        stream.stop_all();
        assert!(stream.tracks().iter().all(|t| t.is_stopped()));
    }
}
