// Watches source tracks and stops the session when one ends for real.

use std::time::Duration;

use futures::future::select_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::capture::MediaTrack;

use super::state::StopReason;

/// Subscribes to every source track's end-of-stream signal.
///
/// Some platforms emit a burst of bogus ended events right as capture spins
/// up; anything inside the grace window after `started_at` is logged and
/// ignored. The first end past the window requests a session stop. Cancelling
/// the supervisor drops all subscriptions at once.
pub struct TrackSupervisor {
    task: JoinHandle<()>,
}

impl TrackSupervisor {
    pub fn watch(
        tracks: Vec<MediaTrack>,
        started_at: Instant,
        grace: Duration,
        stop_tx: mpsc::Sender<StopReason>,
    ) -> Self {
        let task = tokio::spawn(async move {
            let mut labels: Vec<String> =
                tracks.iter().map(|t| t.label().to_string()).collect();
            let mut signals: Vec<_> = tracks
                .iter()
                .map(|t| Box::pin(t.on_ended().fired()))
                .collect();

            while !signals.is_empty() {
                let (_, index, rest) = select_all(signals).await;
                let label = labels.remove(index);
                signals = rest;

                if started_at.elapsed() < grace {
                    info!(
                        "ignoring end of '{}' {}ms after start",
                        label,
                        started_at.elapsed().as_millis()
                    );
                    continue;
                }

                info!("track '{}' ended, requesting session stop", label);
                let _ = stop_tx.send(StopReason::TrackEnded).await;
                return;
            }
            debug!("all watched tracks ended within the grace window");
        });

        Self { task }
    }

    /// Detach from the tracks. Idempotent with drop.
    pub fn cancel(self) {
        self.task.abort();
    }
}

impl Drop for TrackSupervisor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::TrackKind;
    use crate::session::timing::TRACK_END_GRACE;

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn end_within_grace_window_is_ignored() {
        let track = MediaTrack::new(TrackKind::Video, "Entire Screen");
        let (stop_tx, mut stop_rx) = mpsc::channel(4);
        let supervisor = TrackSupervisor::watch(
            vec![track.clone()],
            Instant::now(),
            TRACK_END_GRACE,
            stop_tx,
        );
        settle().await;

        tokio::time::advance(Duration::from_millis(300)).await;
        track.mark_ended();
        settle().await;

        assert!(stop_rx.try_recv().is_err(), "no stop expected inside grace");
        supervisor.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn end_after_grace_window_requests_stop() {
        let track = MediaTrack::new(TrackKind::Video, "Entire Screen");
        let (stop_tx, mut stop_rx) = mpsc::channel(4);
        let _supervisor = TrackSupervisor::watch(
            vec![track.clone()],
            Instant::now(),
            TRACK_END_GRACE,
            stop_tx,
        );
        settle().await;

        tokio::time::advance(Duration::from_millis(900)).await;
        track.mark_ended();
        settle().await;

        assert_eq!(stop_rx.try_recv().unwrap(), StopReason::TrackEnded);
    }

    #[tokio::test(start_paused = true)]
    async fn later_end_still_stops_after_an_early_spurious_one() {
        let screen = MediaTrack::new(TrackKind::Video, "Entire Screen");
        let mic = MediaTrack::new(TrackKind::Audio, "Microphone");
        let (stop_tx, mut stop_rx) = mpsc::channel(4);
        let _supervisor = TrackSupervisor::watch(
            vec![screen.clone(), mic.clone()],
            Instant::now(),
            TRACK_END_GRACE,
            stop_tx,
        );
        settle().await;

        // Spurious end right after start
        tokio::time::advance(Duration::from_millis(100)).await;
        mic.mark_ended();
        settle().await;
        assert!(stop_rx.try_recv().is_err());

        // The surviving track ends for real later
        tokio::time::advance(Duration::from_secs(5)).await;
        screen.mark_ended();
        settle().await;
        assert_eq!(stop_rx.try_recv().unwrap(), StopReason::TrackEnded);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_detaches_subscriptions() {
        let track = MediaTrack::new(TrackKind::Video, "Entire Screen");
        let (stop_tx, mut stop_rx) = mpsc::channel(4);
        let supervisor = TrackSupervisor::watch(
            vec![track.clone()],
            Instant::now(),
            TRACK_END_GRACE,
            stop_tx,
        );
        settle().await;

        supervisor.cancel();
        settle().await;

        tokio::time::advance(Duration::from_secs(5)).await;
        track.mark_ended();
        settle().await;
        assert!(stop_rx.try_recv().is_err());
    }
}
