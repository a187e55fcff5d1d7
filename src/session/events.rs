// Session event feed for the UI.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::broadcast;

/// How many events the replay buffer keeps before dropping the oldest.
pub const EVENT_BUFFER_CAPACITY: usize = 256;

/// What the UI is told about a session as it happens.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    CountdownTick { remaining: u32 },
    RecordingStarted,
    ElapsedTick { elapsed_secs: u64 },
    /// The composed stream carries no audio; recording continues silent
    NoAudioTracks,
    RecordingSaved { name: String, path: PathBuf, size: u64 },
    /// The saved-recordings listing changed; `total` entries are now present
    ListingRefreshed { total: usize },
    Failed { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SequencedEvent {
    pub seq: u64,
    #[serde(flatten)]
    pub event: SessionEvent,
}

struct EventLog {
    next_seq: u64,
    entries: VecDeque<SequencedEvent>,
}

/// Fan-out for session events.
///
/// Live subscribers get a broadcast feed; the HTTP surface polls the
/// sequence-numbered replay buffer instead, passing the last sequence it has
/// seen. The buffer is bounded, so a client that polls rarely may miss
/// events, which is acceptable for UI notifications.
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
    log: Mutex<EventLog>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER_CAPACITY);
        Self {
            tx,
            log: Mutex::new(EventLog {
                next_seq: 0,
                entries: VecDeque::with_capacity(EVENT_BUFFER_CAPACITY),
            }),
        }
    }

    pub fn publish(&self, event: SessionEvent) {
        {
            let mut log = self.log.lock().unwrap();
            let seq = log.next_seq;
            log.next_seq += 1;
            if log.entries.len() == EVENT_BUFFER_CAPACITY {
                log.entries.pop_front();
            }
            log.entries.push_back(SequencedEvent {
                seq,
                event: event.clone(),
            });
        }
        // No live subscribers is fine; the log still has it
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Buffered events after `since`, oldest first. `None` returns the whole
    /// buffer.
    pub fn since(&self, since: Option<u64>) -> Vec<SequencedEvent> {
        let log = self.log.lock().unwrap();
        log.entries
            .iter()
            .filter(|e| since.map_or(true, |s| e.seq > s))
            .cloned()
            .collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn since_filters_by_sequence() {
        let bus = EventBus::new();
        bus.publish(SessionEvent::CountdownTick { remaining: 3 });
        bus.publish(SessionEvent::CountdownTick { remaining: 2 });
        bus.publish(SessionEvent::RecordingStarted);

        assert_eq!(bus.since(None).len(), 3);
        let tail = bus.since(Some(1));
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].seq, 2);
        assert_eq!(tail[0].event, SessionEvent::RecordingStarted);
        assert!(bus.since(Some(2)).is_empty());
    }

    #[test]
    fn buffer_drops_oldest_beyond_capacity() {
        let bus = EventBus::new();
        for i in 0..(EVENT_BUFFER_CAPACITY + 10) {
            bus.publish(SessionEvent::ElapsedTick {
                elapsed_secs: i as u64,
            });
        }
        let all = bus.since(None);
        assert_eq!(all.len(), EVENT_BUFFER_CAPACITY);
        assert_eq!(all[0].seq, 10);
        assert_eq!(all.last().unwrap().seq, (EVENT_BUFFER_CAPACITY + 9) as u64);
    }

    #[tokio::test]
    async fn broadcast_reaches_live_subscribers() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(SessionEvent::RecordingStarted);
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::RecordingStarted);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(SessionEvent::CountdownTick { remaining: 2 }).unwrap();
        assert_eq!(json["type"], "countdown_tick");
        assert_eq!(json["remaining"], 2);

        let seq = serde_json::to_value(SequencedEvent {
            seq: 7,
            event: SessionEvent::NoAudioTracks,
        })
        .unwrap();
        assert_eq!(seq["seq"], 7);
        assert_eq!(seq["type"], "no_audio_tracks");
    }
}
