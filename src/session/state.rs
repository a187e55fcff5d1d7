// Session lifecycle states and transitions.

use std::fmt;

use serde::Serialize;

/// Where the recording session currently is.
///
/// The cycle is `Idle -> CountingDown -> Recording -> Finalizing -> Idle`;
/// failures branch straight back to `Idle`. The countdown is deliberately
/// not cancellable, so `CountingDown` accepts neither start nor stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    CountingDown,
    Recording,
    Finalizing,
}

impl SessionState {
    pub fn is_idle(self) -> bool {
        self == SessionState::Idle
    }

    /// Whether a session is in flight in any form.
    pub fn is_active(self) -> bool {
        self != SessionState::Idle
    }

    /// Only an actively recording session can be stopped.
    pub fn can_stop(self) -> bool {
        self == SessionState::Recording
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::CountingDown => "counting_down",
            SessionState::Recording => "recording",
            SessionState::Finalizing => "finalizing",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a recording session is coming to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The user asked to stop
    Requested,
    /// A source track ended (device unplugged, shared surface closed)
    TrackEnded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_wire_format() {
        assert_eq!(SessionState::Idle.to_string(), "idle");
        assert_eq!(SessionState::CountingDown.to_string(), "counting_down");
        assert_eq!(SessionState::Recording.to_string(), "recording");
        assert_eq!(SessionState::Finalizing.to_string(), "finalizing");
    }

    #[test]
    fn only_recording_can_stop() {
        assert!(!SessionState::Idle.can_stop());
        assert!(!SessionState::CountingDown.can_stop());
        assert!(SessionState::Recording.can_stop());
        assert!(!SessionState::Finalizing.can_stop());
    }

    #[test]
    fn idle_is_the_only_inactive_state() {
        assert!(!SessionState::Idle.is_active());
        assert!(SessionState::CountingDown.is_active());
        assert!(SessionState::Recording.is_active());
        assert!(SessionState::Finalizing.is_active());
    }
}
