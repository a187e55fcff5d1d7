// Session cadence, in one place so behavior and tests agree.

use std::time::Duration;

/// Seconds counted down before capture begins.
pub const COUNTDOWN_SECS: u32 = 3;

/// Gap between countdown ticks.
pub const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// How often the recorder hands back encoded chunks.
pub const CHUNK_INTERVAL: Duration = Duration::from_millis(1000);

/// Track-end events inside this window after capture starts are treated as
/// spurious platform noise and ignored.
pub const TRACK_END_GRACE: Duration = Duration::from_millis(700);

/// Settle time between composing the stream and starting the recorder.
pub const RECORDER_WARMUP: Duration = Duration::from_millis(200);

/// Gap between elapsed-time ticks while recording.
pub const ELAPSED_TICK: Duration = Duration::from_secs(1);
