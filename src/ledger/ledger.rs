// Recording quota tracking.

use std::path::PathBuf;

use tokio::sync::Mutex;
use tracing::{info, warn};

use super::store::{LedgerSnapshot, LedgerStore};

/// Recordings a guest may save before signing in.
pub const GUEST_RECORDING_LIMIT: u32 = 5;

/// Total recordings a signed-in, non-subscribed user may save. Guest usage
/// carries over, so the allowance compares the combined count.
pub const FREE_RECORDING_LIMIT: u32 = 10;

/// The authoritative usage ledger.
///
/// One instance owns the counters; all mutation goes through its async mutex
/// so increments are never lost between concurrent saves. Every change is
/// persisted immediately, but persistence trouble only logs: a full disk must
/// not block the recording that was already saved.
pub struct UsageLedger {
    store: LedgerStore,
    state: Mutex<LedgerSnapshot>,
}

impl UsageLedger {
    /// Open the ledger at `path`, loading any persisted counters.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let store = LedgerStore::new(path);
        let state = store.load();
        Self {
            store,
            state: Mutex::new(state),
        }
    }

    pub async fn get(&self) -> LedgerSnapshot {
        *self.state.lock().await
    }

    /// Whether another recording may be saved under the current plan.
    pub async fn can_record(&self) -> bool {
        allowed(&*self.state.lock().await)
    }

    /// Count one saved recording against the active allowance.
    ///
    /// Callers invoke this exactly once per recording that actually reached
    /// disk; a failed save must never be counted.
    pub async fn record_saved(&self) -> LedgerSnapshot {
        let mut state = self.state.lock().await;
        if state.is_logged_in {
            state.user_count += 1;
        } else {
            state.guest_count += 1;
        }
        info!(
            "recording counted: guest={} user={}",
            state.guest_count, state.user_count
        );
        self.persist(&state);
        *state
    }

    pub async fn set_login_state(&self, logged_in: bool) -> LedgerSnapshot {
        let mut state = self.state.lock().await;
        state.is_logged_in = logged_in;
        self.persist(&state);
        *state
    }

    pub async fn set_subscribed(&self, subscribed: bool) -> LedgerSnapshot {
        let mut state = self.state.lock().await;
        state.is_subscribed = subscribed;
        self.persist(&state);
        *state
    }

    /// Zero the counters, keeping login and subscription flags.
    pub async fn reset(&self) -> LedgerSnapshot {
        let mut state = self.state.lock().await;
        state.guest_count = 0;
        state.user_count = 0;
        self.persist(&state);
        *state
    }

    fn persist(&self, state: &LedgerSnapshot) {
        if let Err(e) = self.store.save(state) {
            warn!("failed to persist usage ledger: {:#}", e);
        }
    }
}

fn allowed(state: &LedgerSnapshot) -> bool {
    if state.is_subscribed {
        return true;
    }
    if state.is_logged_in {
        state.guest_count + state.user_count < FREE_RECORDING_LIMIT
    } else {
        state.guest_count < GUEST_RECORDING_LIMIT
    }
}
