//! Recording usage ledger
//!
//! Tracks how many recordings have been saved under the guest and signed-in
//! allowances, answers the pre-recording quota check, and persists the
//! counters as a small JSON document in the app data directory.

mod ledger;
mod store;

pub use ledger::{UsageLedger, FREE_RECORDING_LIMIT, GUEST_RECORDING_LIMIT};
pub use store::{LedgerSnapshot, LedgerStore};
