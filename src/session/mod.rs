//! Recording session lifecycle
//!
//! This module provides the `SessionController` that manages:
//! - The `Idle -> CountingDown -> Recording -> Finalizing` state machine
//! - Pre-start gating (quota, source selection, the interactive picker)
//! - Stream acquisition, composition, and the platform recorder
//! - End-of-track supervision with the startup grace window
//! - Saving finished recordings and counting them against the ledger
//! - The session event feed consumed by the UI

mod controller;
mod events;
mod state;
mod supervisor;
pub mod timing;

pub use controller::{SessionController, SessionError, SessionStatus, StartRequest};
pub use events::{EventBus, SequencedEvent, SessionEvent, EVENT_BUFFER_CAPACITY};
pub use state::{SessionState, StopReason};
pub use supervisor::TrackSupervisor;
