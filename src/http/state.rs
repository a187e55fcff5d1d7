use std::sync::Arc;

use crate::capture::{SourceRegistry, StreamAcquirer};
use crate::ledger::UsageLedger;
use crate::otp::OtpGate;
use crate::session::{EventBus, SessionController};
use crate::storage::{FolderOpener, RecordingsLister};

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub controller: SessionController,
    pub registry: Arc<SourceRegistry>,
    pub acquirer: Arc<StreamAcquirer>,
    pub ledger: Arc<UsageLedger>,
    pub otp: Arc<OtpGate>,
    pub lister: Arc<RecordingsLister>,
    pub opener: Arc<dyn FolderOpener>,
    pub events: Arc<EventBus>,
}
