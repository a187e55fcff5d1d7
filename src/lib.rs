pub mod capture;
pub mod config;
pub mod http;
pub mod ledger;
pub mod otp;
pub mod session;
pub mod storage;

pub use capture::{
    compose, CaptureError, CaptureMode, CaptureSource, Composition, MediaPlatform, MediaStream,
    MicConstraint, MicDevice, PlatformFactory, ScreenRequest, SourceRegistry, StreamAcquirer,
};
pub use config::Config;
pub use http::{create_router, AppState};
pub use ledger::{LedgerSnapshot, UsageLedger};
pub use otp::{EmailTransport, HttpMailer, OtpGate};
pub use session::{
    EventBus, SessionController, SessionError, SessionEvent, SessionState, SessionStatus,
    StartRequest,
};
pub use storage::{FileSink, RecordingsLister, SavedRecording, VideosDirSink};
