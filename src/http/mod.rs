//! HTTP API server for the desktop UI
//!
//! This module provides a REST API for driving the recorder:
//! - GET /sources/screens, /sources/mics - Enumerate capture sources
//! - GET/POST/DELETE /sources/picker - Inspect, prime, or release a picker share
//! - POST /auth/otp/request, /auth/otp/verify, /auth/logout - Email sign-in
//! - GET /usage - Quota counters and recording allowance
//! - POST /record/start, /record/stop - Drive the session lifecycle
//! - GET /record/status, /record/events - Observe the session
//! - GET /recordings - List saved recordings
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
