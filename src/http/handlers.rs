use super::state::AppState;
use crate::capture::{CaptureError, CaptureSource};
use crate::ledger::{LedgerSnapshot, FREE_RECORDING_LIMIT, GUEST_RECORDING_LIMIT};
use crate::otp::{OtpError, TransportError};
use crate::session::{SequencedEvent, SessionError, StartRequest};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ScreenSourceResponse {
    pub id: String,
    pub name: String,
    /// Base64-encoded preview image, when the platform provides one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

impl From<CaptureSource> for ScreenSourceResponse {
    fn from(source: CaptureSource) -> Self {
        Self {
            id: source.id,
            name: source.name,
            thumbnail: source
                .thumbnail
                .map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PickerStatusResponse {
    pub pending: bool,
}

#[derive(Debug, Deserialize)]
pub struct OtpRequestBody {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct OtpSentResponse {
    pub sent: bool,
}

#[derive(Debug, Deserialize)]
pub struct OtpVerifyBody {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub guest_count: u32,
    pub user_count: u32,
    pub is_logged_in: bool,
    pub is_subscribed: bool,
    pub can_record: bool,
    pub guest_limit: u32,
    pub free_limit: u32,
}

impl UsageResponse {
    fn new(snapshot: LedgerSnapshot, can_record: bool) -> Self {
        Self {
            guest_count: snapshot.guest_count,
            user_count: snapshot.user_count,
            is_logged_in: snapshot.is_logged_in,
            is_subscribed: snapshot.is_subscribed,
            can_record,
            guest_limit: GUEST_RECORDING_LIMIT,
            free_limit: FREE_RECORDING_LIMIT,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionBody {
    pub subscribed: bool,
}

#[derive(Debug, Serialize)]
pub struct RecordControlResponse {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub since: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub events: Vec<SequencedEvent>,
}

#[derive(Debug, Deserialize)]
pub struct RevealBody {
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// ============================================================================
// Error mapping
// ============================================================================

fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
            code: code.to_string(),
        }),
    )
        .into_response()
}

fn session_error(e: SessionError) -> Response {
    let (status, code) = match &e {
        SessionError::InvalidState { .. } => (StatusCode::CONFLICT, "invalid_state"),
        SessionError::QuotaExceeded => (StatusCode::FORBIDDEN, "quota_exceeded"),
        SessionError::NoSourceSelected => (StatusCode::BAD_REQUEST, "no_source_selected"),
        SessionError::Capture(CaptureError::PickerDismissed) => {
            (StatusCode::CONFLICT, "picker_dismissed")
        }
        SessionError::Capture(CaptureError::PermissionDenied(_)) => {
            (StatusCode::FORBIDDEN, "permission_denied")
        }
        SessionError::Capture(_) => (StatusCode::BAD_GATEWAY, "capture_failed"),
        SessionError::Save(_) => (StatusCode::INTERNAL_SERVER_ERROR, "save_failed"),
    };
    error_response(status, code, e.to_string())
}

fn otp_error(e: OtpError) -> Response {
    let (status, code) = match &e {
        OtpError::NotRequested => (StatusCode::BAD_REQUEST, "otp_not_requested"),
        OtpError::Expired => (StatusCode::BAD_REQUEST, "otp_expired"),
        OtpError::Mismatch => (StatusCode::BAD_REQUEST, "otp_mismatch"),
        OtpError::InvalidAddress(_) => (StatusCode::BAD_REQUEST, "invalid_address"),
        OtpError::Transport(TransportError::NotConfigured) => {
            (StatusCode::SERVICE_UNAVAILABLE, "email_not_configured")
        }
        OtpError::Transport(_) => (StatusCode::BAD_GATEWAY, "email_failed"),
    };
    error_response(status, code, e.to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /sources/screens
/// List shareable screens and windows
pub async fn list_screen_sources(State(state): State<AppState>) -> impl IntoResponse {
    let sources = state.registry.screen_sources().await;
    let body: Vec<ScreenSourceResponse> =
        sources.into_iter().map(ScreenSourceResponse::from).collect();
    Json(body)
}

/// GET /sources/mics
/// List audio input devices
pub async fn list_mic_devices(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.mic_devices().await)
}

/// GET /sources/picker
/// Whether an interactively picked share is waiting to be used
pub async fn picker_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(PickerStatusResponse {
        pending: state.acquirer.has_pending(),
    })
}

/// POST /sources/picker
/// Show the system share picker now and hold the result for the next start
pub async fn prime_picker(State(state): State<AppState>) -> Response {
    match state.acquirer.prompt_and_cache().await {
        Ok(()) => Json(PickerStatusResponse { pending: true }).into_response(),
        Err(e @ CaptureError::PickerDismissed) => {
            info!("share picker dismissed");
            error_response(StatusCode::CONFLICT, "picker_dismissed", e.to_string())
        }
        Err(e) => {
            error!("picker prompt failed: {}", e);
            error_response(StatusCode::BAD_GATEWAY, "capture_failed", e.to_string())
        }
    }
}

/// DELETE /sources/picker
/// Discard a previously picked share
pub async fn release_picker(State(state): State<AppState>) -> impl IntoResponse {
    state.acquirer.release_pending();
    Json(PickerStatusResponse { pending: false })
}

/// POST /auth/otp/request
/// Email a one-time sign-in code
pub async fn request_otp(
    State(state): State<AppState>,
    Json(body): Json<OtpRequestBody>,
) -> Response {
    match state.otp.issue(&body.email).await {
        Ok(()) => Json(OtpSentResponse { sent: true }).into_response(),
        Err(e) => {
            warn!("could not issue sign-in code: {}", e);
            otp_error(e)
        }
    }
}

/// POST /auth/otp/verify
/// Verify a submitted code; success signs the user in
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(body): Json<OtpVerifyBody>,
) -> Response {
    match state.otp.verify(&body.email, &body.code).await {
        Ok(()) => {
            let snapshot = state.ledger.set_login_state(true).await;
            let can_record = state.ledger.can_record().await;
            Json(UsageResponse::new(snapshot, can_record)).into_response()
        }
        Err(e) => otp_error(e),
    }
}

/// POST /auth/logout
/// Drop the signed-in flag
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.ledger.set_login_state(false).await;
    let can_record = state.ledger.can_record().await;
    Json(UsageResponse::new(snapshot, can_record))
}

/// GET /usage
/// Current counters and whether another recording is allowed
pub async fn get_usage(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.ledger.get().await;
    let can_record = state.ledger.can_record().await;
    Json(UsageResponse::new(snapshot, can_record))
}

/// POST /usage/subscription
/// Set the subscription flag (driven by the account backend)
pub async fn set_subscription(
    State(state): State<AppState>,
    Json(body): Json<SubscriptionBody>,
) -> impl IntoResponse {
    let snapshot = state.ledger.set_subscribed(body.subscribed).await;
    let can_record = state.ledger.can_record().await;
    Json(UsageResponse::new(snapshot, can_record))
}

/// POST /usage/reset
/// Administrative counter reset
pub async fn reset_usage(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.ledger.reset().await;
    let can_record = state.ledger.can_record().await;
    Json(UsageResponse::new(snapshot, can_record))
}

/// POST /record/start
/// Begin a recording session (countdown runs in the background)
pub async fn start_recording(
    State(state): State<AppState>,
    Json(request): Json<StartRequest>,
) -> Response {
    info!(
        "start requested: mode={} source={:?}",
        request.mode, request.source_id
    );
    match state.controller.start(request).await {
        Ok(()) => Json(RecordControlResponse {
            status: "counting_down".to_string(),
        })
        .into_response(),
        Err(e) => {
            warn!("start rejected: {}", e);
            session_error(e)
        }
    }
}

/// POST /record/stop
/// Stop the running session; it finalizes and saves in the background
pub async fn stop_recording(State(state): State<AppState>) -> Response {
    match state.controller.stop().await {
        Ok(()) => Json(RecordControlResponse {
            status: "stopping".to_string(),
        })
        .into_response(),
        Err(e) => session_error(e),
    }
}

/// GET /record/status
/// Session state, countdown, elapsed time, last error
pub async fn recording_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.controller.status().await)
}

/// GET /record/events?since=N
/// Session events after sequence N, for UI polling
pub async fn drain_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> impl IntoResponse {
    Json(EventsResponse {
        events: state.events.since(query.since),
    })
}

/// GET /recordings
/// Saved recordings, newest first
pub async fn list_recordings(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.lister.list().await)
}

/// POST /recordings/open-folder
/// Open the recordings directory in the file manager
pub async fn open_recordings_folder(State(state): State<AppState>) -> Response {
    match state.opener.open_folder(state.lister.dir()) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!("could not open recordings folder: {:#}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "open_failed",
                e.to_string(),
            )
        }
    }
}

/// POST /recordings/reveal
/// Reveal one recording in the file manager
pub async fn reveal_recording(
    State(state): State<AppState>,
    Json(body): Json<RevealBody>,
) -> Response {
    let path = PathBuf::from(&body.path);
    if !path.starts_with(state.lister.dir()) {
        return error_response(
            StatusCode::BAD_REQUEST,
            "outside_library",
            "path is not inside the recordings folder",
        );
    }

    match state.opener.reveal(&path) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!("could not reveal {}: {:#}", path.display(), e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "reveal_failed",
                e.to_string(),
            )
        }
    }
}
