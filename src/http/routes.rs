use super::handlers;
use super::state::AppState;
use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState, dev_server_origin: Option<String>) -> Router {
    let mut router = Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Capture sources
        .route("/sources/screens", get(handlers::list_screen_sources))
        .route("/sources/mics", get(handlers::list_mic_devices))
        .route(
            "/sources/picker",
            get(handlers::picker_status)
                .post(handlers::prime_picker)
                .delete(handlers::release_picker),
        )
        // Sign-in
        .route("/auth/otp/request", post(handlers::request_otp))
        .route("/auth/otp/verify", post(handlers::verify_otp))
        .route("/auth/logout", post(handlers::logout))
        // Usage ledger
        .route("/usage", get(handlers::get_usage))
        .route("/usage/subscription", post(handlers::set_subscription))
        .route("/usage/reset", post(handlers::reset_usage))
        // Recording control
        .route("/record/start", post(handlers::start_recording))
        .route("/record/stop", post(handlers::stop_recording))
        .route("/record/status", get(handlers::recording_status))
        .route("/record/events", get(handlers::drain_events))
        // Saved recordings
        .route("/recordings", get(handlers::list_recordings))
        .route(
            "/recordings/open-folder",
            post(handlers::open_recordings_folder),
        )
        .route("/recordings/reveal", post(handlers::reveal_recording))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http());

    // The UI dev server runs on its own origin during development
    if let Some(origin) = dev_server_origin {
        match origin.parse::<HeaderValue>() {
            Ok(origin) => {
                router = router.layer(
                    CorsLayer::new()
                        .allow_origin(origin)
                        .allow_methods(Any)
                        .allow_headers(Any),
                );
            }
            Err(e) => warn!("ignoring invalid dev server origin '{}': {}", origin, e),
        }
    }

    router.with_state(state)
}
