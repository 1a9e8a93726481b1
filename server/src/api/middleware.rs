//! HTTP middleware (404 handler, request tracing)

use axum::extract::Request;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Handle 404 Not Found with logging. Bodies are never read; pushes are
/// usually binary.
pub async fn handle_404(req: Request) -> impl IntoResponse {
    if tracing::enabled!(Level::DEBUG) {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");
        tracing::debug!(
            method = %req.method(),
            uri = %req.uri(),
            content_type,
            "[404] no route"
        );
    }
    StatusCode::NOT_FOUND
}

/// Request span per HTTP call; responses logged at debug
pub fn trace_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::DEBUG))
}
