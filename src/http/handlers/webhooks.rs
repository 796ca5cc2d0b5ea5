use crate::signature::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;

/// Takes the body as raw bytes: re-serialising parsed JSON would break the signature.
pub async fn receive_gateway_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("")
            .to_string()
    };
    let signature = header(SIGNATURE_HEADER);
    let timestamp = header(TIMESTAMP_HEADER);

    match state
        .webhook_processor
        .process(&body, &signature, &timestamp)
        .await
    {
        Ok(outcome) => (axum::http::StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => e.into_response(),
    }
}
