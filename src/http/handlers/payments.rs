use crate::domain::payment::{CreatePaymentRequest, RefundPaymentRequest};
use crate::AppState;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use uuid::Uuid;

pub async fn create_payment(
    State(state): State<AppState>,
    Json(req): Json<CreatePaymentRequest>,
) -> impl IntoResponse {
    match state.payment_service.create_payment(req).await {
        Ok(resp) => (axum::http::StatusCode::CREATED, Json(resp)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn get_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.payment_service.get_status(payment_id).await {
        Ok(payment) => (axum::http::StatusCode::OK, Json(payment)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn capture_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.payment_service.capture(payment_id).await {
        Ok(payment) => (axum::http::StatusCode::OK, Json(payment)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn refund_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    Json(req): Json<RefundPaymentRequest>,
) -> impl IntoResponse {
    match state.payment_service.refund(payment_id, req).await {
        Ok(payment) => (axum::http::StatusCode::OK, Json(payment)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn cancel_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.payment_service.cancel(payment_id).await {
        Ok(payment) => (axum::http::StatusCode::OK, Json(payment)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn list_logs(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.payment_service.list_logs(payment_id).await {
        Ok(logs) => (
            axum::http::StatusCode::OK,
            Json(serde_json::json!({
                "payment_id": payment_id,
                "total": logs.len(),
                "logs": logs
            })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn health() -> impl IntoResponse {
    (axum::http::StatusCode::OK, "ok")
}
