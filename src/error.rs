use crate::domain::payment::PaymentStatus;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("validation failed: {0}")]
    Validation(String),

    /// Non-2xx answer from the gateway. `message` is the gateway's own text.
    #[error("gateway rejected request ({code}): {message}")]
    Gateway {
        status: u16,
        code: String,
        message: String,
    },

    /// The call may or may not have taken effect at the gateway.
    #[error("gateway call timed out: {0}")]
    GatewayTimeout(String),

    #[error("gateway transport error: {0}")]
    Transport(String),

    #[error("webhook signature invalid")]
    SignatureInvalid,

    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("illegal transition from {from} to {to}")]
    IllegalTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("order already has an active payment {0}")]
    ActivePaymentExists(Uuid),

    #[error("payment {0} kept changing underneath the update")]
    ConcurrentUpdate(Uuid),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

pub type PaymentResult<T> = Result<T, PaymentError>;

impl PaymentError {
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::Validation(_) => "VALIDATION_ERROR",
            PaymentError::Gateway { .. } => "GATEWAY_ERROR",
            PaymentError::GatewayTimeout(_) => "GATEWAY_TIMEOUT",
            PaymentError::Transport(_) => "TRANSPORT_ERROR",
            PaymentError::SignatureInvalid => "SIGNATURE_INVALID",
            PaymentError::InvalidPayload(_) => "INVALID_PAYLOAD",
            PaymentError::NotFound(_) => "NOT_FOUND",
            PaymentError::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            PaymentError::ActivePaymentExists(_) => "ACTIVE_PAYMENT_EXISTS",
            PaymentError::ConcurrentUpdate(_) => "CONCURRENT_UPDATE",
            PaymentError::Storage(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            PaymentError::Validation(_) | PaymentError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            PaymentError::Gateway { status, .. } if (400..500).contains(status) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            PaymentError::Gateway { .. } | PaymentError::Transport(_) => StatusCode::BAD_GATEWAY,
            PaymentError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            PaymentError::SignatureInvalid => StatusCode::UNAUTHORIZED,
            PaymentError::NotFound(_) => StatusCode::NOT_FOUND,
            PaymentError::IllegalTransition { .. }
            | PaymentError::ActivePaymentExists(_)
            | PaymentError::ConcurrentUpdate(_) => StatusCode::CONFLICT,
            PaymentError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn envelope(&self) -> ErrorEnvelope {
        let (message, details) = match self {
            PaymentError::Gateway { code, message, .. } => {
                (message.clone(), Some(format!("gateway code {code}")))
            }
            PaymentError::Storage(_) => ("internal error".to_string(), None),
            other => (other.to_string(), None),
        };

        ErrorEnvelope {
            error: ErrorPayload {
                code: self.code().to_string(),
                message,
                details,
            },
        }
    }
}

impl From<sqlx::Error> for PaymentError {
    fn from(err: sqlx::Error) -> Self {
        PaymentError::Storage(err.into())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorPayload,
}

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        if let PaymentError::Storage(err) = &self {
            tracing::error!("request failed on storage: {:#}", err);
        }
        (self.status_code(), Json(self.envelope())).into_response()
    }
}
