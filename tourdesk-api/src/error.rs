use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tourdesk_core::{BookingError, GatewayError};

#[derive(Debug)]
pub enum AppError {
    Booking(BookingError),
    InvalidBody(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            AppError::Booking(err) => match err {
                BookingError::NotFound(_) => StatusCode::NOT_FOUND,
                BookingError::Validation(_)
                | BookingError::Capacity(_)
                | BookingError::Policy(_)
                | BookingError::Signature(_) => StatusCode::BAD_REQUEST,
                BookingError::Forbidden(_) => StatusCode::FORBIDDEN,
                BookingError::InvalidState(_) | BookingError::Conflict(_) => StatusCode::CONFLICT,
                BookingError::Retryable(_) => StatusCode::SERVICE_UNAVAILABLE,
                BookingError::Gateway(GatewayError::IntentNotFound(_)) => StatusCode::NOT_FOUND,
                BookingError::Gateway(_) => StatusCode::BAD_GATEWAY,
                BookingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, code) = match self {
            AppError::InvalidBody(msg) => (msg, "VALIDATION_ERROR"),
            AppError::Booking(err) => {
                let code = err.code();
                let message = match &err {
                    BookingError::Internal(_) => {
                        tracing::error!("Internal Server Error: {}", err);
                        "Internal Server Error".to_string()
                    }
                    BookingError::Gateway(GatewayError::IntentNotFound(_)) => err.to_string(),
                    BookingError::Gateway(_) => {
                        tracing::error!("Payment gateway error: {}", err);
                        "Payment provider error".to_string()
                    }
                    BookingError::Signature(e) => {
                        tracing::warn!("Rejected webhook: {}", e);
                        "Invalid signature".to_string()
                    }
                    _ => err.to_string(),
                };
                (message, code)
            }
        };

        let body = Json(json!({
            "error": message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        AppError::Booking(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidBody(rejection.body_text())
    }
}
