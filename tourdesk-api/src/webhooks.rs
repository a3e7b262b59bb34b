use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tourdesk_booking::Reconciliation;

use crate::error::AppError;
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments", post(handle_payment_webhook))
}

/// POST /v1/webhooks/payments
///
/// The body is taken raw: the signature covers the exact bytes sent.
async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let result = state.payments.handle_webhook(&body, signature).await?;

    let outcome = match result {
        Reconciliation::Applied { confirmed: true } => "confirmed",
        Reconciliation::Applied { confirmed: false } => "applied",
        Reconciliation::Duplicate => "duplicate",
        Reconciliation::Ignored(_) => "ignored",
    };
    Ok((StatusCode::OK, Json(json!({ "received": true, "result": outcome }))))
}
