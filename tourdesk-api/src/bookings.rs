use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use tourdesk_booking::{Booking, BookingRequest, Requester};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub intent_id: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentIntentResponse {
    pub intent_id: String,
    pub amount: i64,
    pub currency: String,
    pub client_secret: Option<String>,
}

/// Routes behind `auth_middleware`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking).get(list_bookings))
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
        .route("/v1/bookings/{id}/payment-intent", post(create_payment_intent))
        .route("/v1/bookings/{id}/confirm-payment", post(confirm_payment))
}

async fn create_booking(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    payload: Result<Json<BookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let Json(req) = payload?;
    let booking = state.bookings.create_booking(&requester, req).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn list_bookings(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.bookings.list_bookings(&requester).await?))
}

async fn get_booking(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.bookings.get_booking(&requester, id).await?))
}

/// The body is optional; `{"reason": "..."}` is recorded in the booking notes.
async fn cancel_booking(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<Booking>, AppError> {
    let req: CancelRequest = if body.is_empty() {
        CancelRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::InvalidBody(e.to_string()))?
    };

    let reason = req.reason.unwrap_or_default();
    let booking = state.bookings.cancel_booking(&requester, id, &reason).await?;
    Ok(Json(booking))
}

async fn create_payment_intent(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentIntentResponse>, AppError> {
    let intent = state.payments.create_payment_intent(&requester, id).await?;
    Ok(Json(PaymentIntentResponse {
        intent_id: intent.id,
        amount: intent.amount,
        currency: intent.currency,
        client_secret: intent.client_secret,
    }))
}

async fn confirm_payment(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(id): Path<Uuid>,
    payload: Result<Json<ConfirmPaymentRequest>, JsonRejection>,
) -> Result<Json<Booking>, AppError> {
    let Json(req) = payload?;
    let booking = state.payments.confirm_payment(&requester, id, &req.intent_id).await?;
    Ok(Json(booking))
}
