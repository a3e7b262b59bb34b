use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{patch, post},
    Extension, Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use tourdesk_booking::{Booking, BookingStatus, Requester};
use tourdesk_catalog::{CatalogItem, CatalogItemUpdate, NewCatalogItem};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NewSlotRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub status: BookingStatus,
}

/// Routes behind `admin_auth_middleware`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/catalog", post(create_item))
        .route("/v1/admin/catalog/{id}", patch(update_item).delete(delete_item))
        .route("/v1/admin/catalog/{id}/slots", post(add_slot))
        .route("/v1/admin/bookings/{id}/status", post(change_status))
        .route("/v1/admin/bookings/{id}/refund", post(record_refund))
}

async fn create_item(
    State(state): State<AppState>,
    Extension(admin): Extension<Requester>,
    payload: Result<Json<NewCatalogItem>, JsonRejection>,
) -> Result<(StatusCode, Json<CatalogItem>), AppError> {
    let Json(mut draft) = payload?;
    if draft.currency.trim().is_empty() {
        draft.currency = state.default_currency.clone();
    }
    let item = state.catalog.create_item(&admin, draft).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn update_item(
    State(state): State<AppState>,
    Extension(admin): Extension<Requester>,
    Path(id): Path<Uuid>,
    payload: Result<Json<CatalogItemUpdate>, JsonRejection>,
) -> Result<Json<CatalogItem>, AppError> {
    let Json(update) = payload?;
    Ok(Json(state.catalog.update_item(&admin, id, update).await?))
}

async fn delete_item(
    State(state): State<AppState>,
    Extension(admin): Extension<Requester>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.catalog.delete_item(&admin, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_slot(
    State(state): State<AppState>,
    Extension(admin): Extension<Requester>,
    Path(id): Path<Uuid>,
    payload: Result<Json<NewSlotRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CatalogItem>), AppError> {
    let Json(req) = payload?;
    let item = state.catalog.add_slot(&admin, id, req.start_date, req.end_date).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn change_status(
    State(state): State<AppState>,
    Extension(admin): Extension<Requester>,
    Path(id): Path<Uuid>,
    payload: Result<Json<StatusChangeRequest>, JsonRejection>,
) -> Result<Json<Booking>, AppError> {
    let Json(req) = payload?;
    Ok(Json(state.bookings.advance_status(&admin, id, req.status).await?))
}

async fn record_refund(
    State(state): State<AppState>,
    Extension(admin): Extension<Requester>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.bookings.record_refund(&admin, id).await?))
}
