use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use tourdesk_booking::AvailabilityView;
use tourdesk_catalog::{CatalogItem, Quote};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PartyQuery {
    pub date: NaiveDate,
    pub party_size: u32,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/catalog", get(list_items))
        .route("/v1/catalog/{item_id}", get(get_item))
        .route("/v1/catalog/{item_id}/availability", get(get_availability))
        .route("/v1/catalog/{item_id}/quote", get(get_quote))
}

async fn list_items(State(state): State<AppState>) -> Result<Json<Vec<CatalogItem>>, AppError> {
    Ok(Json(state.catalog.list_items().await?))
}

async fn get_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> Result<Json<CatalogItem>, AppError> {
    Ok(Json(state.catalog.get_item(item_id).await?))
}

/// GET /v1/catalog/{item_id}/availability?date=&party_size=
async fn get_availability(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Query(query): Query<PartyQuery>,
) -> Result<Json<AvailabilityView>, AppError> {
    let view = state.catalog.availability(item_id, query.date, query.party_size).await?;
    Ok(Json(view))
}

/// GET /v1/catalog/{item_id}/quote?date=&party_size=
async fn get_quote(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Query(query): Query<PartyQuery>,
) -> Result<Json<Quote>, AppError> {
    let quote = state.catalog.quote(item_id, query.date, query.party_size).await?;
    Ok(Json(quote))
}
