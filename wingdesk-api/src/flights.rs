use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use uuid::Uuid;
use wingdesk_core::{Flight, FlightPriceHistory, Permission};
use wingdesk_inventory::{FlightPatch, NewFlight};

use crate::error::AppError;
use crate::middleware::StaffClaims;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/flights", post(create_flight))
        .route("/v1/flights/{id}", patch(update_flight).delete(delete_flight))
        .route("/v1/flights/{id}/on-sale", post(set_on_sale))
        .route("/v1/flights/{id}/price-history", get(price_history))
}

/// POST /v1/flights
async fn create_flight(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    Json(req): Json<NewFlight>,
) -> Result<(StatusCode, Json<Flight>), AppError> {
    let actor = claims.require(Permission::FlightsWrite)?;
    let flight = state.flights.create(req, actor).await?;
    Ok((StatusCode::CREATED, Json(flight)))
}

/// PATCH /v1/flights/{id}
async fn update_flight(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    Path(flight_id): Path<Uuid>,
    Json(req): Json<FlightPatch>,
) -> Result<Json<Flight>, AppError> {
    let actor = claims.require(Permission::FlightsWrite)?;
    Ok(Json(state.flights.update(flight_id, req, actor).await?))
}

/// DELETE /v1/flights/{id}
async fn delete_flight(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    Path(flight_id): Path<Uuid>,
) -> Result<Json<Flight>, AppError> {
    let actor = claims.require(Permission::FlightsDelete)?;
    Ok(Json(state.flights.delete(flight_id, actor).await?))
}

/// POST /v1/flights/{id}/on-sale
async fn set_on_sale(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    Path(flight_id): Path<Uuid>,
) -> Result<Json<Flight>, AppError> {
    let actor = claims.require(Permission::FlightsWrite)?;
    Ok(Json(state.flights.set_on_sale_now(flight_id, actor).await?))
}

/// GET /v1/flights/{id}/price-history
async fn price_history(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    Path(flight_id): Path<Uuid>,
) -> Result<Json<Vec<FlightPriceHistory>>, AppError> {
    claims.require(Permission::FlightsRead)?;
    Ok(Json(state.flights.price_history(flight_id).await?))
}
