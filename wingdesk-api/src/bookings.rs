use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{patch, post},
    Extension, Json, Router,
};
use uuid::Uuid;
use wingdesk_core::{Booking, Permission};
use wingdesk_sales::{BookingPatch, NewBooking};

use crate::error::AppError;
use crate::middleware::StaffClaims;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/flights/{id}/bookings", post(create_booking))
        .route("/v1/bookings/{id}", patch(update_booking).delete(delete_booking))
}

async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    Path(flight_id): Path<Uuid>,
    Json(req): Json<NewBooking>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let actor = claims.require(Permission::BookingsWrite)?;
    let booking = state.bookings.create(req, flight_id, actor).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn update_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<BookingPatch>,
) -> Result<Json<Booking>, AppError> {
    let actor = claims.require(Permission::BookingsWrite)?;
    Ok(Json(state.bookings.update(booking_id, req, actor).await?))
}

async fn delete_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    let actor = claims.require(Permission::BookingsDelete)?;
    Ok(Json(state.bookings.delete(booking_id, actor).await?))
}
