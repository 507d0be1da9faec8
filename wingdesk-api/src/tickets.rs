use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{patch, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use wingdesk_core::{Passenger, Permission, SeatSource, Ticket};
use wingdesk_sales::{CancelTicket, NewTicket, TicketPatch};

use crate::error::AppError;
use crate::middleware::StaffClaims;
use crate::state::AppState;

// ============================================================================
// Request Types
// ============================================================================

/// Sale request; `hard`/`soft` pick the agent's booking block to draw from.
#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub agent_id: Uuid,
    pub passenger: Passenger,
    #[serde(default)]
    pub luggage: bool,
    #[serde(default)]
    pub hard: bool,
    #[serde(default)]
    pub soft: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTicketRequest {
    #[serde(flatten)]
    pub patch: TicketPatch,
    pub hard: Option<bool>,
    pub soft: Option<bool>,
}

impl UpdateTicketRequest {
    fn into_patch(self) -> Result<TicketPatch, AppError> {
        let mut patch = self.patch;
        if self.hard.is_some() || self.soft.is_some() {
            let source = SeatSource::from_flags(self.hard.unwrap_or(false), self.soft.unwrap_or(false))?;
            patch.source = Some(source);
        }
        Ok(patch)
    }
}

// ============================================================================
// Handlers
// ============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/flights/{id}/tickets", post(create_ticket))
        .route("/v1/tickets/{id}", patch(update_ticket))
        .route("/v1/tickets/{id}/cancel", post(cancel_ticket))
}

async fn create_ticket(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    Path(flight_id): Path<Uuid>,
    Json(req): Json<CreateTicketRequest>,
) -> Result<(StatusCode, Json<Ticket>), AppError> {
    let actor = claims.require(Permission::TicketsWrite)?;
    let input = NewTicket {
        agent_id: req.agent_id,
        passenger: req.passenger,
        luggage: req.luggage,
        source: SeatSource::from_flags(req.hard, req.soft)?,
    };
    let ticket = state.tickets.create(input, flight_id, actor).await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

/// Returns the replacement ticket when `agent_id` changes.
async fn update_ticket(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    Path(ticket_id): Path<Uuid>,
    Json(req): Json<UpdateTicketRequest>,
) -> Result<Json<Ticket>, AppError> {
    let actor = claims.require(Permission::TicketsWrite)?;
    Ok(Json(state.tickets.update(ticket_id, req.into_patch()?, actor).await?))
}

async fn cancel_ticket(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    Path(ticket_id): Path<Uuid>,
    Json(req): Json<CancelTicket>,
) -> Result<Json<Ticket>, AppError> {
    let actor = claims.require(Permission::TicketsCancel)?;
    Ok(Json(state.tickets.cancel(ticket_id, req, actor).await?))
}
