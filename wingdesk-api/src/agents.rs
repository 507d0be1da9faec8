use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{patch, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use wingdesk_core::{AgentDebt, Money, Permission, Refill};

use crate::error::AppError;
use crate::middleware::StaffClaims;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RefillRequest {
    pub amount: Money,
    pub comment: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/agents/{id}/refills", post(create_refill))
        .route("/v1/agents/{id}/debts", axum::routing::get(list_debts))
        .route("/v1/refills/{id}", patch(update_refill).delete(delete_refill))
}

/// POST /v1/agents/{id}/refills; the calling staff member is the receiver.
async fn create_refill(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    Path(agent_id): Path<Uuid>,
    Json(req): Json<RefillRequest>,
) -> Result<(StatusCode, Json<Refill>), AppError> {
    let receiver = claims.require(Permission::BalanceWrite)?;
    let refill = state.balance.refill(agent_id, req.amount, receiver, req.comment).await?;
    Ok((StatusCode::CREATED, Json(refill)))
}

async fn update_refill(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    Path(refill_id): Path<Uuid>,
    Json(req): Json<RefillRequest>,
) -> Result<Json<Refill>, AppError> {
    let actor = claims.require(Permission::BalanceWrite)?;
    Ok(Json(state.balance.update_refill(refill_id, req.amount, req.comment, actor).await?))
}

async fn delete_refill(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    Path(refill_id): Path<Uuid>,
) -> Result<Json<Refill>, AppError> {
    let actor = claims.require(Permission::BalanceWrite)?;
    Ok(Json(state.balance.delete_refill(refill_id, actor).await?))
}

async fn list_debts(
    State(state): State<AppState>,
    Extension(claims): Extension<StaffClaims>,
    Path(agent_id): Path<Uuid>,
) -> Result<Json<Vec<AgentDebt>>, AppError> {
    claims.require(Permission::BalanceRead)?;
    Ok(Json(state.balance.debts(agent_id).await?))
}
