use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use wingdesk_core::changes::ChangeSet;
use wingdesk_core::{Booking, CoreError, CoreResult, HistorySink, Repository};
use wingdesk_inventory::inventory;
use wingdesk_shared::models::{EntityKind, HistoryAction, HistoryEvent};

use crate::balance;
use crate::ledger;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBooking {
    pub agent_id: Uuid,
    pub hard_block: i32,
    pub soft_block: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingPatch {
    pub hard_block: Option<i32>,
    pub soft_block: Option<i32>,
}

impl BookingPatch {
    /// Field-by-field merge onto a copy of `booking`.
    pub fn apply(&self, booking: &Booking) -> CoreResult<Booking> {
        let mut next = booking.clone();
        if let Some(hard_block) = self.hard_block {
            next.hard_block = hard_block;
        }
        if let Some(soft_block) = self.soft_block {
            next.soft_block = soft_block;
        }
        validate_blocks(next.hard_block, next.soft_block)?;
        Ok(next)
    }
}

/// Both blocks non-negative with a representable total; returns the total.
fn validate_blocks(hard_block: i32, soft_block: i32) -> CoreResult<i32> {
    if hard_block < 0 || soft_block < 0 {
        return Err(CoreError::Validation("blocks must not be negative".to_string()));
    }
    hard_block
        .checked_add(soft_block)
        .ok_or_else(|| CoreError::Validation("blocks exceed any seat capacity".to_string()))
}

/// Seat blocks held by agents. A booking's seats leave general inventory when
/// it is made and come back when it shrinks or is deleted.
pub struct BookingManager {
    repo: Arc<dyn Repository>,
    history: Arc<dyn HistorySink>,
}

impl BookingManager {
    pub fn new(repo: Arc<dyn Repository>, history: Arc<dyn HistorySink>) -> Self {
        Self { repo, history }
    }

    /// One booking per (agent, flight). Snapshots the flight price.
    pub async fn create(&self, input: NewBooking, flight_id: Uuid, actor_id: Uuid) -> CoreResult<Booking> {
        if validate_blocks(input.hard_block, input.soft_block)? == 0 {
            return Err(CoreError::Validation("a booking must block at least one seat".to_string()));
        }

        let mut uow = self.repo.begin().await?;
        let mut flight = uow
            .flight(flight_id)
            .await?
            .filter(|f| !f.is_deleted())
            .ok_or_else(|| CoreError::not_found("flight", flight_id))?;
        let now = Utc::now();
        if flight.has_departed(now) {
            return Err(CoreError::State(format!("flight {} has already departed", flight_id)));
        }
        uow.agent(input.agent_id)
            .await?
            .filter(|a| a.is_active())
            .ok_or_else(|| CoreError::not_found("agent", input.agent_id))?;

        if uow.active_booking(input.agent_id, flight_id).await?.is_some() {
            return Err(CoreError::Conflict(format!(
                "agent {} already holds a booking on flight {}",
                input.agent_id, flight_id
            )));
        }

        let booking = Booking {
            id: Uuid::new_v4(),
            flight_id,
            agent_id: input.agent_id,
            hard_block: input.hard_block,
            soft_block: input.soft_block,
            price: flight.price,
            created_by: actor_id,
            created_at: now,
            deleted_at: None,
        };
        inventory::adjust_left_seats(&mut flight, -booking.seats())?;

        uow.update_flight(&flight).await?;
        uow.insert_booking(&booking).await?;
        uow.commit().await?;

        info!(
            "Booking {} created for agent {} on flight {}: hard {}, soft {}, {} seats left",
            booking.id, booking.agent_id, flight.id, booking.hard_block, booking.soft_block, flight.left_seats
        );
        self.history.record(HistoryEvent::new(
            EntityKind::Booking,
            booking.id,
            HistoryAction::Created,
            actor_id,
            format!("hard_block {}, soft_block {}, price {}", booking.hard_block, booking.soft_block, booking.price),
        ));
        Ok(booking)
    }

    /// Resize the blocks; the difference moves to or from general inventory.
    pub async fn update(&self, booking_id: Uuid, patch: BookingPatch, actor_id: Uuid) -> CoreResult<Booking> {
        let mut uow = self.repo.begin().await?;
        let (flight_id, _) = uow
            .booking_keys(booking_id)
            .await?
            .ok_or_else(|| CoreError::not_found("booking", booking_id))?;
        let mut flight = uow
            .flight(flight_id)
            .await?
            .ok_or_else(|| CoreError::not_found("flight", flight_id))?;
        let current = uow
            .booking(booking_id)
            .await?
            .filter(|b| !b.is_deleted())
            .ok_or_else(|| CoreError::not_found("booking", booking_id))?;
        let next = patch.apply(&current)?;

        let diff = ChangeSet::new()
            .field("hard_block", current.hard_block, next.hard_block)
            .field("soft_block", current.soft_block, next.soft_block);
        if diff.is_empty() {
            return Ok(current);
        }

        inventory::adjust_left_seats(&mut flight, current.seats() - next.seats())?;

        uow.update_flight(&flight).await?;
        uow.update_booking(&next).await?;
        uow.commit().await?;

        info!("Booking {} updated ({}), flight {} has {} seats left", next.id, diff.describe(), flight.id, flight.left_seats);
        self.history.record(HistoryEvent::new(
            EntityKind::Booking,
            next.id,
            HistoryAction::Updated,
            actor_id,
            diff.describe(),
        ));
        Ok(next)
    }

    /// Return every blocked seat to the flight and refund the pre-paid hard
    /// block at the snapshot price.
    pub async fn delete(&self, booking_id: Uuid, actor_id: Uuid) -> CoreResult<Booking> {
        let mut uow = self.repo.begin().await?;
        let (flight_id, agent_id) = uow
            .booking_keys(booking_id)
            .await?
            .ok_or_else(|| CoreError::not_found("booking", booking_id))?;
        let mut flight = uow
            .flight(flight_id)
            .await?
            .ok_or_else(|| CoreError::not_found("flight", flight_id))?;
        let mut agent = uow
            .agent(agent_id)
            .await?
            .ok_or_else(|| CoreError::not_found("agent", agent_id))?;
        let mut booking = uow
            .booking(booking_id)
            .await?
            .filter(|b| !b.is_deleted())
            .ok_or_else(|| CoreError::not_found("booking", booking_id))?;

        inventory::adjust_left_seats(&mut flight, booking.seats())?;
        let refund = booking.price * i64::from(booking.hard_block);
        balance::apply_credit(&mut agent, refund);
        booking.deleted_at = Some(Utc::now());

        uow.update_flight(&flight).await?;
        uow.update_agent(&agent).await?;
        uow.update_booking(&booking).await?;
        if refund > 0 {
            let comment = format!("booking {} deleted: {} hard-blocked seats", booking.id, booking.hard_block);
            uow.append_debt(&ledger::refund(agent.id, flight.id, refund, actor_id, Some(comment)))
                .await?;
        }
        uow.commit().await?;

        info!(
            "Booking {} deleted: {} seats back to flight {}, agent {} refunded {}",
            booking.id,
            booking.seats(),
            flight.id,
            agent.id,
            refund
        );
        self.history.record(HistoryEvent::new(
            EntityKind::Booking,
            booking.id,
            HistoryAction::Deleted,
            actor_id,
            format!("released {} seats, refunded {}", booking.seats(), refund),
        ));
        Ok(booking)
    }
}
