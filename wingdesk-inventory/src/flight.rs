use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use wingdesk_core::changes::ChangeSet;
use wingdesk_core::{
    CoreError, CoreResult, Flight, FlightPriceHistory, HistorySink, Money, Repository,
};
use wingdesk_shared::models::{EntityKind, HistoryAction, HistoryEvent};

use crate::inventory;

/// Limits applied to flight schedules.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FlightRules {
    /// Sales may not open further than this many days from now.
    pub max_on_sale_days: i64,
}

impl Default for FlightRules {
    fn default() -> Self {
        Self { max_on_sale_days: 365 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFlight {
    pub guide_id: Uuid,
    pub from_airport_id: Uuid,
    pub to_airport_id: Uuid,
    pub departure_at: DateTime<Utc>,
    pub arrival_at: DateTime<Utc>,
    pub price: Money,
    pub currency: String,
    pub total_seats: i32,
    /// Defaults to now.
    pub on_sale: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlightPatch {
    pub guide_id: Option<Uuid>,
    pub departure_at: Option<DateTime<Utc>>,
    pub arrival_at: Option<DateTime<Utc>>,
    pub price: Option<Money>,
    pub currency: Option<String>,
    pub total_seats: Option<i32>,
    pub on_sale: Option<DateTime<Utc>>,
    /// Stored with the price history entry when the price changes.
    pub comment: Option<String>,
}

impl FlightPatch {
    /// Field-by-field merge onto a copy of `flight`.
    pub fn apply(&self, flight: &Flight) -> CoreResult<Flight> {
        let mut next = flight.clone();

        if let Some(guide_id) = self.guide_id {
            next.guide_id = guide_id;
        }
        if let Some(departure_at) = self.departure_at {
            next.departure_at = departure_at;
        }
        if let Some(arrival_at) = self.arrival_at {
            next.arrival_at = arrival_at;
        }
        if let Some(price) = self.price {
            next.price = price;
        }
        if let Some(currency) = &self.currency {
            next.currency = currency.clone();
        }
        if let Some(on_sale) = self.on_sale {
            next.on_sale = on_sale;
        }
        if let Some(total_seats) = self.total_seats {
            inventory::resize(&mut next, total_seats)?;
        }

        Ok(next)
    }

    fn touches_schedule(&self) -> bool {
        self.departure_at.is_some() || self.arrival_at.is_some() || self.on_sale.is_some()
    }
}

/// Rules a flight must satisfy before it is written.
pub fn validate_flight(flight: &Flight, now: DateTime<Utc>, rules: &FlightRules) -> CoreResult<()> {
    if flight.departure_at <= now {
        return Err(CoreError::Validation("departure must be in the future".to_string()));
    }
    if flight.arrival_at <= flight.departure_at {
        return Err(CoreError::Validation("arrival must be after departure".to_string()));
    }
    if flight.from_airport_id == flight.to_airport_id {
        return Err(CoreError::Validation("origin and destination must differ".to_string()));
    }
    if flight.total_seats < 1 {
        return Err(CoreError::Validation("total_seats must be at least 1".to_string()));
    }
    if flight.price < 0 {
        return Err(CoreError::Validation("price must not be negative".to_string()));
    }
    if flight.currency.len() != 3 || !flight.currency.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(CoreError::Validation(format!(
            "currency '{}' is not an ISO 4217 code",
            flight.currency
        )));
    }
    if flight.on_sale > flight.departure_at {
        return Err(CoreError::Validation("sales must open before departure".to_string()));
    }
    if flight.on_sale > now + Duration::days(rules.max_on_sale_days) {
        return Err(CoreError::Validation(format!(
            "sales may not open more than {} days ahead",
            rules.max_on_sale_days
        )));
    }
    Ok(())
}

pub fn price_entry(flight: &Flight, actor_id: Uuid, comment: impl Into<String>) -> FlightPriceHistory {
    FlightPriceHistory {
        id: Uuid::new_v4(),
        flight_id: flight.id,
        price: flight.price,
        currency: flight.currency.clone(),
        comment: comment.into(),
        created_by: actor_id,
        created_at: Utc::now(),
    }
}

/// Owns flight capacity, the sales window and price history.
pub struct FlightManager {
    repo: Arc<dyn Repository>,
    history: Arc<dyn HistorySink>,
    rules: FlightRules,
}

impl FlightManager {
    pub fn new(repo: Arc<dyn Repository>, history: Arc<dyn HistorySink>, rules: FlightRules) -> Self {
        Self { repo, history, rules }
    }

    pub async fn create(&self, input: NewFlight, actor_id: Uuid) -> CoreResult<Flight> {
        let now = Utc::now();
        let flight = Flight {
            id: Uuid::new_v4(),
            guide_id: input.guide_id,
            from_airport_id: input.from_airport_id,
            to_airport_id: input.to_airport_id,
            departure_at: input.departure_at,
            arrival_at: input.arrival_at,
            price: input.price,
            currency: input.currency,
            total_seats: input.total_seats,
            left_seats: input.total_seats,
            on_sale: input.on_sale.unwrap_or(now),
            created_by: actor_id,
            created_at: now,
            deleted_at: None,
        };
        validate_flight(&flight, now, &self.rules)?;

        let mut uow = self.repo.begin().await?;
        if uow.flight_guide(flight.guide_id).await?.is_none() {
            return Err(CoreError::not_found("flight guide", flight.guide_id));
        }
        uow.insert_flight(&flight).await?;
        uow.commit().await?;

        info!("Flight created: {} ({} seats, price {})", flight.id, flight.total_seats, flight.price);
        self.history.record(HistoryEvent::new(
            EntityKind::Flight,
            flight.id,
            HistoryAction::Created,
            actor_id,
            format!("{} seats at {} {}", flight.total_seats, flight.price, flight.currency),
        ));
        Ok(flight)
    }

    /// Apply a patch. A price change appends one price history entry.
    pub async fn update(&self, flight_id: Uuid, patch: FlightPatch, actor_id: Uuid) -> CoreResult<Flight> {
        let mut uow = self.repo.begin().await?;
        let current = uow
            .flight(flight_id)
            .await?
            .filter(|f| !f.is_deleted())
            .ok_or_else(|| CoreError::not_found("flight", flight_id))?;

        let next = patch.apply(&current)?;
        let now = Utc::now();
        if patch.touches_schedule() || next.price != current.price || next.currency != current.currency {
            validate_flight(&next, now, &self.rules)?;
        }
        if next.guide_id != current.guide_id && uow.flight_guide(next.guide_id).await?.is_none() {
            return Err(CoreError::not_found("flight guide", next.guide_id));
        }

        let diff = ChangeSet::new()
            .field("price", current.price, next.price)
            .field("currency", current.currency.as_str(), next.currency.as_str())
            .field("total_seats", current.total_seats, next.total_seats)
            .field("left_seats", current.left_seats, next.left_seats)
            .field("departure_at", current.departure_at, next.departure_at)
            .field("arrival_at", current.arrival_at, next.arrival_at)
            .field("on_sale", current.on_sale, next.on_sale)
            .field("guide_id", current.guide_id, next.guide_id);
        if diff.is_empty() {
            return Ok(current);
        }

        uow.update_flight(&next).await?;
        if next.price != current.price {
            let comment = patch.comment.clone().unwrap_or_else(|| "price updated".to_string());
            uow.append_price_history(&price_entry(&next, actor_id, comment)).await?;
        }
        uow.commit().await?;

        info!("Flight updated: {} ({})", next.id, diff.describe());
        self.history.record(HistoryEvent::new(
            EntityKind::Flight,
            next.id,
            HistoryAction::Updated,
            actor_id,
            diff.describe(),
        ));
        Ok(next)
    }

    /// `left_seats += delta`, bounded by `0..=total_seats`.
    pub async fn update_seats(&self, flight_id: Uuid, delta: i32, actor_id: Uuid) -> CoreResult<Flight> {
        let mut uow = self.repo.begin().await?;
        let mut flight = uow
            .flight(flight_id)
            .await?
            .filter(|f| !f.is_deleted())
            .ok_or_else(|| CoreError::not_found("flight", flight_id))?;

        let before = flight.left_seats;
        inventory::adjust_left_seats(&mut flight, delta)?;
        uow.update_flight(&flight).await?;
        uow.commit().await?;

        info!("Flight {} seats adjusted by {}: {} left", flight.id, delta, flight.left_seats);
        self.history.record(HistoryEvent::new(
            EntityKind::Flight,
            flight.id,
            HistoryAction::Updated,
            actor_id,
            ChangeSet::new().field("left_seats", before, flight.left_seats).describe(),
        ));
        Ok(flight)
    }

    /// Soft-delete. Tickets and bookings must be cancelled first.
    pub async fn delete(&self, flight_id: Uuid, actor_id: Uuid) -> CoreResult<Flight> {
        let mut uow = self.repo.begin().await?;
        let mut flight = uow
            .flight(flight_id)
            .await?
            .filter(|f| !f.is_deleted())
            .ok_or_else(|| CoreError::not_found("flight", flight_id))?;

        let tickets = uow.active_tickets(flight_id).await?;
        let bookings = uow.active_bookings(flight_id).await?;
        if !tickets.is_empty() || !bookings.is_empty() {
            warn!(
                "Refusing to delete flight {}: {} active tickets, {} active bookings",
                flight_id,
                tickets.len(),
                bookings.len()
            );
            return Err(CoreError::Conflict(format!(
                "flight {} still has {} active tickets and {} active bookings",
                flight_id,
                tickets.len(),
                bookings.len()
            )));
        }

        flight.deleted_at = Some(Utc::now());
        uow.update_flight(&flight).await?;
        uow.commit().await?;

        info!("Flight deleted: {}", flight.id);
        self.history.record(HistoryEvent::new(
            EntityKind::Flight,
            flight.id,
            HistoryAction::Deleted,
            actor_id,
            "flight deleted",
        ));
        Ok(flight)
    }

    /// Open sales immediately.
    pub async fn set_on_sale_now(&self, flight_id: Uuid, actor_id: Uuid) -> CoreResult<Flight> {
        let mut uow = self.repo.begin().await?;
        let mut flight = uow
            .flight(flight_id)
            .await?
            .ok_or_else(|| CoreError::not_found("flight", flight_id))?;

        let now = Utc::now();
        if flight.is_deleted() {
            return Err(CoreError::State(format!("flight {} is deleted", flight_id)));
        }
        if flight.has_departed(now) {
            return Err(CoreError::State(format!("flight {} has already departed", flight_id)));
        }
        if flight.is_on_sale(now) {
            return Err(CoreError::State(format!("flight {} is already on sale", flight_id)));
        }

        flight.on_sale = now;
        uow.update_flight(&flight).await?;
        uow.commit().await?;

        info!("Flight {} put on sale", flight.id);
        self.history.record(HistoryEvent::new(
            EntityKind::Flight,
            flight.id,
            HistoryAction::OnSale,
            actor_id,
            format!("on sale from {}", now.to_rfc3339()),
        ));
        Ok(flight)
    }

    /// Price history of a flight, oldest first.
    pub async fn price_history(&self, flight_id: Uuid) -> CoreResult<Vec<FlightPriceHistory>> {
        let mut uow = self.repo.begin().await?;
        if uow.flight(flight_id).await?.is_none() {
            return Err(CoreError::not_found("flight", flight_id));
        }
        let mut entries = uow.price_history(flight_id).await?;
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }
}
