use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use wingdesk_core::changes::ChangeSet;
use wingdesk_core::{
    Agent, BlockKind, Booking, CoreError, CoreResult, Flight, HistorySink, Money, Passenger,
    Repository, RestockPolicy, SeatSource, Ticket, TicketStatus, UnitOfWork,
};
use wingdesk_inventory::inventory;
use wingdesk_inventory::pricing::{self, PricingContext};
use wingdesk_shared::models::{EntityKind, HistoryAction, HistoryEvent};
use wingdesk_shared::Masked;

use crate::balance;
use crate::ledger;
use crate::numbering;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTicket {
    pub agent_id: Uuid,
    pub passenger: Passenger,
    #[serde(default)]
    pub luggage: bool,
    #[serde(default)]
    pub source: SeatSource,
}

/// Partial ticket update. A different `agent_id` replaces the ticket.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketPatch {
    pub agent_id: Option<Uuid>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub document_number: Option<Masked<String>>,
    pub birth_date: Option<NaiveDate>,
    pub phone: Option<String>,
    pub luggage: Option<bool>,
    pub source: Option<SeatSource>,
}

impl TicketPatch {
    pub fn merge_passenger(&self, passenger: &Passenger) -> Passenger {
        let mut next = passenger.clone();
        if let Some(first_name) = &self.first_name {
            next.first_name = first_name.clone();
        }
        if let Some(last_name) = &self.last_name {
            next.last_name = last_name.clone();
        }
        if let Some(document_number) = &self.document_number {
            next.document_number = document_number.clone();
        }
        if let Some(birth_date) = self.birth_date {
            next.birth_date = Some(birth_date);
        }
        if let Some(phone) = &self.phone {
            next.phone = Some(phone.clone());
        }
        next
    }

    fn replaces_agent_of(&self, ticket: &Ticket) -> Option<Uuid> {
        self.agent_id.filter(|agent_id| ticket.agent_id != Some(*agent_id))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelTicket {
    #[serde(default)]
    pub fine: Money,
    pub comment: Option<String>,
}

fn pool_label(block: Option<BlockKind>) -> &'static str {
    block.map(|kind| kind.as_str()).unwrap_or("general")
}

fn optional<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

fn take_from_block(booking: Option<&mut Booking>, kind: BlockKind, ticket_agent: Uuid) -> CoreResult<()> {
    let booking = booking.ok_or_else(|| {
        CoreError::Quota(format!("agent {} holds no booking on this flight", ticket_agent))
    })?;
    if booking.block(kind) < 1 {
        return Err(CoreError::Quota(format!("booking {}: {} block exhausted", booking.id, kind)));
    }
    *booking.block_mut(kind) -= 1;
    Ok(())
}

/// Ticket sales against general inventory or an agent's booking blocks.
///
/// Every public operation runs in one unit of work: the agent charge, the seat
/// movement, the ticket row and its ledger row commit together or not at all.
pub struct TicketManager {
    repo: Arc<dyn Repository>,
    history: Arc<dyn HistorySink>,
    policy: RestockPolicy,
    default_carrier: String,
}

impl TicketManager {
    pub fn new(
        repo: Arc<dyn Repository>,
        history: Arc<dyn HistorySink>,
        policy: RestockPolicy,
        default_carrier: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            history,
            policy,
            default_carrier: default_carrier.into(),
        }
    }

    pub fn policy(&self) -> RestockPolicy {
        self.policy
    }

    pub async fn create(&self, input: NewTicket, flight_id: Uuid, actor_id: Uuid) -> CoreResult<Ticket> {
        let mut uow = self.repo.begin().await?;
        let mut journal = Vec::new();
        let ticket = self.create_in(uow.as_mut(), input, flight_id, actor_id, &mut journal).await?;
        uow.commit().await?;

        self.history.record_all(journal);
        Ok(ticket)
    }

    /// Refund the price minus the fine and put the seat back.
    pub async fn cancel(&self, ticket_id: Uuid, input: CancelTicket, actor_id: Uuid) -> CoreResult<Ticket> {
        let mut uow = self.repo.begin().await?;
        let mut journal = Vec::new();
        let ticket = self
            .cancel_in(uow.as_mut(), ticket_id, input, TicketStatus::Cancelled, actor_id, &mut journal)
            .await?;
        uow.commit().await?;

        self.history.record_all(journal);
        Ok(ticket)
    }

    /// Returns the updated ticket, or the replacement when the agent changed.
    pub async fn update(&self, ticket_id: Uuid, patch: TicketPatch, actor_id: Uuid) -> CoreResult<Ticket> {
        let mut uow = self.repo.begin().await?;
        let mut journal = Vec::new();
        let ticket = self.update_in(uow.as_mut(), ticket_id, patch, actor_id, &mut journal).await?;
        uow.commit().await?;

        self.history.record_all(journal);
        Ok(ticket)
    }

    async fn create_in(
        &self,
        uow: &mut dyn UnitOfWork,
        input: NewTicket,
        flight_id: Uuid,
        actor_id: Uuid,
        journal: &mut Vec<HistoryEvent>,
    ) -> CoreResult<Ticket> {
        let now = Utc::now();
        let mut flight = uow
            .flight(flight_id)
            .await?
            .filter(|f| !f.is_deleted())
            .ok_or_else(|| CoreError::not_found("flight", flight_id))?;
        if !flight.is_on_sale(now) {
            return Err(CoreError::State(format!("flight {} is not on sale until {}", flight.id, flight.on_sale)));
        }
        if flight.has_departed(now) {
            return Err(CoreError::State(format!("flight {} has already departed", flight.id)));
        }

        let mut agent = uow
            .agent(input.agent_id)
            .await?
            .filter(|a| a.is_active())
            .ok_or_else(|| CoreError::not_found("agent", input.agent_id))?;
        let discount = match agent.discount_id {
            Some(discount_id) => Some(
                uow.discount(discount_id)
                    .await?
                    .ok_or_else(|| CoreError::not_found("discount", discount_id))?,
            ),
            None => None,
        };
        let mut booking = match input.source {
            SeatSource::General => None,
            SeatSource::Hard | SeatSource::Soft => uow.active_booking(agent.id, flight.id).await?,
        };
        let guide = uow
            .flight_guide(flight.guide_id)
            .await?
            .ok_or_else(|| CoreError::not_found("flight guide", flight.guide_id))?;

        let quote = pricing::quote(&PricingContext {
            flight: &flight,
            discount: discount.as_ref(),
            source: input.source,
            booking: booking.as_ref(),
            luggage_fee: input.luggage.then_some(guide.luggage_fee),
        });

        balance::ensure_can_charge(&agent, quote.total)?;
        match input.source.block() {
            Some(kind) => take_from_block(booking.as_mut(), kind, agent.id)?,
            None => inventory::adjust_left_seats(&mut flight, -1)?,
        }
        balance::apply_charge(&mut agent, quote.total)?;

        let ticket = Ticket {
            id: Uuid::new_v4(),
            number: numbering::ticket_number(&guide.carrier_code, &self.default_carrier),
            flight_id: flight.id,
            agent_id: Some(agent.id),
            passenger: input.passenger,
            luggage: input.luggage,
            price: quote.total,
            is_booked: input.source.is_booked(),
            block: input.source.block(),
            status: TicketStatus::Active,
            created_by: actor_id,
            created_at: now,
            cancelled_at: None,
        };

        uow.update_agent(&agent).await?;
        match &booking {
            Some(booking) if ticket.is_booked => uow.update_booking(booking).await?,
            _ => uow.update_flight(&flight).await?,
        }
        uow.insert_ticket(&ticket).await?;
        uow.append_debt(&ledger::purchase(agent.id, flight.id, ticket.id, ticket.price, actor_id, None))
            .await?;

        info!(
            "Ticket {} ({}) sold on flight {} by agent {}: price {}, pool {}, agent balance {}",
            ticket.id,
            ticket.number,
            flight.id,
            agent.id,
            ticket.price,
            pool_label(ticket.block),
            agent.balance
        );
        journal.push(HistoryEvent::new(
            EntityKind::Ticket,
            ticket.id,
            HistoryAction::Created,
            actor_id,
            format!(
                "number {}, price {} (base {}, discount {}, drift {}, luggage {}), pool {}",
                ticket.number,
                ticket.price,
                quote.base,
                quote.discount,
                quote.drift,
                quote.luggage,
                pool_label(ticket.block)
            ),
        ));
        Ok(ticket)
    }

    async fn cancel_in(
        &self,
        uow: &mut dyn UnitOfWork,
        ticket_id: Uuid,
        input: CancelTicket,
        status: TicketStatus,
        actor_id: Uuid,
        journal: &mut Vec<HistoryEvent>,
    ) -> CoreResult<Ticket> {
        if input.fine < 0 {
            return Err(CoreError::Validation("fine must not be negative".to_string()));
        }

        let mut ticket = uow
            .ticket(ticket_id)
            .await?
            .ok_or_else(|| CoreError::not_found("ticket", ticket_id))?;
        if !ticket.is_active() {
            return Err(CoreError::State(format!(
                "ticket {} is already {}",
                ticket.id,
                ticket.status.as_str()
            )));
        }
        let mut flight = uow
            .flight(ticket.flight_id)
            .await?
            .ok_or_else(|| CoreError::not_found("flight", ticket.flight_id))?;
        // Blocked agents still get their money back.
        let mut agent = match ticket.agent_id {
            Some(agent_id) => Some(
                uow.agent(agent_id)
                    .await?
                    .ok_or_else(|| CoreError::not_found("agent", agent_id))?,
            ),
            None => None,
        };

        let net = ticket.price - input.fine;
        if let Some(agent) = agent.as_mut() {
            if net < 0 {
                balance::apply_charge(agent, -net)?;
            } else {
                balance::apply_credit(agent, net);
            }
        }
        let restocked = self.restock(uow, &mut flight, &ticket).await?;

        ticket.status = status;
        ticket.cancelled_at = Some(Utc::now());

        uow.update_ticket(&ticket).await?;
        match &restocked {
            Some(booking) => uow.update_booking(booking).await?,
            None => uow.update_flight(&flight).await?,
        }
        if let Some(agent) = &agent {
            uow.update_agent(agent).await?;
            uow.append_debt(&ledger::fine(
                agent.id,
                flight.id,
                ticket.id,
                input.fine,
                actor_id,
                input.comment.clone(),
            ))
            .await?;
        }

        let pool = match &restocked {
            Some(booking) => format!("booking {}", booking.id),
            None => "general".to_string(),
        };
        info!(
            "Ticket {} {} on flight {}: fine {}, refunded {}, seat back to {}",
            ticket.id,
            status.as_str(),
            flight.id,
            input.fine,
            net,
            pool
        );
        let action = match status {
            TicketStatus::Replaced => HistoryAction::Replaced,
            _ => HistoryAction::Cancelled,
        };
        let mut detail = format!("fine {}, refunded {}, seat back to {}", input.fine, net, pool);
        if let Some(comment) = &input.comment {
            detail = format!("{} ({})", detail, comment);
        }
        journal.push(HistoryEvent::new(EntityKind::Ticket, ticket.id, action, actor_id, detail));
        Ok(ticket)
    }

    /// Put the seat of a cancelled ticket back according to the restock
    /// policy. Returns the booking when the seat went back into a block.
    async fn restock(
        &self,
        uow: &mut dyn UnitOfWork,
        flight: &mut Flight,
        ticket: &Ticket,
    ) -> CoreResult<Option<Booking>> {
        match (self.policy, ticket.block, ticket.agent_id) {
            (RestockPolicy::DebitedPool, Some(kind), Some(agent_id)) => {
                if let Some(mut booking) = uow.active_booking(agent_id, ticket.flight_id).await? {
                    *booking.block_mut(kind) += 1;
                    return Ok(Some(booking));
                }
                inventory::adjust_left_seats(flight, 1)?;
                Ok(None)
            }
            (RestockPolicy::Legacy, Some(kind), _) => {
                warn!(
                    "Ticket {} was drawn from a {} block; crediting general inventory of flight {}",
                    ticket.id, kind, flight.id
                );
                inventory::adjust_left_seats(flight, 1)?;
                Ok(None)
            }
            _ => {
                inventory::adjust_left_seats(flight, 1)?;
                Ok(None)
            }
        }
    }

    async fn update_in(
        &self,
        uow: &mut dyn UnitOfWork,
        ticket_id: Uuid,
        patch: TicketPatch,
        actor_id: Uuid,
        journal: &mut Vec<HistoryEvent>,
    ) -> CoreResult<Ticket> {
        let current = uow
            .ticket(ticket_id)
            .await?
            .ok_or_else(|| CoreError::not_found("ticket", ticket_id))?;
        if !current.is_active() {
            return Err(CoreError::State(format!(
                "ticket {} is already {}",
                current.id,
                current.status.as_str()
            )));
        }

        if let Some(agent_id) = patch.replaces_agent_of(&current) {
            // Both agents are locked, lowest id first, before any booking row.
            uow.flight(current.flight_id).await?;
            let mut agents: Vec<Uuid> = current.agent_id.into_iter().chain([agent_id]).collect();
            agents.sort();
            for id in agents {
                uow.agent(id).await?;
            }

            let replacement = NewTicket {
                agent_id,
                passenger: patch.merge_passenger(&current.passenger),
                luggage: patch.luggage.unwrap_or(current.luggage),
                source: patch.source.unwrap_or_default(),
            };
            let ticket = self.create_in(uow, replacement, current.flight_id, actor_id, journal).await?;
            let cancel = CancelTicket {
                fine: 0,
                comment: Some(format!("replaced by ticket {}", ticket.number)),
            };
            self.cancel_in(uow, current.id, cancel, TicketStatus::Replaced, actor_id, journal)
                .await?;
            info!("Ticket {} replaced by {} for agent {}", current.id, ticket.id, agent_id);
            return Ok(ticket);
        }

        let mut flight = uow
            .flight(current.flight_id)
            .await?
            .ok_or_else(|| CoreError::not_found("flight", current.flight_id))?;
        let guide = uow
            .flight_guide(flight.guide_id)
            .await?
            .ok_or_else(|| CoreError::not_found("flight guide", flight.guide_id))?;
        let mut agent: Option<Agent> = match current.agent_id {
            Some(agent_id) => Some(
                uow.agent(agent_id)
                    .await?
                    .ok_or_else(|| CoreError::not_found("agent", agent_id))?,
            ),
            None => None,
        };

        let mut next = current.clone();
        next.passenger = patch.merge_passenger(&current.passenger);

        // Luggage surcharge moves price and balance together.
        next.luggage = patch.luggage.unwrap_or(current.luggage);
        let delta = pricing::luggage_delta(current.luggage, next.luggage, guide.luggage_fee);
        next.price = current.price + delta;
        if let Some(agent) = agent.as_mut() {
            if delta > 0 {
                balance::apply_charge(agent, delta)?;
            } else {
                balance::apply_credit(agent, -delta);
            }
        }

        let mut booking = None;
        let mut flight_moved = false;
        if let Some(requested) = patch.source {
            let touches_block = match self.policy {
                RestockPolicy::Legacy => requested.is_booked(),
                RestockPolicy::DebitedPool => {
                    requested != current.source() && (requested.is_booked() || current.is_booked)
                }
            };
            if touches_block {
                let agent_id = current.agent_id.ok_or_else(|| {
                    CoreError::Validation(format!("ticket {} has no agent to hold a booking", current.id))
                })?;
                booking = uow.active_booking(agent_id, current.flight_id).await?;
            }
            flight_moved = self.move_seat(&current, requested, &mut flight, booking.as_mut())?;
            if let Some(kind) = requested.block() {
                next.block = Some(kind);
            } else if self.policy == RestockPolicy::DebitedPool {
                next.block = None;
            }
            next.is_booked = next.block.is_some();
        }

        let diff = ChangeSet::new()
            .field("first_name", current.passenger.first_name.as_str(), next.passenger.first_name.as_str())
            .field("last_name", current.passenger.last_name.as_str(), next.passenger.last_name.as_str())
            .redacted("document_number", &current.passenger.document_number, &next.passenger.document_number)
            .field("birth_date", optional(&current.passenger.birth_date), optional(&next.passenger.birth_date))
            .field("phone", optional(&current.passenger.phone), optional(&next.passenger.phone))
            .field("luggage", current.luggage, next.luggage)
            .field("price", current.price, next.price)
            .field("pool", pool_label(current.block), pool_label(next.block));
        if diff.is_empty() && booking.is_none() && !flight_moved {
            return Ok(current);
        }

        uow.update_ticket(&next).await?;
        if flight_moved {
            uow.update_flight(&flight).await?;
        }
        if let Some(booking) = &booking {
            uow.update_booking(booking).await?;
        }
        if let Some(agent) = &agent {
            if delta != 0 {
                uow.update_agent(agent).await?;
            }
            if current.luggage != next.luggage {
                let comment = if next.luggage { "luggage added" } else { "luggage removed" };
                uow.append_debt(&ledger::purchase(
                    agent.id,
                    flight.id,
                    next.id,
                    next.price,
                    actor_id,
                    Some(comment.to_string()),
                ))
                .await?;
            }
        }

        info!("Ticket {} updated ({})", next.id, diff.describe());
        journal.push(HistoryEvent::new(
            EntityKind::Ticket,
            next.id,
            HistoryAction::Updated,
            actor_id,
            diff.describe(),
        ));
        Ok(next)
    }

    /// Seat movement for an update that names a pool. Returns whether
    /// `left_seats` changed.
    fn move_seat(
        &self,
        ticket: &Ticket,
        requested: SeatSource,
        flight: &mut Flight,
        mut booking: Option<&mut Booking>,
    ) -> CoreResult<bool> {
        let agent_id = ticket.agent_id.unwrap_or_default();
        match self.policy {
            RestockPolicy::Legacy => {
                // General requests only ever cleared the flag without
                // returning the seat; the block marker is kept instead.
                let Some(kind) = requested.block() else {
                    return Ok(false);
                };
                if ticket.is_booked {
                    warn!(
                        "Ticket {} already holds a {} seat; taking another from the {} block and crediting flight {}",
                        ticket.id,
                        pool_label(ticket.block),
                        kind,
                        flight.id
                    );
                }
                let mut seats = flight.clone();
                inventory::adjust_left_seats(&mut seats, 1)?;
                take_from_block(booking, kind, agent_id)?;
                *flight = seats;
                Ok(true)
            }
            RestockPolicy::DebitedPool => {
                if requested == ticket.source() {
                    return Ok(false);
                }
                let mut seats = flight.clone();
                let mut moved = false;

                match ticket.block {
                    Some(kind) => match booking.as_deref_mut() {
                        Some(booking) => *booking.block_mut(kind) += 1,
                        None => {
                            inventory::adjust_left_seats(&mut seats, 1)?;
                            moved = true;
                        }
                    },
                    None => {
                        inventory::adjust_left_seats(&mut seats, 1)?;
                        moved = true;
                    }
                }
                match requested.block() {
                    Some(kind) => take_from_block(booking, kind, agent_id)?,
                    None => {
                        inventory::adjust_left_seats(&mut seats, -1)?;
                        moved = true;
                    }
                }

                *flight = seats;
                Ok(moved)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use wingdesk_core::{DebtType, Discount, FlightGuide, MemoryHistorySink, MemoryRepository};

    struct Fixture {
        repo: MemoryRepository,
        history: Arc<MemoryHistorySink>,
        manager: TicketManager,
        flight: Flight,
        agent: Agent,
        actor: Uuid,
    }

    async fn fixture(policy: RestockPolicy, balance: Money) -> Fixture {
        let repo = MemoryRepository::new();
        let now = Utc::now();
        let guide = FlightGuide {
            id: Uuid::new_v4(),
            carrier_code: "WZ".to_string(),
            luggage_fee: 300,
        };
        let flight = Flight {
            id: Uuid::new_v4(),
            guide_id: guide.id,
            from_airport_id: Uuid::new_v4(),
            to_airport_id: Uuid::new_v4(),
            departure_at: now + Duration::days(3),
            arrival_at: now + Duration::days(3) + Duration::hours(4),
            price: 1000,
            currency: "USD".to_string(),
            total_seats: 10,
            left_seats: 10,
            on_sale: now - Duration::days(1),
            created_by: Uuid::new_v4(),
            created_at: now,
            deleted_at: None,
        };
        let agent = Agent {
            id: Uuid::new_v4(),
            name: "Polar Tours".to_string(),
            balance,
            discount_id: None,
            is_on_credit: false,
            block_date: None,
        };
        repo.seed_guide(guide).await;
        repo.seed_flight(flight.clone()).await;
        repo.seed_agent(agent.clone()).await;

        let history = Arc::new(MemoryHistorySink::new());
        let manager = TicketManager::new(Arc::new(repo.clone()), history.clone(), policy, "XX");
        Fixture { repo, history, manager, flight, agent, actor: Uuid::new_v4() }
    }

    fn passenger() -> Passenger {
        Passenger {
            first_name: "Aigerim".to_string(),
            last_name: "Sadykova".to_string(),
            document_number: Masked::new("N1234567".to_string()),
            birth_date: NaiveDate::from_ymd_opt(1990, 4, 12),
            phone: None,
        }
    }

    fn sale(agent_id: Uuid, source: SeatSource) -> NewTicket {
        NewTicket { agent_id, passenger: passenger(), luggage: false, source }
    }

    /// Seed a booking as if its seats had already left general inventory.
    async fn book(fx: &Fixture, hard_block: i32, soft_block: i32, price: Money) -> Booking {
        let booking = Booking {
            id: Uuid::new_v4(),
            flight_id: fx.flight.id,
            agent_id: fx.agent.id,
            hard_block,
            soft_block,
            price,
            created_by: fx.actor,
            created_at: Utc::now(),
            deleted_at: None,
        };
        let mut flight = fx.repo.snapshot().await.flights[&fx.flight.id].clone();
        flight.left_seats -= hard_block + soft_block;
        fx.repo.seed_flight(flight).await;
        fx.repo.seed_booking(booking.clone()).await;
        booking
    }

    #[tokio::test]
    async fn test_basic_purchase() {
        let fx = fixture(RestockPolicy::Legacy, 5000).await;
        let ticket = fx.manager.create(sale(fx.agent.id, SeatSource::General), fx.flight.id, fx.actor).await.unwrap();

        assert_eq!(ticket.price, 1000);
        assert!(!ticket.is_booked);
        assert!(ticket.number.starts_with("WZ"));

        let state = fx.repo.snapshot().await;
        assert_eq!(state.agents[&fx.agent.id].balance, 4000);
        assert_eq!(state.flights[&fx.flight.id].left_seats, 9);
        let debts = state.debts_for(fx.agent.id);
        assert_eq!(debts.len(), 1);
        assert_eq!((debts[0].debt_type, debts[0].amount), (DebtType::Purchase, 1000));
        assert_eq!(debts[0].ticket_id, Some(ticket.id));
        assert_eq!(fx.history.events().len(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_balance_changes_nothing() {
        let fx = fixture(RestockPolicy::Legacy, 500).await;
        let err = fx
            .manager
            .create(sale(fx.agent.id, SeatSource::General), fx.flight.id, fx.actor)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InsufficientBalance { balance: 500, required: 1000, .. }));

        let state = fx.repo.snapshot().await;
        assert_eq!(state.agents[&fx.agent.id].balance, 500);
        assert_eq!(state.flights[&fx.flight.id].left_seats, 10);
        assert!(state.tickets.is_empty());
        assert!(state.debts.is_empty());
        assert!(fx.history.events().is_empty());
    }

    #[tokio::test]
    async fn test_credit_agent_goes_negative() {
        let fx = fixture(RestockPolicy::Legacy, 200).await;
        let mut agent = fx.agent.clone();
        agent.is_on_credit = true;
        fx.repo.seed_agent(agent).await;

        fx.manager.create(sale(fx.agent.id, SeatSource::General), fx.flight.id, fx.actor).await.unwrap();
        assert_eq!(fx.repo.snapshot().await.agents[&fx.agent.id].balance, -800);
    }

    #[tokio::test]
    async fn test_hard_block_consumption_with_drift() {
        let fx = fixture(RestockPolicy::Legacy, 5000).await;
        let booking = book(&fx, 3, 0, 800).await;

        let ticket = fx.manager.create(sale(fx.agent.id, SeatSource::Hard), fx.flight.id, fx.actor).await.unwrap();
        // Booked at 800 while the flight now sells at 1000.
        assert_eq!(ticket.price, 800);
        assert!(ticket.is_booked);
        assert_eq!(ticket.block, Some(BlockKind::Hard));

        let state = fx.repo.snapshot().await;
        assert_eq!(state.bookings[&booking.id].hard_block, 2);
        assert_eq!(state.flights[&fx.flight.id].left_seats, 7);
        assert_eq!(state.agents[&fx.agent.id].balance, 4200);
    }

    #[tokio::test]
    async fn test_exhausted_block_is_quota_error() {
        let fx = fixture(RestockPolicy::Legacy, 5000).await;
        book(&fx, 0, 1, 1000).await;

        let err = fx
            .manager
            .create(sale(fx.agent.id, SeatSource::Hard), fx.flight.id, fx.actor)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Quota(_)));

        let soft = fx.manager.create(sale(fx.agent.id, SeatSource::Soft), fx.flight.id, fx.actor).await.unwrap();
        assert_eq!(soft.price, 1000);
        assert_eq!(fx.repo.snapshot().await.agents[&fx.agent.id].balance, 4000);
    }

    #[tokio::test]
    async fn test_block_without_booking_is_quota_error() {
        let fx = fixture(RestockPolicy::Legacy, 5000).await;
        let err = fx
            .manager
            .create(sale(fx.agent.id, SeatSource::Soft), fx.flight.id, fx.actor)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Quota(_)));
    }

    #[tokio::test]
    async fn test_discount_luggage_and_floor() {
        let fx = fixture(RestockPolicy::Legacy, 5000).await;
        let discount = Discount { id: Uuid::new_v4(), name: "partner".to_string(), amount: 1500 };
        fx.repo.seed_discount(discount.clone()).await;
        let mut agent = fx.agent.clone();
        agent.discount_id = Some(discount.id);
        fx.repo.seed_agent(agent).await;

        let mut input = sale(fx.agent.id, SeatSource::General);
        input.luggage = true;
        let ticket = fx.manager.create(input, fx.flight.id, fx.actor).await.unwrap();
        assert_eq!(ticket.price, 300);
        assert_eq!(fx.repo.snapshot().await.agents[&fx.agent.id].balance, 4700);
    }

    #[tokio::test]
    async fn test_flight_must_be_on_sale() {
        let fx = fixture(RestockPolicy::Legacy, 5000).await;
        let mut flight = fx.flight.clone();
        flight.on_sale = Utc::now() + Duration::days(1);
        fx.repo.seed_flight(flight).await;

        let err = fx
            .manager
            .create(sale(fx.agent.id, SeatSource::General), fx.flight.id, fx.actor)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::State(_)));
    }

    #[tokio::test]
    async fn test_blocked_agent_is_absent() {
        let fx = fixture(RestockPolicy::Legacy, 5000).await;
        let mut agent = fx.agent.clone();
        agent.block_date = Some(Utc::now());
        fx.repo.seed_agent(agent).await;

        let err = fx
            .manager
            .create(sale(fx.agent.id, SeatSource::General), fx.flight.id, fx.actor)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { entity: "agent", .. }));
    }

    #[tokio::test]
    async fn test_failed_ledger_write_rolls_back_sale() {
        let fx = fixture(RestockPolicy::Legacy, 5000).await;
        fx.repo.fail_ledger_writes(true);

        let err = fx
            .manager
            .create(sale(fx.agent.id, SeatSource::General), fx.flight.id, fx.actor)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "persistence");
        assert_eq!(err.to_string(), "operation failed");

        let state = fx.repo.snapshot().await;
        assert_eq!(state.agents[&fx.agent.id].balance, 5000);
        assert_eq!(state.flights[&fx.flight.id].left_seats, 10);
        assert!(state.tickets.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_refunds_minus_fine() {
        let fx = fixture(RestockPolicy::Legacy, 5000).await;
        let ticket = fx.manager.create(sale(fx.agent.id, SeatSource::General), fx.flight.id, fx.actor).await.unwrap();

        let input = CancelTicket { fine: 150, comment: Some("late cancellation".to_string()) };
        let cancelled = fx.manager.cancel(ticket.id, input, fx.actor).await.unwrap();
        assert_eq!(cancelled.status, TicketStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());

        let state = fx.repo.snapshot().await;
        assert_eq!(state.agents[&fx.agent.id].balance, 4850);
        assert_eq!(state.flights[&fx.flight.id].left_seats, 10);
        let fines: Vec<_> = state
            .debts_for(fx.agent.id)
            .into_iter()
            .filter(|d| d.debt_type == DebtType::Fine)
            .collect();
        assert_eq!(fines.len(), 1);
        assert_eq!(fines[0].amount, 150);
    }

    #[tokio::test]
    async fn test_second_cancel_is_rejected() {
        let fx = fixture(RestockPolicy::Legacy, 5000).await;
        let ticket = fx.manager.create(sale(fx.agent.id, SeatSource::General), fx.flight.id, fx.actor).await.unwrap();
        fx.manager.cancel(ticket.id, CancelTicket::default(), fx.actor).await.unwrap();
        let after_first = fx.repo.snapshot().await;

        let err = fx.manager.cancel(ticket.id, CancelTicket::default(), fx.actor).await.unwrap_err();
        assert!(matches!(err, CoreError::State(_)));

        let after_second = fx.repo.snapshot().await;
        assert_eq!(after_first.agents, after_second.agents);
        assert_eq!(after_first.flights, after_second.flights);
        assert_eq!(after_first.tickets, after_second.tickets);
        assert_eq!(after_first.debts, after_second.debts);
    }

    #[tokio::test]
    async fn test_cancel_fine_larger_than_refund() {
        let fx = fixture(RestockPolicy::Legacy, 1000).await;
        let ticket = fx.manager.create(sale(fx.agent.id, SeatSource::General), fx.flight.id, fx.actor).await.unwrap();

        let input = CancelTicket { fine: 1500, comment: None };
        let err = fx.manager.cancel(ticket.id, input, fx.actor).await.unwrap_err();
        assert!(matches!(err, CoreError::InsufficientBalance { .. }));
        assert!(fx.repo.snapshot().await.tickets[&ticket.id].is_active());

        let negative = CancelTicket { fine: -1, comment: None };
        assert!(matches!(
            fx.manager.cancel(ticket.id, negative, fx.actor).await,
            Err(CoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_legacy_cancel_of_booked_ticket_credits_general() {
        let fx = fixture(RestockPolicy::Legacy, 5000).await;
        let booking = book(&fx, 3, 0, 1000).await;
        let ticket = fx.manager.create(sale(fx.agent.id, SeatSource::Hard), fx.flight.id, fx.actor).await.unwrap();

        fx.manager.cancel(ticket.id, CancelTicket::default(), fx.actor).await.unwrap();
        let state = fx.repo.snapshot().await;
        assert_eq!(state.flights[&fx.flight.id].left_seats, 8);
        assert_eq!(state.bookings[&booking.id].hard_block, 2);
    }

    #[tokio::test]
    async fn test_debited_pool_cancel_returns_seat_to_block() {
        let fx = fixture(RestockPolicy::DebitedPool, 5000).await;
        let booking = book(&fx, 3, 0, 1000).await;
        let ticket = fx.manager.create(sale(fx.agent.id, SeatSource::Hard), fx.flight.id, fx.actor).await.unwrap();

        fx.manager.cancel(ticket.id, CancelTicket::default(), fx.actor).await.unwrap();
        let state = fx.repo.snapshot().await;
        assert_eq!(state.flights[&fx.flight.id].left_seats, 7);
        assert_eq!(state.bookings[&booking.id].hard_block, 3);
    }

    #[tokio::test]
    async fn test_luggage_toggle_reprices() {
        let fx = fixture(RestockPolicy::Legacy, 5000).await;
        let ticket = fx.manager.create(sale(fx.agent.id, SeatSource::General), fx.flight.id, fx.actor).await.unwrap();

        let patch = TicketPatch { luggage: Some(true), phone: Some("+7 700 000 0000".to_string()), ..Default::default() };
        let updated = fx.manager.update(ticket.id, patch, fx.actor).await.unwrap();
        assert_eq!(updated.price, 1300);
        assert_eq!(updated.passenger.phone.as_deref(), Some("+7 700 000 0000"));

        let state = fx.repo.snapshot().await;
        assert_eq!(state.agents[&fx.agent.id].balance, 3700);
        let purchases: Vec<_> = state
            .debts_for(fx.agent.id)
            .into_iter()
            .filter(|d| d.debt_type == DebtType::Purchase)
            .map(|d| d.amount)
            .collect();
        assert_eq!(purchases, vec![1000, 1300]);

        let patch = TicketPatch { luggage: Some(false), ..Default::default() };
        let updated = fx.manager.update(ticket.id, patch, fx.actor).await.unwrap();
        assert_eq!(updated.price, 1000);
        assert_eq!(fx.repo.snapshot().await.agents[&fx.agent.id].balance, 4000);
    }

    #[tokio::test]
    async fn test_empty_patch_writes_nothing() {
        let fx = fixture(RestockPolicy::Legacy, 5000).await;
        let ticket = fx.manager.create(sale(fx.agent.id, SeatSource::General), fx.flight.id, fx.actor).await.unwrap();

        let same = fx.manager.update(ticket.id, TicketPatch::default(), fx.actor).await.unwrap();
        assert_eq!(same, ticket);
        assert_eq!(fx.history.events().len(), 1);
    }

    #[tokio::test]
    async fn test_legacy_block_request_credits_general() {
        let fx = fixture(RestockPolicy::Legacy, 5000).await;
        let booking = book(&fx, 3, 0, 1000).await;
        let ticket = fx.manager.create(sale(fx.agent.id, SeatSource::General), fx.flight.id, fx.actor).await.unwrap();
        assert_eq!(fx.repo.snapshot().await.flights[&fx.flight.id].left_seats, 6);

        let patch = TicketPatch { source: Some(SeatSource::Hard), ..Default::default() };
        let updated = fx.manager.update(ticket.id, patch, fx.actor).await.unwrap();
        assert!(updated.is_booked);

        let state = fx.repo.snapshot().await;
        assert_eq!(state.flights[&fx.flight.id].left_seats, 7);
        assert_eq!(state.bookings[&booking.id].hard_block, 2);

        // Asking for the same block again takes yet another seat.
        let patch = TicketPatch { source: Some(SeatSource::Hard), ..Default::default() };
        fx.manager.update(ticket.id, patch, fx.actor).await.unwrap();
        let state = fx.repo.snapshot().await;
        assert_eq!(state.flights[&fx.flight.id].left_seats, 8);
        assert_eq!(state.bookings[&booking.id].hard_block, 1);
    }

    #[tokio::test]
    async fn test_debited_pool_moves_only_on_source_change() {
        let fx = fixture(RestockPolicy::DebitedPool, 5000).await;
        let booking = book(&fx, 1, 2, 1000).await;
        let ticket = fx.manager.create(sale(fx.agent.id, SeatSource::Hard), fx.flight.id, fx.actor).await.unwrap();

        let patch = TicketPatch { source: Some(SeatSource::Hard), ..Default::default() };
        fx.manager.update(ticket.id, patch, fx.actor).await.unwrap();
        let state = fx.repo.snapshot().await;
        assert_eq!(state.bookings[&booking.id].hard_block, 0);

        let patch = TicketPatch { source: Some(SeatSource::Soft), ..Default::default() };
        let updated = fx.manager.update(ticket.id, patch, fx.actor).await.unwrap();
        assert_eq!(updated.block, Some(BlockKind::Soft));
        let state = fx.repo.snapshot().await;
        assert_eq!((state.bookings[&booking.id].hard_block, state.bookings[&booking.id].soft_block), (1, 1));
        assert_eq!(state.flights[&fx.flight.id].left_seats, 7);

        let patch = TicketPatch { source: Some(SeatSource::General), ..Default::default() };
        let updated = fx.manager.update(ticket.id, patch, fx.actor).await.unwrap();
        assert!(!updated.is_booked);
        let state = fx.repo.snapshot().await;
        assert_eq!(state.bookings[&booking.id].soft_block, 2);
        assert_eq!(state.flights[&fx.flight.id].left_seats, 6);
    }

    #[tokio::test]
    async fn test_agent_change_replaces_ticket() {
        let fx = fixture(RestockPolicy::Legacy, 5000).await;
        let other = Agent { id: Uuid::new_v4(), name: "Steppe Air Travel".to_string(), ..fx.agent.clone() };
        fx.repo.seed_agent(other.clone()).await;
        let ticket = fx.manager.create(sale(fx.agent.id, SeatSource::General), fx.flight.id, fx.actor).await.unwrap();

        let patch = TicketPatch { agent_id: Some(other.id), last_name: Some("Bekova".to_string()), ..Default::default() };
        let replacement = fx.manager.update(ticket.id, patch, fx.actor).await.unwrap();
        assert_ne!(replacement.id, ticket.id);
        assert_eq!(replacement.agent_id, Some(other.id));
        assert_eq!(replacement.passenger.last_name, "Bekova");

        let state = fx.repo.snapshot().await;
        assert_eq!(state.tickets[&ticket.id].status, TicketStatus::Replaced);
        assert_eq!(state.agents[&fx.agent.id].balance, 5000);
        assert_eq!(state.agents[&other.id].balance, 4000);
        assert_eq!(state.flights[&fx.flight.id].left_seats, 9);

        let old_fines: Vec<_> = state
            .debts_for(fx.agent.id)
            .into_iter()
            .filter(|d| d.debt_type == DebtType::Fine)
            .collect();
        assert_eq!(old_fines.len(), 1);
        assert_eq!(old_fines[0].amount, 0);
        assert!(old_fines[0].comment.as_deref().unwrap_or_default().contains(&replacement.number));
    }

    #[tokio::test]
    async fn test_failed_replacement_keeps_old_ticket() {
        let fx = fixture(RestockPolicy::Legacy, 5000).await;
        let broke = Agent { id: Uuid::new_v4(), balance: 10, ..fx.agent.clone() };
        fx.repo.seed_agent(broke.clone()).await;
        let ticket = fx.manager.create(sale(fx.agent.id, SeatSource::General), fx.flight.id, fx.actor).await.unwrap();
        let before = fx.repo.snapshot().await;

        let patch = TicketPatch { agent_id: Some(broke.id), ..Default::default() };
        let err = fx.manager.update(ticket.id, patch, fx.actor).await.unwrap_err();
        assert!(matches!(err, CoreError::InsufficientBalance { .. }));

        let after = fx.repo.snapshot().await;
        assert_eq!(before.tickets, after.tickets);
        assert_eq!(before.agents, after.agents);
        assert_eq!(before.debts, after.debts);
    }

    fn assert_lock_order(log: &[&str]) {
        const ORDER: [&str; 4] = ["tickets", "flights", "agents", "bookings"];
        let ranks: Vec<usize> = log
            .iter()
            .map(|table| ORDER.iter().position(|o| o == table).unwrap())
            .collect();
        assert!(ranks.windows(2).all(|w| w[0] <= w[1]), "locks out of order: {:?}", log);
    }

    #[tokio::test]
    async fn test_ticket_flows_lock_flight_before_booking() {
        let fx = fixture(RestockPolicy::DebitedPool, 5000).await;
        book(&fx, 2, 2, 1000).await;
        let other = Agent { id: Uuid::new_v4(), name: "Altai Wings".to_string(), ..fx.agent.clone() };
        fx.repo.seed_agent(other.clone()).await;
        fx.repo.take_lock_log();

        let hard = fx.manager.create(sale(fx.agent.id, SeatSource::Hard), fx.flight.id, fx.actor).await.unwrap();
        assert_eq!(fx.repo.take_lock_log(), vec!["flights", "agents", "bookings"]);

        fx.manager.cancel(hard.id, CancelTicket::default(), fx.actor).await.unwrap();
        assert_eq!(fx.repo.take_lock_log(), vec!["tickets", "flights", "agents", "bookings"]);

        let soft = fx.manager.create(sale(fx.agent.id, SeatSource::Soft), fx.flight.id, fx.actor).await.unwrap();
        fx.repo.take_lock_log();
        let patch = TicketPatch { agent_id: Some(other.id), ..Default::default() };
        fx.manager.update(soft.id, patch, fx.actor).await.unwrap();

        let log = fx.repo.take_lock_log();
        assert_lock_order(&log);
        assert_eq!(log.iter().filter(|t| **t == "agents").count(), 2);
        assert_eq!(log.last(), Some(&"bookings"));
    }
}
