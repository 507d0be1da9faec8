use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    Agent, AgentDebt, Booking, Discount, Flight, FlightGuide, FlightPriceHistory, Refill, Ticket,
};
use crate::CoreResult;

/// Entry point to the relational store: every manager operation opens one
/// unit of work and commits it once.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn begin(&self) -> CoreResult<Box<dyn UnitOfWork>>;
}

/// One transaction against the store.
///
/// Loads of mutable rows (flights, bookings, agents, tickets, refills) lock
/// the row until the unit of work ends. Operations take those locks in one
/// order: tickets, flights, agents, bookings; refills before agents.
/// Soft-deleted rows are still returned;
/// callers decide what a deleted marker means for their operation. Dropping a
/// unit of work without calling [`UnitOfWork::commit`] discards every write.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn flight(&mut self, id: Uuid) -> CoreResult<Option<Flight>>;

    async fn flight_guide(&mut self, id: Uuid) -> CoreResult<Option<FlightGuide>>;

    async fn agent(&mut self, id: Uuid) -> CoreResult<Option<Agent>>;

    async fn discount(&mut self, id: Uuid) -> CoreResult<Option<Discount>>;

    async fn booking(&mut self, id: Uuid) -> CoreResult<Option<Booking>>;

    /// `(flight_id, agent_id)` of a booking, read without taking a lock, so
    /// callers can lock the flight and agent before the booking itself.
    async fn booking_keys(&mut self, id: Uuid) -> CoreResult<Option<(Uuid, Uuid)>>;

    /// The non-deleted booking held by `agent_id` on `flight_id`, if any.
    async fn active_booking(&mut self, agent_id: Uuid, flight_id: Uuid) -> CoreResult<Option<Booking>>;

    async fn active_bookings(&mut self, flight_id: Uuid) -> CoreResult<Vec<Booking>>;

    async fn ticket(&mut self, id: Uuid) -> CoreResult<Option<Ticket>>;

    async fn active_tickets(&mut self, flight_id: Uuid) -> CoreResult<Vec<Ticket>>;

    async fn refill(&mut self, id: Uuid) -> CoreResult<Option<Refill>>;

    async fn debts_for_agent(&mut self, agent_id: Uuid) -> CoreResult<Vec<AgentDebt>>;

    async fn price_history(&mut self, flight_id: Uuid) -> CoreResult<Vec<FlightPriceHistory>>;

    async fn insert_flight(&mut self, flight: &Flight) -> CoreResult<()>;

    async fn update_flight(&mut self, flight: &Flight) -> CoreResult<()>;

    async fn update_agent(&mut self, agent: &Agent) -> CoreResult<()>;

    /// Fails with `Conflict` when the agent already holds an active booking
    /// on the flight.
    async fn insert_booking(&mut self, booking: &Booking) -> CoreResult<()>;

    async fn update_booking(&mut self, booking: &Booking) -> CoreResult<()>;

    async fn insert_ticket(&mut self, ticket: &Ticket) -> CoreResult<()>;

    async fn update_ticket(&mut self, ticket: &Ticket) -> CoreResult<()>;

    async fn insert_refill(&mut self, refill: &Refill) -> CoreResult<()>;

    async fn update_refill(&mut self, refill: &Refill) -> CoreResult<()>;

    async fn append_debt(&mut self, debt: &AgentDebt) -> CoreResult<()>;

    async fn append_price_history(&mut self, entry: &FlightPriceHistory) -> CoreResult<()>;

    async fn commit(self: Box<Self>) -> CoreResult<()>;
}
