use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::models::{
    Agent, AgentDebt, Booking, Discount, Flight, FlightGuide, FlightPriceHistory, Refill, Ticket,
};
use crate::repository::{Repository, UnitOfWork};
use crate::{CoreError, CoreResult};

/// Full contents of the in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub flights: HashMap<Uuid, Flight>,
    pub guides: HashMap<Uuid, FlightGuide>,
    pub agents: HashMap<Uuid, Agent>,
    pub discounts: HashMap<Uuid, Discount>,
    pub bookings: HashMap<Uuid, Booking>,
    pub tickets: HashMap<Uuid, Ticket>,
    pub refills: HashMap<Uuid, Refill>,
    pub debts: Vec<AgentDebt>,
    pub price_history: Vec<FlightPriceHistory>,
}

impl MemoryState {
    pub fn debts_for(&self, agent_id: Uuid) -> Vec<&AgentDebt> {
        self.debts.iter().filter(|d| d.agent_id == agent_id).collect()
    }

    pub fn active_bookings_on(&self, flight_id: Uuid) -> Vec<&Booking> {
        self.bookings
            .values()
            .filter(|b| b.flight_id == flight_id && !b.is_deleted())
            .collect()
    }

    pub fn active_tickets_on(&self, flight_id: Uuid) -> Vec<&Ticket> {
        self.tickets
            .values()
            .filter(|t| t.flight_id == flight_id && t.is_active())
            .collect()
    }
}

/// In-memory repository.
///
/// Units of work are serialized behind one async mutex: `begin` takes the
/// lock and copies the state, `commit` swaps the copy in. A unit of work that
/// is dropped leaves the stored state untouched.
#[derive(Clone, Default)]
pub struct MemoryRepository {
    state: Arc<Mutex<MemoryState>>,
    fail_ledger: Arc<AtomicBool>,
    lock_log: Arc<StdMutex<Vec<&'static str>>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    pub async fn seed_flight(&self, flight: Flight) {
        self.state.lock().await.flights.insert(flight.id, flight);
    }

    pub async fn seed_guide(&self, guide: FlightGuide) {
        self.state.lock().await.guides.insert(guide.id, guide);
    }

    pub async fn seed_agent(&self, agent: Agent) {
        self.state.lock().await.agents.insert(agent.id, agent);
    }

    pub async fn seed_discount(&self, discount: Discount) {
        self.state.lock().await.discounts.insert(discount.id, discount);
    }

    pub async fn seed_booking(&self, booking: Booking) {
        self.state.lock().await.bookings.insert(booking.id, booking);
    }

    pub async fn seed_ticket(&self, ticket: Ticket) {
        self.state.lock().await.tickets.insert(ticket.id, ticket);
    }

    /// Make every ledger append fail until switched off again.
    pub fn fail_ledger_writes(&self, fail: bool) {
        self.fail_ledger.store(fail, Ordering::SeqCst);
    }

    /// Tables of the rows locked since the last call, in locking order. Only
    /// the first lock of a row within a unit of work is recorded, matching a
    /// store where re-locking a held row never waits.
    pub fn take_lock_log(&self) -> Vec<&'static str> {
        self.lock_log.lock().map(|mut log| std::mem::take(&mut *log)).unwrap_or_default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn begin(&self) -> CoreResult<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            working,
            fail_ledger: self.fail_ledger.load(Ordering::SeqCst),
            lock_log: self.lock_log.clone(),
            held: HashSet::new(),
        }))
    }
}

struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_ledger: bool,
    lock_log: Arc<StdMutex<Vec<&'static str>>>,
    held: HashSet<(&'static str, Uuid)>,
}

impl MemoryUnitOfWork {
    fn locked<T>(&mut self, table: &'static str, id: Uuid, row: Option<T>) -> CoreResult<Option<T>> {
        if row.is_some() && self.held.insert((table, id)) {
            if let Ok(mut log) = self.lock_log.lock() {
                log.push(table);
            }
        }
        Ok(row)
    }
}

fn replace<T: Clone>(
    rows: &mut HashMap<Uuid, T>,
    id: Uuid,
    row: &T,
    operation: &'static str,
) -> CoreResult<()> {
    match rows.get_mut(&id) {
        Some(slot) => {
            *slot = row.clone();
            Ok(())
        }
        None => Err(CoreError::persistence(operation, format!("row {} does not exist", id))),
    }
}

fn insert<T: Clone>(
    rows: &mut HashMap<Uuid, T>,
    id: Uuid,
    row: &T,
    operation: &'static str,
) -> CoreResult<()> {
    if rows.contains_key(&id) {
        return Err(CoreError::persistence(operation, format!("row {} already exists", id)));
    }
    rows.insert(id, row.clone());
    Ok(())
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn flight(&mut self, id: Uuid) -> CoreResult<Option<Flight>> {
        let row = self.working.flights.get(&id).cloned();
        self.locked("flights", id, row)
    }

    async fn flight_guide(&mut self, id: Uuid) -> CoreResult<Option<FlightGuide>> {
        Ok(self.working.guides.get(&id).cloned())
    }

    async fn agent(&mut self, id: Uuid) -> CoreResult<Option<Agent>> {
        let row = self.working.agents.get(&id).cloned();
        self.locked("agents", id, row)
    }

    async fn discount(&mut self, id: Uuid) -> CoreResult<Option<Discount>> {
        Ok(self.working.discounts.get(&id).cloned())
    }

    async fn booking(&mut self, id: Uuid) -> CoreResult<Option<Booking>> {
        let row = self.working.bookings.get(&id).cloned();
        self.locked("bookings", id, row)
    }

    async fn booking_keys(&mut self, id: Uuid) -> CoreResult<Option<(Uuid, Uuid)>> {
        Ok(self.working.bookings.get(&id).map(|b| (b.flight_id, b.agent_id)))
    }

    async fn active_booking(&mut self, agent_id: Uuid, flight_id: Uuid) -> CoreResult<Option<Booking>> {
        let row = self
            .working
            .bookings
            .values()
            .find(|b| b.agent_id == agent_id && b.flight_id == flight_id && !b.is_deleted())
            .cloned();
        match row {
            Some(booking) => self.locked("bookings", booking.id, Some(booking)),
            None => Ok(None),
        }
    }

    async fn active_bookings(&mut self, flight_id: Uuid) -> CoreResult<Vec<Booking>> {
        Ok(self.working.active_bookings_on(flight_id).into_iter().cloned().collect())
    }

    async fn ticket(&mut self, id: Uuid) -> CoreResult<Option<Ticket>> {
        let row = self.working.tickets.get(&id).cloned();
        self.locked("tickets", id, row)
    }

    async fn active_tickets(&mut self, flight_id: Uuid) -> CoreResult<Vec<Ticket>> {
        Ok(self.working.active_tickets_on(flight_id).into_iter().cloned().collect())
    }

    async fn refill(&mut self, id: Uuid) -> CoreResult<Option<Refill>> {
        let row = self.working.refills.get(&id).cloned();
        self.locked("refills", id, row)
    }

    async fn debts_for_agent(&mut self, agent_id: Uuid) -> CoreResult<Vec<AgentDebt>> {
        Ok(self.working.debts_for(agent_id).into_iter().cloned().collect())
    }

    async fn price_history(&mut self, flight_id: Uuid) -> CoreResult<Vec<FlightPriceHistory>> {
        Ok(self
            .working
            .price_history
            .iter()
            .filter(|h| h.flight_id == flight_id)
            .cloned()
            .collect())
    }

    async fn insert_flight(&mut self, flight: &Flight) -> CoreResult<()> {
        insert(&mut self.working.flights, flight.id, flight, "insert_flight")
    }

    async fn update_flight(&mut self, flight: &Flight) -> CoreResult<()> {
        replace(&mut self.working.flights, flight.id, flight, "update_flight")
    }

    async fn update_agent(&mut self, agent: &Agent) -> CoreResult<()> {
        replace(&mut self.working.agents, agent.id, agent, "update_agent")
    }

    async fn insert_booking(&mut self, booking: &Booking) -> CoreResult<()> {
        let duplicate = self.working.bookings.values().any(|b| {
            b.agent_id == booking.agent_id && b.flight_id == booking.flight_id && !b.is_deleted()
        });
        if duplicate {
            return Err(CoreError::Conflict(format!(
                "agent {} already holds a booking on flight {}",
                booking.agent_id, booking.flight_id
            )));
        }
        insert(&mut self.working.bookings, booking.id, booking, "insert_booking")
    }

    async fn update_booking(&mut self, booking: &Booking) -> CoreResult<()> {
        replace(&mut self.working.bookings, booking.id, booking, "update_booking")
    }

    async fn insert_ticket(&mut self, ticket: &Ticket) -> CoreResult<()> {
        insert(&mut self.working.tickets, ticket.id, ticket, "insert_ticket")
    }

    async fn update_ticket(&mut self, ticket: &Ticket) -> CoreResult<()> {
        replace(&mut self.working.tickets, ticket.id, ticket, "update_ticket")
    }

    async fn insert_refill(&mut self, refill: &Refill) -> CoreResult<()> {
        insert(&mut self.working.refills, refill.id, refill, "insert_refill")
    }

    async fn update_refill(&mut self, refill: &Refill) -> CoreResult<()> {
        replace(&mut self.working.refills, refill.id, refill, "update_refill")
    }

    async fn append_debt(&mut self, debt: &AgentDebt) -> CoreResult<()> {
        if self.fail_ledger {
            return Err(CoreError::persistence("append_debt", "ledger table unavailable"));
        }
        self.working.debts.push(debt.clone());
        Ok(())
    }

    async fn append_price_history(&mut self, entry: &FlightPriceHistory) -> CoreResult<()> {
        self.working.price_history.push(entry.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> CoreResult<()> {
        let MemoryUnitOfWork { mut guard, working, .. } = *self;
        *guard = working;
        Ok(())
    }
}
