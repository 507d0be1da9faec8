use chrono::Utc;
use uuid::Uuid;
use wingdesk_core::{AgentDebt, DebtType, Money};

#[derive(Default)]
struct Cause {
    flight_id: Option<Uuid>,
    ticket_id: Option<Uuid>,
    refill_id: Option<Uuid>,
}

fn entry(
    debt_type: DebtType,
    agent_id: Uuid,
    cause: Cause,
    amount: Money,
    actor_id: Uuid,
    comment: Option<String>,
) -> AgentDebt {
    AgentDebt {
        id: Uuid::new_v4(),
        agent_id,
        flight_id: cause.flight_id,
        ticket_id: cause.ticket_id,
        refill_id: cause.refill_id,
        debt_type,
        amount,
        comment,
        created_by: actor_id,
        created_at: Utc::now(),
    }
}

/// Ledger row for a ticket sale or re-pricing; `amount` is the ticket price.
pub fn purchase(
    agent_id: Uuid,
    flight_id: Uuid,
    ticket_id: Uuid,
    amount: Money,
    actor_id: Uuid,
    comment: Option<String>,
) -> AgentDebt {
    let cause = Cause { flight_id: Some(flight_id), ticket_id: Some(ticket_id), ..Cause::default() };
    entry(DebtType::Purchase, agent_id, cause, amount, actor_id, comment)
}

/// Ledger row for a cancellation; `amount` is the fine, not the refund.
pub fn fine(
    agent_id: Uuid,
    flight_id: Uuid,
    ticket_id: Uuid,
    amount: Money,
    actor_id: Uuid,
    comment: Option<String>,
) -> AgentDebt {
    let cause = Cause { flight_id: Some(flight_id), ticket_id: Some(ticket_id), ..Cause::default() };
    entry(DebtType::Fine, agent_id, cause, amount, actor_id, comment)
}

/// Ledger row for the hard-block money returned when a booking is deleted.
pub fn refund(
    agent_id: Uuid,
    flight_id: Uuid,
    amount: Money,
    actor_id: Uuid,
    comment: Option<String>,
) -> AgentDebt {
    let cause = Cause { flight_id: Some(flight_id), ..Cause::default() };
    entry(DebtType::Refund, agent_id, cause, amount, actor_id, comment)
}

/// Ledger row for a refill, its correction or its reversal; `amount` is the
/// signed balance change.
pub fn refill(
    agent_id: Uuid,
    refill_id: Uuid,
    amount: Money,
    actor_id: Uuid,
    comment: Option<String>,
) -> AgentDebt {
    let cause = Cause { refill_id: Some(refill_id), ..Cause::default() };
    entry(DebtType::Refill, agent_id, cause, amount, actor_id, comment)
}
