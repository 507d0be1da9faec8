use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use wingdesk_core::changes::ChangeSet;
use wingdesk_core::{Agent, AgentDebt, CoreError, CoreResult, HistorySink, Money, Refill, Repository};
use wingdesk_shared::models::{EntityKind, HistoryAction, HistoryEvent};

use crate::ledger;

/// Check a charge without applying it.
///
/// On-credit agents may go negative; everyone else must cover the amount.
pub fn ensure_can_charge(agent: &Agent, amount: Money) -> CoreResult<()> {
    if amount < 0 {
        return Err(CoreError::Validation(format!("charge amount {} is negative", amount)));
    }
    if !agent.is_on_credit && agent.balance - amount < 0 {
        warn!(
            "Agent {} cannot cover {}: balance {}",
            agent.id, amount, agent.balance
        );
        return Err(CoreError::InsufficientBalance {
            agent_id: agent.id,
            balance: agent.balance,
            required: amount,
        });
    }
    Ok(())
}

/// `balance -= amount`, guarded by [`ensure_can_charge`].
pub fn apply_charge(agent: &mut Agent, amount: Money) -> CoreResult<()> {
    ensure_can_charge(agent, amount)?;
    agent.balance -= amount;
    Ok(())
}

/// `balance += amount`. Refunds, cancellations and refills.
pub fn apply_credit(agent: &mut Agent, amount: Money) {
    agent.balance += amount;
}

/// Agent money movements that are not tied to a ticket: refills and the
/// ledger view.
pub struct AgentBalance {
    repo: Arc<dyn Repository>,
    history: Arc<dyn HistorySink>,
}

impl AgentBalance {
    pub fn new(repo: Arc<dyn Repository>, history: Arc<dyn HistorySink>) -> Self {
        Self { repo, history }
    }

    /// Credit the agent and keep a refill record of who received the money.
    pub async fn refill(
        &self,
        agent_id: Uuid,
        amount: Money,
        receiver_id: Uuid,
        comment: Option<String>,
    ) -> CoreResult<Refill> {
        if amount <= 0 {
            return Err(CoreError::Validation("refill amount must be positive".to_string()));
        }

        let mut uow = self.repo.begin().await?;
        let mut agent = uow
            .agent(agent_id)
            .await?
            .ok_or_else(|| CoreError::not_found("agent", agent_id))?;

        apply_credit(&mut agent, amount);
        let refill = Refill {
            id: Uuid::new_v4(),
            agent_id,
            receiver_id,
            amount,
            comment,
            created_at: Utc::now(),
            deleted_at: None,
        };

        uow.update_agent(&agent).await?;
        uow.insert_refill(&refill).await?;
        uow.append_debt(&ledger::refill(agent_id, refill.id, amount, receiver_id, refill.comment.clone()))
            .await?;
        uow.commit().await?;

        info!("Agent {} refilled by {}: balance {}", agent_id, amount, agent.balance);
        self.history.record(HistoryEvent::new(
            EntityKind::Refill,
            refill.id,
            HistoryAction::Created,
            receiver_id,
            format!("agent {} refilled by {}", agent_id, amount),
        ));
        Ok(refill)
    }

    /// Change a refill amount; the agent balance moves by the difference.
    pub async fn update_refill(
        &self,
        refill_id: Uuid,
        amount: Money,
        comment: Option<String>,
        actor_id: Uuid,
    ) -> CoreResult<Refill> {
        if amount <= 0 {
            return Err(CoreError::Validation("refill amount must be positive".to_string()));
        }

        let mut uow = self.repo.begin().await?;
        let mut refill = uow
            .refill(refill_id)
            .await?
            .filter(|r| !r.is_deleted())
            .ok_or_else(|| CoreError::not_found("refill", refill_id))?;
        let mut agent = uow
            .agent(refill.agent_id)
            .await?
            .ok_or_else(|| CoreError::not_found("agent", refill.agent_id))?;

        let delta = amount - refill.amount;
        if delta < 0 {
            apply_charge(&mut agent, -delta)?;
        } else {
            apply_credit(&mut agent, delta);
        }

        let mut diff = ChangeSet::new().field("amount", refill.amount, amount);
        refill.amount = amount;
        if let Some(comment) = comment {
            diff = diff.field(
                "comment",
                refill.comment.clone().unwrap_or_default(),
                comment.clone(),
            );
            refill.comment = Some(comment);
        }

        uow.update_agent(&agent).await?;
        uow.update_refill(&refill).await?;
        if delta != 0 {
            let comment = format!("refill corrected to {}", amount);
            uow.append_debt(&ledger::refill(agent.id, refill.id, delta, actor_id, Some(comment)))
                .await?;
        }
        uow.commit().await?;

        info!("Refill {} updated ({}): agent {} balance {}", refill.id, diff.describe(), agent.id, agent.balance);
        self.history.record(HistoryEvent::new(
            EntityKind::Refill,
            refill.id,
            HistoryAction::Updated,
            actor_id,
            diff.describe(),
        ));
        Ok(refill)
    }

    /// Reverse the full refill amount and mark the record deleted.
    pub async fn delete_refill(&self, refill_id: Uuid, actor_id: Uuid) -> CoreResult<Refill> {
        let mut uow = self.repo.begin().await?;
        let mut refill = uow
            .refill(refill_id)
            .await?
            .filter(|r| !r.is_deleted())
            .ok_or_else(|| CoreError::not_found("refill", refill_id))?;
        let mut agent = uow
            .agent(refill.agent_id)
            .await?
            .ok_or_else(|| CoreError::not_found("agent", refill.agent_id))?;

        apply_charge(&mut agent, refill.amount)?;
        refill.deleted_at = Some(Utc::now());

        uow.update_agent(&agent).await?;
        uow.update_refill(&refill).await?;
        let comment = "refill reversed".to_string();
        uow.append_debt(&ledger::refill(agent.id, refill.id, -refill.amount, actor_id, Some(comment)))
            .await?;
        uow.commit().await?;

        info!("Refill {} reversed: agent {} balance {}", refill.id, agent.id, agent.balance);
        self.history.record(HistoryEvent::new(
            EntityKind::Refill,
            refill.id,
            HistoryAction::Deleted,
            actor_id,
            format!("reversed {}", refill.amount),
        ));
        Ok(refill)
    }

    /// Ledger rows of an agent, oldest first.
    pub async fn debts(&self, agent_id: Uuid) -> CoreResult<Vec<AgentDebt>> {
        let mut uow = self.repo.begin().await?;
        if uow.agent(agent_id).await?.is_none() {
            return Err(CoreError::not_found("agent", agent_id));
        }
        let mut debts = uow.debts_for_agent(agent_id).await?;
        debts.sort_by_key(|d| d.created_at);
        Ok(debts)
    }
}
