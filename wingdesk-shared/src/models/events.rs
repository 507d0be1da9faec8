use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Flight,
    Booking,
    Ticket,
    Agent,
    Refill,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Flight => "flight",
            EntityKind::Booking => "booking",
            EntityKind::Ticket => "ticket",
            EntityKind::Agent => "agent",
            EntityKind::Refill => "refill",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    Updated,
    Deleted,
    Cancelled,
    Replaced,
    OnSale,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Created => "created",
            HistoryAction::Updated => "updated",
            HistoryAction::Deleted => "deleted",
            HistoryAction::Cancelled => "cancelled",
            HistoryAction::Replaced => "replaced",
            HistoryAction::OnSale => "on_sale",
        }
    }
}

/// One audit-trail line describing a committed mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEvent {
    pub id: Uuid,
    pub entity: EntityKind,
    pub entity_id: Uuid,
    pub action: HistoryAction,
    pub actor_id: Uuid,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEvent {
    pub fn new(
        entity: EntityKind,
        entity_id: Uuid,
        action: HistoryAction,
        actor_id: Uuid,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity,
            entity_id,
            action,
            actor_id,
            detail: detail.into(),
            timestamp: Utc::now(),
        }
    }
}
