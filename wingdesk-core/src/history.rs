use std::sync::Mutex;
use wingdesk_shared::models::HistoryEvent;

/// Fire-and-forget audit recorder. Called after a unit of work commits;
/// implementations swallow and log their own failures.
pub trait HistorySink: Send + Sync {
    fn record(&self, event: HistoryEvent);

    fn record_all(&self, events: Vec<HistoryEvent>) {
        for event in events {
            self.record(event);
        }
    }
}

/// Writes history lines to the tracing log only.
pub struct TracingHistorySink;

impl HistorySink for TracingHistorySink {
    fn record(&self, event: HistoryEvent) {
        tracing::info!(
            entity = event.entity.as_str(),
            entity_id = %event.entity_id,
            action = event.action.as_str(),
            actor_id = %event.actor_id,
            "{}",
            event.detail
        );
    }
}

/// Keeps history in memory; used by tests and local runs.
#[derive(Default)]
pub struct MemoryHistorySink {
    events: Mutex<Vec<HistoryEvent>>,
}

impl MemoryHistorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<HistoryEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl HistorySink for MemoryHistorySink {
    fn record(&self, event: HistoryEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
