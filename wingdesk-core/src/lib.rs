pub mod changes;
pub mod history;
pub mod memory;
pub mod models;
pub mod permissions;
pub mod policy;
pub mod repository;

use uuid::Uuid;

pub use history::{HistorySink, MemoryHistorySink, TracingHistorySink};
pub use memory::MemoryRepository;
pub use models::*;
pub use permissions::Permission;
pub use policy::RestockPolicy;
pub use repository::{Repository, UnitOfWork};

/// Error kinds surfaced by every back-office operation.
///
/// Business-rule variants are returned before anything is written.
/// `Persistence` is the only variant that originates in the storage layer; its
/// detail is logged where it is raised and never rendered to callers.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Seat inventory violated: {0}")]
    Inventory(String),

    #[error("Booking quota exhausted: {0}")]
    Quota(String),

    #[error("Insufficient balance for agent {agent_id}: balance {balance}, required {required}")]
    InsufficientBalance {
        agent_id: Uuid,
        balance: Money,
        required: Money,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid state: {0}")]
    State(String),

    #[error("operation failed")]
    Persistence {
        operation: &'static str,
        detail: String,
    },
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        CoreError::NotFound { entity, id }
    }

    /// Wrap a storage failure. The detail goes to the log here and nowhere else.
    pub fn persistence(operation: &'static str, err: impl std::fmt::Display) -> Self {
        let detail = err.to_string();
        tracing::error!(operation, detail = %detail, "Persistence failure");
        CoreError::Persistence { operation, detail }
    }

    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "validation",
            CoreError::NotFound { .. } => "not_found",
            CoreError::Inventory(_) => "inventory",
            CoreError::Quota(_) => "quota",
            CoreError::InsufficientBalance { .. } => "insufficient_balance",
            CoreError::Conflict(_) => "conflict",
            CoreError::State(_) => "state",
            CoreError::Persistence { .. } => "persistence",
        }
    }

    pub fn is_business_rule(&self) -> bool {
        !matches!(self, CoreError::Persistence { .. })
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
