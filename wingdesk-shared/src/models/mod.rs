pub mod events;

pub use events::{EntityKind, HistoryAction, HistoryEvent};
