use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::CoreError;

/// Where a seat goes back to when a booked ticket is cancelled or moved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RestockPolicy {
    /// Always credit `Flight::left_seats`, whatever pool the seat came from.
    #[default]
    Legacy,
    /// Credit the pool the seat was actually drawn from.
    DebitedPool,
}

impl RestockPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestockPolicy::Legacy => "legacy",
            RestockPolicy::DebitedPool => "debited_pool",
        }
    }
}

impl FromStr for RestockPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "legacy" => Ok(RestockPolicy::Legacy),
            "debited_pool" => Ok(RestockPolicy::DebitedPool),
            other => Err(CoreError::Validation(format!("unknown restock policy '{}'", other))),
        }
    }
}
