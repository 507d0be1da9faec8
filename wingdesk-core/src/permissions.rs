use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Capabilities a staff token can carry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Permission {
    #[serde(rename = "flights:read")]
    FlightsRead,
    #[serde(rename = "flights:write")]
    FlightsWrite,
    #[serde(rename = "flights:delete")]
    FlightsDelete,
    #[serde(rename = "bookings:write")]
    BookingsWrite,
    #[serde(rename = "bookings:delete")]
    BookingsDelete,
    #[serde(rename = "tickets:write")]
    TicketsWrite,
    #[serde(rename = "tickets:cancel")]
    TicketsCancel,
    #[serde(rename = "balance:read")]
    BalanceRead,
    #[serde(rename = "balance:write")]
    BalanceWrite,
}

impl Permission {
    pub const ALL: [Permission; 9] = [
        Permission::FlightsRead,
        Permission::FlightsWrite,
        Permission::FlightsDelete,
        Permission::BookingsWrite,
        Permission::BookingsDelete,
        Permission::TicketsWrite,
        Permission::TicketsCancel,
        Permission::BalanceRead,
        Permission::BalanceWrite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::FlightsRead => "flights:read",
            Permission::FlightsWrite => "flights:write",
            Permission::FlightsDelete => "flights:delete",
            Permission::BookingsWrite => "bookings:write",
            Permission::BookingsDelete => "bookings:delete",
            Permission::TicketsWrite => "tickets:write",
            Permission::TicketsCancel => "tickets:cancel",
            Permission::BalanceRead => "balance:read",
            Permission::BalanceWrite => "balance:write",
        }
    }

    /// Parse the permission names found in a token, dropping unknown ones.
    pub fn parse_all<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<Permission> {
        names.into_iter().filter_map(|n| n.parse().ok()).collect()
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown permission '{}'", s))
    }
}
