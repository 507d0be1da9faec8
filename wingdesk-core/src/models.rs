use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use wingdesk_shared::Masked;

use crate::CoreError;

/// Amounts are integer minor units of the flight currency.
pub type Money = i64;

// ============================================================================
// Flights
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flight {
    pub id: Uuid,
    pub guide_id: Uuid,
    pub from_airport_id: Uuid,
    pub to_airport_id: Uuid,
    pub departure_at: DateTime<Utc>,
    pub arrival_at: DateTime<Utc>,
    pub price: Money,
    pub currency: String,
    pub total_seats: i32,
    pub left_seats: i32,
    /// Sales open at or after this instant.
    pub on_sale: DateTime<Utc>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Flight {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_on_sale(&self, now: DateTime<Utc>) -> bool {
        self.on_sale <= now
    }

    pub fn has_departed(&self, now: DateTime<Utc>) -> bool {
        self.departure_at <= now
    }
}

/// Carrier settings shared by a group of flights.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlightGuide {
    pub id: Uuid,
    pub carrier_code: String,
    pub luggage_fee: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlightPriceHistory {
    pub id: Uuid,
    pub flight_id: Uuid,
    pub price: Money,
    pub currency: String,
    pub comment: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Agents
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    pub balance: Money,
    pub discount_id: Option<Uuid>,
    pub is_on_credit: bool,
    /// Suspension marker; a blocked agent cannot buy or book.
    pub block_date: Option<DateTime<Utc>>,
}

impl Agent {
    pub fn is_active(&self) -> bool {
        self.block_date.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Discount {
    pub id: Uuid,
    pub name: String,
    pub amount: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Refill {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub receiver_id: Uuid,
    pub amount: Money,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Refill {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DebtType {
    Purchase,
    Fine,
    Refund,
    Refill,
}

impl DebtType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebtType::Purchase => "purchase",
            DebtType::Fine => "fine",
            DebtType::Refund => "refund",
            DebtType::Refill => "refill",
        }
    }
}

impl FromStr for DebtType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(DebtType::Purchase),
            "fine" => Ok(DebtType::Fine),
            "refund" => Ok(DebtType::Refund),
            "refill" => Ok(DebtType::Refill),
            other => Err(CoreError::Validation(format!("unknown debt type '{}'", other))),
        }
    }
}

/// Append-only ledger row. Never updated once written.
///
/// Ticket and booking rows carry the flight; refill rows carry the refill and
/// a signed `amount` equal to the balance change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentDebt {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub flight_id: Option<Uuid>,
    pub ticket_id: Option<Uuid>,
    pub refill_id: Option<Uuid>,
    pub debt_type: DebtType,
    pub amount: Money,
    pub comment: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Bookings
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Hard,
    Soft,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Hard => "hard",
            BlockKind::Soft => "soft",
        }
    }
}

impl FromStr for BlockKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hard" => Ok(BlockKind::Hard),
            "soft" => Ok(BlockKind::Soft),
            other => Err(CoreError::Validation(format!("unknown block kind '{}'", other))),
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Seats an agent set aside on a flight. Both blocks are carved out of
/// `Flight::left_seats` when the booking is made.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub flight_id: Uuid,
    pub agent_id: Uuid,
    pub hard_block: i32,
    pub soft_block: i32,
    /// Flight price when the booking was made.
    pub price: Money,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Booking {
    /// Total blocked seats. Blocks are validated so the sum fits.
    pub fn seats(&self) -> i32 {
        self.hard_block.saturating_add(self.soft_block)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn block(&self, kind: BlockKind) -> i32 {
        match kind {
            BlockKind::Hard => self.hard_block,
            BlockKind::Soft => self.soft_block,
        }
    }

    pub fn block_mut(&mut self, kind: BlockKind) -> &mut i32 {
        match kind {
            BlockKind::Hard => &mut self.hard_block,
            BlockKind::Soft => &mut self.soft_block,
        }
    }
}

// ============================================================================
// Tickets
// ============================================================================

/// Which pool a ticket draws its seat from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SeatSource {
    #[default]
    General,
    Hard,
    Soft,
}

impl SeatSource {
    /// Build from the `hard`/`soft` flag pair used by request payloads.
    pub fn from_flags(hard: bool, soft: bool) -> Result<Self, CoreError> {
        match (hard, soft) {
            (false, false) => Ok(SeatSource::General),
            (true, false) => Ok(SeatSource::Hard),
            (false, true) => Ok(SeatSource::Soft),
            (true, true) => Err(CoreError::Validation(
                "hard and soft blocks are mutually exclusive".to_string(),
            )),
        }
    }

    pub fn block(&self) -> Option<BlockKind> {
        match self {
            SeatSource::General => None,
            SeatSource::Hard => Some(BlockKind::Hard),
            SeatSource::Soft => Some(BlockKind::Soft),
        }
    }

    pub fn is_booked(&self) -> bool {
        !matches!(self, SeatSource::General)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Active,
    Cancelled,
    Replaced,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Active => "active",
            TicketStatus::Cancelled => "cancelled",
            TicketStatus::Replaced => "replaced",
        }
    }
}

impl FromStr for TicketStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TicketStatus::Active),
            "cancelled" => Ok(TicketStatus::Cancelled),
            "replaced" => Ok(TicketStatus::Replaced),
            other => Err(CoreError::Validation(format!("unknown ticket status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Passenger {
    pub first_name: String,
    pub last_name: String,
    pub document_number: Masked<String>,
    pub birth_date: Option<NaiveDate>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    pub id: Uuid,
    /// Display label only; not guaranteed unique.
    pub number: String,
    pub flight_id: Uuid,
    pub agent_id: Option<Uuid>,
    pub passenger: Passenger,
    pub luggage: bool,
    pub price: Money,
    pub is_booked: bool,
    pub block: Option<BlockKind>,
    pub status: TicketStatus,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Ticket {
    pub fn is_active(&self) -> bool {
        self.status == TicketStatus::Active && self.cancelled_at.is_none()
    }

    pub fn source(&self) -> SeatSource {
        match self.block {
            None => SeatSource::General,
            Some(BlockKind::Hard) => SeatSource::Hard,
            Some(BlockKind::Soft) => SeatSource::Soft,
        }
    }
}
