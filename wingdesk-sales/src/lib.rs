pub mod balance;
pub mod booking;
pub mod ledger;
pub mod numbering;
pub mod ticket;

pub use balance::AgentBalance;
pub use booking::{BookingManager, BookingPatch, NewBooking};
pub use ticket::{CancelTicket, NewTicket, TicketManager, TicketPatch};
pub use wingdesk_core::RestockPolicy;
