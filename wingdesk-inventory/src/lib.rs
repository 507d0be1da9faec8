pub mod flight;
pub mod inventory;
pub mod pricing;

pub use flight::{FlightManager, FlightPatch, FlightRules, NewFlight};
pub use pricing::{FareQuote, PricingContext};
