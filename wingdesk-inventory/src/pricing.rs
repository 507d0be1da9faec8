use serde::{Deserialize, Serialize};
use wingdesk_core::{Booking, Discount, Flight, Money, SeatSource};

/// Inputs for pricing one ticket.
#[derive(Debug, Clone, Copy)]
pub struct PricingContext<'a> {
    pub flight: &'a Flight,
    pub discount: Option<&'a Discount>,
    pub source: SeatSource,
    /// Booking the seat is drawn from; only read for hard-blocked seats.
    pub booking: Option<&'a Booking>,
    /// Carrier luggage fee, charged when the ticket carries luggage.
    pub luggage_fee: Option<Money>,
}

/// Breakdown of a ticket price.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FareQuote {
    pub base: Money,
    pub discount: Money,
    /// `flight.price - booking.price` for hard-blocked seats; negative when
    /// the flight got cheaper after the booking was made.
    pub drift: Money,
    pub luggage: Money,
    pub total: Money,
}

/// Price = flight price - discount - hard-block drift, floored at zero,
/// plus the luggage surcharge.
pub fn quote(ctx: &PricingContext<'_>) -> FareQuote {
    let base = ctx.flight.price;
    let discount = ctx.discount.map(|d| d.amount).unwrap_or(0);

    let drift = match (ctx.source, ctx.booking) {
        (SeatSource::Hard, Some(booking)) => ctx.flight.price - booking.price,
        _ => 0,
    };

    let luggage = ctx.luggage_fee.unwrap_or(0);
    let fare = (base - discount - drift).max(0);

    FareQuote {
        base,
        discount,
        drift,
        luggage,
        total: fare + luggage,
    }
}

/// Balance change for toggling luggage: positive means the agent pays more.
pub fn luggage_delta(had_luggage: bool, wants_luggage: bool, fee: Money) -> Money {
    match (had_luggage, wants_luggage) {
        (false, true) => fee,
        (true, false) => -fee,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn flight(price: Money) -> Flight {
        let now = Utc::now();
        Flight {
            id: Uuid::new_v4(),
            guide_id: Uuid::new_v4(),
            from_airport_id: Uuid::new_v4(),
            to_airport_id: Uuid::new_v4(),
            departure_at: now + Duration::days(3),
            arrival_at: now + Duration::days(3) + Duration::hours(2),
            price,
            currency: "USD".to_string(),
            total_seats: 10,
            left_seats: 10,
            on_sale: now,
            created_by: Uuid::new_v4(),
            created_at: now,
            deleted_at: None,
        }
    }

    fn booking(flight: &Flight, price: Money) -> Booking {
        Booking {
            id: Uuid::new_v4(),
            flight_id: flight.id,
            agent_id: Uuid::new_v4(),
            hard_block: 3,
            soft_block: 0,
            price,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn test_plain_fare() {
        let f = flight(1000);
        let q = quote(&PricingContext {
            flight: &f,
            discount: None,
            source: SeatSource::General,
            booking: None,
            luggage_fee: None,
        });
        assert_eq!(q.total, 1000);
    }

    #[test]
    fn test_discount_and_luggage() {
        let f = flight(1000);
        let d = Discount { id: Uuid::new_v4(), name: "partner".to_string(), amount: 150 };
        let q = quote(&PricingContext {
            flight: &f,
            discount: Some(&d),
            source: SeatSource::General,
            booking: None,
            luggage_fee: Some(200),
        });
        assert_eq!(q.discount, 150);
        assert_eq!(q.total, 1050);
    }

    #[test]
    fn test_hard_block_pays_booking_price() {
        let f = flight(1200);
        let b = booking(&f, 1000);
        let q = quote(&PricingContext {
            flight: &f,
            discount: None,
            source: SeatSource::Hard,
            booking: Some(&b),
            luggage_fee: None,
        });
        assert_eq!(q.drift, 200);
        assert_eq!(q.total, 1000);

        // Soft blocks ignore the snapshot.
        let q = quote(&PricingContext { source: SeatSource::Soft, ..q_ctx(&f, &b) });
        assert_eq!(q.total, 1200);
    }

    fn q_ctx<'a>(f: &'a Flight, b: &'a Booking) -> PricingContext<'a> {
        PricingContext {
            flight: f,
            discount: None,
            source: SeatSource::Hard,
            booking: Some(b),
            luggage_fee: None,
        }
    }

    #[test]
    fn test_price_never_negative() {
        let f = flight(100);
        let d = Discount { id: Uuid::new_v4(), name: "staff".to_string(), amount: 500 };
        let q = quote(&PricingContext {
            flight: &f,
            discount: Some(&d),
            source: SeatSource::General,
            booking: None,
            luggage_fee: Some(30),
        });
        assert_eq!(q.total, 30);
    }

    #[test]
    fn test_luggage_delta() {
        assert_eq!(luggage_delta(false, true, 200), 200);
        assert_eq!(luggage_delta(true, false, 200), -200);
        assert_eq!(luggage_delta(true, true, 200), 0);
    }
}
