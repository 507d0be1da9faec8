use wingdesk_core::{CoreError, CoreResult, Flight};

/// Apply `left_seats += delta`, keeping `0 <= left_seats <= total_seats`.
/// The flight is left untouched when the check fails.
pub fn adjust_left_seats(flight: &mut Flight, delta: i32) -> CoreResult<()> {
    let next = flight.left_seats + delta;

    if next < 0 {
        return Err(CoreError::Inventory(format!(
            "flight {}: requested {}, available {}",
            flight.id, -delta, flight.left_seats
        )));
    }
    if next > flight.total_seats {
        return Err(CoreError::Inventory(format!(
            "flight {}: {} seats left would exceed capacity {}",
            flight.id, next, flight.total_seats
        )));
    }

    flight.left_seats = next;
    Ok(())
}

/// Change capacity; the same delta moves `left_seats`.
pub fn resize(flight: &mut Flight, total_seats: i32) -> CoreResult<()> {
    if total_seats < 1 {
        return Err(CoreError::Validation("total_seats must be at least 1".to_string()));
    }

    let delta = total_seats - flight.total_seats;
    let left = flight.left_seats + delta;
    if left < 0 {
        return Err(CoreError::Inventory(format!(
            "flight {}: {} seats are already sold or blocked, capacity {} is too small",
            flight.id,
            flight.total_seats - flight.left_seats,
            total_seats
        )));
    }

    flight.total_seats = total_seats;
    flight.left_seats = left;
    Ok(())
}
