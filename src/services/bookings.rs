use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{
    is_valid_time_slot, Booking, BookingStatus, Caller, DriverAssignment, StopCategory, Transport,
};
use crate::services::pricing;

/// Input to booking creation. The service is addressed by slug the same
/// way the booking form links to it; everything else is validated here.
#[derive(Debug, Clone)]
pub struct CreateBookingInput {
    pub service_slug: String,
    pub instructor_id: String,
    pub date_iso: String,
    pub time_label: String,
    pub transport: Option<Transport>,
    pub pickup_notes: Option<String>,
    pub places_to_eat_stop_id: Option<String>,
    pub pasalubong_stop_id: Option<String>,
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn validate_tour_stop(
    conn: &Connection,
    stop_id: &str,
    expected: StopCategory,
) -> Result<(), AppError> {
    let stop = queries::get_tour_stop(conn, stop_id)?
        .ok_or_else(|| AppError::Validation(format!("tour stop {stop_id} not found")))?;
    if !stop.is_active {
        return Err(AppError::Validation(format!(
            "tour stop {} is no longer available",
            stop.name
        )));
    }
    if stop.category != expected {
        return Err(AppError::Validation(format!(
            "tour stop {} is not a {} stop",
            stop.name,
            expected.as_str()
        )));
    }
    Ok(())
}

/// Create a booking with status `pending`, no driver and no locked
/// pricing. The (service, instructor) pair must exist in the join table.
pub fn create_booking(
    conn: &Connection,
    caller: &Caller,
    input: CreateBookingInput,
) -> Result<Booking, AppError> {
    let date_iso = NaiveDate::parse_from_str(&input.date_iso, "%Y-%m-%d")
        .map_err(|_| AppError::Validation("date must be formatted YYYY-MM-DD".to_string()))?;

    if !is_valid_time_slot(&input.time_label) {
        return Err(AppError::Validation(format!(
            "{:?} is not a bookable time slot",
            input.time_label
        )));
    }

    let pickup_notes = trimmed(input.pickup_notes);
    if pickup_notes.is_some() && input.transport.is_none() {
        return Err(AppError::Validation(
            "pickup notes require a transport option".to_string(),
        ));
    }

    let service = queries::get_service_by_slug(conn, &input.service_slug)?
        .ok_or_else(|| AppError::Validation("service not found".to_string()))?;

    let instructor = queries::get_instructor(conn, &input.instructor_id)?
        .ok_or_else(|| AppError::Validation("instructor not found".to_string()))?;

    if !queries::service_instructor_pair_exists(conn, &service.id, &instructor.id)? {
        return Err(AppError::Validation(
            "this instructor is not available for this service".to_string(),
        ));
    }

    if let Some(stop_id) = &input.places_to_eat_stop_id {
        validate_tour_stop(conn, stop_id, StopCategory::PlacesToEat)?;
    }
    if let Some(stop_id) = &input.pasalubong_stop_id {
        validate_tour_stop(conn, stop_id, StopCategory::PasalubongCenter)?;
    }

    let driver = if input.transport.is_some() {
        DriverAssignment::ToBeAssigned
    } else {
        DriverAssignment::NotIncluded
    };

    let now = Utc::now().naive_utc();
    let booking = Booking {
        id: Uuid::new_v4().to_string(),
        user_id: caller.user_id.clone(),
        status: BookingStatus::Pending,
        service_id: service.id,
        service_name: service.name,
        instructor_id: instructor.id.clone(),
        instructor_name: instructor.display_name(),
        date_iso,
        time_label: input.time_label,
        transport: input.transport,
        pickup_notes,
        driver,
        driver_id: None,
        places_to_eat_stop_id: input.places_to_eat_stop_id,
        pasalubong_stop_id: input.pasalubong_stop_id,
        admin_notes: None,
        pricing: None,
        confirmed_at: None,
        rejected_at: None,
        completed_at: None,
        cancelled_at: None,
        version: 1,
        created_at: now,
        updated_at: now,
    };

    queries::insert_booking(conn, &booking)?;
    tracing::info!(booking_id = %booking.id, user_id = %booking.user_id, "booking created");

    Ok(booking)
}

/// Owner-or-admin read. A non-owner non-admin caller gets "not found"
/// rather than "forbidden" so booking ids don't leak existence.
pub fn get_booking(conn: &Connection, caller: &Caller, id: &str) -> Result<Booking, AppError> {
    let booking = queries::get_booking_by_id(conn, id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;

    if booking.user_id != caller.user_id && !caller.is_admin {
        return Err(AppError::NotFound(format!("booking {id}")));
    }
    Ok(booking)
}

pub fn list_my_bookings(conn: &Connection, caller: &Caller) -> Result<Vec<Booking>, AppError> {
    Ok(queries::list_bookings_for_user(conn, &caller.user_id)?)
}

pub fn list_all_bookings(conn: &Connection, caller: &Caller) -> Result<Vec<Booking>, AppError> {
    if !caller.is_admin {
        return Err(AppError::Forbidden);
    }
    Ok(queries::list_all_bookings(conn)?)
}

fn require_admin(caller: &Caller) -> Result<(), AppError> {
    if caller.is_admin {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

fn load_for_update(conn: &Connection, id: &str) -> Result<Booking, AppError> {
    queries::get_booking_by_id(conn, id)?.ok_or_else(|| AppError::NotFound(format!("booking {id}")))
}

fn conflict(id: &str) -> AppError {
    AppError::Conflict(format!("booking {id} was modified concurrently"))
}

/// Admin confirmation. Legal from `pending` (or `rejected`, to undo a
/// mistaken rejection). Locks pricing atomically with the status write;
/// if pricing was already locked by an earlier confirmation only the
/// transport component is recomputed.
pub fn confirm_booking(
    conn: &mut Connection,
    caller: &Caller,
    id: &str,
    driver_id: Option<String>,
    admin_notes: Option<String>,
) -> Result<Booking, AppError> {
    require_admin(caller)?;

    let tx = conn.transaction()?;

    let booking = load_for_update(&tx, id)?;
    match booking.status {
        BookingStatus::Pending | BookingStatus::Rejected => {}
        other => {
            return Err(AppError::Validation(format!(
                "cannot confirm a {} booking",
                other.as_str()
            )))
        }
    }

    let driver = match &driver_id {
        Some(did) => {
            let transport = booking.transport.ok_or_else(|| {
                AppError::Validation("cannot assign a driver to a booking without transport".into())
            })?;
            let d = queries::get_driver(&tx, did)?
                .ok_or_else(|| AppError::Validation("driver not found".to_string()))?;
            if d.vehicle_type != transport {
                return Err(AppError::Validation(format!(
                    "driver {} drives a {}, booking requested a {}",
                    d.name,
                    d.vehicle_type.as_str(),
                    transport.as_str()
                )));
            }
            Some(d)
        }
        None => None,
    };

    // Workshop and materials freeze at the first lock; a re-confirmation
    // after rejection only re-prices transport.
    let pricing = match booking.pricing {
        Some(locked) => {
            let transport_rate = pricing::transport_rate(driver.as_ref());
            crate::models::LockedPricing {
                transport_rate,
                total: locked.workshop_rate + locked.materials_fee + transport_rate,
                ..locked
            }
        }
        None => {
            let instructor = queries::get_instructor(&tx, &booking.instructor_id)?
                .ok_or_else(|| AppError::Validation("instructor not found".to_string()))?;
            pricing::lock_quote(&instructor, driver.as_ref())
        }
    };

    let assignment = match (&driver, booking.transport) {
        (Some(_), _) => DriverAssignment::Assigned,
        (None, Some(_)) => DriverAssignment::ToBeAssigned,
        (None, None) => DriverAssignment::NotIncluded,
    };

    let updated = queries::apply_confirm(
        &tx,
        id,
        booking.version,
        assignment,
        driver.as_ref().map(|d| d.id.as_str()),
        trimmed(admin_notes).as_deref(),
        &pricing,
    )?;
    if !updated {
        return Err(conflict(id));
    }

    let booking = load_for_update(&tx, id)?;
    tx.commit()?;

    tracing::info!(booking_id = %id, "booking confirmed");
    Ok(booking)
}

/// Admin rejection. Legal from `pending` or `confirmed`; clears any
/// driver assignment and the confirmed-at timestamp.
pub fn reject_booking(
    conn: &Connection,
    caller: &Caller,
    id: &str,
    admin_notes: Option<String>,
) -> Result<Booking, AppError> {
    require_admin(caller)?;

    let booking = load_for_update(conn, id)?;
    match booking.status {
        BookingStatus::Pending | BookingStatus::Confirmed => {}
        other => {
            return Err(AppError::Validation(format!(
                "cannot reject a {} booking",
                other.as_str()
            )))
        }
    }

    let assignment = if booking.transport.is_some() {
        DriverAssignment::ToBeAssigned
    } else {
        DriverAssignment::NotIncluded
    };

    let updated = queries::apply_reject(
        conn,
        id,
        booking.version,
        assignment,
        trimmed(admin_notes).as_deref(),
    )?;
    if !updated {
        return Err(conflict(id));
    }

    tracing::info!(booking_id = %id, "booking rejected");
    load_for_update(conn, id)
}

/// Admin completion, legal from `confirmed` only.
pub fn complete_booking(conn: &Connection, caller: &Caller, id: &str) -> Result<Booking, AppError> {
    require_admin(caller)?;

    let booking = load_for_update(conn, id)?;
    if booking.status != BookingStatus::Confirmed {
        return Err(AppError::Validation(format!(
            "cannot complete a {} booking",
            booking.status.as_str()
        )));
    }

    if !queries::apply_complete(conn, id, booking.version)? {
        return Err(conflict(id));
    }

    tracing::info!(booking_id = %id, "booking completed");
    load_for_update(conn, id)
}

/// Owner-initiated cancellation, legal from `pending` or `confirmed`.
/// Cancelling a terminal booking is a validation error, not a no-op.
pub fn cancel_booking(conn: &Connection, caller: &Caller, id: &str) -> Result<Booking, AppError> {
    let booking = queries::get_booking_by_id(conn, id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;

    if booking.user_id != caller.user_id {
        return Err(AppError::NotFound(format!("booking {id}")));
    }

    if !booking.status.is_cancellable() {
        return Err(AppError::Validation(format!(
            "cannot cancel a {} booking",
            booking.status.as_str()
        )));
    }

    if !queries::apply_cancel(conn, id, booking.version)? {
        return Err(conflict(id));
    }

    tracing::info!(booking_id = %id, "booking cancelled by owner");
    load_for_update(conn, id)
}

/// Admin driver (re)assignment on a confirmed booking. Recomputes the
/// transport rate and total inside one transaction, preserving the
/// locked workshop and materials components.
pub fn assign_driver(
    conn: &mut Connection,
    caller: &Caller,
    id: &str,
    driver_id: &str,
) -> Result<Booking, AppError> {
    require_admin(caller)?;

    let tx = conn.transaction()?;

    let booking = load_for_update(&tx, id)?;
    if booking.status != BookingStatus::Confirmed {
        return Err(AppError::Validation(format!(
            "cannot assign a driver to a {} booking",
            booking.status.as_str()
        )));
    }
    let transport = booking.transport.ok_or_else(|| {
        AppError::Validation("cannot assign a driver to a booking without transport".into())
    })?;

    let driver = queries::get_driver(&tx, driver_id)?
        .ok_or_else(|| AppError::Validation("driver not found".to_string()))?;
    if driver.vehicle_type != transport {
        return Err(AppError::Validation(format!(
            "driver {} drives a {}, booking requested a {}",
            driver.name,
            driver.vehicle_type.as_str(),
            transport.as_str()
        )));
    }

    let locked = booking
        .pricing
        .ok_or_else(|| AppError::Validation("booking pricing has not been locked".to_string()))?;
    let (transport_rate, total) = pricing::requote_transport(&locked, &driver);

    let updated =
        queries::apply_driver_assignment(&tx, id, booking.version, &driver.id, transport_rate, total)?;
    if !updated {
        return Err(conflict(id));
    }

    let booking = load_for_update(&tx, id)?;
    tx.commit()?;

    tracing::info!(booking_id = %id, driver_id = %driver.id, "driver assigned");
    Ok(booking)
}
