use chrono::Utc;

use crate::models::{Driver, Instructor, LockedPricing};

/// Monetary fields are non-negative finite numbers; anything else
/// coerces to zero instead of failing the lock.
fn sanitize(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() && v >= 0.0 => v,
        _ => 0.0,
    }
}

/// Exact point rate takes precedence over the range minimum.
pub fn workshop_rate(instructor: &Instructor) -> f64 {
    sanitize(instructor.rate.or(instructor.rate_min))
}

/// Conservative default: the minimum of the materials-fee range.
pub fn materials_fee(instructor: &Instructor) -> f64 {
    sanitize(instructor.materials_fee_min)
}

pub fn transport_rate(driver: Option<&Driver>) -> f64 {
    sanitize(driver.map(|d| d.rate))
}

/// Full pricing snapshot computed at confirmation time.
pub fn lock_quote(instructor: &Instructor, driver: Option<&Driver>) -> LockedPricing {
    let workshop = workshop_rate(instructor);
    let materials = materials_fee(instructor);
    let transport = transport_rate(driver);

    LockedPricing {
        workshop_rate: workshop,
        materials_fee: materials,
        transport_rate: transport,
        total: workshop + materials + transport,
        locked_at: Utc::now().naive_utc(),
    }
}

/// Recompute transport and total for a driver (re)assignment, keeping
/// the already-locked workshop and materials components.
pub fn requote_transport(locked: &LockedPricing, driver: &Driver) -> (f64, f64) {
    let transport = sanitize(Some(driver.rate));
    let total = locked.workshop_rate + locked.materials_fee + transport;
    (transport, total)
}
