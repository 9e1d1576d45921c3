use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection};

use crate::models::{
    Booking, BookingStatus, Driver, DriverAssignment, Instructor, LockedPricing, Profile, RateUnit,
    Service, StopCategory, TourStop, Transport,
};

const DT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn fmt_dt(dt: &NaiveDateTime) -> String {
    dt.format(DT_FORMAT).to_string()
}

/// A stored timestamp that doesn't parse is data corruption; surface it
/// as a row-conversion error rather than substituting a made-up time.
fn parse_dt(idx: usize, s: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DT_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn now_str() -> String {
    Utc::now().naive_utc().format(DT_FORMAT).to_string()
}

// ── Profiles ──

pub fn get_profile_by_token(conn: &Connection, token: &str) -> anyhow::Result<Option<Profile>> {
    let result = conn.query_row(
        "SELECT id, email, full_name, is_admin FROM profiles WHERE auth_token = ?1",
        params![token],
        |row| {
            Ok(Profile {
                id: row.get(0)?,
                email: row.get(1)?,
                full_name: row.get(2)?,
                is_admin: row.get::<_, i64>(3)? != 0,
            })
        },
    );

    match result {
        Ok(profile) => Ok(Some(profile)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_profile(conn: &Connection, id: &str) -> anyhow::Result<Option<Profile>> {
    let result = conn.query_row(
        "SELECT id, email, full_name, is_admin FROM profiles WHERE id = ?1",
        params![id],
        |row| {
            Ok(Profile {
                id: row.get(0)?,
                email: row.get(1)?,
                full_name: row.get(2)?,
                is_admin: row.get::<_, i64>(3)? != 0,
            })
        },
    );

    match result {
        Ok(profile) => Ok(Some(profile)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn upsert_profile(
    conn: &Connection,
    profile: &Profile,
    auth_token: Option<&str>,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO profiles (id, email, full_name, is_admin, auth_token)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
           email = excluded.email,
           full_name = excluded.full_name,
           is_admin = excluded.is_admin,
           auth_token = excluded.auth_token",
        params![
            profile.id,
            profile.email,
            profile.full_name,
            profile.is_admin as i64,
            auth_token,
        ],
    )?;
    Ok(())
}

// ── Services & Instructors ──

pub fn list_services(conn: &Connection) -> anyhow::Result<Vec<Service>> {
    let mut stmt =
        conn.prepare("SELECT id, slug, name, description FROM services ORDER BY name")?;
    let rows = stmt.query_map([], |row| {
        Ok(Service {
            id: row.get(0)?,
            slug: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
        })
    })?;

    let mut services = vec![];
    for row in rows {
        services.push(row?);
    }
    Ok(services)
}

pub fn get_service_by_slug(conn: &Connection, slug: &str) -> anyhow::Result<Option<Service>> {
    let result = conn.query_row(
        "SELECT id, slug, name, description FROM services WHERE slug = ?1",
        params![slug],
        |row| {
            Ok(Service {
                id: row.get(0)?,
                slug: row.get(1)?,
                name: row.get(2)?,
                description: row.get(3)?,
            })
        },
    );

    match result {
        Ok(service) => Ok(Some(service)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn insert_service(conn: &Connection, service: &Service) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO services (id, slug, name, description) VALUES (?1, ?2, ?3, ?4)",
        params![service.id, service.slug, service.name, service.description],
    )?;
    Ok(())
}

fn parse_instructor_row(row: &rusqlite::Row) -> rusqlite::Result<Instructor> {
    Ok(Instructor {
        id: row.get(0)?,
        name: row.get(1)?,
        nickname: row.get(2)?,
        craft: row.get(3)?,
        rate: row.get(4)?,
        rate_min: row.get(5)?,
        rate_max: row.get(6)?,
        rate_notes: row.get(7)?,
        materials_fee_min: row.get(8)?,
        materials_fee_max: row.get(9)?,
        bio: row.get(10)?,
    })
}

const INSTRUCTOR_COLS: &str = "id, name, nickname, craft, rate, rate_min, rate_max, rate_notes, \
                               materials_fee_min, materials_fee_max, bio";

pub fn get_instructor(conn: &Connection, id: &str) -> anyhow::Result<Option<Instructor>> {
    let sql = format!("SELECT {INSTRUCTOR_COLS} FROM instructors WHERE id = ?1");
    let result = conn.query_row(&sql, params![id], parse_instructor_row);

    match result {
        Ok(instructor) => Ok(Some(instructor)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_instructors_for_service(
    conn: &Connection,
    service_id: &str,
) -> anyhow::Result<Vec<Instructor>> {
    let mut stmt = conn.prepare(
        "SELECT i.id, i.name, i.nickname, i.craft, i.rate, i.rate_min, i.rate_max, i.rate_notes,
                i.materials_fee_min, i.materials_fee_max, i.bio
         FROM instructors i
         INNER JOIN service_instructors si ON si.instructor_id = i.id
         WHERE si.service_id = ?1
         ORDER BY i.name",
    )?;
    let rows = stmt.query_map(params![service_id], parse_instructor_row)?;

    let mut instructors = vec![];
    for row in rows {
        instructors.push(row?);
    }
    Ok(instructors)
}

pub fn insert_instructor(conn: &Connection, instructor: &Instructor) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO instructors (id, name, nickname, craft, rate, rate_min, rate_max, rate_notes,
                                  materials_fee_min, materials_fee_max, bio)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            instructor.id,
            instructor.name,
            instructor.nickname,
            instructor.craft,
            instructor.rate,
            instructor.rate_min,
            instructor.rate_max,
            instructor.rate_notes,
            instructor.materials_fee_min,
            instructor.materials_fee_max,
            instructor.bio,
        ],
    )?;
    Ok(())
}

pub fn link_service_instructor(
    conn: &Connection,
    service_id: &str,
    instructor_id: &str,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO service_instructors (service_id, instructor_id) VALUES (?1, ?2)",
        params![service_id, instructor_id],
    )?;
    Ok(())
}

/// A booking is only valid for a (service, instructor) pair present in
/// the join table.
pub fn service_instructor_pair_exists(
    conn: &Connection,
    service_id: &str,
    instructor_id: &str,
) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM service_instructors WHERE service_id = ?1 AND instructor_id = ?2",
        params![service_id, instructor_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

// ── Drivers ──

fn parse_driver_row(row: &rusqlite::Row) -> rusqlite::Result<Driver> {
    let vehicle: String = row.get(2)?;
    let rate_unit: String = row.get(4)?;
    Ok(Driver {
        id: row.get(0)?,
        name: row.get(1)?,
        vehicle_type: Transport::parse(&vehicle).unwrap_or(Transport::Van),
        rate: row.get(3)?,
        rate_unit: RateUnit::parse(&rate_unit),
        license_no: row.get(5)?,
        years_experience: row.get(6)?,
    })
}

pub fn get_driver(conn: &Connection, id: &str) -> anyhow::Result<Option<Driver>> {
    let result = conn.query_row(
        "SELECT id, name, vehicle_type, rate, rate_unit, license_no, years_experience
         FROM drivers WHERE id = ?1",
        params![id],
        parse_driver_row,
    );

    match result {
        Ok(driver) => Ok(Some(driver)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_drivers(conn: &Connection) -> anyhow::Result<Vec<Driver>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, vehicle_type, rate, rate_unit, license_no, years_experience
         FROM drivers ORDER BY name",
    )?;
    let rows = stmt.query_map([], parse_driver_row)?;

    let mut drivers = vec![];
    for row in rows {
        drivers.push(row?);
    }
    Ok(drivers)
}

pub fn insert_driver(conn: &Connection, driver: &Driver) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO drivers (id, name, vehicle_type, rate, rate_unit, license_no, years_experience)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            driver.id,
            driver.name,
            driver.vehicle_type.as_str(),
            driver.rate,
            driver.rate_unit.as_str(),
            driver.license_no,
            driver.years_experience,
        ],
    )?;
    Ok(())
}

// ── Tour Stops ──

fn parse_tour_stop_row(row: &rusqlite::Row) -> rusqlite::Result<TourStop> {
    let category: String = row.get(1)?;
    let image_urls_json: String = row.get(6)?;
    Ok(TourStop {
        id: row.get(0)?,
        category: StopCategory::parse(&category).unwrap_or(StopCategory::PlacesToEat),
        name: row.get(2)?,
        description: row.get(3)?,
        address: row.get(4)?,
        contact_phone: row.get(5)?,
        image_urls: serde_json::from_str(&image_urls_json).unwrap_or_default(),
        is_active: row.get::<_, i64>(7)? != 0,
    })
}

pub fn get_tour_stop(conn: &Connection, id: &str) -> anyhow::Result<Option<TourStop>> {
    let result = conn.query_row(
        "SELECT id, category, name, description, address, contact_phone, image_urls, is_active
         FROM tour_stops WHERE id = ?1",
        params![id],
        parse_tour_stop_row,
    );

    match result {
        Ok(stop) => Ok(Some(stop)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_tour_stops(conn: &Connection, category: StopCategory) -> anyhow::Result<Vec<TourStop>> {
    let mut stmt = conn.prepare(
        "SELECT id, category, name, description, address, contact_phone, image_urls, is_active
         FROM tour_stops WHERE category = ?1 AND is_active = 1 ORDER BY name",
    )?;
    let rows = stmt.query_map(params![category.as_str()], parse_tour_stop_row)?;

    let mut stops = vec![];
    for row in rows {
        stops.push(row?);
    }
    Ok(stops)
}

pub fn insert_tour_stop(conn: &Connection, stop: &TourStop) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO tour_stops (id, category, name, description, address, contact_phone, image_urls, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            stop.id,
            stop.category.as_str(),
            stop.name,
            stop.description,
            stop.address,
            stop.contact_phone,
            serde_json::to_string(&stop.image_urls)?,
            stop.is_active as i64,
        ],
    )?;
    Ok(())
}

// ── Bookings ──

const BOOKING_COLS: &str = "id, user_id, status, service_id, service_name, instructor_id, \
    instructor_name, date_iso, time_label, transport, pickup_notes, driver, driver_id, \
    places_to_eat_stop_id, pasalubong_stop_id, admin_notes, final_workshop_rate, \
    final_materials_fee, final_transport_rate, final_total, pricing_locked_at, confirmed_at, \
    rejected_at, completed_at, cancelled_at, version, created_at, updated_at";

fn parse_booking_row(row: &rusqlite::Row) -> rusqlite::Result<Booking> {
    let status: String = row.get(2)?;
    let date_iso: String = row.get(7)?;
    let transport: Option<String> = row.get(9)?;
    let driver: String = row.get(11)?;

    let workshop_rate: Option<f64> = row.get(16)?;
    let materials_fee: Option<f64> = row.get(17)?;
    let transport_rate: Option<f64> = row.get(18)?;
    let total: Option<f64> = row.get(19)?;
    let locked_at: Option<String> = row.get(20)?;

    // pricing_locked_at is the source of truth for the lock; the numeric
    // components default to zero if a column is unexpectedly null.
    let pricing = match locked_at {
        Some(ts) => Some(LockedPricing {
            workshop_rate: workshop_rate.unwrap_or(0.0),
            materials_fee: materials_fee.unwrap_or(0.0),
            transport_rate: transport_rate.unwrap_or(0.0),
            total: total.unwrap_or(0.0),
            locked_at: parse_dt(20, &ts)?,
        }),
        None => None,
    };

    let confirmed_at: Option<String> = row.get(21)?;
    let rejected_at: Option<String> = row.get(22)?;
    let completed_at: Option<String> = row.get(23)?;
    let cancelled_at: Option<String> = row.get(24)?;
    let created_at: String = row.get(26)?;
    let updated_at: String = row.get(27)?;

    Ok(Booking {
        id: row.get(0)?,
        user_id: row.get(1)?,
        status: BookingStatus::parse(&status),
        service_id: row.get(3)?,
        service_name: row.get(4)?,
        instructor_id: row.get(5)?,
        instructor_name: row.get(6)?,
        date_iso: NaiveDate::parse_from_str(&date_iso, "%Y-%m-%d").map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
        })?,
        time_label: row.get(8)?,
        transport: transport.as_deref().and_then(Transport::parse),
        pickup_notes: row.get(10)?,
        driver: DriverAssignment::parse(&driver),
        driver_id: row.get(12)?,
        places_to_eat_stop_id: row.get(13)?,
        pasalubong_stop_id: row.get(14)?,
        admin_notes: row.get(15)?,
        pricing,
        confirmed_at: confirmed_at.map(|s| parse_dt(21, &s)).transpose()?,
        rejected_at: rejected_at.map(|s| parse_dt(22, &s)).transpose()?,
        completed_at: completed_at.map(|s| parse_dt(23, &s)).transpose()?,
        cancelled_at: cancelled_at.map(|s| parse_dt(24, &s)).transpose()?,
        version: row.get(25)?,
        created_at: parse_dt(26, &created_at)?,
        updated_at: parse_dt(27, &updated_at)?,
    })
}

pub fn insert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO bookings (id, user_id, status, service_id, service_name, instructor_id,
                               instructor_name, date_iso, time_label, transport, pickup_notes,
                               driver, driver_id, places_to_eat_stop_id, pasalubong_stop_id,
                               version, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        params![
            booking.id,
            booking.user_id,
            booking.status.as_str(),
            booking.service_id,
            booking.service_name,
            booking.instructor_id,
            booking.instructor_name,
            booking.date_iso.format("%Y-%m-%d").to_string(),
            booking.time_label,
            booking.transport.map(|t| t.as_str()),
            booking.pickup_notes,
            booking.driver.as_str(),
            booking.driver_id,
            booking.places_to_eat_stop_id,
            booking.pasalubong_stop_id,
            booking.version,
            fmt_dt(&booking.created_at),
            fmt_dt(&booking.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let sql = format!("SELECT {BOOKING_COLS} FROM bookings WHERE id = ?1");
    let result = conn.query_row(&sql, params![id], parse_booking_row);

    match result {
        Ok(booking) => Ok(Some(booking)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_bookings_for_user(conn: &Connection, user_id: &str) -> anyhow::Result<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLS} FROM bookings WHERE user_id = ?1 ORDER BY created_at DESC, id DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![user_id], parse_booking_row)?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row?);
    }
    Ok(bookings)
}

pub fn list_all_bookings(conn: &Connection) -> anyhow::Result<Vec<Booking>> {
    let sql = format!("SELECT {BOOKING_COLS} FROM bookings ORDER BY created_at DESC, id DESC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], parse_booking_row)?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row?);
    }
    Ok(bookings)
}

// ── Booking transition writes ──
//
// Every status-changing write is a compare-and-swap on `version`; a
// returned `false` means the row changed under us (or disappeared) and
// the caller surfaces a conflict.

#[allow(clippy::too_many_arguments)]
pub fn apply_confirm(
    conn: &Connection,
    id: &str,
    expected_version: i64,
    driver: DriverAssignment,
    driver_id: Option<&str>,
    admin_notes: Option<&str>,
    pricing: &LockedPricing,
) -> anyhow::Result<bool> {
    let now = now_str();
    let count = conn.execute(
        "UPDATE bookings SET
            status = 'confirmed',
            confirmed_at = ?1,
            rejected_at = NULL,
            driver = ?2,
            driver_id = ?3,
            admin_notes = ?4,
            final_workshop_rate = ?5,
            final_materials_fee = ?6,
            final_transport_rate = ?7,
            final_total = ?8,
            pricing_locked_at = ?9,
            version = version + 1,
            updated_at = ?1
         WHERE id = ?10 AND version = ?11",
        params![
            now,
            driver.as_str(),
            driver_id,
            admin_notes,
            pricing.workshop_rate,
            pricing.materials_fee,
            pricing.transport_rate,
            pricing.total,
            fmt_dt(&pricing.locked_at),
            id,
            expected_version,
        ],
    )?;
    Ok(count > 0)
}

pub fn apply_reject(
    conn: &Connection,
    id: &str,
    expected_version: i64,
    driver: DriverAssignment,
    admin_notes: Option<&str>,
) -> anyhow::Result<bool> {
    let now = now_str();
    let count = conn.execute(
        "UPDATE bookings SET
            status = 'rejected',
            rejected_at = ?1,
            confirmed_at = NULL,
            driver = ?2,
            driver_id = NULL,
            admin_notes = ?3,
            version = version + 1,
            updated_at = ?1
         WHERE id = ?4 AND version = ?5",
        params![now, driver.as_str(), admin_notes, id, expected_version],
    )?;
    Ok(count > 0)
}

pub fn apply_complete(conn: &Connection, id: &str, expected_version: i64) -> anyhow::Result<bool> {
    let now = now_str();
    let count = conn.execute(
        "UPDATE bookings SET
            status = 'completed',
            completed_at = ?1,
            version = version + 1,
            updated_at = ?1
         WHERE id = ?2 AND version = ?3",
        params![now, id, expected_version],
    )?;
    Ok(count > 0)
}

pub fn apply_cancel(conn: &Connection, id: &str, expected_version: i64) -> anyhow::Result<bool> {
    let now = now_str();
    let count = conn.execute(
        "UPDATE bookings SET
            status = 'cancelled',
            cancelled_at = ?1,
            version = version + 1,
            updated_at = ?1
         WHERE id = ?2 AND version = ?3",
        params![now, id, expected_version],
    )?;
    Ok(count > 0)
}

/// Post-confirmation driver (re)assignment: touches only the driver slot,
/// transport rate and total. Workshop and materials stay frozen.
pub fn apply_driver_assignment(
    conn: &Connection,
    id: &str,
    expected_version: i64,
    driver_id: &str,
    transport_rate: f64,
    total: f64,
) -> anyhow::Result<bool> {
    let now = now_str();
    let count = conn.execute(
        "UPDATE bookings SET
            driver = 'assigned',
            driver_id = ?1,
            final_transport_rate = ?2,
            final_total = ?3,
            version = version + 1,
            updated_at = ?4
         WHERE id = ?5 AND version = ?6",
        params![driver_id, transport_rate, total, now, id, expected_version],
    )?;
    Ok(count > 0)
}
