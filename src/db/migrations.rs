use anyhow::Context;
use rusqlite::Connection;

/// Ordered schema migrations, applied once each and recorded in
/// `_migrations`. Kept in code so in-memory test databases migrate the
/// same way as the on-disk one.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_catalog",
        "CREATE TABLE IF NOT EXISTS services (
            id TEXT PRIMARY KEY,
            slug TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            description TEXT
        );

        CREATE TABLE IF NOT EXISTS instructors (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            nickname TEXT,
            craft TEXT,
            rate REAL,
            rate_min REAL,
            rate_max REAL,
            rate_notes TEXT,
            materials_fee_min REAL,
            materials_fee_max REAL,
            bio TEXT
        );

        CREATE TABLE IF NOT EXISTS service_instructors (
            service_id TEXT NOT NULL REFERENCES services(id),
            instructor_id TEXT NOT NULL REFERENCES instructors(id),
            PRIMARY KEY (service_id, instructor_id)
        );

        CREATE TABLE IF NOT EXISTS drivers (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            vehicle_type TEXT NOT NULL,
            rate REAL NOT NULL DEFAULT 0,
            rate_unit TEXT NOT NULL DEFAULT 'per_trip',
            license_no TEXT,
            years_experience INTEGER
        );

        CREATE TABLE IF NOT EXISTS tour_stops (
            id TEXT PRIMARY KEY,
            category TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            address TEXT,
            contact_phone TEXT,
            image_urls TEXT NOT NULL DEFAULT '[]',
            is_active INTEGER NOT NULL DEFAULT 1
        );",
    ),
    (
        "0002_profiles",
        "CREATE TABLE IF NOT EXISTS profiles (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            full_name TEXT,
            is_admin INTEGER NOT NULL DEFAULT 0,
            auth_token TEXT UNIQUE,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    ),
    (
        "0003_bookings",
        "CREATE TABLE IF NOT EXISTS bookings (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES profiles(id),
            status TEXT NOT NULL DEFAULT 'pending',
            service_id TEXT NOT NULL,
            service_name TEXT NOT NULL,
            instructor_id TEXT NOT NULL,
            instructor_name TEXT NOT NULL,
            date_iso TEXT NOT NULL,
            time_label TEXT NOT NULL,
            transport TEXT,
            pickup_notes TEXT,
            driver TEXT NOT NULL DEFAULT 'to_be_assigned',
            driver_id TEXT REFERENCES drivers(id),
            places_to_eat_stop_id TEXT REFERENCES tour_stops(id),
            pasalubong_stop_id TEXT REFERENCES tour_stops(id),
            admin_notes TEXT,
            final_workshop_rate REAL,
            final_materials_fee REAL,
            final_transport_rate REAL,
            final_total REAL,
            pricing_locked_at TEXT,
            confirmed_at TEXT,
            rejected_at TEXT,
            completed_at TEXT,
            cancelled_at TEXT,
            version INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_bookings_user_created
            ON bookings(user_id, created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_bookings_status
            ON bookings(status);",
    ),
];

pub fn run_migrations(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .context("failed to create migrations table")?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .context("failed to check migration status")?;

        if already_applied {
            continue;
        }

        conn.execute_batch(sql)
            .with_context(|| format!("failed to apply migration: {name}"))?;

        conn.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])
            .with_context(|| format!("failed to record migration: {name}"))?;

        tracing::info!("applied migration: {name}");
    }

    Ok(())
}
