use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, Driver, RateUnit, Transport};
use crate::services::bookings;
use crate::services::notifications::{self, NotificationKind};
use crate::state::AppState;

use super::authenticate;
use super::bookings::{broadcast_change, BookingResponse};

/// Admin view of a booking: the caller-facing shape plus owner id,
/// status timestamps and the concurrency token.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminBookingResponse {
    #[serde(flatten)]
    pub booking: BookingResponse,
    pub user_id: String,
    pub confirmed_at: Option<String>,
    pub rejected_at: Option<String>,
    pub completed_at: Option<String>,
    pub cancelled_at: Option<String>,
    pub version: i64,
}

impl From<Booking> for AdminBookingResponse {
    fn from(b: Booking) -> Self {
        let fmt = |t: chrono::NaiveDateTime| t.format("%Y-%m-%d %H:%M:%S").to_string();
        AdminBookingResponse {
            user_id: b.user_id.clone(),
            confirmed_at: b.confirmed_at.map(fmt),
            rejected_at: b.rejected_at.map(fmt),
            completed_at: b.completed_at.map(fmt),
            cancelled_at: b.cancelled_at.map(fmt),
            version: b.version,
            booking: b.into(),
        }
    }
}

// GET /api/admin/bookings
pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<AdminBookingResponse>>, AppError> {
    let bookings = {
        let db = state.db.lock().unwrap();
        let caller = authenticate(&headers, &db)?;
        bookings::list_all_bookings(&db, &caller)?
    };

    Ok(Json(bookings.into_iter().map(Into::into).collect()))
}

// POST /api/admin/bookings/:id/confirm
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    pub driver_id: Option<String>,
    pub admin_notes: Option<String>,
}

pub async fn confirm_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ConfirmRequest>,
) -> Result<Json<AdminBookingResponse>, AppError> {
    let booking = {
        let mut db = state.db.lock().unwrap();
        let caller = authenticate(&headers, &db)?;
        bookings::confirm_booking(&mut db, &caller, &id, body.driver_id, body.admin_notes)?
    };

    notifications::dispatch(
        Arc::clone(&state),
        NotificationKind::BookingStatusChanged,
        booking.id.clone(),
    );
    broadcast_change(&state, &booking);

    Ok(Json(booking.into()))
}

// POST /api/admin/bookings/:id/reject
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectRequest {
    pub admin_notes: Option<String>,
}

pub async fn reject_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<RejectRequest>,
) -> Result<Json<AdminBookingResponse>, AppError> {
    let booking = {
        let db = state.db.lock().unwrap();
        let caller = authenticate(&headers, &db)?;
        bookings::reject_booking(&db, &caller, &id, body.admin_notes)?
    };

    notifications::dispatch(
        Arc::clone(&state),
        NotificationKind::BookingStatusChanged,
        booking.id.clone(),
    );
    broadcast_change(&state, &booking);

    Ok(Json(booking.into()))
}

// POST /api/admin/bookings/:id/complete
pub async fn complete_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<AdminBookingResponse>, AppError> {
    let booking = {
        let db = state.db.lock().unwrap();
        let caller = authenticate(&headers, &db)?;
        bookings::complete_booking(&db, &caller, &id)?
    };

    broadcast_change(&state, &booking);

    Ok(Json(booking.into()))
}

// POST /api/admin/bookings/:id/driver
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignDriverRequest {
    pub driver_id: String,
}

pub async fn assign_driver(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<AssignDriverRequest>,
) -> Result<Json<AdminBookingResponse>, AppError> {
    let booking = {
        let mut db = state.db.lock().unwrap();
        let caller = authenticate(&headers, &db)?;
        bookings::assign_driver(&mut db, &caller, &id, &body.driver_id)?
    };

    broadcast_change(&state, &booking);

    Ok(Json(booking.into()))
}

// GET /api/admin/drivers
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverResponse {
    pub id: String,
    pub name: String,
    pub vehicle_type: Transport,
    pub rate: f64,
    pub rate_unit: RateUnit,
    pub license_no: Option<String>,
    pub years_experience: Option<i64>,
}

impl From<Driver> for DriverResponse {
    fn from(d: Driver) -> Self {
        DriverResponse {
            id: d.id,
            name: d.name,
            vehicle_type: d.vehicle_type,
            rate: d.rate,
            rate_unit: d.rate_unit,
            license_no: d.license_no,
            years_experience: d.years_experience,
        }
    }
}

pub async fn list_drivers(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<DriverResponse>>, AppError> {
    let drivers = {
        let db = state.db.lock().unwrap();
        let caller = authenticate(&headers, &db)?;
        if !caller.is_admin {
            return Err(AppError::Forbidden);
        }
        queries::list_drivers(&db)?
    };

    Ok(Json(drivers.into_iter().map(Into::into).collect()))
}
