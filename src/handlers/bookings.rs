use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::errors::AppError;
use crate::models::{Booking, DriverAssignment, StatusDisplay, Transport};
use crate::services::bookings::{self, CreateBookingInput};
use crate::services::notifications::{self, NotificationKind};
use crate::state::{AppState, BookingChange};

use super::authenticate;

/// Caller-facing booking shape. Field names match what the booking pages
/// consume.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    pub id: String,
    pub created_at: String,
    pub status: &'static str,
    pub status_display: StatusDisplay,

    pub service_id: String,
    pub service_name: String,

    pub instructor_id: String,
    pub instructor_name: String,

    #[serde(rename = "dateISO")]
    pub date_iso: String,
    pub time_label: String,

    pub transport: Option<Transport>,
    pub pickup_notes: Option<String>,

    pub driver: DriverAssignment,
    pub driver_id: Option<String>,

    pub places_to_eat_stop_id: Option<String>,
    pub pasalubong_stop_id: Option<String>,

    pub final_workshop_rate: Option<f64>,
    pub final_materials_fee: Option<f64>,
    pub final_transport_rate: Option<f64>,
    pub final_total: Option<f64>,
    pub pricing_locked_at: Option<String>,

    pub admin_notes: Option<String>,
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        BookingResponse {
            id: b.id,
            created_at: b.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            status: b.status.as_str(),
            status_display: b.status.display(),
            service_id: b.service_id,
            service_name: b.service_name,
            instructor_id: b.instructor_id,
            instructor_name: b.instructor_name,
            date_iso: b.date_iso.format("%Y-%m-%d").to_string(),
            time_label: b.time_label,
            transport: b.transport,
            pickup_notes: b.pickup_notes,
            driver: b.driver,
            driver_id: b.driver_id,
            places_to_eat_stop_id: b.places_to_eat_stop_id,
            pasalubong_stop_id: b.pasalubong_stop_id,
            final_workshop_rate: b.pricing.map(|p| p.workshop_rate),
            final_materials_fee: b.pricing.map(|p| p.materials_fee),
            final_transport_rate: b.pricing.map(|p| p.transport_rate),
            final_total: b.pricing.map(|p| p.total),
            pricing_locked_at: b
                .pricing
                .map(|p| p.locked_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            admin_notes: b.admin_notes,
        }
    }
}

pub(super) fn broadcast_change(state: &AppState, booking: &Booking) {
    let _ = state.booking_events.send(BookingChange {
        booking_id: booking.id.clone(),
        user_id: booking.user_id.clone(),
        status: booking.status,
    });
}

// POST /api/bookings
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub service_slug: String,
    pub instructor_id: String,
    #[serde(rename = "dateISO")]
    pub date_iso: String,
    pub time_label: String,
    pub transport: Option<Transport>,
    pub pickup_notes: Option<String>,
    pub places_to_eat_stop_id: Option<String>,
    pub pasalubong_stop_id: Option<String>,
}

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    let booking = {
        let db = state.db.lock().unwrap();
        let caller = authenticate(&headers, &db)?;
        bookings::create_booking(
            &db,
            &caller,
            CreateBookingInput {
                service_slug: body.service_slug,
                instructor_id: body.instructor_id,
                date_iso: body.date_iso,
                time_label: body.time_label,
                transport: body.transport,
                pickup_notes: body.pickup_notes,
                places_to_eat_stop_id: body.places_to_eat_stop_id,
                pasalubong_stop_id: body.pasalubong_stop_id,
            },
        )?
    };

    notifications::dispatch(
        Arc::clone(&state),
        NotificationKind::BookingCreated,
        booking.id.clone(),
    );
    broadcast_change(&state, &booking);

    Ok((StatusCode::CREATED, Json(booking.into())))
}

// GET /api/bookings
pub async fn list_my_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    let bookings = {
        let db = state.db.lock().unwrap();
        let caller = authenticate(&headers, &db)?;
        bookings::list_my_bookings(&db, &caller)?
    };

    Ok(Json(bookings.into_iter().map(Into::into).collect()))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = {
        let db = state.db.lock().unwrap();
        let caller = authenticate(&headers, &db)?;
        bookings::get_booking(&db, &caller, &id)?
    };

    Ok(Json(booking.into()))
}

// POST /api/bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = {
        let db = state.db.lock().unwrap();
        let caller = authenticate(&headers, &db)?;
        bookings::cancel_booking(&db, &caller, &id)?
    };

    broadcast_change(&state, &booking);

    Ok(Json(booking.into()))
}

// GET /api/bookings/events
pub async fn events_stream(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let caller = {
        let db = state.db.lock().unwrap();
        authenticate(&headers, &db)?
    };

    let rx = state.booking_events.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(change) if change.visible_to(&caller) => Event::default()
            .json_data(change.payload_for(&caller))
            .ok()
            .map(Ok::<_, Infallible>),
        // Hidden events and lagged receivers just skip; the next visible
        // event catches them up.
        _ => None,
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}
