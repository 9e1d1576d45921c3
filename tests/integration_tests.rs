use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceExt;

use kultoura::db::{self, queries};
use kultoura::handlers;
use kultoura::models::{
    Booking, Caller, Driver, Instructor, Profile, RateUnit, Service, StopCategory, TourStop,
    Transport,
};
use kultoura::services::notifications::NotificationProvider;
use kultoura::state::AppState;

// ── Mock Notifier ──

#[derive(Clone)]
struct MockNotifier {
    created: Arc<Mutex<Vec<String>>>,
    status_changed: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl MockNotifier {
    fn new() -> Self {
        Self {
            created: Arc::new(Mutex::new(vec![])),
            status_changed: Arc::new(Mutex::new(vec![])),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl NotificationProvider for MockNotifier {
    async fn booking_created(&self, booking: &Booking, _owner: &Profile) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("mock delivery failure");
        }
        self.created.lock().unwrap().push(booking.id.clone());
        Ok(())
    }

    async fn booking_status_changed(
        &self,
        booking: &Booking,
        _owner: &Profile,
    ) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("mock delivery failure");
        }
        self.status_changed.lock().unwrap().push(booking.id.clone());
        Ok(())
    }
}

// ── Helpers ──

fn instructor(id: &str, name: &str, rate: Option<f64>, rate_min: Option<f64>, fee_min: Option<f64>) -> Instructor {
    Instructor {
        id: id.to_string(),
        name: name.to_string(),
        nickname: None,
        craft: Some("pottery".to_string()),
        rate,
        rate_min,
        rate_max: None,
        rate_notes: None,
        materials_fee_min: fee_min,
        materials_fee_max: None,
        bio: None,
    }
}

fn driver(id: &str, name: &str, vehicle: Transport, rate: f64) -> Driver {
    Driver {
        id: id.to_string(),
        name: name.to_string(),
        vehicle_type: vehicle,
        rate,
        rate_unit: RateUnit::PerTrip,
        license_no: None,
        years_experience: Some(5),
    }
}

fn tour_stop(id: &str, category: StopCategory, name: &str, active: bool) -> TourStop {
    TourStop {
        id: id.to_string(),
        category,
        name: name.to_string(),
        description: None,
        address: None,
        contact_phone: None,
        image_urls: vec![],
        is_active: active,
    }
}

fn seed(conn: &rusqlite::Connection) {
    let users = [
        ("u-ana", "ana@test.local", false, "ana-token"),
        ("u-ben", "ben@test.local", false, "ben-token"),
        ("u-admin", "admin@test.local", true, "admin-token"),
    ];
    for (id, email, is_admin, token) in users {
        queries::upsert_profile(
            conn,
            &Profile {
                id: id.to_string(),
                email: email.to_string(),
                full_name: None,
                is_admin,
            },
            Some(token),
        )
        .unwrap();
    }

    queries::insert_service(
        conn,
        &Service {
            id: "svc-pottery".to_string(),
            slug: "pottery".to_string(),
            name: "Pottery".to_string(),
            description: None,
        },
    )
    .unwrap();

    queries::insert_instructor(conn, &instructor("inst-jane", "Jane Doe", Some(500.0), None, Some(100.0))).unwrap();
    queries::insert_instructor(conn, &instructor("inst-rosa", "Rosa Cruz", None, Some(300.0), None)).unwrap();
    queries::insert_instructor(conn, &instructor("inst-unlinked", "Leo Reyes", Some(400.0), None, None)).unwrap();
    queries::link_service_instructor(conn, "svc-pottery", "inst-jane").unwrap();
    queries::link_service_instructor(conn, "svc-pottery", "inst-rosa").unwrap();

    queries::insert_driver(conn, &driver("drv-van", "Mang Ben", Transport::Van, 150.0)).unwrap();
    queries::insert_driver(conn, &driver("drv-van2", "Ka Nilo", Transport::Van, 200.0)).unwrap();
    queries::insert_driver(conn, &driver("drv-trike", "Totoy", Transport::Tricycle, 80.0)).unwrap();

    queries::insert_tour_stop(conn, &tour_stop("stop-eat", StopCategory::PlacesToEat, "Carinderia ni Aling Nena", true)).unwrap();
    queries::insert_tour_stop(conn, &tour_stop("stop-pasalubong", StopCategory::PasalubongCenter, "Pasalubong Plaza", true)).unwrap();
    queries::insert_tour_stop(conn, &tour_stop("stop-closed", StopCategory::PlacesToEat, "Closed Kitchen", false)).unwrap();
}

fn test_state_with(notifier: MockNotifier) -> Arc<AppState> {
    let conn = db::init_db(":memory:").unwrap();
    seed(&conn);
    let (booking_events, _) = tokio::sync::broadcast::channel(64);
    Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        notifier: Box::new(notifier),
        booking_events,
    })
}

fn test_state() -> Arc<AppState> {
    test_state_with(MockNotifier::new())
}

fn test_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/services", get(handlers::catalog::list_services))
        .route(
            "/api/services/:slug/instructors",
            get(handlers::catalog::list_service_instructors),
        )
        .route(
            "/api/instructors/:id",
            get(handlers::catalog::get_instructor),
        )
        .route("/api/tour-stops", get(handlers::catalog::list_tour_stops))
        .route("/api/tour-stops/:id", get(handlers::catalog::get_tour_stop))
        .route(
            "/api/bookings",
            post(handlers::bookings::create_booking).get(handlers::bookings::list_my_bookings),
        )
        .route(
            "/api/bookings/events",
            get(handlers::bookings::events_stream),
        )
        .route("/api/bookings/:id", get(handlers::bookings::get_booking))
        .route(
            "/api/bookings/:id/cancel",
            post(handlers::bookings::cancel_booking),
        )
        .route("/api/admin/bookings", get(handlers::admin::list_bookings))
        .route(
            "/api/admin/bookings/:id/confirm",
            post(handlers::admin::confirm_booking),
        )
        .route(
            "/api/admin/bookings/:id/reject",
            post(handlers::admin::reject_booking),
        )
        .route(
            "/api/admin/bookings/:id/complete",
            post(handlers::admin::complete_booking),
        )
        .route(
            "/api/admin/bookings/:id/driver",
            post(handlers::admin::assign_driver),
        )
        .route("/api/admin/drivers", get(handlers::admin::list_drivers))
        .with_state(state)
}

async fn request(
    state: &Arc<AppState>,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let req = match body {
        Some(json) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let res = test_app(Arc::clone(state)).oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn create_body(instructor_id: &str, transport: Option<&str>) -> serde_json::Value {
    let mut body = serde_json::json!({
        "serviceSlug": "pottery",
        "instructorId": instructor_id,
        "dateISO": "2026-09-10",
        "timeLabel": "09:00 AM",
    });
    if let Some(t) = transport {
        body["transport"] = serde_json::json!(t);
        body["pickupNotes"] = serde_json::json!("Hotel lobby, 8:30");
    }
    body
}

/// Create a booking as the given user and return its JSON.
async fn create_booking(
    state: &Arc<AppState>,
    token: &str,
    instructor_id: &str,
    transport: Option<&str>,
) -> serde_json::Value {
    let (status, json) = request(
        state,
        "POST",
        "/api/bookings",
        Some(token),
        Some(create_body(instructor_id, transport)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {json}");
    json
}

// ── Creation ──

#[tokio::test]
async fn test_create_requires_auth() {
    let state = test_state();
    let (status, _) = request(
        &state,
        "POST",
        "/api/bookings",
        None,
        Some(create_body("inst-jane", None)),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_rejects_invalid_pairing() {
    let state = test_state();
    let (status, json) = request(
        &state,
        "POST",
        "/api/bookings",
        Some("ana-token"),
        Some(create_body("inst-unlinked", None)),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"]
        .as_str()
        .unwrap()
        .contains("not available for this service"));
}

#[tokio::test]
async fn test_create_rejects_unknown_time_slot() {
    let state = test_state();
    let mut body = create_body("inst-jane", None);
    body["timeLabel"] = serde_json::json!("10:30 AM");
    let (status, _) = request(&state, "POST", "/api/bookings", Some("ana-token"), Some(body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_create_rejects_malformed_date() {
    let state = test_state();
    let mut body = create_body("inst-jane", None);
    body["dateISO"] = serde_json::json!("10/09/2026");
    let (status, _) = request(&state, "POST", "/api/bookings", Some("ana-token"), Some(body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_create_rejects_wrong_category_stop() {
    let state = test_state();
    let mut body = create_body("inst-jane", Some("van"));
    body["placesToEatStopId"] = serde_json::json!("stop-pasalubong");
    let (status, _) = request(&state, "POST", "/api/bookings", Some("ana-token"), Some(body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_create_rejects_inactive_stop() {
    let state = test_state();
    let mut body = create_body("inst-jane", Some("van"));
    body["placesToEatStopId"] = serde_json::json!("stop-closed");
    let (status, _) = request(&state, "POST", "/api/bookings", Some("ana-token"), Some(body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_create_pending_booking_with_transport() {
    let state = test_state();
    let mut body = create_body("inst-jane", Some("van"));
    body["placesToEatStopId"] = serde_json::json!("stop-eat");
    body["pasalubongStopId"] = serde_json::json!("stop-pasalubong");

    let (status, json) = request(&state, "POST", "/api/bookings", Some("ana-token"), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["status"], "pending");
    assert_eq!(json["serviceName"], "Pottery");
    assert_eq!(json["instructorName"], "Jane Doe");
    assert_eq!(json["transport"], "van");
    assert_eq!(json["driver"], "to_be_assigned");
    assert_eq!(json["placesToEatStopId"], "stop-eat");
    // pending implies no pricing lock
    assert_eq!(json["pricingLockedAt"], serde_json::Value::Null);
    assert_eq!(json["finalTotal"], serde_json::Value::Null);
}

#[tokio::test]
async fn test_create_without_transport_has_no_driver_slot() {
    let state = test_state();
    let booking = create_booking(&state, "ana-token", "inst-jane", None).await;
    assert_eq!(booking["driver"], "not_included");
    assert_eq!(booking["transport"], serde_json::Value::Null);
}

#[tokio::test]
async fn test_create_fires_booking_created_notification() {
    let notifier = MockNotifier::new();
    let state = test_state_with(notifier.clone());

    let booking = create_booking(&state, "ana-token", "inst-jane", None).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    let created = notifier.created.lock().unwrap();
    assert_eq!(*created, [booking["id"].as_str().unwrap()]);
}

#[tokio::test]
async fn test_notification_failure_does_not_fail_creation() {
    let state = test_state_with(MockNotifier::failing());
    let (status, _) = request(
        &state,
        "POST",
        "/api/bookings",
        Some("ana-token"),
        Some(create_body("inst-jane", None)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

// ── Confirmation & pricing lock ──

#[tokio::test]
async fn test_scenario_a_confirm_without_driver() {
    let notifier = MockNotifier::new();
    let state = test_state_with(notifier.clone());
    let booking = create_booking(&state, "ana-token", "inst-jane", None).await;
    let id = booking["id"].as_str().unwrap();

    let (status, json) = request(
        &state,
        "POST",
        &format!("/api/admin/bookings/{id}/confirm"),
        Some("admin-token"),
        Some(serde_json::json!({})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "confirmed");
    assert_eq!(json["finalWorkshopRate"], serde_json::json!(500.0));
    assert_eq!(json["finalMaterialsFee"], serde_json::json!(100.0));
    assert_eq!(json["finalTransportRate"], serde_json::json!(0.0));
    assert_eq!(json["finalTotal"], serde_json::json!(600.0));
    assert!(json["pricingLockedAt"].is_string());
    assert!(json["confirmedAt"].is_string());
    assert_eq!(json["rejectedAt"], serde_json::Value::Null);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let changed = notifier.status_changed.lock().unwrap();
    assert_eq!(*changed, [id]);
}

#[tokio::test]
async fn test_scenario_b_rate_fallback_with_driver() {
    let state = test_state();
    let booking = create_booking(&state, "ana-token", "inst-rosa", Some("van")).await;
    let id = booking["id"].as_str().unwrap();

    let (status, json) = request(
        &state,
        "POST",
        &format!("/api/admin/bookings/{id}/confirm"),
        Some("admin-token"),
        Some(serde_json::json!({"driverId": "drv-van"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["finalWorkshopRate"], serde_json::json!(300.0));
    assert_eq!(json["finalMaterialsFee"], serde_json::json!(0.0));
    assert_eq!(json["finalTransportRate"], serde_json::json!(150.0));
    assert_eq!(json["finalTotal"], serde_json::json!(450.0));
    assert_eq!(json["driver"], "assigned");
    assert_eq!(json["driverId"], "drv-van");
}

#[tokio::test]
async fn test_scenario_c_driver_assignment_after_confirmation() {
    let state = test_state();
    let booking = create_booking(&state, "ana-token", "inst-jane", Some("van")).await;
    let id = booking["id"].as_str().unwrap();

    let (status, json) = request(
        &state,
        "POST",
        &format!("/api/admin/bookings/{id}/confirm"),
        Some("admin-token"),
        Some(serde_json::json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["finalTotal"], serde_json::json!(600.0));
    assert_eq!(json["driver"], "to_be_assigned");

    let (status, json) = request(
        &state,
        "POST",
        &format!("/api/admin/bookings/{id}/driver"),
        Some("admin-token"),
        Some(serde_json::json!({"driverId": "drv-van2"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["finalWorkshopRate"], serde_json::json!(500.0));
    assert_eq!(json["finalMaterialsFee"], serde_json::json!(100.0));
    assert_eq!(json["finalTransportRate"], serde_json::json!(200.0));
    assert_eq!(json["finalTotal"], serde_json::json!(800.0));
    assert_eq!(json["driver"], "assigned");
}

#[tokio::test]
async fn test_reassignment_keeps_workshop_and_materials_frozen() {
    let state = test_state();
    let booking = create_booking(&state, "ana-token", "inst-jane", Some("van")).await;
    let id = booking["id"].as_str().unwrap();

    request(
        &state,
        "POST",
        &format!("/api/admin/bookings/{id}/confirm"),
        Some("admin-token"),
        Some(serde_json::json!({"driverId": "drv-van"})),
    )
    .await;

    let (_, first) = request(
        &state,
        "POST",
        &format!("/api/admin/bookings/{id}/driver"),
        Some("admin-token"),
        Some(serde_json::json!({"driverId": "drv-van2"})),
    )
    .await;
    let (_, second) = request(
        &state,
        "POST",
        &format!("/api/admin/bookings/{id}/driver"),
        Some("admin-token"),
        Some(serde_json::json!({"driverId": "drv-van"})),
    )
    .await;

    assert_eq!(first["finalWorkshopRate"], serde_json::json!(500.0));
    assert_eq!(second["finalWorkshopRate"], serde_json::json!(500.0));
    assert_eq!(first["finalMaterialsFee"], serde_json::json!(100.0));
    assert_eq!(second["finalMaterialsFee"], serde_json::json!(100.0));
    assert_eq!(first["finalTransportRate"], serde_json::json!(200.0));
    assert_eq!(second["finalTransportRate"], serde_json::json!(150.0));
    assert_eq!(second["finalTotal"], serde_json::json!(750.0));
}

#[tokio::test]
async fn test_driver_vehicle_must_match_transport() {
    let state = test_state();
    let booking = create_booking(&state, "ana-token", "inst-jane", Some("van")).await;
    let id = booking["id"].as_str().unwrap();

    let (status, json) = request(
        &state,
        "POST",
        &format!("/api/admin/bookings/{id}/confirm"),
        Some("admin-token"),
        Some(serde_json::json!({"driverId": "drv-trike"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"].as_str().unwrap().contains("tricycle"));
}

#[tokio::test]
async fn test_driver_assignment_needs_transport() {
    let state = test_state();
    let booking = create_booking(&state, "ana-token", "inst-jane", None).await;
    let id = booking["id"].as_str().unwrap();

    request(
        &state,
        "POST",
        &format!("/api/admin/bookings/{id}/confirm"),
        Some("admin-token"),
        Some(serde_json::json!({})),
    )
    .await;

    let (status, _) = request(
        &state,
        "POST",
        &format!("/api/admin/bookings/{id}/driver"),
        Some("admin-token"),
        Some(serde_json::json!({"driverId": "drv-van"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_confirm_requires_admin() {
    let state = test_state();
    let booking = create_booking(&state, "ana-token", "inst-jane", None).await;
    let id = booking["id"].as_str().unwrap();

    let (status, _) = request(
        &state,
        "POST",
        &format!("/api/admin/bookings/{id}/confirm"),
        Some("ana-token"),
        Some(serde_json::json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// ── Reject / complete / cancel ──

#[tokio::test]
async fn test_reject_after_confirm_clears_confirmation() {
    let state = test_state();
    let booking = create_booking(&state, "ana-token", "inst-jane", Some("van")).await;
    let id = booking["id"].as_str().unwrap();

    request(
        &state,
        "POST",
        &format!("/api/admin/bookings/{id}/confirm"),
        Some("admin-token"),
        Some(serde_json::json!({"driverId": "drv-van"})),
    )
    .await;

    let (status, json) = request(
        &state,
        "POST",
        &format!("/api/admin/bookings/{id}/reject"),
        Some("admin-token"),
        Some(serde_json::json!({"adminNotes": "fully booked that day"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "rejected");
    assert!(json["rejectedAt"].is_string());
    assert_eq!(json["confirmedAt"], serde_json::Value::Null);
    assert_eq!(json["driver"], "to_be_assigned");
    assert_eq!(json["driverId"], serde_json::Value::Null);
    assert_eq!(json["adminNotes"], "fully booked that day");
}

#[tokio::test]
async fn test_reconfirm_after_reject_keeps_first_lock() {
    let state = test_state();
    let booking = create_booking(&state, "ana-token", "inst-jane", Some("van")).await;
    let id = booking["id"].as_str().unwrap();

    request(
        &state,
        "POST",
        &format!("/api/admin/bookings/{id}/confirm"),
        Some("admin-token"),
        Some(serde_json::json!({})),
    )
    .await;
    request(
        &state,
        "POST",
        &format!("/api/admin/bookings/{id}/reject"),
        Some("admin-token"),
        Some(serde_json::json!({})),
    )
    .await;

    let (status, json) = request(
        &state,
        "POST",
        &format!("/api/admin/bookings/{id}/confirm"),
        Some("admin-token"),
        Some(serde_json::json!({"driverId": "drv-van2"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["confirmedAt"].is_string());
    assert_eq!(json["rejectedAt"], serde_json::Value::Null);
    // workshop and materials stay frozen from the first lock
    assert_eq!(json["finalWorkshopRate"], serde_json::json!(500.0));
    assert_eq!(json["finalMaterialsFee"], serde_json::json!(100.0));
    assert_eq!(json["finalTransportRate"], serde_json::json!(200.0));
    assert_eq!(json["finalTotal"], serde_json::json!(800.0));
}

#[tokio::test]
async fn test_complete_only_from_confirmed() {
    let state = test_state();
    let booking = create_booking(&state, "ana-token", "inst-jane", None).await;
    let id = booking["id"].as_str().unwrap();

    let (status, _) = request(
        &state,
        "POST",
        &format!("/api/admin/bookings/{id}/complete"),
        Some("admin-token"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    request(
        &state,
        "POST",
        &format!("/api/admin/bookings/{id}/confirm"),
        Some("admin-token"),
        Some(serde_json::json!({})),
    )
    .await;

    let (status, json) = request(
        &state,
        "POST",
        &format!("/api/admin/bookings/{id}/complete"),
        Some("admin-token"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "completed");
    assert!(json["completedAt"].is_string());
}

#[tokio::test]
async fn test_cancel_pending_booking() {
    let state = test_state();
    let booking = create_booking(&state, "ana-token", "inst-jane", None).await;
    let id = booking["id"].as_str().unwrap();

    let (status, json) = request(
        &state,
        "POST",
        &format!("/api/bookings/{id}/cancel"),
        Some("ana-token"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "cancelled");
}

#[tokio::test]
async fn test_cancel_terminal_booking_is_rejected() {
    let state = test_state();
    let booking = create_booking(&state, "ana-token", "inst-jane", None).await;
    let id = booking["id"].as_str().unwrap();

    request(
        &state,
        "POST",
        &format!("/api/admin/bookings/{id}/confirm"),
        Some("admin-token"),
        Some(serde_json::json!({})),
    )
    .await;
    request(
        &state,
        "POST",
        &format!("/api/admin/bookings/{id}/complete"),
        Some("admin-token"),
        None,
    )
    .await;

    let (status, json) = request(
        &state,
        "POST",
        &format!("/api/bookings/{id}/cancel"),
        Some("ana-token"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"].as_str().unwrap().contains("completed"));
}

#[tokio::test]
async fn test_cancel_twice_is_rejected() {
    let state = test_state();
    let booking = create_booking(&state, "ana-token", "inst-jane", None).await;
    let id = booking["id"].as_str().unwrap();

    let (status, _) = request(
        &state,
        "POST",
        &format!("/api/bookings/{id}/cancel"),
        Some("ana-token"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = request(
        &state,
        "POST",
        &format!("/api/bookings/{id}/cancel"),
        Some("ana-token"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_scenario_d_confirm_cancelled_booking_fails() {
    let state = test_state();
    let booking = create_booking(&state, "ana-token", "inst-jane", None).await;
    let id = booking["id"].as_str().unwrap();

    request(
        &state,
        "POST",
        &format!("/api/bookings/{id}/cancel"),
        Some("ana-token"),
        None,
    )
    .await;

    let (status, json) = request(
        &state,
        "POST",
        &format!("/api/admin/bookings/{id}/confirm"),
        Some("admin-token"),
        Some(serde_json::json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"].as_str().unwrap().contains("cancelled"));
}

// ── Listing & access control ──

#[tokio::test]
async fn test_list_mine_is_scoped_to_owner() {
    let state = test_state();
    let ana_booking = create_booking(&state, "ana-token", "inst-jane", None).await;
    let ben_booking = create_booking(&state, "ben-token", "inst-rosa", None).await;

    let (status, json) = request(&state, "GET", "/api/bookings", Some("ana-token"), None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&ana_booking["id"].as_str().unwrap()));
    assert!(!ids.contains(&ben_booking["id"].as_str().unwrap()));
}

#[tokio::test]
async fn test_list_all_requires_admin() {
    let state = test_state();
    create_booking(&state, "ana-token", "inst-jane", None).await;

    let (status, _) = request(&state, "GET", "/api/admin/bookings", Some("ana-token"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) =
        request(&state, "GET", "/api/admin/bookings", Some("admin-token"), None).await;
    assert_eq!(status, StatusCode::OK);
    let bookings = json.as_array().unwrap();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0]["userId"], "u-ana");
}

#[tokio::test]
async fn test_get_booking_hidden_from_other_users() {
    let state = test_state();
    let booking = create_booking(&state, "ana-token", "inst-jane", None).await;
    let id = booking["id"].as_str().unwrap();

    let (status, _) = request(
        &state,
        "GET",
        &format!("/api/bookings/{id}"),
        Some("ben-token"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = request(
        &state,
        "GET",
        &format!("/api/bookings/{id}"),
        Some("admin-token"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_cancel_other_users_booking_is_hidden() {
    let state = test_state();
    let booking = create_booking(&state, "ana-token", "inst-jane", None).await;
    let id = booking["id"].as_str().unwrap();

    let (status, _) = request(
        &state,
        "POST",
        &format!("/api/bookings/{id}/cancel"),
        Some("ben-token"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Concurrency token ──

#[tokio::test]
async fn test_stale_version_write_misses() {
    let state = test_state();
    let booking = create_booking(&state, "ana-token", "inst-jane", None).await;
    let id = booking["id"].as_str().unwrap();

    let db = state.db.lock().unwrap();
    // first CAS at the current version succeeds, a replay at the stale
    // version touches no rows
    assert!(queries::apply_cancel(&db, id, 1).unwrap());
    assert!(!queries::apply_cancel(&db, id, 1).unwrap());

    let current = queries::get_booking_by_id(&db, id).unwrap().unwrap();
    assert_eq!(current.version, 2);
    assert!(current.cancelled_at.is_some());
}

#[tokio::test]
async fn test_corrupt_stored_timestamp_surfaces_error() {
    let state = test_state();
    let booking = create_booking(&state, "ana-token", "inst-jane", None).await;
    let id = booking["id"].as_str().unwrap();

    let db = state.db.lock().unwrap();
    db.execute(
        "UPDATE bookings SET created_at = 'not-a-timestamp' WHERE id = ?1",
        [id],
    )
    .unwrap();

    // corruption must not be masked by a fabricated timestamp
    assert!(queries::get_booking_by_id(&db, id).is_err());
}

#[tokio::test]
async fn test_transitions_broadcast_change_events() {
    let state = test_state();
    let mut rx = state.booking_events.subscribe();

    let booking = create_booking(&state, "ana-token", "inst-jane", None).await;
    let id = booking["id"].as_str().unwrap();

    let change = rx.try_recv().unwrap();
    assert_eq!(change.booking_id, id);

    request(
        &state,
        "POST",
        &format!("/api/admin/bookings/{id}/confirm"),
        Some("admin-token"),
        Some(serde_json::json!({})),
    )
    .await;

    let change = rx.try_recv().unwrap();
    assert_eq!(change.booking_id, id);
    assert_eq!(change.status.as_str(), "confirmed");
}

#[tokio::test]
async fn test_change_events_scoped_to_owner_or_admin() {
    let state = test_state();
    let mut rx = state.booking_events.subscribe();

    create_booking(&state, "ana-token", "inst-jane", None).await;
    let change = rx.try_recv().unwrap();

    let ana = Caller {
        user_id: "u-ana".to_string(),
        is_admin: false,
    };
    let ben = Caller {
        user_id: "u-ben".to_string(),
        is_admin: false,
    };
    let admin = Caller {
        user_id: "u-admin".to_string(),
        is_admin: true,
    };

    // another user's subscription never sees Ana's booking
    assert!(change.visible_to(&ana));
    assert!(!change.visible_to(&ben));
    assert!(change.visible_to(&admin));

    let owner_payload = change.payload_for(&ana);
    assert_eq!(owner_payload["bookingId"], change.booking_id.as_str());
    assert_eq!(owner_payload["status"], "pending");
    assert!(owner_payload.get("userId").is_none());

    let admin_payload = change.payload_for(&admin);
    assert_eq!(admin_payload["userId"], "u-ana");
}

// ── Catalog ──

#[tokio::test]
async fn test_catalog_instructors_for_service() {
    let state = test_state();
    let (status, json) = request(
        &state,
        "GET",
        "/api/services/pottery/instructors",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["Jane Doe", "Rosa Cruz"]);
}

#[tokio::test]
async fn test_catalog_tour_stops_filter_category_and_active() {
    let state = test_state();
    let (status, json) = request(
        &state,
        "GET",
        "/api/tour-stops?category=places_to_eat",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["stop-eat"]);

    let (status, _) = request(&state, "GET", "/api/tour-stops?category=bad", None, None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_admin_drivers_listing() {
    let state = test_state();
    let (status, _) = request(&state, "GET", "/api/admin/drivers", Some("ana-token"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) =
        request(&state, "GET", "/api/admin/drivers", Some("admin-token"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_health() {
    let state = test_state();
    let (status, json) = request(&state, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}
