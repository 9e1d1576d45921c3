use std::sync::{Arc, Mutex};

use axum::routing::{get, post};
use axum::Router;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use kultoura::config::AppConfig;
use kultoura::db;
use kultoura::handlers;
use kultoura::services::notifications::resend::ResendEmailProvider;
use kultoura::services::notifications::{LogNotifier, NotificationProvider};
use kultoura::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let notifier: Box<dyn NotificationProvider> = match config.notifier_provider.as_str() {
        "resend" => {
            anyhow::ensure!(
                !config.resend_api_key.is_empty(),
                "RESEND_API_KEY must be set when NOTIFIER_PROVIDER=resend"
            );
            tracing::info!("using Resend email notifier (from: {})", config.from_email);
            Box::new(ResendEmailProvider::new(
                config.resend_api_key.clone(),
                config.from_email.clone(),
                config.admin_email.clone(),
                config.site_url.clone(),
            ))
        }
        _ => {
            tracing::info!("using log-only notifier");
            Box::new(LogNotifier)
        }
    };

    let (booking_events, _) = broadcast::channel(256);

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        notifier,
        booking_events,
    });

    let app = Router::new()
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
        .route(
            "/api/tour-stops/:id",
            get(handlers::catalog::get_tour_stop),
        )
        .route(
            "/api/bookings",
            post(handlers::bookings::create_booking).get(handlers::bookings::list_my_bookings),
        )
        .route("/api/bookings/events", get(handlers::bookings::events_stream))
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
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
