use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub notifier_provider: String,
    pub resend_api_key: String,
    pub from_email: String,
    pub admin_email: String,
    pub site_url: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "kultoura.db".to_string()),
            notifier_provider: env::var("NOTIFIER_PROVIDER").unwrap_or_else(|_| "log".to_string()),
            resend_api_key: env::var("RESEND_API_KEY").unwrap_or_default(),
            from_email: env::var("FROM_EMAIL")
                .unwrap_or_else(|_| "bookings@kultoura.example".to_string()),
            admin_email: env::var("ADMIN_EMAIL")
                .unwrap_or_else(|_| "admin@kultoura.example".to_string()),
            site_url: env::var("SITE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string()),
        }
    }
}
