use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tokio::sync::broadcast;

use crate::models::{BookingStatus, Caller};
use crate::services::notifications::NotificationProvider;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub notifier: Box<dyn NotificationProvider>,
    pub booking_events: broadcast::Sender<BookingChange>,
}

/// Change event broadcast after every successful create or transition so
/// list views can refresh without polling. Carries the owner id so the
/// feed can be filtered per subscriber.
#[derive(Debug, Clone)]
pub struct BookingChange {
    pub booking_id: String,
    pub user_id: String,
    pub status: BookingStatus,
}

impl BookingChange {
    /// Owners see changes to their own bookings; admins see all of them.
    pub fn visible_to(&self, caller: &Caller) -> bool {
        caller.is_admin || self.user_id == caller.user_id
    }

    /// Wire payload for the change feed. The owner id rides along only
    /// for admin subscribers.
    pub fn payload_for(&self, caller: &Caller) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "bookingId": self.booking_id,
            "status": self.status,
        });
        if caller.is_admin {
            payload["userId"] = serde_json::json!(self.user_id);
        }
        payload
    }
}
