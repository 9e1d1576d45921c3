pub mod resend;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::db::queries;
use crate::models::{Booking, Profile};
use crate::state::AppState;

/// Outbound transactional notifications. Best-effort side channel: the
/// booking workflow never awaits or observes delivery.
#[async_trait]
pub trait NotificationProvider: Send + Sync {
    /// New booking request, addressed to the operator.
    async fn booking_created(&self, booking: &Booking, owner: &Profile) -> anyhow::Result<()>;

    /// Status change, addressed to the requesting user.
    async fn booking_status_changed(&self, booking: &Booking, owner: &Profile)
        -> anyhow::Result<()>;
}

/// Fallback provider that only logs. Used when no email credentials are
/// configured, and handy in development.
pub struct LogNotifier;

#[async_trait]
impl NotificationProvider for LogNotifier {
    async fn booking_created(&self, booking: &Booking, owner: &Profile) -> anyhow::Result<()> {
        tracing::info!(
            booking_id = %booking.id,
            owner = %owner.email,
            "notification: booking created"
        );
        Ok(())
    }

    async fn booking_status_changed(
        &self,
        booking: &Booking,
        owner: &Profile,
    ) -> anyhow::Result<()> {
        tracing::info!(
            booking_id = %booking.id,
            owner = %owner.email,
            status = booking.status.as_str(),
            "notification: booking status changed"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum NotificationKind {
    BookingCreated,
    BookingStatusChanged,
}

const MAX_ATTEMPTS: u32 = 3;

/// Fire-and-forget dispatch. Spawns a task that re-loads the booking and
/// its owner, then attempts delivery with linear backoff. Failures are
/// logged and swallowed; they never surface to the booking workflow.
pub fn dispatch(state: Arc<AppState>, kind: NotificationKind, booking_id: String) {
    tokio::spawn(async move {
        for attempt in 1..=MAX_ATTEMPTS {
            let loaded = {
                let db = state.db.lock().unwrap();
                queries::get_booking_by_id(&db, &booking_id).and_then(|b| match b {
                    Some(booking) => {
                        let owner = queries::get_profile(&db, &booking.user_id)?;
                        Ok(owner.map(|o| (booking, o)))
                    }
                    None => Ok(None),
                })
            };

            let (booking, owner) = match loaded {
                Ok(Some(pair)) => pair,
                Ok(None) => {
                    tracing::warn!(booking_id, "notification skipped: booking or owner missing");
                    return;
                }
                Err(e) => {
                    tracing::warn!(booking_id, error = %e, "notification skipped: load failed");
                    return;
                }
            };

            let result = match kind {
                NotificationKind::BookingCreated => {
                    state.notifier.booking_created(&booking, &owner).await
                }
                NotificationKind::BookingStatusChanged => {
                    state.notifier.booking_status_changed(&booking, &owner).await
                }
            };

            match result {
                Ok(()) => return,
                Err(e) if attempt < MAX_ATTEMPTS => {
                    tracing::warn!(
                        booking_id,
                        attempt,
                        error = %e,
                        "notification delivery failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_secs(2 * attempt as u64)).await;
                }
                Err(e) => {
                    tracing::warn!(
                        booking_id,
                        error = %e,
                        "notification delivery failed, giving up"
                    );
                }
            }
        }
    });
}
