use anyhow::Context;
use async_trait::async_trait;

use super::NotificationProvider;
use crate::models::{Booking, Profile};

/// Transactional email via the Resend HTTP API.
pub struct ResendEmailProvider {
    api_key: String,
    from_email: String,
    admin_email: String,
    site_url: String,
    client: reqwest::Client,
}

impl ResendEmailProvider {
    pub fn new(api_key: String, from_email: String, admin_email: String, site_url: String) -> Self {
        Self {
            api_key,
            from_email,
            admin_email,
            site_url,
            client: reqwest::Client::new(),
        }
    }

    async fn send(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()> {
        self.client
            .post("https://api.resend.com/emails")
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "from": self.from_email,
                "to": to,
                "subject": subject,
                "html": html,
            }))
            .send()
            .await
            .context("failed to reach Resend")?
            .error_for_status()
            .context("Resend API returned error")?;
        Ok(())
    }
}

#[async_trait]
impl NotificationProvider for ResendEmailProvider {
    async fn booking_created(&self, booking: &Booking, owner: &Profile) -> anyhow::Result<()> {
        let subject = format!("New booking request: {}", booking.service_name);
        let html = format!(
            "<p>{} requested <strong>{}</strong> with {} on {} at {}.</p>\
             <p><a href=\"{}/admin/bookings\">Review the request</a></p>",
            owner.email,
            booking.service_name,
            booking.instructor_name,
            booking.date_iso,
            booking.time_label,
            self.site_url,
        );
        self.send(&self.admin_email, &subject, &html).await
    }

    async fn booking_status_changed(
        &self,
        booking: &Booking,
        owner: &Profile,
    ) -> anyhow::Result<()> {
        let display = booking.status.display();
        let subject = format!("Your booking is {}", display.label.to_lowercase());
        let html = format!(
            "<p>{}</p>\
             <p><strong>{}</strong> with {} on {} at {}.</p>\
             <p><a href=\"{}/bookings/{}\">View your booking</a></p>",
            display.message,
            booking.service_name,
            booking.instructor_name,
            booking.date_iso,
            booking.time_label,
            self.site_url,
            booking.id,
        );
        self.send(&owner.email, &subject, &html).await
    }
}
