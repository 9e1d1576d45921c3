pub mod bookings;
pub mod notifications;
pub mod pricing;
