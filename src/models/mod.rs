pub mod booking;
pub mod driver;
pub mod instructor;
pub mod profile;
pub mod service;
pub mod tour_stop;

pub use booking::{
    is_valid_time_slot, Booking, BookingStatus, DriverAssignment, LockedPricing, StatusDisplay,
    Transport, TIME_SLOTS,
};
pub use driver::{Driver, RateUnit};
pub use instructor::Instructor;
pub use profile::{Caller, Profile};
pub use service::Service;
pub use tour_stop::{StopCategory, TourStop};
