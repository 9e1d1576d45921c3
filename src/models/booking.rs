use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Bookable time slots shown on the booking form. The label is stored
/// verbatim on the booking row.
pub const TIME_SLOTS: [&str; 5] = ["09:00 AM", "11:00 AM", "01:00 PM", "03:00 PM", "05:00 PM"];

pub fn is_valid_time_slot(label: &str) -> bool {
    TIME_SLOTS.contains(&label)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub user_id: String,
    pub status: BookingStatus,

    pub service_id: String,
    pub service_name: String,

    pub instructor_id: String,
    pub instructor_name: String,

    pub date_iso: NaiveDate,
    pub time_label: String,

    pub transport: Option<Transport>,
    pub pickup_notes: Option<String>,

    pub driver: DriverAssignment,
    pub driver_id: Option<String>,

    pub places_to_eat_stop_id: Option<String>,
    pub pasalubong_stop_id: Option<String>,

    pub admin_notes: Option<String>,
    pub pricing: Option<LockedPricing>,

    pub confirmed_at: Option<NaiveDateTime>,
    pub rejected_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub cancelled_at: Option<NaiveDateTime>,

    pub version: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    /// A non-null lock timestamp is the single source of truth for
    /// "pricing has been finalized."
    pub fn pricing_locked(&self) -> bool {
        self.pricing.is_some()
    }
}

/// Pricing snapshot frozen at confirmation. Workshop rate and materials
/// fee never change after the first lock; transport rate and total are
/// recomputed only by driver (re)assignment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LockedPricing {
    pub workshop_rate: f64,
    pub materials_fee: f64,
    pub transport_rate: f64,
    pub total: f64,
    pub locked_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Rejected,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "confirmed" => BookingStatus::Confirmed,
            "rejected" => BookingStatus::Rejected,
            "cancelled" => BookingStatus::Cancelled,
            "completed" => BookingStatus::Completed,
            _ => BookingStatus::Pending,
        }
    }

    /// Terminal statuses admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Rejected | BookingStatus::Cancelled | BookingStatus::Completed
        )
    }

    /// Only pending and confirmed bookings can be cancelled by their owner.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    /// Exhaustive display mapping. Adding a status forces an update here.
    pub fn display(&self) -> StatusDisplay {
        match self {
            BookingStatus::Pending => StatusDisplay {
                label: "Pending",
                tone: "warning",
                message: "Your request is waiting for confirmation.",
            },
            BookingStatus::Confirmed => StatusDisplay {
                label: "Confirmed",
                tone: "success",
                message: "Your booking is confirmed. See you there!",
            },
            BookingStatus::Rejected => StatusDisplay {
                label: "Rejected",
                tone: "danger",
                message: "Sorry, we couldn't accommodate this request.",
            },
            BookingStatus::Cancelled => StatusDisplay {
                label: "Cancelled",
                tone: "muted",
                message: "This booking was cancelled.",
            },
            BookingStatus::Completed => StatusDisplay {
                label: "Completed",
                tone: "muted",
                message: "Thanks for joining us! We hope you enjoyed it.",
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatusDisplay {
    pub label: &'static str,
    pub tone: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Jeepney,
    Tricycle,
    Van,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Jeepney => "jeepney",
            Transport::Tricycle => "tricycle",
            Transport::Van => "van",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "jeepney" => Some(Transport::Jeepney),
            "tricycle" => Some(Transport::Tricycle),
            "van" => Some(Transport::Van),
            _ => None,
        }
    }
}

/// Driver slot on a booking. `NotIncluded` when the booking has no
/// transport, `ToBeAssigned` until an admin picks a driver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriverAssignment {
    NotIncluded,
    ToBeAssigned,
    Assigned,
}

impl DriverAssignment {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverAssignment::NotIncluded => "not_included",
            DriverAssignment::ToBeAssigned => "to_be_assigned",
            DriverAssignment::Assigned => "assigned",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "assigned" => DriverAssignment::Assigned,
            "not_included" => DriverAssignment::NotIncluded,
            _ => DriverAssignment::ToBeAssigned,
        }
    }
}
