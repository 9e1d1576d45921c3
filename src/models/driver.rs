use serde::{Deserialize, Serialize};

use super::booking::Transport;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: String,
    pub name: String,
    pub vehicle_type: Transport,
    pub rate: f64,
    pub rate_unit: RateUnit,
    pub license_no: Option<String>,
    pub years_experience: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RateUnit {
    PerTrip,
    PerHour,
    PerDay,
}

impl RateUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateUnit::PerTrip => "per_trip",
            RateUnit::PerHour => "per_hour",
            RateUnit::PerDay => "per_day",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "per_hour" => RateUnit::PerHour,
            "per_day" => RateUnit::PerDay,
            _ => RateUnit::PerTrip,
        }
    }
}
