use serde::{Deserialize, Serialize};

/// Optional side-destination a user can attach to a booking: a place to
/// eat or a pasalubong (souvenir) center.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TourStop {
    pub id: String,
    pub category: StopCategory,
    pub name: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub contact_phone: Option<String>,
    pub image_urls: Vec<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopCategory {
    PlacesToEat,
    PasalubongCenter,
}

impl StopCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopCategory::PlacesToEat => "places_to_eat",
            StopCategory::PasalubongCenter => "pasalubong_center",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "places_to_eat" => Some(StopCategory::PlacesToEat),
            "pasalubong_center" => Some(StopCategory::PasalubongCenter),
            _ => None,
        }
    }
}
