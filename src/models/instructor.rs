use serde::{Deserialize, Serialize};

/// Catalog record for a workshop instructor. Read-only from the booking
/// workflow's perspective; the pricing lock reads rates but never writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instructor {
    pub id: String,
    pub name: String,
    pub nickname: Option<String>,
    pub craft: Option<String>,
    pub rate: Option<f64>,
    pub rate_min: Option<f64>,
    pub rate_max: Option<f64>,
    pub rate_notes: Option<String>,
    pub materials_fee_min: Option<f64>,
    pub materials_fee_max: Option<f64>,
    pub bio: Option<String>,
}

impl Instructor {
    pub fn display_name(&self) -> String {
        match &self.nickname {
            Some(nick) => format!("{nick} • {}", self.name),
            None => self.name.clone(),
        }
    }
}
