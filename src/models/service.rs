use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
}
