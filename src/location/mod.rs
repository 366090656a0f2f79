pub mod boundaries;
pub mod enricher;
pub mod geocoder;

use serde::{Deserialize, Serialize};

/// Resolved administrative location for a hotspot. `city` mirrors
/// `municipality` for older dashboard clients and is never empty:
/// unresolvable records carry the literal "N/A".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub municipality: String,
    #[serde(rename = "regionalCommand")]
    pub regional_command: String,
    pub city: String,
}

impl Location {
    pub fn new(municipality: impl Into<String>, regional_command: impl Into<String>) -> Self {
        let municipality = municipality.into();
        Self {
            city: municipality.clone(),
            municipality,
            regional_command: regional_command.into(),
        }
    }
}
