pub mod firms;
pub mod format;
pub mod service;

use serde::{Deserialize, Serialize};

use crate::location::Location;

/// One thermal-anomaly detection, normalized from the upstream payload.
/// Field set follows the FIRMS VIIRS active-fire product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotspotRecord {
    pub latitude: f64,
    pub longitude: f64,
    pub acq_date: String,
    pub acq_time: String,
    pub satellite: String,
    pub instrument: String,
    pub confidence: String,
    pub frp: f64,
    pub bright_ti4: f64,
    pub bright_ti5: f64,
    pub daynight: String,
}

/// A hotspot with its resolved administrative location attached.
/// Never mutated after the enrichment pass creates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedHotspot {
    #[serde(flatten)]
    pub record: HotspotRecord,
    pub location: Location,
}
