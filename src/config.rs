use serde::{Deserialize, Serialize};
use std::env;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub firms_map_key: String,
    pub firms_base_url: String,
    pub firms_sources: Vec<String>,
    pub firms_area: String,
    pub geocode_base_url: String,
    pub geocode_api_key: String,
    pub boundaries_path: String,
    pub cache_ttl_secs: u64,
    pub max_all_records: usize,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Config {
            firms_map_key: env::var("FIRMS_MAP_KEY")
                .map_err(|_| anyhow::anyhow!("FIRMS_MAP_KEY not set"))?,
            firms_base_url: env::var("FIRMS_BASE_URL")
                .unwrap_or_else(|_| "https://firms.modaps.eosdis.nasa.gov".to_string()),
            firms_sources: env::var("FIRMS_SOURCES")
                .unwrap_or_else(|_| "VIIRS_SNPP_NRT,VIIRS_NOAA20_NRT".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            // west,south,east,north bounding box for Rio Grande do Sul
            firms_area: env::var("FIRMS_AREA")
                .unwrap_or_else(|_| "-57.7,-33.8,-49.7,-27.0".to_string()),
            geocode_base_url: env::var("GEOCODE_BASE_URL")
                .unwrap_or_else(|_| "https://geocode.maps.co".to_string()),
            geocode_api_key: env::var("GEOCODE_API_KEY").unwrap_or_default(),
            boundaries_path: env::var("BOUNDARIES_PATH")
                .unwrap_or_else(|_| "data/municipios_rs.geojson".to_string()),
            cache_ttl_secs: env::var("CACHE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(600),
            max_all_records: env::var("MAX_ALL_RECORDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10_000),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
        })
    }
}
