use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Location;

#[derive(Error, Debug)]
pub enum GeocodeError {
    #[error("reverse geocoding request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("reverse geocoding service returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("reverse geocoding returned {got} results for {want} coordinates")]
    LengthMismatch { want: usize, got: usize },
}

/// Fallback resolution through a rate-limited third party. One batched
/// call per enrichment request; failures are not retried here.
#[allow(async_fn_in_trait)]
pub trait ReverseGeocode {
    async fn reverse_batch(&self, points: &[(f64, f64)]) -> Result<Vec<Location>, GeocodeError>;
}

pub struct ReverseGeocoder {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct BatchRequest {
    coordinates: Vec<Coordinate>,
}

#[derive(Serialize)]
struct Coordinate {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct BatchResponse {
    results: Vec<BatchResult>,
}

#[derive(Deserialize, Default)]
struct BatchResult {
    #[serde(default)]
    municipality: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    town: Option<String>,
    #[serde(default)]
    village: Option<String>,
    #[serde(default)]
    county: Option<String>,
}

impl ReverseGeocoder {
    pub fn new(base_url: String, api_key: String) -> Self {
        let client = Client::builder()
            .user_agent("queimadas-server/0.1")
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to create HTTP client");

        Self {
            client,
            base_url,
            api_key,
        }
    }
}

impl ReverseGeocode for ReverseGeocoder {
    async fn reverse_batch(&self, points: &[(f64, f64)]) -> Result<Vec<Location>, GeocodeError> {
        let body = BatchRequest {
            coordinates: points
                .iter()
                .map(|&(latitude, longitude)| Coordinate {
                    latitude,
                    longitude,
                })
                .collect(),
        };

        let url = format!("{}/reverse/batch", self.base_url);
        let response = self
            .client
            .post(&url)
            .query(&[("key", &self.api_key)])
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GeocodeError::Status(response.status()));
        }

        let parsed: BatchResponse = response.json().await?;
        if parsed.results.len() != points.len() {
            return Err(GeocodeError::LengthMismatch {
                want: points.len(),
                got: parsed.results.len(),
            });
        }

        // Results come back index-aligned with the submitted coordinates.
        Ok(parsed.results.iter().map(to_location).collect())
    }
}

fn to_location(result: &BatchResult) -> Location {
    let name = result
        .municipality
        .as_deref()
        .or(result.city.as_deref())
        .or(result.town.as_deref())
        .or(result.village.as_deref())
        .or(result.county.as_deref())
        .unwrap_or("N/A");
    // The third party knows nothing about regional commands.
    Location::new(name, "N/A")
}
