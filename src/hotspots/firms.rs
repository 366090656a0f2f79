use std::time::Duration;

use reqwest::Client;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::time::sleep;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("hotspot request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("rate limited by upstream, gave up after {0} retries")]
    RateLimited(u32),
    #[error("upstream returned HTTP {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("upstream fetch was interrupted before completing")]
    Interrupted,
}

/// Source of raw hotspot payloads. The orchestrator only sees this
/// trait; tests substitute an in-memory provider.
#[allow(async_fn_in_trait)]
pub trait HotspotProvider {
    async fn fetch_area(
        &self,
        source: &str,
        day_range: u32,
        date: &str,
    ) -> Result<Value, ProviderError>;
}

/// NASA FIRMS area-API client. The API serves CSV only; rows are
/// converted to a JSON array so the cache and the format router work
/// on one payload shape.
pub struct FirmsClient {
    client: Client,
    base_url: String,
    map_key: String,
    area: String,
}

impl FirmsClient {
    pub fn new(base_url: String, map_key: String, area: String) -> Self {
        let client = Client::builder()
            .user_agent("queimadas-server/0.1")
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to create HTTP client");

        Self {
            client,
            base_url,
            map_key,
            area,
        }
    }

    async fn get_with_retry(&self, url: &str) -> Result<String, ProviderError> {
        let mut retry_count = 0;
        let max_retries = 3;
        let mut delay = Duration::from_millis(1000);

        loop {
            let response = self.client.get(url).send().await?;

            match response.status() {
                reqwest::StatusCode::OK => return Ok(response.text().await?),
                reqwest::StatusCode::TOO_MANY_REQUESTS => {
                    if retry_count >= max_retries {
                        return Err(ProviderError::RateLimited(max_retries));
                    }

                    tracing::warn!("rate limited by FIRMS, retrying in {}ms", delay.as_millis());
                    sleep(delay).await;
                    delay = delay.mul_f32(2.0 + fastrand::f32() * 0.5);
                    retry_count += 1;
                }
                status => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(ProviderError::Api { status, body });
                }
            }
        }
    }
}

impl HotspotProvider for FirmsClient {
    async fn fetch_area(
        &self,
        source: &str,
        day_range: u32,
        date: &str,
    ) -> Result<Value, ProviderError> {
        // [BASE]/api/area/csv/[MAP_KEY]/[SOURCE]/[AREA]/[DAY_RANGE]/[DATE]
        let url = format!(
            "{}/api/area/csv/{}/{}/{}/{}/{}",
            self.base_url, self.map_key, source, self.area, day_range, date
        );

        let body = self.get_with_retry(&url).await?;
        Ok(csv_to_rows(&body))
    }
}

/// Convert a FIRMS CSV body into a JSON array of row objects keyed by
/// the header line. All values stay strings; the format router parses
/// numerics.
fn csv_to_rows(body: &str) -> Value {
    let mut lines = body.lines().filter(|line| !line.trim().is_empty());
    let headers: Vec<&str> = match lines.next() {
        Some(header) => header.trim().split(',').map(str::trim).collect(),
        None => return Value::Array(Vec::new()),
    };

    let rows: Vec<Value> = lines
        .map(|line| {
            let mut object = Map::new();
            for (header, field) in headers.iter().zip(line.trim().split(',')) {
                object.insert(
                    header.to_string(),
                    Value::String(field.trim().to_string()),
                );
            }
            Value::Object(object)
        })
        .collect();

    Value::Array(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_to_rows_maps_header_to_fields() {
        let body = "latitude,longitude,acq_date,acq_time,satellite\n\
                    -29.71,-51.13,2024-06-06,36,N20\n\
                    -30.02,-52.40,2024-06-06,1230,N21\n";

        let rows = csv_to_rows(body);
        let rows = rows.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["latitude"], "-29.71");
        assert_eq!(rows[1]["satellite"], "N21");
    }

    #[test]
    fn test_csv_header_only_yields_empty_array() {
        let rows = csv_to_rows("latitude,longitude\n");
        assert!(rows.as_array().unwrap().is_empty());
    }

    #[test]
    fn test_csv_empty_body_yields_empty_array() {
        let rows = csv_to_rows("");
        assert!(rows.as_array().unwrap().is_empty());
    }

    #[test]
    fn test_csv_short_row_keeps_matched_columns() {
        let rows = csv_to_rows("a,b,c\n1,2\n");
        let row = &rows.as_array().unwrap()[0];
        assert_eq!(row["a"], "1");
        assert_eq!(row["b"], "2");
        assert!(row.get("c").is_none());
    }
}
