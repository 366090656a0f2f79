use std::sync::Arc;

use super::boundaries::BoundarySet;
use super::geocoder::{GeocodeError, ReverseGeocode};
use super::Location;
use crate::hotspots::{EnrichedHotspot, HotspotRecord};

/// Outcome of the local point-in-polygon pass. Incomplete is an
/// expected condition, not an error: it routes the batch to the
/// fallback geocoder.
enum PrimaryPass {
    Complete(Vec<EnrichedHotspot>),
    Incomplete,
}

/// Two-tier enrichment: local boundary matching first, the rate-limited
/// third-party geocoder only when the local pass cannot resolve every
/// record (or the boundary dataset never loaded).
pub struct LocationEnricher<G> {
    boundaries: Option<Arc<BoundarySet>>,
    geocoder: G,
}

impl<G: ReverseGeocode> LocationEnricher<G> {
    pub fn new(boundaries: Option<Arc<BoundarySet>>, geocoder: G) -> Self {
        Self {
            boundaries,
            geocoder,
        }
    }

    pub async fn enrich(
        &self,
        records: Vec<HotspotRecord>,
    ) -> Result<Vec<EnrichedHotspot>, GeocodeError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        match self.primary_pass(&records) {
            PrimaryPass::Complete(enriched) => Ok(enriched),
            PrimaryPass::Incomplete => self.fallback(records).await,
        }
    }

    fn primary_pass(&self, records: &[HotspotRecord]) -> PrimaryPass {
        let Some(boundaries) = &self.boundaries else {
            return PrimaryPass::Incomplete;
        };

        let mut enriched = Vec::with_capacity(records.len());
        for record in records {
            match boundaries.locate(record.latitude, record.longitude) {
                Some((municipality, command)) => enriched.push(EnrichedHotspot {
                    record: record.clone(),
                    location: Location::new(municipality, command),
                }),
                // Any unresolved record sends the whole batch to the
                // fallback so all records come from the same source.
                None => return PrimaryPass::Incomplete,
            }
        }
        PrimaryPass::Complete(enriched)
    }

    async fn fallback(
        &self,
        records: Vec<HotspotRecord>,
    ) -> Result<Vec<EnrichedHotspot>, GeocodeError> {
        tracing::info!(
            "local boundary pass incomplete, reverse geocoding {} records",
            records.len()
        );

        let points: Vec<(f64, f64)> = records
            .iter()
            .map(|r| (r.latitude, r.longitude))
            .collect();
        let locations = self.geocoder.reverse_batch(&points).await?;

        Ok(records
            .into_iter()
            .zip(locations)
            .map(|(record, location)| EnrichedHotspot { record, location })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn record(latitude: f64, longitude: f64) -> HotspotRecord {
        HotspotRecord {
            latitude,
            longitude,
            acq_date: "2024-06-06".to_string(),
            acq_time: "1230".to_string(),
            satellite: "N20".to_string(),
            instrument: "VIIRS".to_string(),
            confidence: "n".to_string(),
            frp: 4.2,
            bright_ti4: 330.0,
            bright_ti5: 290.0,
            daynight: "D".to_string(),
        }
    }

    struct FakeGeocoder {
        calls: AtomicUsize,
        last_batch_len: Mutex<usize>,
        fail: bool,
    }

    impl FakeGeocoder {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                last_batch_len: Mutex::new(0),
                fail,
            }
        }
    }

    impl ReverseGeocode for &FakeGeocoder {
        async fn reverse_batch(
            &self,
            points: &[(f64, f64)],
        ) -> Result<Vec<Location>, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_batch_len.lock().unwrap() = points.len();
            if self.fail {
                return Err(GeocodeError::Status(
                    reqwest::StatusCode::TOO_MANY_REQUESTS,
                ));
            }
            Ok(points.iter().map(|_| Location::new("Remoto", "N/A")).collect())
        }
    }

    fn square_boundaries() -> Arc<BoundarySet> {
        let body = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {"municipio": "Porto Alegre", "comando_regional": "CRB Metropolitano"},
                "geometry": {"type": "Polygon", "coordinates": [[[-52.0, -31.0], [-50.0, -31.0], [-50.0, -29.0], [-52.0, -29.0], [-52.0, -31.0]]]}
            }]
        }"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        Arc::new(BoundarySet::load(file.path()).unwrap())
    }

    #[tokio::test]
    async fn test_complete_primary_pass_skips_the_geocoder() {
        let geocoder = FakeGeocoder::new(false);
        let enricher = LocationEnricher::new(Some(square_boundaries()), &geocoder);

        let enriched = enricher
            .enrich(vec![record(-30.0, -51.0), record(-30.5, -51.5)])
            .await
            .unwrap();

        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(enriched.len(), 2);
        for hotspot in &enriched {
            assert_eq!(hotspot.location.municipality, "Porto Alegre");
            assert_eq!(hotspot.location.regional_command, "CRB Metropolitano");
            assert_eq!(hotspot.location.city, "Porto Alegre");
        }
    }

    #[tokio::test]
    async fn test_one_unresolved_record_sends_whole_batch_to_fallback() {
        let geocoder = FakeGeocoder::new(false);
        let enricher = LocationEnricher::new(Some(square_boundaries()), &geocoder);

        // First record resolves locally, second falls outside the zone.
        let enriched = enricher
            .enrich(vec![record(-30.0, -51.0), record(10.0, 10.0)])
            .await
            .unwrap();

        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*geocoder.last_batch_len.lock().unwrap(), 2);
        for hotspot in &enriched {
            assert_eq!(hotspot.location.municipality, "Remoto");
            assert!(!hotspot.location.city.is_empty());
        }
    }

    #[tokio::test]
    async fn test_missing_dataset_goes_straight_to_fallback() {
        let geocoder = FakeGeocoder::new(false);
        let enricher = LocationEnricher::new(None, &geocoder);

        let enriched = enricher.enrich(vec![record(-30.0, -51.0)]).await.unwrap();
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(enriched[0].location.city, "Remoto");
    }

    #[tokio::test]
    async fn test_fallback_failure_propagates() {
        let geocoder = FakeGeocoder::new(true);
        let enricher = LocationEnricher::new(None, &geocoder);

        let result = enricher.enrich(vec![record(-30.0, -51.0)]).await;
        assert!(matches!(result, Err(GeocodeError::Status(_))));
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_calls() {
        let geocoder = FakeGeocoder::new(false);
        let enricher = LocationEnricher::new(None, &geocoder);

        let enriched = enricher.enrich(Vec::new()).await.unwrap();
        assert!(enriched.is_empty());
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 0);
    }
}
