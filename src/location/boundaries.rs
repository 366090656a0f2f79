use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BoundaryError {
    #[error("failed to read boundary file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse boundary GeoJSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("boundary dataset contains no usable features")]
    Empty,
}

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    properties: FeatureProperties,
    geometry: Geometry,
}

#[derive(Deserialize)]
struct FeatureProperties {
    municipio: String,
    #[serde(default)]
    comando_regional: Option<String>,
}

// Positions are kept as Vec<f64> because GeoJSON allows an optional
// third (altitude) element.
#[derive(Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Polygon { coordinates: Vec<Vec<Vec<f64>>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Vec<f64>>>> },
    #[serde(other)]
    Unsupported,
}

struct Ring {
    points: Vec<(f64, f64)>,
}

struct PolygonArea {
    exterior: Ring,
    holes: Vec<Ring>,
}

struct Zone {
    municipality: String,
    regional_command: String,
    polygons: Vec<PolygonArea>,
}

/// Administrative-boundary dataset for the primary (local, free)
/// location pass. Read-only after load; shared via Arc.
pub struct BoundarySet {
    zones: Vec<Zone>,
}

impl BoundarySet {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BoundaryError> {
        let body = fs::read_to_string(path)?;
        let collection: FeatureCollection = serde_json::from_str(&body)?;

        let mut zones = Vec::new();
        for feature in collection.features {
            let polygons = match feature.geometry {
                Geometry::Polygon { coordinates } => build_polygon(&coordinates)
                    .map(|p| vec![p])
                    .unwrap_or_default(),
                Geometry::MultiPolygon { coordinates } => {
                    coordinates.iter().filter_map(|c| build_polygon(c)).collect()
                }
                Geometry::Unsupported => Vec::new(),
            };
            if polygons.is_empty() {
                tracing::warn!(
                    "skipping boundary feature '{}' with no usable polygon",
                    feature.properties.municipio
                );
                continue;
            }
            zones.push(Zone {
                municipality: feature.properties.municipio,
                regional_command: feature
                    .properties
                    .comando_regional
                    .unwrap_or_else(|| "N/A".to_string()),
                polygons,
            });
        }

        if zones.is_empty() {
            return Err(BoundaryError::Empty);
        }
        Ok(Self { zones })
    }

    /// Point-in-polygon lookup. Returns the municipality and regional
    /// command of the first zone containing the point.
    pub fn locate(&self, latitude: f64, longitude: f64) -> Option<(&str, &str)> {
        for zone in &self.zones {
            for polygon in &zone.polygons {
                if polygon_contains(polygon, longitude, latitude) {
                    return Some((&zone.municipality, &zone.regional_command));
                }
            }
        }
        None
    }

    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }
}

fn build_polygon(rings: &[Vec<Vec<f64>>]) -> Option<PolygonArea> {
    let mut iter = rings.iter().map(|ring| Ring {
        points: ring
            .iter()
            .filter(|pos| pos.len() >= 2)
            .map(|pos| (pos[0], pos[1]))
            .collect(),
    });
    let exterior = iter.next()?;
    if exterior.points.len() < 3 {
        return None;
    }
    Some(PolygonArea {
        exterior,
        holes: iter.collect(),
    })
}

fn polygon_contains(polygon: &PolygonArea, x: f64, y: f64) -> bool {
    ring_contains(&polygon.exterior, x, y)
        && !polygon.holes.iter().any(|hole| ring_contains(hole, x, y))
}

// Even-odd ray cast against one ring.
fn ring_contains(ring: &Ring, x: f64, y: f64) -> bool {
    let points = &ring.points;
    if points.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = points.len() - 1;
    for i in 0..points.len() {
        let (xi, yi) = points[i];
        let (xj, yj) = points[j];
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_geojson(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    const TWO_SQUARES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"municipio": "Porto Alegre", "comando_regional": "CRB Metropolitano"},
                "geometry": {"type": "Polygon", "coordinates": [[[-51.5, -30.5], [-50.5, -30.5], [-50.5, -29.5], [-51.5, -29.5], [-51.5, -30.5]]]}
            },
            {
                "type": "Feature",
                "properties": {"municipio": "Pelotas"},
                "geometry": {"type": "MultiPolygon", "coordinates": [[[[-53.0, -32.0], [-52.0, -32.0], [-52.0, -31.0], [-53.0, -31.0], [-53.0, -32.0]]]]}
            }
        ]
    }"#;

    #[test]
    fn test_locate_inside_polygon() {
        let file = write_geojson(TWO_SQUARES);
        let set = BoundarySet::load(file.path()).unwrap();
        assert_eq!(set.zone_count(), 2);

        let hit = set.locate(-30.0, -51.0).unwrap();
        assert_eq!(hit, ("Porto Alegre", "CRB Metropolitano"));
    }

    #[test]
    fn test_locate_inside_multipolygon_defaults_command() {
        let file = write_geojson(TWO_SQUARES);
        let set = BoundarySet::load(file.path()).unwrap();

        let hit = set.locate(-31.5, -52.5).unwrap();
        assert_eq!(hit, ("Pelotas", "N/A"));
    }

    #[test]
    fn test_locate_outside_all_zones() {
        let file = write_geojson(TWO_SQUARES);
        let set = BoundarySet::load(file.path()).unwrap();
        assert!(set.locate(10.0, 10.0).is_none());
    }

    #[test]
    fn test_hole_is_excluded() {
        let body = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {"municipio": "Anel"},
                "geometry": {"type": "Polygon", "coordinates": [
                    [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0], [0.0, 0.0]],
                    [[4.0, 4.0], [6.0, 4.0], [6.0, 6.0], [4.0, 6.0], [4.0, 4.0]]
                ]}
            }]
        }"#;
        let file = write_geojson(body);
        let set = BoundarySet::load(file.path()).unwrap();

        assert!(set.locate(2.0, 2.0).is_some()); // in the ring
        assert!(set.locate(5.0, 5.0).is_none()); // in the hole
    }

    #[test]
    fn test_empty_collection_is_an_error() {
        let file = write_geojson(r#"{"type": "FeatureCollection", "features": []}"#);
        assert!(matches!(
            BoundarySet::load(file.path()),
            Err(BoundaryError::Empty)
        ));
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let file = write_geojson("not geojson");
        assert!(matches!(
            BoundarySet::load(file.path()),
            Err(BoundaryError::Parse(_))
        ));
    }
}
