//! Spatial polygon descriptor used in query requests and spatial property values.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Coordinate system assumed when a descriptor omits one.
pub const DEFAULT_COORDINATE_SYSTEM: &str = "4326";

/// A closed ring of lon/lat points plus a coordinate system id.
///
/// JSON form: `{"points": [[lon, lat], ...], "coordinate_system": "4326"}`.
/// The ring does not have to repeat its first point; consumers close it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonDescriptor {
    /// Ring vertices as `[x, y]` (longitude, latitude).
    pub points: Vec<[f64; 2]>,
    /// Coordinate system id, either bare (`"4326"`) or prefixed (`"EPSG:4326"`).
    #[serde(default = "default_coordinate_system")]
    pub coordinate_system: String,
}

fn default_coordinate_system() -> String {
    DEFAULT_COORDINATE_SYSTEM.to_string()
}

impl PolygonDescriptor {
    /// Create a descriptor in the default coordinate system.
    pub fn new(points: Vec<[f64; 2]>) -> Self {
        Self {
            points,
            coordinate_system: default_coordinate_system(),
        }
    }

    /// Set the coordinate system id.
    pub fn with_coordinate_system(mut self, coordinate_system: impl Into<String>) -> Self {
        self.coordinate_system = coordinate_system.into();
        self
    }

    /// Axis-aligned rectangle from two corners.
    pub fn rectangle(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self::new(vec![
            [min_x, min_y],
            [max_x, min_y],
            [max_x, max_y],
            [min_x, max_y],
        ])
    }

    /// Parse the JSON form.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let polygon: PolygonDescriptor = serde_json::from_str(json)?;
        polygon.validate()?;
        Ok(polygon)
    }

    /// Render the JSON form.
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    /// Numeric SRID of the coordinate system.
    pub fn srid(&self) -> Result<i32, Error> {
        let raw = self.coordinate_system.trim();
        let digits = raw
            .strip_prefix("EPSG:")
            .or_else(|| raw.strip_prefix("epsg:"))
            .unwrap_or(raw);
        digits.parse::<i32>().map_err(|_| {
            Error::InvalidPolygon(format!(
                "unrecognized coordinate system '{}'",
                self.coordinate_system
            ))
        })
    }

    /// Check that the ring is usable: at least three distinct vertices, all finite,
    /// and a numeric coordinate system.
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(point) = self
            .points
            .iter()
            .find(|p| !p[0].is_finite() || !p[1].is_finite())
        {
            return Err(Error::InvalidPolygon(format!(
                "non-finite coordinate {:?}",
                point
            )));
        }

        let mut ring: &[[f64; 2]] = &self.points;
        if ring.len() > 1 && ring.first() == ring.last() {
            ring = &ring[..ring.len() - 1];
        }
        if ring.len() < 3 {
            return Err(Error::InvalidPolygon(format!(
                "a ring needs at least 3 distinct points, got {}",
                ring.len()
            )));
        }

        self.srid()?;
        Ok(())
    }

    /// Bounding box of the ring, or `None` for an empty ring.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let (first, rest) = self.points.split_first()?;
        let mut bbox = BoundingBox {
            min_x: first[0],
            min_y: first[1],
            max_x: first[0],
            max_y: first[1],
        };
        for p in rest {
            bbox.min_x = bbox.min_x.min(p[0]);
            bbox.min_y = bbox.min_y.min(p[1]);
            bbox.max_x = bbox.max_x.max(p[0]);
            bbox.max_y = bbox.max_y.max(p[1]);
        }
        Some(bbox)
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Whether two boxes overlap, edges included.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polygon_json_form() {
        let json = r#"{"points": [[0.0, 0.0], [2.0, 0.0], [2.0, 1.0]], "coordinate_system": "4326"}"#;
        let polygon = PolygonDescriptor::from_json(json).unwrap();
        assert_eq!(polygon.points.len(), 3);
        assert_eq!(polygon.srid().unwrap(), 4326);
    }

    #[test]
    fn test_polygon_default_coordinate_system() {
        let polygon: PolygonDescriptor =
            serde_json::from_str(r#"{"points": [[0, 0], [1, 0], [1, 1]]}"#).unwrap();
        assert_eq!(polygon.coordinate_system, "4326");
    }

    #[test]
    fn test_srid_prefixed() {
        let polygon = PolygonDescriptor::rectangle(0.0, 0.0, 1.0, 1.0)
            .with_coordinate_system("EPSG:3857");
        assert_eq!(polygon.srid().unwrap(), 3857);

        let bad = polygon.with_coordinate_system("WGS84");
        assert!(matches!(bad.srid(), Err(Error::InvalidPolygon(_))));
    }

    #[test]
    fn test_validate_rejects_degenerate_ring() {
        let closed_line = PolygonDescriptor::new(vec![[0.0, 0.0], [1.0, 1.0], [0.0, 0.0]]);
        assert!(closed_line.validate().is_err());

        let nan = PolygonDescriptor::new(vec![[0.0, 0.0], [f64::NAN, 1.0], [1.0, 0.0]]);
        assert!(nan.validate().is_err());

        assert!(PolygonDescriptor::rectangle(0.0, 0.0, 1.0, 1.0).validate().is_ok());
    }

    #[test]
    fn test_bounding_box() {
        let polygon = PolygonDescriptor::new(vec![[3.0, -1.0], [5.0, 2.0], [-2.0, 0.5]]);
        let bbox = polygon.bounding_box().unwrap();
        assert_eq!(
            bbox,
            BoundingBox {
                min_x: -2.0,
                min_y: -1.0,
                max_x: 5.0,
                max_y: 2.0
            }
        );

        let far = BoundingBox {
            min_x: 10.0,
            min_y: 10.0,
            max_x: 11.0,
            max_y: 11.0,
        };
        assert!(!bbox.intersects(&far));
        assert!(bbox.intersects(&bbox));
        assert!(PolygonDescriptor::new(vec![]).bounding_box().is_none());
    }
}
