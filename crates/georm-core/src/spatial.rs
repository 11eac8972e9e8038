//! Spatial helpers: WKT encoding, exact intersection and the in-process
//! post-filter used when the backend has no spatial functions.

use std::str::FromStr;

use geo::Intersects;
use geo_types::{Coord, Geometry, LineString, Polygon};
use georm_proto::{BoundingBox, PolygonDescriptor, Record, Value};
use wkt::ToWkt;

use crate::error::Error;

/// Validate a polygon descriptor as a query input.
pub fn validate_polygon(polygon: &PolygonDescriptor) -> Result<(), Error> {
    polygon.validate()?;
    Ok(())
}

fn ring(polygon: &PolygonDescriptor) -> LineString<f64> {
    LineString::from(
        polygon
            .points
            .iter()
            .map(|p| Coord { x: p[0], y: p[1] })
            .collect::<Vec<_>>(),
    )
}

/// Convert a descriptor to a `geo` polygon, closing the ring.
pub fn to_geo(polygon: &PolygonDescriptor) -> Result<Polygon<f64>, Error> {
    validate_polygon(polygon)?;
    Ok(Polygon::new(ring(polygon), vec![]))
}

/// WKT text of a descriptor's ring.
pub fn polygon_to_wkt(polygon: &PolygonDescriptor) -> String {
    Polygon::new(ring(polygon), vec![]).wkt_string()
}

/// Decode WKT read from a result row into a descriptor.
///
/// The closing vertex is dropped so the descriptor matches the form callers
/// write.
pub fn polygon_from_wkt(text: &str, srid: i32) -> Result<PolygonDescriptor, Error> {
    let parsed = wkt::Wkt::<f64>::from_str(text)
        .map_err(|e| Error::InvalidRequest(format!("malformed WKT '{}': {}", text, e)))?;
    let geometry: Geometry<f64> = parsed.try_into().map_err(|e: wkt::conversion::Error| {
        Error::InvalidRequest(format!("malformed WKT '{}': {:?}", text, e))
    })?;

    let polygon = match geometry {
        Geometry::Polygon(p) => p,
        other => {
            return Err(Error::InvalidRequest(format!(
                "expected a polygon, found {}",
                geometry_name(&other)
            )))
        }
    };

    let mut points: Vec<[f64; 2]> = polygon.exterior().coords().map(|c| [c.x, c.y]).collect();
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    let descriptor =
        PolygonDescriptor::new(points).with_coordinate_system(srid.to_string());
    validate_polygon(&descriptor)?;
    Ok(descriptor)
}

fn geometry_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "point",
        Geometry::LineString(_) => "linestring",
        Geometry::MultiPolygon(_) => "multipolygon",
        Geometry::GeometryCollection(_) => "geometrycollection",
        _ => "non-polygon geometry",
    }
}

/// Exact ring intersection.
pub fn intersects(a: &PolygonDescriptor, b: &PolygonDescriptor) -> Result<bool, Error> {
    Ok(to_geo(a)?.intersects(&to_geo(b)?))
}

/// Bounding box of a descriptor, failing on an empty ring.
pub fn bounding_box(polygon: &PolygonDescriptor) -> Result<BoundingBox, Error> {
    polygon
        .bounding_box()
        .ok_or_else(|| Error::InvalidRequest("polygon has no points".to_string()))
}

/// Exact polygon filter applied to materialized records.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialFilter {
    /// Spatial property tested against the polygon.
    pub property: String,
    pub polygon: PolygonDescriptor,
    /// Remove the property afterwards because it was selected only for the test.
    pub strip_property: bool,
}

impl SpatialFilter {
    /// Keep records whose spatial property intersects the polygon.
    ///
    /// Records without a spatial value are dropped.
    pub fn apply(&self, records: Vec<Record>) -> Result<Vec<Record>, Error> {
        let query = to_geo(&self.polygon)?;
        let mut kept = Vec::with_capacity(records.len());
        for mut record in records {
            let hit = match record.get(&self.property) {
                Some(Value::Polygon(footprint)) => to_geo(footprint)?.intersects(&query),
                _ => false,
            };
            if !hit {
                continue;
            }
            if self.strip_property {
                record.properties.remove(&self.property);
            }
            kept.push(record);
        }
        Ok(kept)
    }
}
