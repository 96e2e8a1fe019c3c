//! Great-circle distances between a reference point and feed geometries
//!
//! Feeds deliver GeoJSON-shaped geometries whose positions are ordered
//! `[longitude, latitude]`. [`Coordinate`] names both axes explicitly so the
//! swap happens exactly once, in [`Geometry::from_geojson`].
//!
//! Polygon distance is an approximation: zero when the reference point lies
//! inside the outer ring, otherwise the distance to the nearest vertex (not
//! the nearest edge). Holes are ignored.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::GeometryError;

/// Mean Earth radius used by the haversine formula
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Maximum nesting of geometry collections
pub const MAX_COLLECTION_DEPTH: usize = 16;

/// A position on the Earth's surface
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Build from a GeoJSON position (`[longitude, latitude, ...]`)
    fn from_position(value: &Value) -> Result<Self, GeometryError> {
        let position = value
            .as_array()
            .filter(|p| p.len() >= 2)
            .ok_or_else(|| GeometryError::Malformed(format!("invalid position {value}")))?;

        let axis = |v: &Value| {
            v.as_f64()
                .filter(|f| f.is_finite())
                .ok_or_else(|| GeometryError::Malformed(format!("invalid position {value}")))
        };

        Ok(Self::new(axis(&position[1])?, axis(&position[0])?))
    }

    fn to_position(self) -> Value {
        json!([self.longitude, self.latitude])
    }
}

/// The fixed point all distances are measured from
pub type ReferencePoint = Coordinate;

/// Supported feed geometries
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Coordinate),
    /// Outer ring of a polygon
    Polygon(Vec<Coordinate>),
    Collection(Vec<Geometry>),
}

impl Geometry {
    /// Parse a GeoJSON geometry object
    ///
    /// Unknown `type` values yield [`GeometryError::UnsupportedGeometryKind`].
    /// Inside a collection, members of an unknown kind are skipped; the
    /// collection only fails when nothing usable remains.
    pub fn from_geojson(value: &Value) -> Result<Self, GeometryError> {
        Self::parse(value, 0)
    }

    fn parse(value: &Value, depth: usize) -> Result<Self, GeometryError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| GeometryError::Malformed("geometry has no 'type'".to_string()))?;

        match kind {
            "Point" => {
                let coordinates = value
                    .get("coordinates")
                    .ok_or_else(|| GeometryError::Malformed("point has no coordinates".into()))?;
                Ok(Geometry::Point(Coordinate::from_position(coordinates)?))
            }
            "Polygon" => {
                let outer = value
                    .get("coordinates")
                    .and_then(Value::as_array)
                    .and_then(|rings| rings.first())
                    .ok_or(GeometryError::EmptyRing)?;
                let ring = outer
                    .as_array()
                    .ok_or_else(|| GeometryError::Malformed(format!("invalid ring {outer}")))?
                    .iter()
                    .map(Coordinate::from_position)
                    .collect::<Result<Vec<_>, _>>()?;
                if ring.is_empty() {
                    return Err(GeometryError::EmptyRing);
                }
                Ok(Geometry::Polygon(ring))
            }
            "GeometryCollection" => {
                if depth >= MAX_COLLECTION_DEPTH {
                    return Err(GeometryError::NestingTooDeep(MAX_COLLECTION_DEPTH));
                }
                let members = value
                    .get("geometries")
                    .and_then(Value::as_array)
                    .ok_or_else(|| GeometryError::Malformed("collection has no geometries".into()))?;

                let mut geometries = Vec::with_capacity(members.len());
                let mut unsupported = None;
                for member in members {
                    match Self::parse(member, depth + 1) {
                        Ok(geometry) => geometries.push(geometry),
                        Err(GeometryError::UnsupportedGeometryKind(kind)) => {
                            tracing::debug!(kind = %kind, "Skipping unsupported collection member");
                            unsupported.get_or_insert(kind);
                        }
                        Err(e) => return Err(e),
                    }
                }

                match (geometries.is_empty(), unsupported) {
                    (true, Some(kind)) => Err(GeometryError::UnsupportedGeometryKind(kind)),
                    (true, None) => Err(GeometryError::Malformed("empty geometry collection".into())),
                    _ => Ok(Geometry::Collection(geometries)),
                }
            }
            other => Err(GeometryError::UnsupportedGeometryKind(other.to_string())),
        }
    }

    /// Render as a GeoJSON geometry object
    pub fn to_geojson(&self) -> Value {
        match self {
            Geometry::Point(c) => json!({"type": "Point", "coordinates": c.to_position()}),
            Geometry::Polygon(ring) => {
                let ring: Vec<Value> = ring.iter().map(|c| c.to_position()).collect();
                json!({"type": "Polygon", "coordinates": [ring]})
            }
            Geometry::Collection(members) => {
                let members: Vec<Value> = members.iter().map(Geometry::to_geojson).collect();
                json!({"type": "GeometryCollection", "geometries": members})
            }
        }
    }

    /// A single position standing for the geometry on a map
    ///
    /// Polygons use the mean of their distinct vertices, collections their
    /// first member.
    pub fn anchor(&self) -> Option<Coordinate> {
        match self {
            Geometry::Point(c) => Some(*c),
            Geometry::Polygon(ring) => {
                let vertices = match ring.as_slice() {
                    [first, .., last] if first == last => &ring[..ring.len() - 1],
                    _ => ring.as_slice(),
                };
                if vertices.is_empty() {
                    return None;
                }
                let n = vertices.len() as f64;
                let (lat, lon) = vertices
                    .iter()
                    .fold((0.0, 0.0), |(lat, lon), c| (lat + c.latitude, lon + c.longitude));
                Some(Coordinate::new(lat / n, lon / n))
            }
            Geometry::Collection(members) => members.iter().find_map(Geometry::anchor),
        }
    }
}

/// Great-circle distance in kilometres between two coordinates
pub fn haversine(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Ray-casting containment test against a polygon ring
///
/// Longitude is treated as x and latitude as y. A point equal to a vertex,
/// or lying on a horizontal edge, counts as inside.
pub fn point_in_polygon(point: Coordinate, ring: &[Coordinate]) -> bool {
    let n = ring.len();
    if n == 0 {
        return false;
    }
    let (x, y) = (point.longitude, point.latitude);

    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        if a == point {
            return true;
        }
        if a.latitude == b.latitude
            && a.latitude == y
            && x > a.longitude.min(b.longitude)
            && x < a.longitude.max(b.longitude)
        {
            return true;
        }
    }

    let mut inside = false;
    let mut p1 = ring[0];
    for i in 1..=n {
        let p2 = ring[i % n];
        if y > p1.latitude.min(p2.latitude)
            && y <= p1.latitude.max(p2.latitude)
            && x <= p1.longitude.max(p2.longitude)
        {
            // latitudes differ here, so the division is safe
            let x_intercept = (y - p1.latitude) * (p2.longitude - p1.longitude)
                / (p2.latitude - p1.latitude)
                + p1.longitude;
            if p1.longitude == p2.longitude || x <= x_intercept {
                inside = !inside;
            }
        }
        p1 = p2;
    }

    inside
}

/// Computes distances from a fixed reference point
#[derive(Debug, Clone, Copy)]
pub struct GeoDistanceCalculator {
    reference: ReferencePoint,
}

impl GeoDistanceCalculator {
    pub fn new(reference: ReferencePoint) -> Self {
        Self { reference }
    }

    pub fn reference(&self) -> ReferencePoint {
        self.reference
    }

    /// Distance in kilometres from the reference point to a geometry
    pub fn distance(&self, geometry: &Geometry) -> Result<f64, GeometryError> {
        self.distance_at(geometry, 0)
    }

    fn distance_at(&self, geometry: &Geometry, depth: usize) -> Result<f64, GeometryError> {
        match geometry {
            Geometry::Point(c) => Ok(haversine(self.reference, *c)),
            Geometry::Polygon(ring) => {
                if ring.is_empty() {
                    return Err(GeometryError::EmptyRing);
                }
                if point_in_polygon(self.reference, ring) {
                    return Ok(0.0);
                }
                Ok(ring
                    .iter()
                    .map(|vertex| haversine(self.reference, *vertex))
                    .fold(f64::INFINITY, f64::min))
            }
            Geometry::Collection(members) => {
                if depth >= MAX_COLLECTION_DEPTH {
                    return Err(GeometryError::NestingTooDeep(MAX_COLLECTION_DEPTH));
                }
                if members.is_empty() {
                    return Err(GeometryError::Malformed("empty geometry collection".into()));
                }
                let mut nearest = f64::INFINITY;
                for member in members {
                    nearest = nearest.min(self.distance_at(member, depth + 1)?);
                }
                Ok(nearest)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sydney() -> GeoDistanceCalculator {
        GeoDistanceCalculator::new(Coordinate::new(-33.865, 151.209444))
    }

    fn square(lat: (f64, f64), lon: (f64, f64)) -> Vec<Coordinate> {
        vec![
            Coordinate::new(lat.0, lon.0),
            Coordinate::new(lat.0, lon.1),
            Coordinate::new(lat.1, lon.1),
            Coordinate::new(lat.1, lon.0),
            Coordinate::new(lat.0, lon.0),
        ]
    }

    #[test]
    fn test_haversine_known_distances() {
        let d = haversine(Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 1.0));
        assert!((d - 111.19).abs() < 0.01);

        let d = sydney().distance(&Geometry::Point(Coordinate::new(-33.0, 151.0))).unwrap();
        assert!((d - 98.13).abs() < 0.01, "got {d}");
    }

    #[test]
    fn test_haversine_is_symmetric_and_zero_at_origin() {
        let a = Coordinate::new(-33.865, 151.209444);
        let b = Coordinate::new(40.0, -74.0);
        assert_eq!(haversine(a, a), 0.0);
        assert!((haversine(a, b) - haversine(b, a)).abs() < 1e-9);
    }

    #[test]
    fn test_geojson_point_is_longitude_first() {
        let geometry =
            Geometry::from_geojson(&json!({"type": "Point", "coordinates": [151.0, -33.0]}))
                .unwrap();
        assert_eq!(geometry, Geometry::Point(Coordinate::new(-33.0, 151.0)));

        let d = sydney().distance(&geometry).unwrap();
        assert!(d < 100.0);
    }

    #[test]
    fn test_geojson_round_trip_keeps_axis_order() {
        let geometry = Geometry::Polygon(square((-34.0, -33.5), (151.0, 151.5)));
        let json = geometry.to_geojson();
        assert_eq!(json["coordinates"][0][0], json!([151.0, -34.0]));
        assert_eq!(Geometry::from_geojson(&json).unwrap(), geometry);
    }

    #[test]
    fn test_polygon_containing_reference_is_zero() {
        let geometry = Geometry::Polygon(square((-34.0, -33.5), (151.0, 151.5)));
        assert_eq!(sydney().distance(&geometry).unwrap(), 0.0);
    }

    #[test]
    fn test_polygon_outside_uses_nearest_vertex() {
        let ring = square((-33.0, -32.0), (151.209444, 152.0));
        let geometry = Geometry::Polygon(ring.clone());
        let d = sydney().distance(&geometry).unwrap();

        let nearest = haversine(sydney().reference(), Coordinate::new(-33.0, 151.209444));
        assert!((d - nearest).abs() < 1e-9);
    }

    #[test]
    fn test_point_in_polygon_boundaries() {
        let ring = square((0.0, 1.0), (0.0, 1.0));

        assert!(point_in_polygon(Coordinate::new(0.5, 0.5), &ring));
        assert!(!point_in_polygon(Coordinate::new(1.5, 0.5), &ring));
        // vertex
        assert!(point_in_polygon(Coordinate::new(1.0, 1.0), &ring));
        // horizontal edge
        assert!(point_in_polygon(Coordinate::new(0.0, 0.25), &ring));
        assert!(point_in_polygon(Coordinate::new(1.0, 0.75), &ring));
    }

    #[test]
    fn test_degenerate_rings_do_not_panic() {
        let single = vec![Coordinate::new(1.0, 1.0)];
        assert!(point_in_polygon(Coordinate::new(1.0, 1.0), &single));
        assert!(!point_in_polygon(Coordinate::new(2.0, 2.0), &single));
        assert!(!point_in_polygon(Coordinate::new(2.0, 2.0), &[]));

        let calc = GeoDistanceCalculator::new(Coordinate::new(0.0, 0.0));
        assert_eq!(calc.distance(&Geometry::Polygon(vec![])), Err(GeometryError::EmptyRing));
    }

    #[test]
    fn test_collection_takes_minimum() {
        let near = Geometry::Point(Coordinate::new(-33.432786, 151.209444));
        let far = Geometry::Point(Coordinate::new(-31.151414, 151.209444));
        let nested = Geometry::Collection(vec![far.clone(), Geometry::Collection(vec![near])]);

        let d = sydney().distance(&nested).unwrap();
        assert!((d - 48.06).abs() < 0.01);
    }

    #[test]
    fn test_unsupported_kind() {
        let err = Geometry::from_geojson(&json!({"type": "LineString", "coordinates": []}))
            .unwrap_err();
        assert_eq!(err, GeometryError::UnsupportedGeometryKind("LineString".into()));
    }

    #[test]
    fn test_collection_skips_unsupported_members() {
        let value = json!({
            "type": "GeometryCollection",
            "geometries": [
                {"type": "LineString", "coordinates": [[0.0, 0.0], [1.0, 1.0]]},
                {"type": "Point", "coordinates": [151.209444, -33.432786]}
            ]
        });
        let geometry = Geometry::from_geojson(&value).unwrap();
        assert!(matches!(geometry, Geometry::Collection(ref m) if m.len() == 1));

        let only_unsupported = json!({
            "type": "GeometryCollection",
            "geometries": [{"type": "LineString", "coordinates": []}]
        });
        assert!(matches!(
            Geometry::from_geojson(&only_unsupported),
            Err(GeometryError::UnsupportedGeometryKind(_))
        ));
    }

    #[test]
    fn test_collection_depth_limit() {
        let mut value = json!({"type": "Point", "coordinates": [0.0, 0.0]});
        for _ in 0..MAX_COLLECTION_DEPTH {
            value = json!({"type": "GeometryCollection", "geometries": [value]});
        }
        assert!(Geometry::from_geojson(&value).is_ok());

        value = json!({"type": "GeometryCollection", "geometries": [value]});
        assert_eq!(
            Geometry::from_geojson(&value),
            Err(GeometryError::NestingTooDeep(MAX_COLLECTION_DEPTH))
        );
    }

    #[test]
    fn test_malformed_positions() {
        assert!(matches!(
            Geometry::from_geojson(&json!({"type": "Point", "coordinates": [1.0]})),
            Err(GeometryError::Malformed(_))
        ));
        assert!(matches!(
            Geometry::from_geojson(&json!({"type": "Point", "coordinates": ["a", "b"]})),
            Err(GeometryError::Malformed(_))
        ));
        assert_eq!(
            Geometry::from_geojson(&json!({"type": "Polygon", "coordinates": [[]]})),
            Err(GeometryError::EmptyRing)
        );
    }

    #[test]
    fn test_anchor() {
        let ring = square((0.0, 2.0), (0.0, 2.0));
        assert_eq!(Geometry::Polygon(ring).anchor(), Some(Coordinate::new(1.0, 1.0)));
        assert_eq!(Geometry::Collection(vec![]).anchor(), None);
    }
}
