use serde_json::{json, Value};

use super::{ogr, Coord, CoordSeq, Geometry};
use crate::error::Result;

/// Default number of decimal digits kept when serializing coordinates.
pub const DEFAULT_PRECISION: usize = 15;

/// Serializes [`Geometry`] values into GeoJSON geometry objects.
#[derive(Debug, Clone, Copy)]
pub struct GeometryGeoJson {
    pub precision: usize,
}

impl Default for GeometryGeoJson {
    fn default() -> Self {
        Self {
            precision: DEFAULT_PRECISION,
        }
    }
}

impl GeometryGeoJson {
    /// `None` and `Some(0)` both select [`DEFAULT_PRECISION`].
    pub fn new(precision: Option<usize>) -> Self {
        Self {
            precision: precision.filter(|&p| p > 0).unwrap_or(DEFAULT_PRECISION),
        }
    }

    pub fn convert(&self, geometry: &Geometry) -> Value {
        match geometry {
            Geometry::Point(c) => self.convert_point(c),
            Geometry::MultiPoint(points) => {
                json!({"type": "MultiPoint", "coordinates": self.points(points)})
            }
            Geometry::LineString(points) => {
                json!({"type": "LineString", "coordinates": self.points(points)})
            }
            Geometry::LinearRing(points) => {
                json!({"type": "LinearRing", "coordinates": self.points(points)})
            }
            Geometry::Polygon(rings) => self.convert_polygon(rings),
            Geometry::MultiLineString(lines) => self.convert_multilinestring(lines),
            Geometry::MultiPolygon(polygons) => self.convert_multipolygon(polygons),
            Geometry::GeometryCollection(geometries) => self.convert_geometrycollection(geometries),
        }
    }

    /// Serializes a GDAL/OGR geometry; types without a GeoJSON counterpart
    /// (curves, surfaces, TINs) fail with `UnsupportedGeometryType`.
    pub fn convert_ogr(&self, geometry: &gdal::vector::Geometry) -> Result<Value> {
        Ok(self.convert(&ogr::from_ogr(geometry)?))
    }

    pub fn convert_point(&self, point: &Coord) -> Value {
        json!({"type": "Point", "coordinates": self.point(point)})
    }

    pub fn convert_polygon(&self, rings: &[CoordSeq]) -> Value {
        json!({"type": "Polygon", "coordinates": self.rings(rings)})
    }

    pub fn convert_multilinestring(&self, lines: &[CoordSeq]) -> Value {
        json!({"type": "MultiLineString", "coordinates": self.rings(lines)})
    }

    pub fn convert_multipolygon(&self, polygons: &[Vec<CoordSeq>]) -> Value {
        let coordinates: Vec<Value> = polygons.iter().map(|p| self.rings(p)).collect();
        json!({"type": "MultiPolygon", "coordinates": coordinates})
    }

    pub fn convert_geometrycollection(&self, geometries: &[Geometry]) -> Value {
        let geometries: Vec<Value> = geometries.iter().map(|g| self.convert(g)).collect();
        json!({"type": "GeometryCollection", "geometries": geometries})
    }

    fn rings(&self, rings: &[CoordSeq]) -> Value {
        Value::Array(rings.iter().map(|r| self.points(r)).collect())
    }

    fn points(&self, points: &[Coord]) -> Value {
        Value::Array(points.iter().map(|p| self.point(p)).collect())
    }

    fn point(&self, c: &Coord) -> Value {
        let mut components = vec![self.round(c.x), self.round(c.y)];
        if let Some(z) = c.z {
            components.push(self.round(z));
        }
        json!(components)
    }

    fn round(&self, value: f64) -> f64 {
        // decimal rounding through the shortest representation avoids the
        // overflow of scaling large projected coordinates by 10^precision
        format!("{:.*}", self.precision, value)
            .parse()
            .unwrap_or(value)
    }
}

/// Serializes `geometry`, optionally dropping z values first.
pub fn to_geojson(geometry: &Geometry, flatten: bool, precision: Option<usize>) -> Value {
    let converter = GeometryGeoJson::new(precision);
    if flatten && geometry.has_z() {
        let mut flat = geometry.clone();
        flat.flatten_2d();
        converter.convert(&flat)
    } else {
        converter.convert(geometry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::GeometryBuilder;
    use serde_json::json;

    fn round_trip(geometry: Value, flatten: bool) {
        let built = GeometryBuilder::new(flatten).create(&geometry).unwrap();
        assert_eq!(GeometryGeoJson::default().convert(&built), geometry);
    }

    #[test]
    fn test_round_trip_2d() {
        round_trip(json!({"type": "Point", "coordinates": [27.7734375, 53.748710796898976]}), true);
        round_trip(
            json!({"type": "LineString", "coordinates": [[0.0, 0.0], [1.5, 2.5]]}),
            true,
        );
        round_trip(
            json!({"type": "Polygon", "coordinates": [
                [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 0.0]],
                [[1.0, 1.0], [2.0, 1.0], [2.0, 2.0], [1.0, 1.0]]
            ]}),
            true,
        );
        round_trip(
            json!({"type": "MultiPolygon", "coordinates": [
                [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]],
                [[[5.0, 5.0], [6.0, 5.0], [6.0, 6.0], [5.0, 5.0]]]
            ]}),
            true,
        );
        round_trip(
            json!({"type": "MultiLineString", "coordinates": [[[0.0, 0.0], [1.0, 1.0]], [[2.0, 2.0], [3.0, 3.0]]]}),
            true,
        );
        round_trip(
            json!({"type": "GeometryCollection", "geometries": [
                {"type": "Point", "coordinates": [1.0, 2.0]},
                {"type": "LineString", "coordinates": [[0.0, 0.0], [1.0, 1.0]]}
            ]}),
            true,
        );
        round_trip(
            json!({"type": "MultiPoint", "coordinates": [[27.7734375, 53.7487107], [28.0, 54.25]]}),
            true,
        );
        round_trip(
            json!({"type": "LinearRing", "coordinates": [[0.0, 0.0], [4.0, 0.0], [4.0, 3.0], [0.0, 0.0]]}),
            true,
        );
    }

    #[test]
    fn test_round_trip_3d() {
        round_trip(json!({"type": "Point", "coordinates": [1.0, 2.0, 3.0]}), false);
        round_trip(
            json!({"type": "Polygon", "coordinates": [
                [[0.0, 0.0, 1.0], [10.0, 0.0, 2.0], [10.0, 10.0, 3.0], [0.0, 0.0, 1.0]]
            ]}),
            false,
        );
        round_trip(
            json!({"type": "MultiPoint", "coordinates": [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]}),
            false,
        );
        round_trip(
            json!({"type": "LineString", "coordinates": [[0.0, 0.0, 10.5], [1.5, 2.5, 11.25]]}),
            false,
        );
        round_trip(
            json!({"type": "MultiLineString", "coordinates": [
                [[0.0, 0.0, 1.0], [1.0, 1.0, 2.0]],
                [[2.0, 2.0, 3.0], [3.0, 3.0, 4.0]]
            ]}),
            false,
        );
        round_trip(
            json!({"type": "MultiPolygon", "coordinates": [
                [[[0.0, 0.0, 5.0], [1.0, 0.0, 5.0], [1.0, 1.0, 5.0], [0.0, 0.0, 5.0]]],
                [
                    [[5.0, 5.0, 7.0], [9.0, 5.0, 7.0], [9.0, 9.0, 7.0], [5.0, 5.0, 7.0]],
                    [[6.0, 6.0, 7.0], [7.0, 6.0, 7.0], [7.0, 7.0, 7.0], [6.0, 6.0, 7.0]]
                ]
            ]}),
            false,
        );
        round_trip(
            json!({"type": "GeometryCollection", "geometries": [
                {"type": "Point", "coordinates": [1.0, 2.0, 3.0]},
                {"type": "LineString", "coordinates": [[0.0, 0.0, 1.0], [1.0, 1.0, 2.0]]},
                {"type": "Polygon", "coordinates": [
                    [[0.0, 0.0, 1.0], [2.0, 0.0, 1.0], [2.0, 2.0, 1.0], [0.0, 0.0, 1.0]]
                ]}
            ]}),
            false,
        );
    }

    #[test]
    fn test_precision() {
        let point = Geometry::Point(Coord::new(26.999700868340735, 53.16117354432605));
        let value = GeometryGeoJson::new(Some(9)).convert(&point);
        assert_eq!(value, json!({"type": "Point", "coordinates": [26.999700868, 53.161173544]}));

        let projected = Geometry::Point(Coord::new(6234399.99998708, 554680.0000046358));
        let value = GeometryGeoJson::new(Some(2)).convert(&projected);
        assert_eq!(value, json!({"type": "Point", "coordinates": [6234400.0, 554680.0]}));

        // zero digits falls back to the default
        let value = GeometryGeoJson::new(Some(0)).convert(&point);
        assert_eq!(value, GeometryGeoJson::new(None).convert(&point));
        assert_eq!(GeometryGeoJson::new(Some(0)).precision, DEFAULT_PRECISION);
    }

    #[test]
    fn test_to_geojson_flatten() {
        let line = Geometry::LineString(vec![Coord::new_3d(1.0, 2.0, 3.0), Coord::new_3d(4.0, 5.0, 6.0)]);
        assert_eq!(
            to_geojson(&line, true, None),
            json!({"type": "LineString", "coordinates": [[1.0, 2.0], [4.0, 5.0]]})
        );
        assert_eq!(
            to_geojson(&line, false, None),
            json!({"type": "LineString", "coordinates": [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]})
        );
    }
}
