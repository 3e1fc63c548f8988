use serde_json::Value;

use super::{Coord, CoordSeq, Geometry};
use crate::error::{Error, Result};

/// Builds [`Geometry`] values from GeoJSON geometry objects.
///
/// With `flatten` enabled (the default) only the first two components of
/// every position are kept.
#[derive(Debug, Clone, Copy)]
pub struct GeometryBuilder {
    pub flatten: bool,
}

impl Default for GeometryBuilder {
    fn default() -> Self {
        Self { flatten: true }
    }
}

impl GeometryBuilder {
    pub fn new(flatten: bool) -> Self {
        Self { flatten }
    }

    /// Parses a serialized GeoJSON geometry and builds it.
    pub fn create_from_str(&self, geometry: &str) -> Result<Geometry> {
        let value: Value = serde_json::from_str(geometry)?;
        self.create(&value)
    }

    pub fn create(&self, geometry: &Value) -> Result<Geometry> {
        let geometry_type = geometry
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidGeoJson("missing \"type\" member".to_string()))?
            .to_lowercase();

        match geometry_type.as_str() {
            "point" => self.create_point(coordinates(geometry)?),
            "multipoint" => self.create_multipoint(coordinates(geometry)?),
            "linestring" => self.create_linestring(coordinates(geometry)?),
            "linearring" => self.create_linearring(coordinates(geometry)?),
            "polygon" => self.create_polygon(coordinates(geometry)?),
            "multilinestring" => self.create_multilinestring(coordinates(geometry)?),
            "multipolygon" => self.create_multipolygon(coordinates(geometry)?),
            "geometrycollection" => {
                let geometries = geometry.get("geometries").ok_or_else(|| {
                    Error::InvalidGeoJson("GeometryCollection without \"geometries\"".to_string())
                })?;
                self.create_geometrycollection(geometries)
            }
            _ => Err(Error::UnsupportedGeometryType(geometry_type)),
        }
    }

    pub fn create_point(&self, coordinates: &Value) -> Result<Geometry> {
        Ok(Geometry::Point(self.position(coordinates)?))
    }

    pub fn create_multipoint(&self, coordinates: &Value) -> Result<Geometry> {
        Ok(Geometry::MultiPoint(self.positions(coordinates)?))
    }

    pub fn create_linestring(&self, coordinates: &Value) -> Result<Geometry> {
        Ok(Geometry::LineString(self.positions(coordinates)?))
    }

    pub fn create_linearring(&self, coordinates: &Value) -> Result<Geometry> {
        Ok(Geometry::LinearRing(self.positions(coordinates)?))
    }

    pub fn create_polygon(&self, coordinates: &Value) -> Result<Geometry> {
        Ok(Geometry::Polygon(self.rings(coordinates)?))
    }

    pub fn create_multilinestring(&self, coordinates: &Value) -> Result<Geometry> {
        Ok(Geometry::MultiLineString(self.rings(coordinates)?))
    }

    pub fn create_multipolygon(&self, coordinates: &Value) -> Result<Geometry> {
        let polygons = as_array(coordinates)?
            .iter()
            .map(|polygon| self.rings(polygon))
            .collect::<Result<Vec<_>>>()?;
        Ok(Geometry::MultiPolygon(polygons))
    }

    pub fn create_geometrycollection(&self, geometries: &Value) -> Result<Geometry> {
        let geometries = as_array(geometries)?
            .iter()
            .map(|g| self.create(g))
            .collect::<Result<Vec<_>>>()?;
        Ok(Geometry::GeometryCollection(geometries))
    }

    fn rings(&self, coordinates: &Value) -> Result<Vec<CoordSeq>> {
        as_array(coordinates)?
            .iter()
            .map(|ring| self.positions(ring))
            .collect()
    }

    fn positions(&self, coordinates: &Value) -> Result<CoordSeq> {
        as_array(coordinates)?
            .iter()
            .map(|p| self.position(p))
            .collect()
    }

    fn position(&self, position: &Value) -> Result<Coord> {
        let components = as_array(position)?
            .iter()
            .map(|c| {
                c.as_f64()
                    .ok_or_else(|| Error::InvalidGeoJson(format!("non-numeric coordinate {c}")))
            })
            .collect::<Result<Vec<f64>>>()?;

        match (components.as_slice(), self.flatten) {
            ([x, y], _) | ([x, y, ..], true) => Ok(Coord::new(*x, *y)),
            ([x, y, z, ..], false) => Ok(Coord::new_3d(*x, *y, *z)),
            _ => Err(Error::InvalidGeoJson(format!(
                "position needs at least two components, got {position}"
            ))),
        }
    }
}

fn coordinates(geometry: &Value) -> Result<&Value> {
    geometry
        .get("coordinates")
        .ok_or_else(|| Error::InvalidGeoJson("missing \"coordinates\" member".to_string()))
}

fn as_array(value: &Value) -> Result<&Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| Error::InvalidGeoJson(format!("expected an array, got {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_polygon_flattens_by_default() {
        let geometry = json!({
            "type": "Polygon",
            "coordinates": [[[0, 0, 5], [1, 0, 5], [1, 1, 5], [0, 0, 5]]]
        });
        let polygon = GeometryBuilder::default().create(&geometry).unwrap();
        assert!(!polygon.has_z());
        assert_eq!(polygon.coords().len(), 4);

        let polygon = GeometryBuilder::new(false).create(&geometry).unwrap();
        assert_eq!(polygon.coords()[0], &Coord::new_3d(0.0, 0.0, 5.0));
    }

    #[test]
    fn test_type_is_case_insensitive() {
        let point = GeometryBuilder::default()
            .create(&json!({"type": "POINT", "coordinates": [27.77, 53.74]}))
            .unwrap();
        assert_eq!(point, Geometry::Point(Coord::new(27.77, 53.74)));
    }

    #[test]
    fn test_create_from_str() {
        let collection = GeometryBuilder::default()
            .create_from_str(
                r#"{"type": "GeometryCollection", "geometries": [
                    {"type": "Point", "coordinates": [1, 2]},
                    {"type": "MultiLineString", "coordinates": [[[0, 0], [1, 1]], [[2, 2], [3, 3]]]}
                ]}"#,
            )
            .unwrap();
        let Geometry::GeometryCollection(members) = collection else {
            panic!("expected a collection");
        };
        assert_eq!(members.len(), 2);
        assert_eq!(members[1].type_name(), "MultiLineString");
    }

    #[test]
    fn test_unsupported_type() {
        let err = GeometryBuilder::default()
            .create(&json!({"type": "Circle", "coordinates": [0, 0], "radius": 3}))
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedGeometryType(ref t) if t == "circle"));
    }

    #[test]
    fn test_malformed_positions() {
        let err = GeometryBuilder::default()
            .create(&json!({"type": "Point", "coordinates": [1]}))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidGeoJson(_)));

        let err = GeometryBuilder::default()
            .create(&json!({"type": "LineString"}))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidGeoJson(_)));
    }
}
