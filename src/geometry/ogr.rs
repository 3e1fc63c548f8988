//! Bridge between [`Geometry`] and GDAL/OGR geometries.
//!
//! The exchange format is GeoJSON text, so OGR sees exactly the coordinates
//! the builder and serializer work with.

use gdal::vector::Geometry as OgrGeometry;

use super::{Geometry, GeometryBuilder, GeometryGeoJson};
use crate::error::{Error, Result};

/// OGR geometry names that have a [`Geometry`] counterpart.
const SUPPORTED: &[&str] = &[
    "point",
    "multipoint",
    "linestring",
    "linearring",
    "polygon",
    "multilinestring",
    "multipolygon",
    "geometrycollection",
];

pub fn to_ogr(geometry: &Geometry) -> Result<OgrGeometry> {
    let value = match geometry {
        // OGR's GeoJSON reader has no LinearRing type
        Geometry::LinearRing(points) => {
            GeometryGeoJson::default().convert(&Geometry::LineString(points.clone()))
        }
        other => GeometryGeoJson::default().convert(other),
    };
    Ok(OgrGeometry::from_geojson(&value.to_string())?)
}

pub fn from_ogr(geometry: &OgrGeometry) -> Result<Geometry> {
    let name = geometry.geometry_name().to_lowercase();
    if !SUPPORTED.contains(&name.as_str()) {
        return Err(Error::UnsupportedGeometryType(name));
    }
    GeometryBuilder::new(false).create_from_str(&geometry.json()?)
}
