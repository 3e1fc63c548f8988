use gdal::cpl::CslStringList;
use serde_json::Value;
use tracing::debug;

use super::{ogr, Geometry, GeometryBuilder, GeometryGeoJson};
use crate::error::{Error, Result};

/// Repairs an invalid (multi)polygon.
///
/// Rings are closed, the geometry goes through GEOS make-valid, and a mixed
/// collection result is reduced to the union of its polygonal members. A
/// MultiPolygon input always comes back as a MultiPolygon.
pub fn make_valid(geometry: &Geometry) -> Result<Geometry> {
    let mut closed = geometry.clone();
    closed.close_rings();

    let valid = ogr::to_ogr(&closed)?
        .make_valid(&CslStringList::new())
        .map_err(|e| Error::GeometryRepair(format!("{} input: {e}", geometry.type_name())))?;

    let repaired = if valid.geometry_name() == "GEOMETRYCOLLECTION" {
        union_polygonal_members(&valid, geometry)?
    } else {
        ogr::from_ogr(&valid)?
    };

    match (geometry, repaired) {
        (Geometry::MultiPolygon(_), Geometry::Polygon(rings)) => {
            Ok(Geometry::MultiPolygon(vec![rings]))
        }
        (_, repaired) => Ok(repaired),
    }
}

fn union_polygonal_members(
    collection: &gdal::vector::Geometry,
    original: &Geometry,
) -> Result<Geometry> {
    debug!(
        "make_valid produced a collection of {} members, merging polygonal parts",
        collection.geometry_count()
    );

    let mut union: Option<gdal::vector::Geometry> = None;
    for i in 0..collection.geometry_count() {
        let member = collection.get_geometry(i);
        let name = member.geometry_name();
        if name != "POLYGON" && name != "MULTIPOLYGON" {
            continue;
        }
        let member = ogr::to_ogr(&ogr::from_ogr(&member)?)?;
        union = match union {
            None => Some(member),
            Some(acc) => Some(acc.union(&member).ok_or_else(|| {
                Error::GeometryRepair("union of repaired parts failed".to_string())
            })?),
        };
    }

    match union {
        Some(g) => ogr::from_ogr(&g),
        None => Ok(empty_like(original)),
    }
}

fn empty_like(geometry: &Geometry) -> Geometry {
    match geometry {
        Geometry::MultiPolygon(_) => Geometry::MultiPolygon(Vec::new()),
        _ => Geometry::Polygon(Vec::new()),
    }
}

pub fn make_valid_geojson(geometry: &Value, precision: Option<usize>) -> Result<Value> {
    let geometry = GeometryBuilder::default().create(geometry)?;
    let valid = make_valid(&geometry)?;
    Ok(GeometryGeoJson::new(precision).convert(&valid))
}
