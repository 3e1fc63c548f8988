use serde_json::Value;

use crate::error::{Error, Result};
use crate::geometry::{Geometry, GeometryBuilder, GeometryGeoJson};
use crate::srs::{SpatialReference, Transformer};

/// Reprojects `geometry` from `from_srs` to `to_srs`.
///
/// The input geometry and both references are left untouched; the result is
/// a new geometry.
pub fn transform_by_srs(
    geometry: &Geometry,
    from_srs: &SpatialReference,
    to_srs: &SpatialReference,
) -> Result<Geometry> {
    let transformer = Transformer::new(from_srs, to_srs)?;
    transform_with(geometry, &transformer)
}

/// Reprojects `geometry` with an already built transformer.
pub fn transform_with(geometry: &Geometry, transformer: &Transformer) -> Result<Geometry> {
    let coords = geometry.coords();
    let mut x: Vec<f64> = coords.iter().map(|c| c.x).collect();
    let mut y: Vec<f64> = coords.iter().map(|c| c.y).collect();
    let mut z: Vec<f64> = if coords.iter().all(|c| c.z.is_some()) {
        coords.iter().map(|c| c.z.unwrap_or_default()).collect()
    } else {
        Vec::new()
    };

    let mut result = geometry.clone();
    if x.is_empty() {
        return Ok(result);
    }
    transformer.transform_coords(&mut x, &mut y, &mut z)?;

    let mut i = 0;
    result.map_coords_in_place(&mut |c| {
        c.x = x[i];
        c.y = y[i];
        if let Some(zi) = z.get(i) {
            c.z = Some(*zi);
        }
        i += 1;
    });
    Ok(result)
}

/// Reprojects `geometry` between two EPSG codes. An unknown code on either
/// side fails with [`Error::Transform`].
pub fn transform(geometry: &Geometry, from_epsg: u32, to_epsg: u32) -> Result<Geometry> {
    let transform_error = |e: Error| Error::Transform {
        from: format!("EPSG:{from_epsg}"),
        to: format!("EPSG:{to_epsg}"),
        message: e.to_string(),
    };
    let from_srs = SpatialReference::from_epsg(from_epsg).map_err(transform_error)?;
    let to_srs = SpatialReference::from_epsg(to_epsg).map_err(transform_error)?;
    transform_by_srs(geometry, &from_srs, &to_srs)
}

/// Builds, reprojects and serializes a GeoJSON geometry in one go.
pub fn transform_geojson(
    geometry: &Value,
    from_epsg: u32,
    to_epsg: u32,
    flatten: bool,
    precision: Option<usize>,
) -> Result<Value> {
    let geometry = GeometryBuilder::new(flatten).create(geometry)?;
    let transformed = transform(&geometry, from_epsg, to_epsg)?;
    Ok(GeometryGeoJson::new(precision).convert(&transformed))
}

/// A geometry together with the spatial reference its coordinates are in.
#[derive(Debug, Clone)]
pub struct GeoGeometry {
    pub geometry: Geometry,
    pub srs: SpatialReference,
}

impl GeoGeometry {
    pub fn new(geometry: Geometry, srs: SpatialReference) -> Self {
        Self { geometry, srs }
    }

    pub fn from_geojson(geometry: &Value, srs: SpatialReference) -> Result<Self> {
        Ok(Self::new(GeometryBuilder::default().create(geometry)?, srs))
    }

    pub fn transform(&self, srs: &SpatialReference) -> Result<GeoGeometry> {
        if &self.srs == srs {
            return Ok(GeoGeometry::new(self.geometry.clone(), srs.clone()));
        }
        Ok(GeoGeometry::new(
            transform_by_srs(&self.geometry, &self.srs, srs)?,
            srs.clone(),
        ))
    }
}
