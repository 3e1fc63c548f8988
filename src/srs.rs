//! Spatial references and coordinate transformations.
//!
//! Every [`SpatialReference`] is pinned to the traditional GIS axis order
//! (x/longitude first). EPSG:4326 is latitude-first by authority; honouring
//! that would swap the axes of every GeoJSON coordinate we hand to PROJ.

use std::fmt;

use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};

use crate::error::{Error, Result};

pub const WGS84: u32 = 4326;
pub const WEB_MERCATOR: u32 = 3857;

#[derive(Clone)]
pub struct SpatialReference {
    srs: SpatialRef,
}

impl SpatialReference {
    pub fn from_epsg(epsg: u32) -> Result<Self> {
        Ok(Self::from_spatial_ref(&SpatialRef::from_epsg(epsg)?))
    }

    /// PROJ parameter string such as `+proj=aea +lat_0=-32 ...`.
    pub fn from_proj4(proj4: &str) -> Result<Self> {
        Ok(Self::from_spatial_ref(&SpatialRef::from_proj4(proj4)?))
    }

    pub fn from_wkt(wkt: &str) -> Result<Self> {
        Ok(Self::from_spatial_ref(&SpatialRef::from_wkt(wkt)?))
    }

    /// Anything `OSRSetFromUserInput` understands: `EPSG:32635`, WKT, PROJ strings.
    pub fn from_definition(definition: &str) -> Result<Self> {
        Ok(Self::from_spatial_ref(&SpatialRef::from_definition(definition)?))
    }

    /// Wraps an externally managed reference; the caller's object is cloned
    /// and never modified.
    pub fn from_spatial_ref(srs: &SpatialRef) -> Self {
        Self {
            srs: traditional_order(srs),
        }
    }

    /// Axis-normalized copy of the wrapped GDAL reference.
    pub fn to_spatial_ref(&self) -> SpatialRef {
        traditional_order(&self.srs)
    }

    pub fn as_spatial_ref(&self) -> &SpatialRef {
        &self.srs
    }

    /// EPSG code when the reference is identified by the EPSG authority.
    pub fn epsg(&self) -> Option<u32> {
        let mut srs = self.srs.clone();
        if self.srs.auth_name().as_deref() != Some("EPSG") {
            srs.auto_identify_epsg().ok()?;
        }
        match srs.auth_name().as_deref() {
            Some("EPSG") => srs.auth_code().ok().and_then(|c| u32::try_from(c).ok()),
            _ => None,
        }
    }

    pub fn to_wkt(&self) -> Result<String> {
        Ok(self.srs.to_wkt()?)
    }

    pub fn to_proj4(&self) -> Result<String> {
        Ok(self.srs.to_proj4()?)
    }

    pub fn is_geographic(&self) -> bool {
        self.srs.is_geographic()
    }

    /// Short human readable label used in logs and error messages.
    pub fn label(&self) -> String {
        if let Some(epsg) = self.epsg() {
            return format!("EPSG:{epsg}");
        }
        self.to_proj4()
            .map(|p| p.trim().to_string())
            .unwrap_or_else(|_| "<unknown CRS>".to_string())
    }
}

impl PartialEq for SpatialReference {
    fn eq(&self, other: &Self) -> bool {
        self.srs == other.srs
    }
}

impl fmt::Debug for SpatialReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SpatialReference").field(&self.label()).finish()
    }
}

impl fmt::Display for SpatialReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

fn traditional_order(srs: &SpatialRef) -> SpatialRef {
    let mut srs = srs.clone();
    srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    srs
}

/// Coordinate transformation between two axis-normalized references.
pub struct Transformer {
    inner: CoordTransform,
    from: String,
    to: String,
}

impl Transformer {
    pub fn new(from: &SpatialReference, to: &SpatialReference) -> Result<Self> {
        let (from_label, to_label) = (from.label(), to.label());
        let inner = CoordTransform::new(&from.to_spatial_ref(), &to.to_spatial_ref()).map_err(
            |e| Error::Transform {
                from: from_label.clone(),
                to: to_label.clone(),
                message: e.to_string(),
            },
        )?;
        Ok(Self {
            inner,
            from: from_label,
            to: to_label,
        })
    }

    fn error(&self, e: impl ToString) -> Error {
        Error::Transform {
            from: self.from.clone(),
            to: self.to.clone(),
            message: e.to_string(),
        }
    }

    /// Transforms coordinates in place; `z` may be empty.
    pub fn transform_coords(&self, x: &mut [f64], y: &mut [f64], z: &mut [f64]) -> Result<()> {
        self.inner
            .transform_coords(x, y, z)
            .map_err(|e| self.error(e))
    }

    /// Like [`Transformer::transform_coords`] but points that cannot be
    /// projected become NaN instead of failing the whole batch.
    pub fn transform_coords_lossy(&self, x: &mut [f64], y: &mut [f64]) {
        if self.inner.transform_coords(x, y, &mut []).is_ok() {
            return;
        }
        for (xi, yi) in x.iter_mut().zip(y.iter_mut()) {
            let mut px = [*xi];
            let mut py = [*yi];
            match self.inner.transform_coords(&mut px, &mut py, &mut []) {
                Ok(()) => (*xi, *yi) = (px[0], py[0]),
                Err(_) => (*xi, *yi) = (f64::NAN, f64::NAN),
            }
        }
    }

    /// Transforms an `[x_min, y_min, x_max, y_max]` box, densifying its edges.
    pub fn transform_bounds(&self, bounds: &[f64; 4]) -> Result<[f64; 4]> {
        self.inner
            .transform_bounds(bounds, 21)
            .map_err(|e| self.error(e))
    }
}
