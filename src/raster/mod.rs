//! In-memory raster datasets and the warp/crop/union engine.

mod affine;
pub mod crop;
mod element;
pub mod io;
pub mod options;
pub mod rasterize;
pub mod union;
pub mod vectorize;
pub mod warp;

use std::collections::BTreeMap;
use std::fmt::Display;

use ndarray::{Array3, ArrayView2, ArrayViewMut2, Axis};
use tracing::debug;

pub use affine::Affine;
pub use crop::{crop_by_geometry, CropOptions};
pub use element::{fill_value, DataType, RasterElement};
pub use io::{is_valid, probe_data_type};
pub use options::{
    Compress, EsriShape, GTiff, GeoJsonDriver, Gpkg, Jp2OpenJpeg, Mem, Png, RasterDriver,
    VectorDriver,
};
pub use rasterize::rasterize;
pub use union::{union, UnionOptions};
pub use vectorize::VALUE_FIELD;
pub use warp::{fast_warp, fast_warp_as_array, warp, Cutline, Resampling, WarpOptions};

use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::srs::{SpatialReference, Transformer};

/// Placement of a raster: its spatial reference and pixel-to-CRS transform.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoInfo {
    pub srs: SpatialReference,
    pub transform: Affine,
}

impl GeoInfo {
    pub fn new(srs: SpatialReference, transform: Affine) -> Self {
        Self { srs, transform }
    }

    pub fn from_epsg(epsg: u32, transform: Affine) -> Result<Self> {
        Ok(Self::new(SpatialReference::from_epsg(epsg)?, transform))
    }

    pub fn epsg(&self) -> Option<u32> {
        self.srs.epsg()
    }

    pub fn resolution(&self) -> (f64, f64) {
        self.transform.resolution()
    }
}

/// A multi-band raster held in memory as a `(bands, rows, cols)` array.
#[derive(Debug, Clone)]
pub struct RasterDataset<T: RasterElement> {
    data: Array3<T>,
    geoinfo: Option<GeoInfo>,
    nodata: Vec<Option<f64>>,
    meta: BTreeMap<String, String>,
}

impl<T: RasterElement> RasterDataset<T> {
    /// Zero-filled dataset of shape `[rows, cols]` or `[bands, rows, cols]`.
    pub fn create(shape: &[usize], geoinfo: Option<GeoInfo>) -> Result<Self> {
        let shape = match *shape {
            [rows, cols] => (1, rows, cols),
            [bands, rows, cols] => (bands, rows, cols),
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "raster shape must have 2 or 3 dimensions, got {shape:?}"
                )))
            }
        };
        Self::from_array(Array3::default(shape), geoinfo)
    }

    pub fn from_array(data: Array3<T>, geoinfo: Option<GeoInfo>) -> Result<Self> {
        let (bands, rows, cols) = data.dim();
        if bands == 0 || rows == 0 || cols == 0 {
            return Err(Error::InvalidArgument(format!(
                "raster must not be empty, got shape ({bands}, {rows}, {cols})"
            )));
        }
        Ok(Self {
            data,
            geoinfo,
            nodata: vec![None; bands],
            meta: BTreeMap::new(),
        })
    }

    pub fn data(&self) -> &Array3<T> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array3<T> {
        &mut self.data
    }

    pub fn into_data(self) -> Array3<T> {
        self.data
    }

    /// Zero-based band view.
    pub fn band(&self, index: usize) -> Result<ArrayView2<'_, T>> {
        self.check_band(index)?;
        Ok(self.data.index_axis(Axis(0), index))
    }

    pub fn band_mut(&mut self, index: usize) -> Result<ArrayViewMut2<'_, T>> {
        self.check_band(index)?;
        Ok(self.data.index_axis_mut(Axis(0), index))
    }

    fn check_band(&self, index: usize) -> Result<()> {
        if index >= self.band_count() {
            return Err(Error::InvalidArgument(format!(
                "band {index} out of range, dataset has {} bands",
                self.band_count()
            )));
        }
        Ok(())
    }

    /// `(bands, rows, cols)`
    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn band_count(&self) -> usize {
        self.data.dim().0
    }

    pub fn dtype(&self) -> DataType {
        T::DATA_TYPE
    }

    pub fn geoinfo(&self) -> Option<&GeoInfo> {
        self.geoinfo.as_ref()
    }

    pub fn set_geoinfo(&mut self, geoinfo: Option<GeoInfo>) {
        self.geoinfo = geoinfo;
    }

    pub(crate) fn require_geoinfo(&self) -> Result<&GeoInfo> {
        self.geoinfo
            .as_ref()
            .ok_or_else(|| Error::InvalidArgument("raster dataset has no GeoInfo".to_string()))
    }

    pub fn srs(&self) -> Option<&SpatialReference> {
        self.geoinfo.as_ref().map(|g| &g.srs)
    }

    /// Per-band nodata values.
    pub fn nodata(&self) -> &[Option<f64>] {
        &self.nodata
    }

    pub fn band_nodata(&self, index: usize) -> Option<f64> {
        self.nodata.get(index).copied().flatten()
    }

    /// Sets the same nodata value on every band.
    pub fn set_nodata(&mut self, nodata: Option<f64>) {
        self.nodata = vec![nodata; self.band_count()];
    }

    pub fn set_band_nodata(&mut self, index: usize, nodata: Option<f64>) -> Result<()> {
        self.check_band(index)?;
        self.nodata[index] = nodata;
        Ok(())
    }

    /// Replaces the nodata list; its length must match the band count.
    pub fn set_nodata_per_band(&mut self, nodata: Vec<Option<f64>>) -> Result<()> {
        if nodata.len() != self.band_count() {
            return Err(Error::InvalidArgument(format!(
                "{} nodata values given for {} bands",
                nodata.len(),
                self.band_count()
            )));
        }
        self.nodata = nodata;
        Ok(())
    }

    pub fn meta(&self) -> &BTreeMap<String, String> {
        &self.meta
    }

    /// Replaces the whole metadata map. Values are stored as their string form.
    pub fn set_meta<I, K, V>(&mut self, meta: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Display,
    {
        self.meta = meta
            .into_iter()
            .map(|(k, v)| (k.into(), v.to_string()))
            .collect();
    }

    pub fn resolution(&self) -> Result<(f64, f64)> {
        Ok(self.require_geoinfo()?.resolution())
    }

    /// `[[x_min, y_min], [x_max, y_max]]`, in `srs` when given, otherwise in
    /// the dataset's own CRS.
    pub fn bounds(&self, srs: Option<&SpatialReference>) -> Result<[[f64; 2]; 2]> {
        let geoinfo = self.require_geoinfo()?;
        let (_, rows, cols) = self.shape();
        let mut bounds = geoinfo.transform.bounds(rows, cols);
        if let Some(srs) = srs {
            if srs != &geoinfo.srs {
                bounds = Transformer::new(&geoinfo.srs, srs)?.transform_bounds(&bounds)?;
            }
        }
        Ok([[bounds[0], bounds[1]], [bounds[2], bounds[3]]])
    }

    /// Places the raster so that it exactly covers `bounds` in `srs`.
    pub fn set_bounds(&mut self, bounds: [[f64; 2]; 2], srs: SpatialReference) -> Result<()> {
        let [[x_min, y_min], [x_max, y_max]] = bounds;
        if !(x_max > x_min && y_max > y_min) {
            return Err(Error::InvalidArgument(format!(
                "bounds must be [[x_min, y_min], [x_max, y_max]], got {bounds:?}"
            )));
        }
        let (_, rows, cols) = self.shape();
        let transform = Affine::north_up(
            x_min,
            y_max,
            (x_max - x_min) / cols as f64,
            (y_max - y_min) / rows as f64,
        );
        debug!("set_bounds {:?} in {}", bounds, srs);
        self.geoinfo = Some(GeoInfo::new(srs, transform));
        Ok(())
    }

    /// Closed footprint ring in the dataset's CRS.
    pub fn bounds_polygon(&self) -> Result<Geometry> {
        let [[x_min, y_min], [x_max, y_max]] = self.bounds(None)?;
        Ok(Geometry::from_bbox(x_min, y_min, x_max, y_max))
    }

    /// Pixel values of every band under each point, `None` for points
    /// outside the raster. Points are in the dataset's CRS.
    pub fn values_by_points(&self, points: &[Geometry]) -> Result<Vec<Option<Vec<T>>>> {
        let transform = self.require_geoinfo()?.transform;
        let (_, rows, cols) = self.shape();

        points
            .iter()
            .map(|point| {
                let Geometry::Point(c) = point else {
                    return Err(Error::InvalidArgument(format!(
                        "values_by_points expects points, got {}",
                        point.type_name()
                    )));
                };
                let (col, row) = transform.to_pixel(c.x, c.y);
                let (col, row) = (col.floor(), row.floor());
                if !(col >= 0.0 && row >= 0.0) || col >= cols as f64 || row >= rows as f64 {
                    return Ok(None);
                }
                let (col, row) = (col as usize, row as usize);
                Ok(Some(
                    self.data.slice(ndarray::s![.., row, col]).to_vec(),
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Coord;
    use crate::srs::WGS84;
    use ndarray::Array3;

    fn sample() -> RasterDataset<u8> {
        let data = Array3::from_shape_fn((2, 4, 5), |(b, r, c)| (b * 100 + r * 10 + c) as u8);
        let geoinfo = GeoInfo::from_epsg(32635, Affine::north_up(1000.0, 2000.0, 10.0, 10.0)).unwrap();
        RasterDataset::from_array(data, Some(geoinfo)).unwrap()
    }

    #[test]
    fn test_create_shapes() {
        let ds = RasterDataset::<f32>::create(&[3, 4], None).unwrap();
        assert_eq!(ds.shape(), (1, 3, 4));
        assert_eq!(ds.nodata(), &[None]);
        let ds = RasterDataset::<u16>::create(&[2, 3, 4], None).unwrap();
        assert_eq!(ds.shape(), (2, 3, 4));
        assert_eq!(ds.dtype(), DataType::UInt16);
        assert!(RasterDataset::<u8>::create(&[3], None).is_err());
        assert!(RasterDataset::<u8>::create(&[0, 3], None).is_err());
    }

    #[test]
    fn test_bounds_and_polygon() {
        let ds = sample();
        assert_eq!(ds.bounds(None).unwrap(), [[1000.0, 1960.0], [1050.0, 2000.0]]);
        assert_eq!(ds.resolution().unwrap(), (10.0, 10.0));

        let polygon = ds.bounds_polygon().unwrap();
        let Geometry::Polygon(rings) = polygon else {
            panic!("expected a polygon");
        };
        let ring: Vec<(f64, f64)> = rings[0].iter().map(|c| (c.x, c.y)).collect();
        assert_eq!(
            ring,
            vec![
                (1000.0, 1960.0),
                (1050.0, 1960.0),
                (1050.0, 2000.0),
                (1000.0, 2000.0),
                (1000.0, 1960.0)
            ]
        );
    }

    #[test]
    fn test_set_bounds() {
        let mut ds = RasterDataset::<u8>::create(&[100, 100], None).unwrap();
        assert!(ds.bounds(None).is_err());
        let wgs84 = SpatialReference::from_epsg(WGS84).unwrap();
        ds.set_bounds([[27.0, 53.0], [28.0, 54.0]], wgs84.clone()).unwrap();
        assert_eq!(
            ds.geoinfo().unwrap().transform.to_gdal(),
            [27.0, 0.01, 0.0, 54.0, 0.0, -0.01]
        );
        assert_eq!(ds.srs(), Some(&wgs84));
        assert!(ds.set_bounds([[28.0, 53.0], [27.0, 54.0]], wgs84).is_err());
    }

    #[test]
    fn test_values_by_points() {
        let ds = sample();
        let points = [
            Geometry::Point(Coord::new(1000.0, 2000.0)),
            Geometry::Point(Coord::new(1025.0, 1975.0)),
            Geometry::Point(Coord::new(1049.9, 1960.1)),
            Geometry::Point(Coord::new(1050.0, 1990.0)),
            Geometry::Point(Coord::new(1010.0, 1960.0)),
            Geometry::Point(Coord::new(999.0, 1990.0)),
        ];
        let values = ds.values_by_points(&points).unwrap();
        assert_eq!(values[0], Some(vec![0, 100]));
        assert_eq!(values[1], Some(vec![22, 122]));
        assert_eq!(values[2], Some(vec![34, 134]));
        assert_eq!(values[3], None);
        assert_eq!(values[4], None);
        assert_eq!(values[5], None);

        let line = Geometry::LineString(vec![Coord::new(0.0, 0.0), Coord::new(1.0, 1.0)]);
        assert!(ds.values_by_points(&[line]).is_err());
    }

    #[test]
    fn test_meta_is_replaced() {
        let mut ds = sample();
        ds.set_meta([("iso_date", "2021-01-01"), ("band", "B04")]);
        ds.set_meta([("cloud_cover", 12.5)]);
        assert_eq!(ds.meta().len(), 1);
        assert_eq!(ds.meta()["cloud_cover"], "12.5");
    }

    #[test]
    fn test_nodata() {
        let mut ds = sample();
        ds.set_nodata(Some(255.0));
        assert_eq!(ds.nodata(), &[Some(255.0), Some(255.0)]);
        ds.set_band_nodata(1, None).unwrap();
        assert_eq!(ds.band_nodata(1), None);
        assert!(ds.set_band_nodata(2, None).is_err());
        assert!(ds.set_nodata_per_band(vec![None]).is_err());
    }
}
