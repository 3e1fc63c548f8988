//! Raster to polygon conversion through GDAL's polygonize algorithm.

use gdal::vector::{LayerAccess, LayerOptions, OGRFieldType, OGRwkbGeometryType};
use gdal::DriverManager;
use tracing::info;

use super::{RasterDataset, RasterElement};
use crate::error::{Error, Result};
use crate::gdal_interop::check_rc;
use crate::progress::Progress;
use crate::vector::VectorDataset;

/// Name of the attribute holding each polygon's pixel value.
pub const VALUE_FIELD: &str = "value";

impl<T: RasterElement> RasterDataset<T> {
    /// Polygonizes band `band` (zero-based): one feature per connected
    /// region of equal pixels, carrying the pixel value in a `value` field.
    /// Nodata pixels produce no polygons.
    pub fn to_vector(&self, band: usize, mut progress: Progress<'_>) -> Result<VectorDataset> {
        self.band(band)?;
        let source = self.to_gdal()?;
        let raster_band = source.rasterband(band + 1)?;

        let mut target = DriverManager::get_driver_by_name("Memory")?.create_vector_only("")?;
        let srs = self.srs().map(|s| s.to_spatial_ref());
        let layer = target.create_layer(LayerOptions {
            name: "polygons",
            srs: srs.as_ref(),
            ty: OGRwkbGeometryType::wkbPolygon,
            ..Default::default()
        })?;
        let field_type = if T::DATA_TYPE.is_float() {
            OGRFieldType::OFTReal
        } else {
            OGRFieldType::OFTInteger64
        };
        layer.create_defn_fields(&[(VALUE_FIELD, field_type)])?;

        let (progress_fn, progress_arg) = progress.as_gdal();
        let rc = unsafe {
            let mask = if self.band_nodata(band).is_some() {
                gdal_sys::GDALGetMaskBand(raster_band.c_rasterband())
            } else {
                std::ptr::null_mut()
            };
            if T::DATA_TYPE.is_float() {
                gdal_sys::GDALFPolygonize(
                    raster_band.c_rasterband(),
                    mask,
                    layer.c_layer(),
                    0,
                    std::ptr::null_mut(),
                    progress_fn,
                    progress_arg,
                )
            } else {
                gdal_sys::GDALPolygonize(
                    raster_band.c_rasterband(),
                    mask,
                    layer.c_layer(),
                    0,
                    std::ptr::null_mut(),
                    progress_fn,
                    progress_arg,
                )
            }
        };
        if progress.is_cancelled() {
            return Err(Error::Cancelled);
        }
        check_rc(rc)?;
        drop(layer);

        let vector = VectorDataset::from_gdal(&target)?;
        info!(
            "Polygonized band {} of {:?} into {} features",
            band,
            self.shape(),
            vector.len()
        );
        Ok(vector)
    }
}
