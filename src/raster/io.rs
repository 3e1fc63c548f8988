//! Reading and writing [`RasterDataset`]s through GDAL drivers.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use gdal::raster::Buffer;
use gdal::{Dataset, DriverManager, Metadata};
use ndarray::{Array3, Axis};
use tracing::{debug, info, warn};

use super::options::{Mem, RasterDriver};
use super::{Affine, DataType, GeoInfo, RasterDataset, RasterElement};
use crate::error::{Error, Result};
use crate::srs::SpatialReference;

static VSIMEM_COUNTER: AtomicUsize = AtomicUsize::new(0);

pub(crate) fn vsimem_path(extension: &str) -> String {
    let n = VSIMEM_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!(
        "/vsimem/gdal_boots_{}_{}.{}",
        std::process::id(),
        n,
        extension
    )
}

impl<T: RasterElement> RasterDataset<T> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let dataset = Dataset::open(path)?;
        let raster = Self::from_gdal(&dataset)?;
        info!(
            "Opened {}: shape {:?}, {}",
            path.display(),
            raster.shape(),
            raster.dtype()
        );
        Ok(raster)
    }

    /// Decodes an encoded image (GeoTIFF, PNG, JPEG2000, ...) held in memory.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let path = vsimem_path("bin");
        gdal::vsi::create_mem_file(&path, bytes.to_vec())?;
        let raster = Dataset::open(&path)
            .map_err(Error::from)
            .and_then(|dataset| Self::from_gdal(&dataset));
        if let Err(e) = gdal::vsi::unlink_mem_file(&path) {
            warn!("Failed to release {}: {}", path, e);
        }
        raster
    }

    /// Copies every band of an open GDAL dataset into memory.
    pub fn from_gdal(dataset: &Dataset) -> Result<Self> {
        let (cols, rows) = dataset.raster_size();
        let count = dataset.raster_count() as usize;
        if count == 0 {
            return Err(Error::InvalidArgument(
                "dataset has no raster bands".to_string(),
            ));
        }

        let mut values = Vec::with_capacity(count * rows * cols);
        let mut nodata = Vec::with_capacity(count);
        for index in 1..=count {
            let band = dataset.rasterband(index)?;
            let buffer = band.read_as::<T>((0, 0), (cols, rows), (cols, rows), None)?;
            let (_, band_values) = buffer.into_shape_and_vec();
            values.extend(band_values);
            nodata.push(band.no_data_value());
        }
        let data = Array3::from_shape_vec((count, rows, cols), values)?;

        let geoinfo = match (dataset.geo_transform(), dataset.spatial_ref()) {
            (Ok(gt), Ok(srs)) => Some(GeoInfo::new(
                SpatialReference::from_spatial_ref(&srs),
                Affine::from_gdal(&gt),
            )),
            (Ok(_), Err(_)) => {
                debug!("dataset has a geotransform but no spatial reference, ignoring it");
                None
            }
            _ => None,
        };

        let mut raster = Self::from_array(data, geoinfo)?;
        raster.nodata = nodata;
        raster.meta = dataset
            .metadata_domain("")
            .unwrap_or_default()
            .iter()
            .filter_map(|item| item.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Ok(raster)
    }

    /// Builds an in-memory GDAL dataset holding a copy of this raster.
    pub fn to_gdal(&self) -> Result<Dataset> {
        let (bands, rows, cols) = self.shape();
        let driver = DriverManager::get_driver_by_name(Mem.driver_name())?;
        let mut dataset = driver.create_with_band_type::<T, _>("", cols, rows, bands)?;

        if let Some(geoinfo) = &self.geoinfo {
            dataset.set_geo_transform(&geoinfo.transform.to_gdal())?;
            dataset.set_spatial_ref(&geoinfo.srs.to_spatial_ref())?;
        }

        for (index, band_data) in self.data.axis_iter(Axis(0)).enumerate() {
            let mut band = dataset.rasterband(index + 1)?;
            if let Some(nodata) = self.nodata[index] {
                band.set_no_data_value(Some(nodata))?;
            }
            let mut buffer = Buffer::new((cols, rows), band_data.iter().copied().collect());
            band.write((0, 0), (cols, rows), &mut buffer)?;
        }

        for (key, value) in &self.meta {
            dataset.set_metadata_item(key, value, "")?;
        }
        Ok(dataset)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P, driver: &impl RasterDriver) -> Result<()> {
        let path = path.as_ref();
        let target = DriverManager::get_driver_by_name(driver.driver_name())?;
        let staging = self.to_gdal()?;
        let written = staging.create_copy(&target, path, &driver.csl_options()?)?;
        // closing flushes the file
        drop(written);
        info!(
            "Wrote {} ({}, shape {:?})",
            path.display(),
            driver.driver_name(),
            self.shape()
        );
        Ok(())
    }

    /// Encodes the raster with `driver` and returns the file contents.
    pub fn to_bytes(&self, driver: &impl RasterDriver) -> Result<Vec<u8>> {
        let path = vsimem_path(driver.extension());
        self.to_file(&path, driver)?;
        Ok(gdal::vsi::get_vsi_mem_file_bytes_owned(&path)?)
    }
}

/// Pixel type of the first band of the raster at `path`.
pub fn probe_data_type<P: AsRef<Path>>(path: P) -> Result<DataType> {
    let dataset = Dataset::open(path.as_ref())?;
    let band_type = dataset.rasterband(1)?.band_type();
    DataType::from_gdal(band_type).ok_or_else(|| {
        Error::InvalidArgument(format!("unsupported band type {band_type:?}"))
    })
}

/// True when every block of every band of the raster at `path` decodes.
///
/// Catches truncated or corrupt files that still open because their header
/// is intact.
pub fn is_valid<P: AsRef<Path>>(path: P) -> bool {
    let path = path.as_ref();
    match read_all_blocks(path) {
        Ok(()) => true,
        Err(e) => {
            warn!("{} is not a valid raster: {}", path.display(), e);
            false
        }
    }
}

fn read_all_blocks(path: &Path) -> Result<()> {
    let dataset = Dataset::open(path)?;
    let (cols, rows) = dataset.raster_size();
    for index in 1..=dataset.raster_count() {
        let band = dataset.rasterband(index)?;
        let strip = band.block_size().1.max(1);
        for row in (0..rows).step_by(strip) {
            let height = strip.min(rows - row);
            band.read_as::<f64>((0, row as isize), (cols, height), (cols, height), None)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::options::{GTiff, Png};
    use ndarray::Array3;
    use tempfile::TempDir;

    fn driver_available(name: &str) -> bool {
        if DriverManager::get_driver_by_name(name).is_err() {
            eprintln!("GDAL driver {name} not available, skipping test");
            return false;
        }
        true
    }

    fn sample() -> RasterDataset<u16> {
        let data = Array3::from_shape_fn((3, 20, 30), |(b, r, c)| (b * 1000 + r * 30 + c) as u16);
        let geoinfo =
            GeoInfo::from_epsg(32635, Affine::north_up(554_680.0, 6_234_400.0, 10.0, 10.0)).unwrap();
        let mut raster = RasterDataset::from_array(data, Some(geoinfo)).unwrap();
        raster.set_nodata(Some(65535.0));
        raster.set_meta([("iso_date", "2021-01-01"), ("sensor", "S2A")]);
        raster
    }

    #[test]
    fn test_gtiff_file_round_trip() {
        if !driver_available("GTiff") {
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sample.tif");
        let raster = sample();
        raster.to_file(&path, &GTiff::deflate(6)).unwrap();
        assert!(path.exists());

        let loaded = RasterDataset::<u16>::open(&path).unwrap();
        assert_eq!(loaded.data(), raster.data());
        assert_eq!(loaded.nodata(), raster.nodata());
        assert_eq!(loaded.meta()["iso_date"], "2021-01-01");
        assert_eq!(loaded.meta()["sensor"], "S2A");
        let geoinfo = loaded.geoinfo().unwrap();
        assert_eq!(geoinfo.transform, raster.geoinfo().unwrap().transform);
        assert_eq!(geoinfo.epsg(), Some(32635));
        assert_eq!(probe_data_type(&path).unwrap(), DataType::UInt16);
    }

    #[test]
    fn test_bytes_round_trip() {
        if !driver_available("GTiff") || !driver_available("PNG") {
            return;
        }
        let raster = sample();
        let bytes = raster.to_bytes(&GTiff::default()).unwrap();
        assert_eq!(&bytes[..2], b"II");
        let decoded = RasterDataset::<u16>::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.data(), raster.data());

        let rgb = RasterDataset::<u8>::from_array(
            Array3::from_shape_fn((3, 8, 8), |(b, r, c)| (b * 60 + r * 8 + c) as u8),
            None,
        )
        .unwrap();
        let png = rgb.to_bytes(&Png { zlevel: Some(9) }).unwrap();
        assert_eq!(&png[1..4], b"PNG");
        let decoded = RasterDataset::<u8>::from_bytes(&png).unwrap();
        assert_eq!(decoded.data(), rgb.data());
        assert!(decoded.geoinfo().is_none());
    }

    #[test]
    fn test_is_valid_detects_truncated_file() {
        if !driver_available("GTiff") {
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("intact.tif");
        sample().to_file(&path, &GTiff::default()).unwrap();
        assert!(is_valid(&path));

        let bytes = std::fs::read(&path).unwrap();
        let truncated = temp_dir.path().join("truncated.tif");
        std::fs::write(&truncated, &bytes[..bytes.len() * 3 / 5]).unwrap();
        assert!(!is_valid(&truncated));

        let garbage = temp_dir.path().join("garbage.tif");
        std::fs::write(&garbage, b"definitely not an image").unwrap();
        assert!(!is_valid(&garbage));
        assert!(!is_valid(temp_dir.path().join("missing.tif")));
    }

    #[test]
    fn test_garbage_bytes_fail() {
        assert!(RasterDataset::<u8>::from_bytes(b"definitely not an image").is_err());
    }
}
