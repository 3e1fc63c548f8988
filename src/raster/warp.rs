//! Reprojection, resampling and mosaicking onto a new pixel grid with
//! `GDALWarp`.
//!
//! Sources are warped into one destination in order, the primary dataset
//! first: a pixel that is nodata (or falls outside its source) never
//! overwrites what an earlier source wrote.

use std::ffi::{c_int, c_void};
use std::fmt;
use std::path::PathBuf;

use gdal::cpl::CslStringList;
use gdal::{Dataset, DriverManager};
use gdal_sys::CPLErr;
use ndarray::{Array3, Axis};
use tracing::{debug, info, warn};

use super::io::vsimem_path;
use super::options::{GeoJsonDriver, Mem, RasterDriver};
use super::{fill_value, Affine, GeoInfo, RasterDataset, RasterElement};
use crate::error::{Error, Result};
use crate::gdal_interop::last_error;
use crate::geometry::resolution::{calc_best_resolution_bbox, cell_count};
use crate::geometry::Geometry;
use crate::progress::Progress;
use crate::srs::{SpatialReference, Transformer};
use crate::transform::transform_by_srs;
use crate::vector::{Feature, VectorDataset};

/// Tolerance, in pixels, for snapping a bounding box onto the source grid.
const PIXEL_EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resampling {
    #[default]
    Nearest,
    Bilinear,
    Cubic,
}

impl Resampling {
    fn as_gdal(self) -> &'static str {
        match self {
            Resampling::Nearest => "near",
            Resampling::Bilinear => "bilinear",
            Resampling::Cubic => "cubic",
        }
    }
}

/// Polygon(s) outside of which the output stays nodata.
#[derive(Debug, Clone)]
pub enum Cutline<'a> {
    Geometry(Geometry, SpatialReference),
    Vector(&'a VectorDataset),
    /// Any vector file OGR can read.
    File(PathBuf),
}

impl Cutline<'_> {
    /// The cutline geometry reprojected into `srs`. Vector sources without a
    /// CRS are assumed to be in `srs` already.
    fn resolve(&self, srs: &SpatialReference) -> Result<Geometry> {
        let (geometry, from) = match self {
            Cutline::Geometry(geometry, from) => (geometry.clone(), Some(from.clone())),
            Cutline::Vector(vector) => (collect(vector)?, vector.srs().cloned()),
            Cutline::File(path) => {
                let vector = VectorDataset::open(path)?;
                (collect(&vector)?, vector.srs().cloned())
            }
        };
        match from {
            Some(from) if &from != srs => transform_by_srs(&geometry, &from, srs),
            _ => Ok(geometry),
        }
    }
}

fn collect(vector: &VectorDataset) -> Result<Geometry> {
    vector
        .collect_geometry()
        .ok_or_else(|| Error::InvalidArgument("cutline dataset has no features".to_string()))
}

/// Settings for [`warp`]. Everything is optional; the default reproduces the
/// source grid.
pub struct WarpOptions<'a, T: RasterElement> {
    /// Output CRS, defaults to the primary dataset's.
    pub srs: Option<SpatialReference>,
    /// Output pixel size `(x, y)` in output CRS units.
    pub resolution: Option<(f64, f64)>,
    /// Output extent `[x_min, y_min, x_max, y_max]`.
    pub bbox: Option<[f64; 4]>,
    /// CRS of `bbox`, defaults to the output CRS.
    pub bbox_srs: Option<SpatialReference>,
    pub resampling: Resampling,
    /// Further datasets mosaicked over the primary one, in order.
    pub extra: Vec<&'a RasterDataset<T>>,
    pub cutline: Option<Cutline<'a>>,
    /// Output nodata; defaults to the primary dataset's.
    pub nodata: Option<f64>,
    pub progress: Progress<'a>,
}

impl<T: RasterElement> Default for WarpOptions<'_, T> {
    fn default() -> Self {
        Self {
            srs: None,
            resolution: None,
            bbox: None,
            bbox_srs: None,
            resampling: Resampling::default(),
            extra: Vec::new(),
            cutline: None,
            nodata: None,
            progress: Progress::default(),
        }
    }
}

impl<T: RasterElement> fmt::Debug for WarpOptions<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarpOptions")
            .field("srs", &self.srs)
            .field("resolution", &self.resolution)
            .field("bbox", &self.bbox)
            .field("bbox_srs", &self.bbox_srs)
            .field("resampling", &self.resampling)
            .field("extra", &self.extra.len())
            .field("cutline", &self.cutline)
            .field("nodata", &self.nodata)
            .field("progress", &self.progress)
            .finish()
    }
}

impl<'a, T: RasterElement> WarpOptions<'a, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_srs(mut self, srs: SpatialReference) -> Self {
        self.srs = Some(srs);
        self
    }

    pub fn with_epsg(self, epsg: u32) -> Result<Self> {
        Ok(self.with_srs(SpatialReference::from_epsg(epsg)?))
    }

    pub fn with_resolution(mut self, resolution: (f64, f64)) -> Self {
        self.resolution = Some(resolution);
        self
    }

    pub fn with_bbox(mut self, bbox: [f64; 4], bbox_srs: Option<SpatialReference>) -> Self {
        self.bbox = Some(bbox);
        self.bbox_srs = bbox_srs;
        self
    }

    pub fn with_resampling(mut self, resampling: Resampling) -> Self {
        self.resampling = resampling;
        self
    }

    pub fn with_extra(mut self, dataset: &'a RasterDataset<T>) -> Self {
        self.extra.push(dataset);
        self
    }

    pub fn with_cutline(mut self, cutline: Cutline<'a>) -> Self {
        self.cutline = Some(cutline);
        self
    }

    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(f64, &str) -> bool + Send + 'a,
    {
        self.progress = Progress::new(callback);
        self
    }
}

/// Output grid chosen for a warp.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Grid {
    pub geoinfo: GeoInfo,
    pub rows: usize,
    pub cols: usize,
}

impl Grid {
    /// Grid over `bbox`. With an explicit resolution the far edges snap to
    /// whole cells; otherwise `source_resolution` is adjusted so the cells
    /// divide the box exactly.
    fn new(
        srs: SpatialReference,
        bbox: [f64; 4],
        resolution: Option<(f64, f64)>,
        source_resolution: (f64, f64),
    ) -> Result<Self> {
        let [x_min, y_min, x_max, y_max] = bbox;
        let (dx, dy) = (x_max - x_min, y_max - y_min);
        if !(dx > 0.0 && dy > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "degenerate output extent {bbox:?}"
            )));
        }
        let (res_x, res_y) = match resolution {
            Some(res) => res,
            None => calc_best_resolution_bbox(x_min, x_max, y_min, y_max, source_resolution),
        };
        if !(res_x > 0.0 && res_y > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "resolution must be positive, got ({res_x}, {res_y})"
            )));
        }
        let cols = cell_count(dx, res_x);
        let rows = cell_count(dy, res_y);
        Ok(Self {
            geoinfo: GeoInfo::new(srs, Affine::north_up(x_min, y_max, res_x, res_y)),
            rows,
            cols,
        })
    }

    /// In-memory GDAL dataset on this grid, every band filled with its nodata (or 0).
    fn create<T: RasterElement>(&self, nodata: &[Option<f64>]) -> Result<Dataset> {
        let driver = DriverManager::get_driver_by_name(Mem.driver_name())?;
        let mut dataset = driver.create_with_band_type::<T, _>("", self.cols, self.rows, nodata.len())?;
        dataset.set_geo_transform(&self.geoinfo.transform.to_gdal())?;
        dataset.set_spatial_ref(&self.geoinfo.srs.to_spatial_ref())?;
        for (index, nodata) in nodata.iter().enumerate() {
            let mut band = dataset.rasterband(index + 1)?;
            if nodata.is_some() {
                band.set_no_data_value(*nodata)?;
            }
            band.fill(fill_value::<T>(*nodata).as_f64(), None)?;
        }
        Ok(dataset)
    }
}

/// Reprojects and resamples `ds` (and `options.extra`, mosaicked on top) onto
/// a new grid.
///
/// The output extent is `options.bbox` when given, else the cutline
/// envelope, else the union of all source footprints. Without an explicit
/// resolution the primary dataset's pixel size, converted to the output CRS,
/// is adjusted to divide the extent into whole cells.
pub fn warp<T: RasterElement>(
    ds: &RasterDataset<T>,
    mut options: WarpOptions<'_, T>,
) -> Result<RasterDataset<T>> {
    let src_geoinfo = ds.require_geoinfo()?;
    let dst_srs = options.srs.clone().unwrap_or_else(|| src_geoinfo.srs.clone());

    let mut sources: Vec<&RasterDataset<T>> = Vec::with_capacity(1 + options.extra.len());
    sources.push(ds);
    sources.extend(options.extra.iter().copied());
    for (i, source) in sources.iter().enumerate().skip(1) {
        source.require_geoinfo()?;
        if source.band_count() != ds.band_count() {
            return Err(Error::InvalidArgument(format!(
                "extra dataset {} has {} bands, expected {}",
                i - 1,
                source.band_count(),
                ds.band_count()
            )));
        }
    }

    let cutline = match &options.cutline {
        Some(cutline) => Some(cutline.resolve(&dst_srs)?),
        None => None,
    };

    let bbox = match (options.bbox, &cutline) {
        (Some(bbox), _) => match &options.bbox_srs {
            Some(bbox_srs) if bbox_srs != &dst_srs => {
                Transformer::new(bbox_srs, &dst_srs)?.transform_bounds(&bbox)?
            }
            _ => bbox,
        },
        (None, Some(cutline)) => {
            let (x_min, x_max, y_min, y_max) = cutline
                .envelope()
                .ok_or_else(|| Error::InvalidArgument("cutline geometry is empty".to_string()))?;
            [x_min, y_min, x_max, y_max]
        }
        (None, None) => footprint_union(&sources, &dst_srs)?,
    };

    let source_resolution = resolution_in(ds, &dst_srs)?;
    let grid = Grid::new(dst_srs, bbox, options.resolution, source_resolution)?;
    debug!(
        "warp grid {}x{} at {:?} in {}",
        grid.rows,
        grid.cols,
        grid.geoinfo.resolution(),
        grid.geoinfo.srs
    );

    let nodata: Vec<Option<f64>> = match options.nodata {
        Some(nodata) => vec![Some(nodata); ds.band_count()],
        None => ds.nodata().to_vec(),
    };
    let destination = grid.create::<T>(&nodata)?;

    let cutline_file = match &cutline {
        Some(geometry) => Some(CutlineFile::write(geometry, &grid.geoinfo.srs)?),
        None => None,
    };
    let mut args = vec!["-r".to_string(), options.resampling.as_gdal().to_string()];
    if let Some(file) = &cutline_file {
        args.push("-cutline".to_string());
        args.push(file.path.clone());
    }

    options.progress.report(0.0, "warping")?;
    let count = sources.len() as f64;
    for (index, source) in sources.iter().enumerate() {
        let staging = source.to_gdal()?;
        let range = (index as f64 / count, (index + 1) as f64 / count);
        gdal_warp(&staging, &destination, &args, &mut options.progress, range)?;
        debug!("warped dataset {} of {}", index + 1, sources.len());
    }
    options.progress.report(1.0, "done")?;

    let mut warped = RasterDataset::from_gdal(&destination)?;
    warped.set_geoinfo(Some(grid.geoinfo));
    warped.set_nodata_per_band(nodata)?;
    warped.meta = ds.meta.clone();
    info!(
        "Warped {:?} -> {:?} ({} sources)",
        ds.shape(),
        warped.shape(),
        sources.len()
    );
    Ok(warped)
}

/// Owned `GDALWarpAppOptions`, freed on drop.
struct WarpAppOptions {
    options: *mut gdal_sys::GDALWarpAppOptions,
}

impl WarpAppOptions {
    fn new(args: &[String]) -> Result<Self> {
        let mut c_args = CslStringList::new();
        for arg in args {
            c_args.add_string(arg)?;
        }
        let options = unsafe { gdal_sys::GDALWarpAppOptionsNew(c_args.as_ptr(), std::ptr::null_mut()) };
        if options.is_null() {
            return Err(last_error(CPLErr::CE_Failure));
        }
        Ok(Self { options })
    }
}

impl Drop for WarpAppOptions {
    fn drop(&mut self) {
        unsafe {
            gdal_sys::GDALWarpAppOptionsFree(self.options);
        }
    }
}

/// GDAL progress data that maps `[0, 1]` onto a sub-range of the caller's progress.
struct ScaledProgress {
    data: *mut c_void,
}

impl ScaledProgress {
    fn new(progress: &mut Progress<'_>, (min, max): (f64, f64)) -> Self {
        let (func, arg) = progress.as_gdal();
        let data = match func {
            Some(_) => unsafe { gdal_sys::GDALCreateScaledProgress(min, max, func, arg) },
            None => std::ptr::null_mut(),
        };
        Self { data }
    }

    fn func(&self) -> gdal_sys::GDALProgressFunc {
        if self.data.is_null() {
            None
        } else {
            Some(gdal_sys::GDALScaledProgress)
        }
    }
}

impl Drop for ScaledProgress {
    fn drop(&mut self) {
        if !self.data.is_null() {
            unsafe {
                gdal_sys::GDALDestroyScaledProgress(self.data);
            }
        }
    }
}

/// Warps `source` into the existing `destination`. Source nodata pixels are
/// skipped and the destination is not re-initialised, so earlier sources
/// show through.
fn gdal_warp(
    source: &Dataset,
    destination: &Dataset,
    args: &[String],
    progress: &mut Progress<'_>,
    range: (f64, f64),
) -> Result<()> {
    let options = WarpAppOptions::new(args)?;
    let scaled = ScaledProgress::new(progress, range);
    let mut user_error: c_int = 0;
    let result = unsafe {
        gdal_sys::GDALWarpAppOptionsSetProgress(options.options, scaled.func(), scaled.data);
        gdal_sys::GDALWarp(
            std::ptr::null(),
            destination.c_dataset(),
            1,
            &mut source.c_dataset(),
            options.options,
            &mut user_error,
        )
    };
    drop(scaled);

    if progress.is_cancelled() {
        return Err(Error::Cancelled);
    }
    if user_error != 0 {
        return Err(Error::InvalidArgument(format!(
            "GDALWarp rejected arguments {args:?}"
        )));
    }
    if result.is_null() {
        return Err(last_error(CPLErr::CE_Failure));
    }
    Ok(())
}

/// Cutline polygons staged as an in-memory GeoJSON file for `-cutline`,
/// removed on drop.
struct CutlineFile {
    path: String,
}

impl CutlineFile {
    fn write(geometry: &Geometry, srs: &SpatialReference) -> Result<Self> {
        let features: Vec<Feature> = geometry
            .polygons()
            .into_iter()
            .map(|rings| Feature::new(Geometry::Polygon(rings.to_vec())))
            .collect();
        if features.is_empty() {
            return Err(Error::InvalidArgument(
                "cutline has no polygons".to_string(),
            ));
        }
        let path = vsimem_path("geojson");
        VectorDataset::new(features, Some(srs.clone())).to_file(
            &path,
            &GeoJsonDriver::default(),
            true,
        )?;
        Ok(Self { path })
    }
}

impl Drop for CutlineFile {
    fn drop(&mut self) {
        if let Err(e) = gdal::vsi::unlink_mem_file(&self.path) {
            warn!("Failed to release {}: {}", self.path, e);
        }
    }
}

/// Union of the sources' extents in `srs`.
fn footprint_union<T: RasterElement>(
    sources: &[&RasterDataset<T>],
    srs: &SpatialReference,
) -> Result<[f64; 4]> {
    let mut union = [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY];
    for source in sources {
        let [[x_min, y_min], [x_max, y_max]] = source.bounds(Some(srs))?;
        union = [
            union[0].min(x_min),
            union[1].min(y_min),
            union[2].max(x_max),
            union[3].max(y_max),
        ];
    }
    Ok(union)
}

/// Pixel size of `ds` expressed in `srs` units. Across CRSs the output keeps
/// as many pixels along the footprint diagonal as the source has.
pub(super) fn resolution_in<T: RasterElement>(
    ds: &RasterDataset<T>,
    srs: &SpatialReference,
) -> Result<(f64, f64)> {
    let geoinfo = ds.require_geoinfo()?;
    if &geoinfo.srs == srs {
        return Ok(geoinfo.resolution());
    }
    let (_, rows, cols) = ds.shape();
    let [[x_min, y_min], [x_max, y_max]] = ds.bounds(Some(srs))?;
    let diagonal = (x_max - x_min).hypot(y_max - y_min);
    let pixels = (cols as f64).hypot(rows as f64);
    let res = diagonal / pixels;
    Ok((res, res))
}

/// Crops `ds` to `bbox` without resampling: the window is the smallest run of
/// whole source pixels covering the box, padded with nodata (or 0) where it
/// leaves the source. Non north-up sources go through [`warp`] instead.
pub fn fast_warp<T: RasterElement>(
    ds: &RasterDataset<T>,
    bbox: [f64; 4],
    bbox_srs: Option<&SpatialReference>,
) -> Result<RasterDataset<T>> {
    let geoinfo = ds.require_geoinfo()?;
    if !is_north_up(&geoinfo.transform) {
        debug!("fast_warp on a rotated or flipped grid, using warp");
        return warp(
            ds,
            WarpOptions::default().with_bbox(bbox, bbox_srs.cloned()),
        );
    }
    let (data, geoinfo) = fast_warp_as_array(ds, bbox, bbox_srs)?;
    let mut cropped = RasterDataset::from_array(data, Some(geoinfo))?;
    cropped.nodata = ds.nodata.clone();
    cropped.meta = ds.meta.clone();
    Ok(cropped)
}

/// [`fast_warp`] returning the pixel block and its placement.
pub fn fast_warp_as_array<T: RasterElement>(
    ds: &RasterDataset<T>,
    bbox: [f64; 4],
    bbox_srs: Option<&SpatialReference>,
) -> Result<(Array3<T>, GeoInfo)> {
    let geoinfo = ds.require_geoinfo()?;
    let transform = geoinfo.transform;
    if !is_north_up(&transform) {
        return Err(Error::InvalidArgument(
            "fast_warp_as_array needs a north-up source grid".to_string(),
        ));
    }
    let bbox = match bbox_srs {
        Some(srs) if srs != &geoinfo.srs => Transformer::new(srs, &geoinfo.srs)?.transform_bounds(&bbox)?,
        _ => bbox,
    };
    let [x_min, y_min, x_max, y_max] = bbox;

    let col0 = ((x_min - transform.c) / transform.a + PIXEL_EPSILON).floor() as i64;
    let col1 = ((x_max - transform.c) / transform.a - PIXEL_EPSILON).ceil() as i64;
    let row0 = ((y_max - transform.f) / transform.e + PIXEL_EPSILON).floor() as i64;
    let row1 = ((y_min - transform.f) / transform.e - PIXEL_EPSILON).ceil() as i64;
    if col1 <= col0 || row1 <= row0 {
        return Err(Error::InvalidArgument(format!(
            "bounding box {bbox:?} covers no pixel"
        )));
    }

    let (bands, rows, cols) = ds.shape();
    let (out_rows, out_cols) = ((row1 - row0) as usize, (col1 - col0) as usize);
    let mut data = Array3::<T>::default((bands, out_rows, out_cols));
    for (mut band, nodata) in data.axis_iter_mut(Axis(0)).zip(ds.nodata()) {
        band.fill(fill_value(*nodata));
    }

    // overlap of the window with the source, in source pixels
    let (src_c0, src_c1) = (col0.max(0), col1.min(cols as i64));
    let (src_r0, src_r1) = (row0.max(0), row1.min(rows as i64));
    if src_c1 > src_c0 && src_r1 > src_r0 {
        let src = ds.data().slice(ndarray::s![
            ..,
            src_r0 as usize..src_r1 as usize,
            src_c0 as usize..src_c1 as usize
        ]);
        let (dst_r0, dst_c0) = ((src_r0 - row0) as usize, (src_c0 - col0) as usize);
        data.slice_mut(ndarray::s![
            ..,
            dst_r0..dst_r0 + (src_r1 - src_r0) as usize,
            dst_c0..dst_c0 + (src_c1 - src_c0) as usize
        ])
        .assign(&src);
    }

    let geoinfo = GeoInfo::new(
        geoinfo.srs.clone(),
        transform.shifted(col0 as f64, row0 as f64),
    );
    Ok((data, geoinfo))
}

fn is_north_up(transform: &Affine) -> bool {
    transform.is_rectilinear() && transform.a > 0.0 && transform.e < 0.0
}
