//! Mosaicking grid-aligned rasters without resampling.

use ndarray::{s, Array3, Axis, Zip};
use tracing::info;

use super::{fill_value, Affine, GeoInfo, RasterDataset, RasterElement};
use crate::error::{Error, Result};

/// Relative tolerance when comparing pixel sizes of union inputs.
const RESOLUTION_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnionOptions {
    /// Skip source pixels equal to that source's nodata instead of copying them.
    pub nodata_aware: bool,
}

/// Places `ds` and `others` on one grid spanning all of them.
///
/// Inputs must share CRS, pixel size and band count and be north-up. Each
/// input lands at the whole-pixel offset of its origin from the common
/// top-left corner; later inputs overwrite earlier ones. Pixels no input
/// covers get the first dataset's nodata (or 0).
pub fn union<T: RasterElement>(
    ds: &RasterDataset<T>,
    others: &[&RasterDataset<T>],
    options: UnionOptions,
) -> Result<RasterDataset<T>> {
    let base = ds.require_geoinfo()?;
    let transform = base.transform;
    if !(transform.is_rectilinear() && transform.a > 0.0 && transform.e < 0.0) {
        return Err(Error::InvalidArgument(format!(
            "union needs north-up rasters, got transform {:?}",
            transform.to_gdal()
        )));
    }
    let (res_x, res_y) = (transform.a, -transform.e);

    let mut inputs = Vec::with_capacity(1 + others.len());
    inputs.push(ds);
    inputs.extend(others.iter().copied());
    for (i, input) in inputs.iter().enumerate().skip(1) {
        check_compatible(i, input, ds, base)?;
    }

    let x_min = inputs
        .iter()
        .filter_map(|input| input.geoinfo())
        .map(|g| g.transform.c)
        .fold(f64::INFINITY, f64::min);
    let y_max = inputs
        .iter()
        .filter_map(|input| input.geoinfo())
        .map(|g| g.transform.f)
        .fold(f64::NEG_INFINITY, f64::max);

    let mut placements = Vec::with_capacity(inputs.len());
    let (mut rows, mut cols) = (0, 0);
    for input in &inputs {
        let t = input.require_geoinfo()?.transform;
        let col = ((t.c - x_min) / res_x).round() as usize;
        let row = ((y_max - t.f) / res_y).round() as usize;
        let (_, r, c) = input.shape();
        rows = rows.max(row + r);
        cols = cols.max(col + c);
        placements.push((row, col));
    }

    let mut data = Array3::<T>::default((ds.band_count(), rows, cols));
    for (mut band, nodata) in data.axis_iter_mut(Axis(0)).zip(ds.nodata()) {
        band.fill(fill_value(*nodata));
    }

    for (input, &(row, col)) in inputs.iter().zip(&placements) {
        let (_, r, c) = input.shape();
        for (index, src) in input.data().axis_iter(Axis(0)).enumerate() {
            let mut dst = data.slice_mut(s![index, row..row + r, col..col + c]);
            if options.nodata_aware {
                let nodata = input.band_nodata(index);
                Zip::from(&mut dst).and(&src).for_each(|out, &value| {
                    if !value.is_nodata(nodata) {
                        *out = value;
                    }
                });
            } else {
                dst.assign(&src);
            }
        }
    }

    let geoinfo = GeoInfo::new(base.srs.clone(), Affine::north_up(x_min, y_max, res_x, res_y));
    let mut merged = RasterDataset::from_array(data, Some(geoinfo))?;
    merged.nodata = ds.nodata.clone();
    merged.meta = ds.meta.clone();
    info!(
        "Union of {} rasters into {:?} at origin ({}, {})",
        inputs.len(),
        merged.shape(),
        x_min,
        y_max
    );
    Ok(merged)
}

fn check_compatible<T: RasterElement>(
    index: usize,
    input: &RasterDataset<T>,
    ds: &RasterDataset<T>,
    base: &GeoInfo,
) -> Result<()> {
    let geoinfo = input.require_geoinfo()?;
    if geoinfo.srs != base.srs {
        return Err(Error::InvalidArgument(format!(
            "union input {index} is in {}, expected {}",
            geoinfo.srs, base.srs
        )));
    }
    let (t, b) = (geoinfo.transform, base.transform);
    let close = |x: f64, y: f64| (x - y).abs() <= RESOLUTION_TOLERANCE * y.abs();
    if !(t.is_rectilinear() && close(t.a, b.a) && close(t.e, b.e)) {
        return Err(Error::InvalidArgument(format!(
            "union input {index} has pixel size {:?}, expected {:?}",
            geoinfo.resolution(),
            base.resolution()
        )));
    }
    if input.band_count() != ds.band_count() {
        return Err(Error::InvalidArgument(format!(
            "union input {index} has {} bands, expected {}",
            input.band_count(),
            ds.band_count()
        )));
    }
    Ok(())
}
