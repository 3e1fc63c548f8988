//! Clipping rasters to polygons.

use ndarray::{Axis, Zip};
use tracing::info;

use super::rasterize::polygon_mask;
use super::warp::{resolution_in, warp, Resampling, WarpOptions};
use super::{fill_value, RasterDataset, RasterElement};
use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::srs::{SpatialReference, WGS84};
use crate::transform::transform_by_srs;
use crate::util::check_maximum_one_value_not_none;

/// Settings for [`crop_by_geometry`].
///
/// The output CRS is picked by at most one of `out_epsg`, `out_proj4` and
/// `out_srs`; with none of them the source CRS is kept.
#[derive(Debug)]
pub struct CropOptions<'a, T: RasterElement> {
    /// CRS of the crop geometry, EPSG:4326 when unset.
    pub geometry_srs: Option<SpatialReference>,
    pub out_epsg: Option<u32>,
    /// PROJ string such as `+proj=aea +lat_0=-32 +lon_0=-60 ...`.
    pub out_proj4: Option<String>,
    pub out_srs: Option<SpatialReference>,
    pub resolution: Option<(f64, f64)>,
    /// Fill pixels outside the geometry with nodata (or 0).
    pub apply_mask: bool,
    pub resampling: Resampling,
    pub nodata: Option<f64>,
    /// Datasets mosaicked over the source before cropping.
    pub extra: Vec<&'a RasterDataset<T>>,
}

impl<T: RasterElement> Default for CropOptions<'_, T> {
    fn default() -> Self {
        Self {
            geometry_srs: None,
            out_epsg: None,
            out_proj4: None,
            out_srs: None,
            resolution: None,
            apply_mask: true,
            resampling: Resampling::default(),
            nodata: None,
            extra: Vec::new(),
        }
    }
}

impl<'a, T: RasterElement> CropOptions<'a, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_geometry_srs(mut self, srs: SpatialReference) -> Self {
        self.geometry_srs = Some(srs);
        self
    }

    pub fn with_geometry_epsg(self, epsg: u32) -> Result<Self> {
        Ok(self.with_geometry_srs(SpatialReference::from_epsg(epsg)?))
    }

    pub fn with_out_epsg(mut self, epsg: u32) -> Self {
        self.out_epsg = Some(epsg);
        self
    }

    pub fn with_out_proj4(mut self, proj4: impl Into<String>) -> Self {
        self.out_proj4 = Some(proj4.into());
        self
    }

    pub fn with_out_srs(mut self, srs: SpatialReference) -> Self {
        self.out_srs = Some(srs);
        self
    }

    pub fn with_resolution(mut self, resolution: (f64, f64)) -> Self {
        self.resolution = Some(resolution);
        self
    }

    pub fn with_apply_mask(mut self, apply_mask: bool) -> Self {
        self.apply_mask = apply_mask;
        self
    }

    pub fn with_resampling(mut self, resampling: Resampling) -> Self {
        self.resampling = resampling;
        self
    }

    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }

    pub fn with_extra(mut self, dataset: &'a RasterDataset<T>) -> Self {
        self.extra.push(dataset);
        self
    }

    fn out_srs(&self, source: &SpatialReference) -> Result<SpatialReference> {
        let choices = [
            self.out_epsg.map(|_| ()),
            self.out_proj4.as_ref().map(|_| ()),
            self.out_srs.as_ref().map(|_| ()),
        ];
        if !check_maximum_one_value_not_none(choices) {
            return Err(Error::InvalidArgument(
                "only one of out_epsg, out_proj4 and out_srs may be set".to_string(),
            ));
        }
        match (&self.out_epsg, &self.out_proj4, &self.out_srs) {
            (Some(epsg), _, _) => SpatialReference::from_epsg(*epsg),
            (_, Some(proj4), _) => SpatialReference::from_proj4(proj4),
            (_, _, Some(srs)) => Ok(srs.clone()),
            _ => Ok(source.clone()),
        }
    }
}

/// Crops `ds` (mosaicked with `options.extra`) to the envelope of
/// `geometry` and returns the cropped raster together with a same-sized
/// `u8` mask: 1 where the pixel centre lies inside the geometry, 0 elsewhere.
///
/// Fails with [`Error::Crop`] when the geometry has no polygonal part, does
/// not overlap any source, or covers no pixel centre of the output grid.
pub fn crop_by_geometry<T: RasterElement>(
    ds: &RasterDataset<T>,
    geometry: &Geometry,
    options: CropOptions<'_, T>,
) -> Result<(RasterDataset<T>, RasterDataset<u8>)> {
    let src_geoinfo = ds.require_geoinfo()?;
    if geometry.polygons().is_empty() {
        return Err(Error::Crop(format!(
            "cannot crop by a {} without polygons",
            geometry.type_name()
        )));
    }

    let out_srs = options.out_srs(&src_geoinfo.srs)?;
    let geometry_srs = match &options.geometry_srs {
        Some(srs) => srs.clone(),
        None => SpatialReference::from_epsg(WGS84)?,
    };
    let geometry = if geometry_srs == out_srs {
        geometry.clone()
    } else {
        transform_by_srs(geometry, &geometry_srs, &out_srs)?
    };
    let (x_min, x_max, y_min, y_max) = geometry
        .envelope()
        .ok_or_else(|| Error::Crop("crop geometry is empty".to_string()))?;
    let bbox = [x_min, y_min, x_max, y_max];

    let overlaps = std::iter::once(ds)
        .chain(options.extra.iter().copied())
        .map(|source| source.bounds(Some(&out_srs)))
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .any(|[[sx_min, sy_min], [sx_max, sy_max]]| {
            sx_min < x_max && x_min < sx_max && sy_min < y_max && y_min < sy_max
        });
    if !overlaps {
        return Err(Error::Crop(format!(
            "geometry envelope {bbox:?} in {out_srs} does not intersect the raster"
        )));
    }

    // less than half an output pixel across rounds to an empty window
    let (res_x, res_y) = match options.resolution {
        Some(resolution) => resolution,
        None => resolution_in(ds, &out_srs)?,
    };
    if (x_max - x_min) / res_x < 0.5 || (y_max - y_min) / res_y < 0.5 {
        return Err(Error::Crop(format!(
            "geometry envelope {bbox:?} is smaller than half a pixel of ({res_x}, {res_y})"
        )));
    }

    let warp_options = WarpOptions {
        srs: Some(out_srs),
        bbox: Some(bbox),
        resampling: options.resampling,
        extra: options.extra,
        nodata: options.nodata,
        resolution: options.resolution,
        ..WarpOptions::default()
    };
    let mut cropped = warp(ds, warp_options)?;

    let (_, rows, cols) = cropped.shape();
    let geoinfo = cropped.require_geoinfo()?.clone();
    let inside = polygon_mask(&geometry, &geoinfo.transform, rows, cols)?;
    let covered = inside.iter().filter(|&&v| v).count();
    if covered == 0 {
        return Err(Error::Crop(format!(
            "geometry covers no pixel of the {rows}x{cols} output grid"
        )));
    }
    let mask_data = inside.mapv(u8::from).insert_axis(Axis(0));
    let mask = RasterDataset::from_array(mask_data, Some(geoinfo))?;

    if options.apply_mask {
        cropped.apply_mask(&mask)?;
    }
    info!(
        "Cropped {:?} to {:?}, {} of {} pixels inside the geometry",
        ds.shape(),
        cropped.shape(),
        covered,
        rows * cols
    );
    Ok((cropped, mask))
}

impl<T: RasterElement> RasterDataset<T> {
    /// Sets every pixel where `mask` is 0 to the band's nodata value (or 0).
    /// The mask must be single-band and match the raster's rows and columns.
    pub fn apply_mask(&mut self, mask: &RasterDataset<u8>) -> Result<()> {
        let (_, rows, cols) = self.shape();
        if mask.shape() != (1, rows, cols) {
            return Err(Error::InvalidArgument(format!(
                "mask shape {:?} does not match raster shape {:?}",
                mask.shape(),
                self.shape()
            )));
        }
        let mask = mask.data.index_axis(Axis(0), 0);
        let fills: Vec<T> = self.nodata.iter().map(|nd| fill_value(*nd)).collect();
        for (mut band, fill) in self.data.axis_iter_mut(Axis(0)).zip(fills) {
            Zip::from(&mut band).and(&mask).for_each(|pixel, &keep| {
                if keep == 0 {
                    *pixel = fill;
                }
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::GeometryBuilder;
    use crate::raster::{Affine, GeoInfo};
    use crate::transform::transform;
    use ndarray::Array3;
    use serde_json::json;

    const AEA: &str = "+proj=aea +lat_0=-32 +lon_0=-60 +lat_1=-5 +lat_2=-42 +x_0=0 +y_0=0 +ellps=aust_SA +units=m +no_defs +type=crs";

    fn utm_dataset(y0: f64, low: u8) -> RasterDataset<u8> {
        let data = Array3::from_shape_fn((1, 1134, 1134), |(_, r, c)| low + ((r * 7 + c * 13) % 64) as u8);
        let geoinfo = GeoInfo::from_epsg(
            32720,
            Affine::new(10.000000005946216, 0.0, 554680.0000046358, 0.0, -10.000000003180787, y0),
        )
        .unwrap();
        RasterDataset::from_array(data, Some(geoinfo)).unwrap()
    }

    fn polygon() -> Geometry {
        GeometryBuilder::default()
            .create(&json!({
                "type": "Polygon",
                "coordinates": [[
                    [-62.403073310852044, -34.02648590051866],
                    [-62.40650653839111, -34.03818674708322],
                    [-62.398738861083984, -34.03943142302355],
                    [-62.395563125610344, -34.02780188173055],
                    [-62.403073310852044, -34.02648590051866]
                ]]
            }))
            .unwrap()
    }

    fn min_max(ds: &RasterDataset<u8>) -> (u8, u8) {
        let data = ds.data();
        (
            data.iter().copied().min().unwrap(),
            data.iter().copied().max().unwrap(),
        )
    }

    #[test]
    fn test_crop_returns_mask() {
        let ds1 = utm_dataset(6234399.99998708, 64);
        let ds2 = utm_dataset(6245339.999990689, 128);

        let (cropped, mask) =
            crop_by_geometry(&ds1, &polygon(), CropOptions::new().with_extra(&ds2)).unwrap();
        let (_, rows, cols) = cropped.shape();
        assert!(rows < 1134 && cols < 1134);
        assert_eq!(mask.shape(), (1, rows, cols));
        assert_eq!(min_max(&mask), (0, 1));
        assert_eq!(cropped.geoinfo().unwrap().epsg(), Some(32720));

        Zip::from(cropped.band(0).unwrap())
            .and(mask.band(0).unwrap())
            .for_each(|&value, &inside| {
                if inside == 1 {
                    assert!((64..192).contains(&value), "{value}");
                } else {
                    assert_eq!(value, 0);
                }
            });

        let (coarse, _) = crop_by_geometry(
            &ds1,
            &polygon(),
            CropOptions::new().with_extra(&ds2).with_resolution((100.0, 100.0)),
        )
        .unwrap();
        let (_, coarse_rows, coarse_cols) = coarse.shape();
        assert!((coarse_rows as f64 - rows as f64 / 10.0).abs() <= 1.0);
        assert!((coarse_cols as f64 - cols as f64 / 10.0).abs() <= 1.0);
    }

    #[test]
    fn test_crop_geometry_and_output_crs() {
        let ds = utm_dataset(6234399.99998708, 64);

        let mut in_3857 = transform(&polygon(), 4326, 3857).unwrap();
        in_3857.flatten_2d();
        let (cropped, _) = crop_by_geometry(
            &ds,
            &in_3857,
            CropOptions::new().with_geometry_epsg(3857).unwrap(),
        )
        .unwrap();
        assert_eq!(cropped.geoinfo().unwrap().epsg(), Some(32720));

        let (cropped, mask) =
            crop_by_geometry(&ds, &polygon(), CropOptions::new().with_out_epsg(3857)).unwrap();
        assert_eq!(cropped.geoinfo().unwrap().epsg(), Some(3857));
        assert_eq!(mask.geoinfo(), cropped.geoinfo());
    }

    #[test]
    fn test_crop_custom_projection_without_mask() {
        let ds1 = utm_dataset(6234399.99998708, 64);
        let ds2 = utm_dataset(6245339.999990689, 128);
        let (cropped, mask) = crop_by_geometry(
            &ds1,
            &polygon(),
            CropOptions::new()
                .with_extra(&ds2)
                .with_out_proj4(AEA)
                .with_apply_mask(false),
        )
        .unwrap();
        assert!(cropped.srs().unwrap().to_proj4().unwrap().contains("+proj=aea"));
        assert_eq!(min_max(&mask), (0, 1));
        // unmasked crop keeps source pixels outside the polygon too
        let outside_kept = Zip::from(cropped.band(0).unwrap())
            .and(mask.band(0).unwrap())
            .fold(0usize, |n, &value, &inside| n + usize::from(inside == 0 && value >= 64));
        assert!(outside_kept > 0);
        assert!(cropped.data().iter().all(|&v| v == 0 || (64..192).contains(&v)));
    }

    #[test]
    fn test_crop_failures() {
        let ds = utm_dataset(6234399.99998708, 64);

        // far away from the raster
        let elsewhere = Geometry::from_bbox(-50.0, -20.0, -49.9, -19.9);
        let err = crop_by_geometry(&ds, &elsewhere, CropOptions::new()).unwrap_err();
        assert!(matches!(err, Error::Crop(_)));

        // narrower than half a pixel
        let sliver = Geometry::from_bbox(555_001.0, 6_230_001.0, 555_004.0, 6_230_004.0);
        let options = CropOptions::new().with_geometry_epsg(32720).unwrap();
        let err = crop_by_geometry(&ds, &sliver, options).unwrap_err();
        assert!(matches!(err, Error::Crop(_)));

        let point = Geometry::Point(crate::geometry::Coord::new(-62.4, -34.03));
        let err = crop_by_geometry(&ds, &point, CropOptions::new()).unwrap_err();
        assert!(matches!(err, Error::Crop(_)));

        let options = CropOptions::new().with_out_epsg(3857).with_out_proj4(AEA);
        let err = crop_by_geometry(&ds, &polygon(), options).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_apply_mask() {
        let mut ds = RasterDataset::from_array(Array3::from_elem((2, 2, 2), 9u16), None).unwrap();
        ds.set_nodata_per_band(vec![Some(1.0), None]).unwrap();
        let mut mask = RasterDataset::from_array(Array3::from_elem((1, 2, 2), 1u8), None).unwrap();
        mask.data_mut()[[0, 0, 1]] = 0;
        ds.apply_mask(&mask).unwrap();
        assert_eq!(ds.band(0).unwrap().row(0).to_vec(), vec![9, 1]);
        assert_eq!(ds.band(1).unwrap().row(0).to_vec(), vec![9, 0]);
        assert_eq!(ds.band(0).unwrap().row(1).to_vec(), vec![9, 9]);

        let wrong = RasterDataset::<u8>::create(&[3, 3], None).unwrap();
        assert!(ds.apply_mask(&wrong).is_err());
    }
}
