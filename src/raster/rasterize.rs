//! Burning polygons into pixel grids with GDAL's rasterizer.
//!
//! A pixel belongs to a polygon when its centre does. Points and lines burn
//! nothing.

use gdal::raster::{Buffer, GdalType};
use gdal::{Dataset, DriverManager};
use ndarray::Array2;
use tracing::debug;

use super::options::{Mem, RasterDriver};
use super::{Affine, GeoInfo, RasterDataset, RasterElement};
use crate::error::Result;
use crate::geometry::{ogr, Geometry};

/// Single-band raster of `shape = (rows, cols)` on `geoinfo` with each
/// geometry's value burned in; later geometries overwrite earlier ones.
/// Geometries must be in `geoinfo`'s CRS.
pub fn rasterize<T: RasterElement>(
    shapes: &[(Geometry, T)],
    geoinfo: &GeoInfo,
    shape: (usize, usize),
    fill: T,
) -> Result<RasterDataset<T>> {
    let (rows, cols) = shape;
    let mut dataset = grid::<T>(&geoinfo.transform, rows, cols)?;
    dataset.set_spatial_ref(&geoinfo.srs.to_spatial_ref())?;
    dataset.rasterband(1)?.fill(fill.as_f64(), None)?;

    let mut geometries = Vec::new();
    let mut values = Vec::new();
    for (geometry, value) in shapes {
        for polygon in ogr_polygons(geometry)? {
            geometries.push(polygon);
            values.push(value.as_f64());
        }
    }
    burn(&mut dataset, &geometries, &values)?;
    debug!("Rasterized {} geometries into {}x{}", shapes.len(), rows, cols);

    let mut raster = RasterDataset::from_gdal(&dataset)?;
    raster.set_geoinfo(Some(geoinfo.clone()));
    Ok(raster)
}

/// Pixels of a `rows` x `cols` grid whose centres fall inside `geometry`.
pub(crate) fn polygon_mask(
    geometry: &Geometry,
    transform: &Affine,
    rows: usize,
    cols: usize,
) -> Result<Array2<bool>> {
    let mut dataset = grid::<u8>(transform, rows, cols)?;
    let polygons = ogr_polygons(geometry)?;
    burn(&mut dataset, &polygons, &vec![1.0; polygons.len()])?;

    let buffer: Buffer<u8> = dataset
        .rasterband(1)?
        .read_as::<u8>((0, 0), (cols, rows), (cols, rows), None)?;
    let (_, values) = buffer.into_shape_and_vec();
    Ok(Array2::from_shape_vec((rows, cols), values)?.mapv(|v| v != 0))
}

fn grid<T: GdalType>(transform: &Affine, rows: usize, cols: usize) -> Result<Dataset> {
    let driver = DriverManager::get_driver_by_name(Mem.driver_name())?;
    let mut dataset = driver.create_with_band_type::<T, _>("", cols, rows, 1)?;
    dataset.set_geo_transform(&transform.to_gdal())?;
    Ok(dataset)
}

fn ogr_polygons(geometry: &Geometry) -> Result<Vec<gdal::vector::Geometry>> {
    geometry
        .polygons()
        .into_iter()
        .map(|rings| ogr::to_ogr(&Geometry::Polygon(rings.to_vec())))
        .collect()
}

fn burn(dataset: &mut Dataset, geometries: &[gdal::vector::Geometry], values: &[f64]) -> Result<()> {
    if geometries.is_empty() {
        return Ok(());
    }
    gdal::raster::rasterize(dataset, &[1], geometries, values, None)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Coord;
    use crate::srs::SpatialReference;

    fn geoinfo() -> GeoInfo {
        GeoInfo::new(
            SpatialReference::from_epsg(3857).unwrap(),
            Affine::north_up(0.0, 10.0, 1.0, 1.0),
        )
    }

    fn count(mask: &Array2<bool>) -> usize {
        mask.iter().filter(|&&v| v).count()
    }

    #[test]
    fn test_square_uses_pixel_centres() {
        let square = Geometry::from_bbox(2.0, 2.0, 6.0, 5.0);
        let mask = polygon_mask(&square, &geoinfo().transform, 10, 10).unwrap();
        assert_eq!(count(&mask), 12);
        // row 5 covers y 4..5, col 2 covers x 2..3
        assert!(mask[[5, 2]]);
        assert!(mask[[7, 5]]);
        assert!(!mask[[4, 2]]);
        assert!(!mask[[5, 6]]);
    }

    #[test]
    fn test_hole_is_left_empty() {
        let polygon = Geometry::Polygon(vec![
            Geometry::from_bbox(0.0, 0.0, 10.0, 10.0).polygon_rings()[0].clone(),
            Geometry::from_bbox(3.0, 3.0, 7.0, 7.0).polygon_rings()[0].clone(),
        ]);
        let mask = polygon_mask(&polygon, &geoinfo().transform, 10, 10).unwrap();
        assert_eq!(count(&mask), 100 - 16);
        assert!(!mask[[5, 5]]);
    }

    #[test]
    fn test_multipolygon_parts_and_lines() {
        let parts = Geometry::MultiPolygon(vec![
            Geometry::from_bbox(0.0, 0.0, 2.0, 2.0).polygons()[0].to_vec(),
            Geometry::from_bbox(5.0, 5.0, 8.0, 6.0).polygons()[0].to_vec(),
        ]);
        let mask = polygon_mask(&parts, &geoinfo().transform, 10, 10).unwrap();
        assert_eq!(count(&mask), 4 + 3);

        let line = Geometry::LineString(vec![Coord::new(0.0, 0.0), Coord::new(9.0, 9.0)]);
        let mask = polygon_mask(&line, &geoinfo().transform, 10, 10).unwrap();
        assert_eq!(count(&mask), 0);
    }

    #[test]
    fn test_later_shapes_win() {
        let shapes = vec![
            (Geometry::from_bbox(0.0, 0.0, 10.0, 10.0), 1u8),
            (Geometry::from_bbox(0.0, 0.0, 5.0, 10.0), 2u8),
            (Geometry::LineString(vec![Coord::new(0.0, 0.0), Coord::new(9.0, 9.0)]), 3u8),
        ];
        let raster = rasterize(&shapes, &geoinfo(), (10, 10), 0).unwrap();
        let band = raster.band(0).unwrap();
        assert_eq!(band[[0, 0]], 2);
        assert_eq!(band[[0, 9]], 1);
        assert!(band.iter().all(|&v| v != 3));
        assert_eq!(raster.geoinfo(), Some(&geoinfo()));
    }

    #[test]
    fn test_fill_outside_shapes() {
        // the 4x4 grid spans y 6..10, so the square covers its bottom-left pixel
        let shapes = vec![(Geometry::from_bbox(0.0, 6.0, 1.0, 7.0), 7i16)];
        let raster = rasterize(&shapes, &geoinfo(), (4, 4), -1).unwrap();
        assert_eq!(raster.dtype(), crate::raster::DataType::Int16);
        let band = raster.band(0).unwrap();
        assert_eq!(band[[3, 0]], 7);
        assert_eq!(band.iter().filter(|&&v| v == -1).count(), 15);
    }
}
