use gdal::DriverManager;
use gdal_boots::raster::{Affine, GTiff};
use gdal_boots::{
    crop_by_geometry, fast_warp, union, warp, CropOptions, GeoInfo, Geometry, GeometryBuilder,
    Progress, RasterDataset, SpatialReference, UnionOptions, VectorDataset, WarpOptions,
};
use ndarray::Array3;
use serde_json::json;
use tempfile::TempDir;

fn gtiff_available() -> bool {
    if DriverManager::get_driver_by_name("GTiff").is_err() {
        eprintln!("GDAL driver GTiff not available, skipping test");
        return false;
    }
    true
}

/// 100 x 100 tile of 10 m pixels in UTM 35N whose values encode the tile.
fn tile(x0: f64, y0: f64, value: u16) -> RasterDataset<u16> {
    let data = Array3::from_shape_fn((1, 100, 100), |(_, r, c)| value + ((r + c) % 10) as u16);
    let geoinfo = GeoInfo::from_epsg(32635, Affine::north_up(x0, y0, 10.0, 10.0)).unwrap();
    let mut ds = RasterDataset::from_array(data, Some(geoinfo)).unwrap();
    ds.set_nodata(Some(0.0));
    ds
}

#[test]
fn test_open_warp_crop_union_write() {
    if !gtiff_available() {
        return;
    }
    let temp_dir = TempDir::new().unwrap();

    let west_path = temp_dir.path().join("west.tif");
    let east_path = temp_dir.path().join("east.tif");
    tile(500_000.0, 6_000_000.0, 100).to_file(&west_path, &GTiff::deflate(6)).unwrap();
    tile(501_000.0, 6_000_000.0, 200).to_file(&east_path, &GTiff::default()).unwrap();

    let west = RasterDataset::<u16>::open(&west_path).unwrap();
    let east = RasterDataset::<u16>::open(&east_path).unwrap();
    assert_eq!(west.nodata(), &[Some(0.0)]);

    // grid-aligned tiles: union and a same-CRS warp mosaic agree
    let merged = union(&west, &[&east], UnionOptions { nodata_aware: true }).unwrap();
    assert_eq!(merged.shape(), (1, 100, 200));
    let mosaic = warp(&west, WarpOptions::default().with_extra(&east)).unwrap();
    assert_eq!(mosaic.data(), merged.data());
    assert_eq!(mosaic.geoinfo(), merged.geoinfo());

    // reprojection to web mercator keeps both tiles' values
    let mercator = warp(&merged, WarpOptions::default().with_epsg(3857).unwrap()).unwrap();
    assert_eq!(mercator.geoinfo().unwrap().epsg(), Some(3857));
    let band = mercator.band(0).unwrap();
    assert!(band.iter().any(|&v| (100..110).contains(&v)));
    assert!(band.iter().any(|&v| (200..210).contains(&v)));

    // crop a polygon straddling both tiles, given in the raster CRS
    let polygon = GeometryBuilder::default()
        .create(&json!({
            "type": "Polygon",
            "coordinates": [[
                [500_800.0, 5_999_300.0],
                [501_300.0, 5_999_300.0],
                [501_050.0, 5_999_700.0],
                [500_800.0, 5_999_300.0]
            ]]
        }))
        .unwrap();
    let options = CropOptions::new()
        .with_geometry_srs(SpatialReference::from_epsg(32635).unwrap());
    let (cropped, mask) = crop_by_geometry(&merged, &polygon, options).unwrap();
    assert_eq!(cropped.shape(), (1, 40, 50));
    assert_eq!(cropped.bounds(None).unwrap(), [[500_800.0, 5_999_300.0], [501_300.0, 5_999_700.0]]);
    let inside = mask.data().iter().filter(|&&v| v == 1).count();
    assert!(inside > 0 && inside < 40 * 50);
    // outside the triangle the cropped raster holds nodata
    assert_eq!(cropped.band(0).unwrap()[[0, 0]], 0);
    assert!(cropped.band(0).unwrap()[[39, 25]] >= 100);

    // fast_warp over the same box matches the unmasked crop
    let fast = fast_warp(&merged, [500_800.0, 5_999_300.0, 501_300.0, 5_999_700.0], None).unwrap();
    let (unmasked, _) = crop_by_geometry(
        &merged,
        &polygon,
        CropOptions::new()
            .with_geometry_srs(SpatialReference::from_epsg(32635).unwrap())
            .with_apply_mask(false),
    )
    .unwrap();
    assert_eq!(fast.data(), unmasked.data());

    let out_path = temp_dir.path().join("cropped.tif");
    cropped.to_file(&out_path, &GTiff::deflate(9)).unwrap();
    let reloaded = RasterDataset::<u16>::open(&out_path).unwrap();
    assert_eq!(reloaded.data(), cropped.data());
    assert_eq!(reloaded.geoinfo().unwrap().transform, cropped.geoinfo().unwrap().transform);
}

#[test]
fn test_vectorize_then_cutline() {
    let mut data = Array3::from_elem((1, 50, 50), 1u8);
    data.slice_mut(ndarray::s![.., 10..30, 10..30]).fill(2);
    let geoinfo = GeoInfo::from_epsg(32635, Affine::north_up(0.0, 500.0, 10.0, 10.0)).unwrap();
    let ds = RasterDataset::from_array(data, Some(geoinfo)).unwrap();

    let vector = ds.to_vector(0, Progress::default()).unwrap();
    assert_eq!(vector.len(), 2);

    let square: Vec<_> = vector
        .features()
        .iter()
        .filter(|f| f.properties["value"] == 2)
        .cloned()
        .collect();
    let cutline = VectorDataset::new(square, vector.srs().cloned());
    let clipped = warp(
        &ds,
        WarpOptions::default().with_cutline(gdal_boots::Cutline::Vector(&cutline)),
    )
    .unwrap();
    assert_eq!(clipped.shape(), (1, 20, 20));
    assert!(clipped.data().iter().all(|&v| v == 2));

    let envelope = cutline.collect_geometry().and_then(|g: Geometry| g.envelope());
    assert_eq!(envelope, Some((100.0, 300.0, 200.0, 400.0)));
}
