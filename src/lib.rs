pub mod error;
mod gdal_interop;
pub mod geometry;
pub mod progress;
pub mod raster;
pub mod srs;
pub mod transform;
pub mod util;
pub mod vector;

pub use error::{Error, Result};
pub use geometry::{
    calc_best_resolution, calc_best_resolution_bbox, make_valid, make_valid_geojson, to_geojson,
    Coord, Geometry, GeometryBuilder, GeometryGeoJson,
};
pub use progress::Progress;
pub use raster::{
    crop_by_geometry, fast_warp, fast_warp_as_array, union, warp, CropOptions, Cutline, DataType,
    GeoInfo, RasterDataset, RasterElement, Resampling, UnionOptions, WarpOptions,
};
pub use srs::{SpatialReference, Transformer};
pub use transform::{transform, transform_by_srs, transform_geojson, GeoGeometry};
pub use util::check_maximum_one_value_not_none;
pub use vector::{Feature, VectorDataset};
