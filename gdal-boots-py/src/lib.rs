use ::gdal_boots::geometry::GeometryBuilder;
use ::gdal_boots::Error;
use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use serde_json::Value;

#[pymodule]
fn gdal_boots(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(transform_geojson, m)?)?;
    m.add_function(wrap_pyfunction!(make_valid_geojson, m)?)?;
    m.add_function(wrap_pyfunction!(calc_best_resolution_bbox, m)?)?;
    m.add_function(wrap_pyfunction!(calc_best_resolution, m)?)?;
    Ok(())
}

fn to_py_err(e: Error) -> PyErr {
    match e {
        Error::UnsupportedGeometryType(_)
        | Error::InvalidGeoJson(_)
        | Error::InvalidArgument(_)
        | Error::Json(_)
        | Error::Transform { .. }
        | Error::GeometryRepair(_) => PyErr::new::<PyValueError, _>(e.to_string()),
        Error::Io(_) | Error::FileExists(_) => PyErr::new::<PyIOError, _>(e.to_string()),
        _ => PyErr::new::<PyRuntimeError, _>(e.to_string()),
    }
}

fn parse(geometry: &str) -> PyResult<Value> {
    serde_json::from_str(geometry)
        .map_err(|e| PyErr::new::<PyValueError, _>(format!("Invalid GeoJSON: {}", e)))
}

/// Reprojects a GeoJSON geometry string and returns the result as a string.
#[pyfunction]
#[pyo3(signature = (geometry, from_epsg, to_epsg, flatten=true, precision=None))]
pub fn transform_geojson(
    geometry: &str,
    from_epsg: u32,
    to_epsg: u32,
    flatten: bool,
    precision: Option<usize>,
) -> PyResult<String> {
    let value = parse(geometry)?;
    ::gdal_boots::transform_geojson(&value, from_epsg, to_epsg, flatten, precision)
        .map(|v| v.to_string())
        .map_err(to_py_err)
}

#[pyfunction]
#[pyo3(signature = (geometry, precision=None))]
pub fn make_valid_geojson(geometry: &str, precision: Option<usize>) -> PyResult<String> {
    let value = parse(geometry)?;
    ::gdal_boots::make_valid_geojson(&value, precision)
        .map(|v| v.to_string())
        .map_err(to_py_err)
}

#[pyfunction]
pub fn calc_best_resolution_bbox(
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
    orig_resolution: (f64, f64),
) -> (f64, f64) {
    ::gdal_boots::calc_best_resolution_bbox(x_min, x_max, y_min, y_max, orig_resolution)
}

#[pyfunction]
pub fn calc_best_resolution(geometry: &str, orig_resolution: (f64, f64)) -> PyResult<(f64, f64)> {
    let geometry = GeometryBuilder::default()
        .create(&parse(geometry)?)
        .map_err(to_py_err)?;
    ::gdal_boots::calc_best_resolution(&geometry, orig_resolution).map_err(to_py_err)
}
