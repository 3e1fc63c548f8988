use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0} is not supported")]
    UnsupportedGeometryType(String),

    #[error("Invalid GeoJSON geometry: {0}")]
    InvalidGeoJson(String),

    #[error("Failed to transform from {from} to {to}: {message}")]
    Transform {
        from: String,
        to: String,
        message: String,
    },

    #[error("Failed to repair geometry: {0}")]
    GeometryRepair(String),

    #[error("Crop failed: {0}")]
    Crop(String),

    #[error("Operation cancelled by progress callback")]
    Cancelled,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("File already exists: {0}")]
    FileExists(PathBuf),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
