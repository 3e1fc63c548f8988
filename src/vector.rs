//! Vector datasets held in memory: features with a geometry and properties.

use std::path::Path;

use gdal::vector::{FieldValue, LayerAccess, LayerOptions, OGRFieldType, OGRwkbGeometryType};
use gdal::{Dataset, DriverManager};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::geometry::{ogr, Geometry, GeometryGeoJson};
use crate::raster::VectorDriver;
use crate::srs::SpatialReference;

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Geometry,
    pub properties: Map<String, Value>,
}

impl Feature {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            properties: Map::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct VectorDataset {
    features: Vec<Feature>,
    srs: Option<SpatialReference>,
}

impl VectorDataset {
    pub fn new(features: Vec<Feature>, srs: Option<SpatialReference>) -> Self {
        Self { features, srs }
    }

    /// Opens anything OGR can read: a file path or inline GeoJSON text.
    /// Features of every layer are loaded.
    pub fn open(source: impl AsRef<Path>) -> Result<Self> {
        let dataset = Dataset::open(source.as_ref())?;
        let vector = Self::from_gdal(&dataset)?;
        debug!(
            "Opened vector dataset with {} features in {:?}",
            vector.features.len(),
            vector.srs
        );
        Ok(vector)
    }

    pub(crate) fn from_gdal(dataset: &Dataset) -> Result<Self> {
        let mut features = Vec::new();
        let mut srs = None;
        for mut layer in dataset.layers() {
            if srs.is_none() {
                srs = layer
                    .spatial_ref()
                    .map(|s| SpatialReference::from_spatial_ref(&s));
            }
            for feature in layer.features() {
                let Some(geometry) = feature.geometry() else {
                    continue;
                };
                let mut properties = Map::new();
                for (name, value) in feature.fields() {
                    properties.insert(name, value.map(field_to_json).unwrap_or(Value::Null));
                }
                features.push(Feature {
                    geometry: ogr::from_ogr(geometry)?,
                    properties,
                });
            }
        }
        Ok(Self { features, srs })
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn geometries(&self) -> impl Iterator<Item = &Geometry> {
        self.features.iter().map(|f| &f.geometry)
    }

    pub fn srs(&self) -> Option<&SpatialReference> {
        self.srs.as_ref()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// All geometries merged into one collection, or `None` when empty.
    pub fn collect_geometry(&self) -> Option<Geometry> {
        match self.features.len() {
            0 => None,
            1 => Some(self.features[0].geometry.clone()),
            _ => Some(Geometry::GeometryCollection(
                self.geometries().cloned().collect(),
            )),
        }
    }

    /// GeoJSON FeatureCollection of the dataset.
    pub fn to_geojson(&self, precision: Option<usize>) -> Value {
        let serializer = GeometryGeoJson::new(precision);
        let features: Vec<Value> = self
            .features
            .iter()
            .map(|f| {
                json!({
                    "type": "Feature",
                    "geometry": serializer.convert(&f.geometry),
                    "properties": f.properties,
                })
            })
            .collect();
        json!({"type": "FeatureCollection", "features": features})
    }

    /// Writes every feature into a single layer. An existing file is replaced
    /// only when `overwrite` is set.
    pub fn to_file<P: AsRef<Path>>(
        &self,
        path: P,
        driver: &impl VectorDriver,
        overwrite: bool,
    ) -> Result<()> {
        let path = path.as_ref();
        let gdal_driver = DriverManager::get_driver_by_name(driver.driver_name())?;
        if path.exists() {
            if !overwrite {
                return Err(Error::FileExists(path.to_path_buf()));
            }
            // removes sidecar files (.dbf, .shx, .prj) along with the main file
            gdal_driver.delete(path)?;
            debug!("Deleted existing {}", path.display());
        }

        let mut dataset = gdal_driver.create_vector_only(path)?;
        let srs = self.srs.as_ref().map(SpatialReference::to_spatial_ref);
        let layer_options: Vec<String> = driver
            .layer_options()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        let layer_options: Vec<&str> = layer_options.iter().map(String::as_str).collect();

        let mut layer = dataset.create_layer(LayerOptions {
            name: layer_name(path),
            srs: srs.as_ref(),
            ty: OGRwkbGeometryType::wkbUnknown,
            options: Some(layer_options.as_slice()),
        })?;

        let schema = self.schema();
        let defn: Vec<(&str, OGRFieldType::Type)> =
            schema.iter().map(|(name, ty)| (name.as_str(), *ty)).collect();
        layer.create_defn_fields(&defn)?;

        for feature in &self.features {
            let mut names = Vec::new();
            let mut values = Vec::new();
            for (name, ty) in &schema {
                if let Some(value) = feature.properties.get(name).and_then(|v| json_to_field(v, *ty)) {
                    names.push(name.as_str());
                    values.push(value);
                }
            }
            layer.create_feature_fields(ogr::to_ogr(&feature.geometry)?, &names, &values)?;
        }

        info!(
            "Wrote {} features to {} ({})",
            self.features.len(),
            path.display(),
            driver.driver_name()
        );
        Ok(())
    }

    /// Field names and types, inferred from the first non-null value of each property.
    fn schema(&self) -> Vec<(String, OGRFieldType::Type)> {
        let mut schema: Vec<(String, OGRFieldType::Type)> = Vec::new();
        for feature in &self.features {
            for (name, value) in &feature.properties {
                if value.is_null() || schema.iter().any(|(n, _)| n == name) {
                    continue;
                }
                let ty = match value {
                    Value::Number(n) if n.is_i64() || n.is_u64() => OGRFieldType::OFTInteger64,
                    Value::Number(_) => OGRFieldType::OFTReal,
                    _ => OGRFieldType::OFTString,
                };
                schema.push((name.clone(), ty));
            }
        }
        schema
    }
}

fn layer_name(path: &Path) -> &str {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("layer")
}

fn field_to_json(value: FieldValue) -> Value {
    match value {
        FieldValue::IntegerValue(v) => json!(v),
        FieldValue::Integer64Value(v) => json!(v),
        FieldValue::RealValue(v) => json!(v),
        FieldValue::StringValue(v) => json!(v),
        other => other.into_string().map(Value::String).unwrap_or(Value::Null),
    }
}

fn json_to_field(value: &Value, ty: OGRFieldType::Type) -> Option<FieldValue> {
    match (ty, value) {
        (_, Value::Null) => None,
        (OGRFieldType::OFTInteger64, v) => v.as_i64().map(FieldValue::Integer64Value),
        (OGRFieldType::OFTReal, v) => v.as_f64().map(FieldValue::RealValue),
        (_, Value::String(s)) => Some(FieldValue::StringValue(s.clone())),
        (_, other) => Some(FieldValue::StringValue(other.to_string())),
    }
}
