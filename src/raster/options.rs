//! GDAL driver selection and creation options.

use gdal::cpl::CslStringList;

use crate::error::Result;

/// A raster output format: GDAL driver name plus its creation options.
pub trait RasterDriver {
    fn driver_name(&self) -> &'static str;

    /// File extension without the dot, used for `/vsimem/` paths.
    fn extension(&self) -> &'static str;

    fn creation_options(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    fn csl_options(&self) -> Result<CslStringList> {
        to_csl(self.creation_options())
    }
}

/// A vector output format.
pub trait VectorDriver {
    fn driver_name(&self) -> &'static str;

    fn extension(&self) -> &'static str;

    fn layer_options(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    fn csl_options(&self) -> Result<CslStringList> {
        to_csl(self.layer_options())
    }
}

fn to_csl(options: Vec<(&'static str, String)>) -> Result<CslStringList> {
    let mut csl = CslStringList::new();
    for (name, value) in options {
        csl.set_name_value(name, &value)?;
    }
    Ok(csl)
}

fn yes_no(value: bool) -> String {
    if value { "YES" } else { "NO" }.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compress {
    None,
    Deflate,
    Lzw,
    Zstd,
    Packbits,
    Jpeg,
}

impl Compress {
    fn as_gdal(self) -> &'static str {
        match self {
            Compress::None => "NONE",
            Compress::Deflate => "DEFLATE",
            Compress::Lzw => "LZW",
            Compress::Zstd => "ZSTD",
            Compress::Packbits => "PACKBITS",
            Compress::Jpeg => "JPEG",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GTiff {
    pub compress: Option<Compress>,
    pub zlevel: Option<u8>,
    pub predictor: Option<u8>,
    pub tiled: bool,
    /// Block size used when `tiled` is set.
    pub block_size: Option<usize>,
    pub bigtiff: bool,
    pub num_threads: Option<usize>,
}

impl GTiff {
    pub fn deflate(zlevel: u8) -> Self {
        Self {
            compress: Some(Compress::Deflate),
            zlevel: Some(zlevel),
            ..Default::default()
        }
    }

    pub fn with_tiles(mut self, block_size: usize) -> Self {
        self.tiled = true;
        self.block_size = Some(block_size);
        self
    }
}

impl RasterDriver for GTiff {
    fn driver_name(&self) -> &'static str {
        "GTiff"
    }

    fn extension(&self) -> &'static str {
        "tif"
    }

    fn creation_options(&self) -> Vec<(&'static str, String)> {
        let mut options = Vec::new();
        if let Some(compress) = self.compress {
            options.push(("COMPRESS", compress.as_gdal().to_string()));
        }
        if let Some(zlevel) = self.zlevel {
            options.push(("ZLEVEL", zlevel.to_string()));
        }
        if let Some(predictor) = self.predictor {
            options.push(("PREDICTOR", predictor.to_string()));
        }
        if self.tiled {
            options.push(("TILED", yes_no(true)));
            if let Some(size) = self.block_size {
                options.push(("BLOCKXSIZE", size.to_string()));
                options.push(("BLOCKYSIZE", size.to_string()));
            }
        }
        if self.bigtiff {
            options.push(("BIGTIFF", yes_no(true)));
        }
        if let Some(threads) = self.num_threads {
            options.push(("NUM_THREADS", threads.to_string()));
        }
        options
    }
}

#[derive(Debug, Clone, Default)]
pub struct Png {
    /// zlib level 1..=9
    pub zlevel: Option<u8>,
}

impl RasterDriver for Png {
    fn driver_name(&self) -> &'static str {
        "PNG"
    }

    fn extension(&self) -> &'static str {
        "png"
    }

    fn creation_options(&self) -> Vec<(&'static str, String)> {
        self.zlevel
            .map(|z| vec![("ZLEVEL", z.to_string())])
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Jp2OpenJpeg {
    /// Percentage of the uncompressed size, 100 for lossless-like output.
    pub quality: Option<u8>,
    pub reversible: Option<bool>,
    pub block_size: Option<usize>,
    pub num_resolutions: Option<u8>,
}

impl RasterDriver for Jp2OpenJpeg {
    fn driver_name(&self) -> &'static str {
        "JP2OpenJPEG"
    }

    fn extension(&self) -> &'static str {
        "jp2"
    }

    fn creation_options(&self) -> Vec<(&'static str, String)> {
        let mut options = Vec::new();
        if let Some(quality) = self.quality {
            options.push(("QUALITY", quality.to_string()));
        }
        if let Some(reversible) = self.reversible {
            options.push(("REVERSIBLE", yes_no(reversible)));
        }
        if let Some(size) = self.block_size {
            options.push(("BLOCKXSIZE", size.to_string()));
            options.push(("BLOCKYSIZE", size.to_string()));
        }
        if let Some(n) = self.num_resolutions {
            options.push(("RESOLUTIONS", n.to_string()));
        }
        options
    }
}

/// In-memory GDAL raster, used as the staging dataset for every write.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mem;

impl RasterDriver for Mem {
    fn driver_name(&self) -> &'static str {
        "MEM"
    }

    fn extension(&self) -> &'static str {
        ""
    }
}

#[derive(Debug, Clone, Default)]
pub struct Gpkg {
    pub spatial_index: Option<bool>,
}

impl VectorDriver for Gpkg {
    fn driver_name(&self) -> &'static str {
        "GPKG"
    }

    fn extension(&self) -> &'static str {
        "gpkg"
    }

    fn layer_options(&self) -> Vec<(&'static str, String)> {
        self.spatial_index
            .map(|v| vec![("SPATIAL_INDEX", yes_no(v))])
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct GeoJsonDriver {
    pub coordinate_precision: Option<usize>,
    pub rfc7946: bool,
}

impl VectorDriver for GeoJsonDriver {
    fn driver_name(&self) -> &'static str {
        "GeoJSON"
    }

    fn extension(&self) -> &'static str {
        "geojson"
    }

    fn layer_options(&self) -> Vec<(&'static str, String)> {
        let mut options = Vec::new();
        if let Some(precision) = self.coordinate_precision {
            options.push(("COORDINATE_PRECISION", precision.to_string()));
        }
        if self.rfc7946 {
            options.push(("RFC7946", yes_no(true)));
        }
        options
    }
}

#[derive(Debug, Clone, Default)]
pub struct EsriShape {
    pub encoding: Option<String>,
}

impl VectorDriver for EsriShape {
    fn driver_name(&self) -> &'static str {
        "ESRI Shapefile"
    }

    fn extension(&self) -> &'static str {
        "shp"
    }

    fn layer_options(&self) -> Vec<(&'static str, String)> {
        self.encoding
            .clone()
            .map(|e| vec![("ENCODING", e)])
            .unwrap_or_default()
    }
}
