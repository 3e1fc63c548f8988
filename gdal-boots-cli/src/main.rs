use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gdal_boots::raster::{probe_data_type, EsriShape, GTiff, GeoJsonDriver, Gpkg, Jp2OpenJpeg, Png};
use gdal_boots::{
    calc_best_resolution, calc_best_resolution_bbox, crop_by_geometry, make_valid_geojson,
    transform_geojson, union, warp, CropOptions, Cutline, DataType, GeometryBuilder, Progress,
    RasterDataset, RasterElement, Resampling, SpatialReference, UnionOptions, VectorDataset,
    WarpOptions,
};
use rayon::ThreadPoolBuilder;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of worker threads (default: number of CPU cores)
    #[arg(short, long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reproject and resample rasters, one output per input or mosaicked with --merge
    Warp(WarpArgs),
    /// Clip a raster to the polygons of a vector file and write the raster and its mask
    Crop(CropArgs),
    /// Mosaic grid-aligned rasters without resampling
    Union(UnionArgs),
    /// Polygonize a raster band into a vector file
    Vectorize(VectorizeArgs),
    /// Reproject a GeoJSON geometry between EPSG codes
    TransformGeojson(TransformArgs),
    /// Repair an invalid GeoJSON polygon or multipolygon
    MakeValid(MakeValidArgs),
    /// Resolution near the given one that divides a geometry's envelope into whole cells
    BestResolution(BestResolutionArgs),
}

#[derive(clap::Args, Debug)]
struct WarpArgs {
    /// Input rasters
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<PathBuf>,

    /// Output directory, or output file with --merge
    #[arg(short, long, value_name = "PATH")]
    output: PathBuf,

    /// Output CRS as EPSG code
    #[arg(long)]
    epsg: Option<u32>,

    /// Output pixel size
    #[arg(long, num_args = 2, value_names = ["X", "Y"])]
    resolution: Option<Vec<f64>>,

    /// Output extent
    #[arg(long, num_args = 4, value_names = ["X_MIN", "Y_MIN", "X_MAX", "Y_MAX"], allow_negative_numbers = true)]
    bbox: Option<Vec<f64>>,

    /// EPSG code of --bbox (default: output CRS)
    #[arg(long)]
    bbox_epsg: Option<u32>,

    #[arg(long, value_enum, default_value_t = ResamplingArg::Nearest)]
    resampling: ResamplingArg,

    /// Vector file whose polygons clip the output
    #[arg(long, value_name = "FILE")]
    cutline: Option<PathBuf>,

    #[arg(long, allow_negative_numbers = true)]
    nodata: Option<f64>,

    /// Mosaic all inputs into one output, later inputs on top
    #[arg(long)]
    merge: bool,
}

#[derive(clap::Args, Debug)]
struct CropArgs {
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Vector file (GeoJSON, GeoPackage, ...) with the crop polygons
    #[arg(short, long, value_name = "FILE")]
    geometry: PathBuf,

    /// Output raster; the mask is written next to it with a `_mask` suffix
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    #[arg(long, conflicts_with = "out_proj4")]
    out_epsg: Option<u32>,

    #[arg(long)]
    out_proj4: Option<String>,

    #[arg(long, num_args = 2, value_names = ["X", "Y"])]
    resolution: Option<Vec<f64>>,

    /// Keep pixels outside the geometry
    #[arg(long)]
    no_mask: bool,

    #[arg(long, value_enum, default_value_t = ResamplingArg::Nearest)]
    resampling: ResamplingArg,
}

#[derive(clap::Args, Debug)]
struct UnionArgs {
    #[arg(value_name = "INPUT", required = true, num_args = 2..)]
    inputs: Vec<PathBuf>,

    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Do not let nodata pixels of later inputs overwrite earlier ones
    #[arg(long)]
    nodata_aware: bool,
}

#[derive(clap::Args, Debug)]
struct VectorizeArgs {
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output vector file (.gpkg, .geojson or .shp)
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Zero-based band index
    #[arg(long, default_value_t = 0)]
    band: usize,

    #[arg(long)]
    overwrite: bool,
}

#[derive(clap::Args, Debug)]
struct TransformArgs {
    /// GeoJSON geometry file, `-` for stdin
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    #[arg(long)]
    from_epsg: u32,

    #[arg(long)]
    to_epsg: u32,

    /// Drop z coordinates
    #[arg(long)]
    flatten: bool,

    /// Decimal places in the output
    #[arg(long)]
    precision: Option<usize>,
}

#[derive(clap::Args, Debug)]
struct MakeValidArgs {
    /// GeoJSON geometry file, `-` for stdin
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    #[arg(long)]
    precision: Option<usize>,
}

#[derive(clap::Args, Debug)]
struct BestResolutionArgs {
    /// GeoJSON geometry file, `-` for stdin
    #[arg(value_name = "INPUT", conflicts_with = "bbox")]
    input: Option<PathBuf>,

    /// Box instead of a geometry
    #[arg(long, num_args = 4, value_names = ["X_MIN", "Y_MIN", "X_MAX", "Y_MAX"], allow_negative_numbers = true)]
    bbox: Option<Vec<f64>>,

    #[arg(long, num_args = 2, value_names = ["X", "Y"], required = true)]
    resolution: Vec<f64>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ResamplingArg {
    Nearest,
    Bilinear,
    Cubic,
}

impl From<ResamplingArg> for Resampling {
    fn from(arg: ResamplingArg) -> Self {
        match arg {
            ResamplingArg::Nearest => Resampling::Nearest,
            ResamplingArg::Bilinear => Resampling::Bilinear,
            ResamplingArg::Cubic => Resampling::Cubic,
        }
    }
}

/// Runs `$func::<T>(args)` with `T` matching a runtime [`DataType`].
macro_rules! dispatch {
    ($dtype:expr, $func:ident($($arg:expr),*)) => {
        match $dtype {
            DataType::UInt8 => $func::<u8>($($arg),*),
            DataType::UInt16 => $func::<u16>($($arg),*),
            DataType::Int16 => $func::<i16>($($arg),*),
            DataType::UInt32 => $func::<u32>($($arg),*),
            DataType::Int32 => $func::<i32>($($arg),*),
            DataType::Float32 => $func::<f32>($($arg),*),
            DataType::Float64 => $func::<f64>($($arg),*),
        }
    };
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let start_time = std::time::Instant::now();

    if let Some(threads) = args.threads {
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to build thread pool")?;
    }

    match &args.command {
        Command::Warp(warp_args) => {
            let dtype = probe_data_type(&warp_args.inputs[0])
                .with_context(|| format!("Failed to open {}", warp_args.inputs[0].display()))?;
            dispatch!(dtype, run_warp(warp_args))?
        }
        Command::Crop(crop_args) => {
            let dtype = probe_data_type(&crop_args.input)
                .with_context(|| format!("Failed to open {}", crop_args.input.display()))?;
            dispatch!(dtype, run_crop(crop_args))?
        }
        Command::Union(union_args) => {
            let dtype = probe_data_type(&union_args.inputs[0])
                .with_context(|| format!("Failed to open {}", union_args.inputs[0].display()))?;
            dispatch!(dtype, run_union(union_args))?
        }
        Command::Vectorize(vectorize_args) => {
            let dtype = probe_data_type(&vectorize_args.input)
                .with_context(|| format!("Failed to open {}", vectorize_args.input.display()))?;
            dispatch!(dtype, run_vectorize(vectorize_args))?
        }
        Command::TransformGeojson(transform_args) => {
            let geometry = read_geojson(&transform_args.input)?;
            let transformed = transform_geojson(
                &geometry,
                transform_args.from_epsg,
                transform_args.to_epsg,
                transform_args.flatten,
                transform_args.precision,
            )?;
            println!("{transformed}");
        }
        Command::MakeValid(make_valid_args) => {
            let geometry = read_geojson(&make_valid_args.input)?;
            println!("{}", make_valid_geojson(&geometry, make_valid_args.precision)?);
        }
        Command::BestResolution(resolution_args) => {
            let resolution = (resolution_args.resolution[0], resolution_args.resolution[1]);
            let (x, y) = match (&resolution_args.bbox, &resolution_args.input) {
                (Some(bbox), _) => calc_best_resolution_bbox(bbox[0], bbox[2], bbox[1], bbox[3], resolution),
                (None, Some(input)) => {
                    let geometry = GeometryBuilder::default().create(&read_geojson(input)?)?;
                    calc_best_resolution(&geometry, resolution)?
                }
                (None, None) => anyhow::bail!("Either a geometry file or --bbox is required"),
            };
            println!("{x} {y}");
        }
    }

    let elapsed = start_time.elapsed();
    info!("Total processing time: {:?}", elapsed);

    Ok(())
}

fn read_geojson(path: &Path) -> Result<Value> {
    let text = if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin())?
    } else {
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?
    };
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn pair(values: &Option<Vec<f64>>) -> Option<(f64, f64)> {
    values.as_ref().map(|v| (v[0], v[1]))
}

fn open_raster<T: RasterElement>(path: &Path) -> Result<RasterDataset<T>> {
    RasterDataset::open(path).with_context(|| format!("Failed to open {}", path.display()))
}

/// Writes `ds` with the driver matching the file extension (GeoTIFF by default).
fn write_raster<T: RasterElement>(ds: &RasterDataset<T>, path: &Path) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "png" => ds.to_file(path, &Png::default()),
        "jp2" => ds.to_file(path, &Jp2OpenJpeg::default()),
        _ => ds.to_file(path, &GTiff::deflate(6).with_tiles(256)),
    }
    .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Written: {:?}", path);
    Ok(())
}

fn run_warp<T: RasterElement>(args: &WarpArgs) -> Result<()> {
    if args.merge {
        let mut datasets: Vec<RasterDataset<T>> = Vec::with_capacity(args.inputs.len());
        for path in &args.inputs {
            datasets.push(open_raster(path)?);
        }
        let (primary, extra) = datasets
            .split_first()
            .context("No input rasters given")?;
        let mut options = warp_options(args)?;
        options.extra = extra.iter().collect();
        info!("Merging {} rasters", datasets.len());
        let merged = warp(primary, options)?;
        return write_raster(&merged, &args.output);
    }

    use rayon::prelude::*;

    fs::create_dir_all(&args.output)?;
    let results: Vec<Result<()>> = args
        .inputs
        .par_iter()
        .map(|path| {
            let ds = open_raster::<T>(path)?;
            let warped = warp(&ds, warp_options(args)?)?;
            let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("warped");
            write_raster(&warped, &args.output.join(format!("{name}.tif")))
        })
        .collect();

    let mut errors = Vec::new();
    for (i, result) in results.into_iter().enumerate() {
        if let Err(e) = result {
            errors.push(format!("{}: {:#}", args.inputs[i].display(), e));
        }
    }

    if !errors.is_empty() {
        error!("Failed to warp {} files:", errors.len());
        for err in &errors {
            error!("  {}", err);
        }
        anyhow::bail!("{} files failed to process", errors.len());
    }

    Ok(())
}

fn warp_options<'a, T: RasterElement>(args: &WarpArgs) -> Result<WarpOptions<'a, T>> {
    let mut options = WarpOptions::default().with_resampling(args.resampling.into());
    if let Some(epsg) = args.epsg {
        options = options.with_epsg(epsg)?;
    }
    if let Some(resolution) = pair(&args.resolution) {
        options = options.with_resolution(resolution);
    }
    if let Some(bbox) = &args.bbox {
        let bbox_srs = args.bbox_epsg.map(SpatialReference::from_epsg).transpose()?;
        options = options.with_bbox([bbox[0], bbox[1], bbox[2], bbox[3]], bbox_srs);
    }
    if let Some(cutline) = &args.cutline {
        options = options.with_cutline(Cutline::File(cutline.clone()));
    }
    if let Some(nodata) = args.nodata {
        options = options.with_nodata(nodata);
    }
    Ok(options)
}

fn run_crop<T: RasterElement>(args: &CropArgs) -> Result<()> {
    let ds = open_raster::<T>(&args.input)?;
    let vector = VectorDataset::open(&args.geometry)
        .with_context(|| format!("Failed to open {}", args.geometry.display()))?;
    let geometry = vector
        .collect_geometry()
        .with_context(|| format!("{} has no features", args.geometry.display()))?;

    let mut options = CropOptions::new()
        .with_apply_mask(!args.no_mask)
        .with_resampling(args.resampling.into());
    if let Some(srs) = vector.srs() {
        options = options.with_geometry_srs(srs.clone());
    }
    if let Some(epsg) = args.out_epsg {
        options = options.with_out_epsg(epsg);
    }
    if let Some(proj4) = &args.out_proj4 {
        options = options.with_out_proj4(proj4.as_str());
    }
    if let Some(resolution) = pair(&args.resolution) {
        options = options.with_resolution(resolution);
    }

    let (cropped, mask) = crop_by_geometry(&ds, &geometry, options)?;
    write_raster(&cropped, &args.output)?;

    let stem = args
        .output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("cropped");
    write_raster(&mask, &args.output.with_file_name(format!("{stem}_mask.tif")))
}

fn run_union<T: RasterElement>(args: &UnionArgs) -> Result<()> {
    let datasets: Vec<RasterDataset<T>> = args
        .inputs
        .iter()
        .map(|path| open_raster(path))
        .collect::<Result<_>>()?;
    let (first, rest) = datasets.split_first().context("No input rasters given")?;
    let rest: Vec<&RasterDataset<T>> = rest.iter().collect();

    let merged = union(
        first,
        &rest,
        UnionOptions {
            nodata_aware: args.nodata_aware,
        },
    )?;
    write_raster(&merged, &args.output)
}

fn run_vectorize<T: RasterElement>(args: &VectorizeArgs) -> Result<()> {
    let ds = open_raster::<T>(&args.input)?;
    let mut last_percent = 0;
    let progress = Progress::new(|fraction, _| {
        let percent = (fraction * 100.0) as u32;
        if percent >= last_percent + 10 {
            info!("Polygonizing: {}%", percent);
            last_percent = percent;
        }
        true
    });
    let vector = ds.to_vector(args.band, progress)?;

    let ext = args
        .output
        .extension()
        .and_then(|s| s.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "gpkg" => vector.to_file(&args.output, &Gpkg::default(), args.overwrite),
        "geojson" | "json" => vector.to_file(&args.output, &GeoJsonDriver::default(), args.overwrite),
        "shp" => vector.to_file(&args.output, &EsriShape::default(), args.overwrite),
        _ => anyhow::bail!("Output file must be .gpkg, .geojson or .shp"),
    }
    .with_context(|| format!("Failed to write {}", args.output.display()))?;
    info!("Written {} features: {:?}", vector.len(), args.output);
    Ok(())
}
