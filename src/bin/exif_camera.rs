// exif_camera - metadata inspector
// Prints one JSON record (metadata + resolved camera) per input image

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use exif_camera::file::extract_exif_batch_with;
use exif_camera::{
    calibration_from_metadata, camera_calibration, camera_from_calibration, sensor_data,
    Calibration, CalibrationDatabase, Camera, Config, ExifMetadata, SensorDatabase,
};

#[derive(Parser)]
#[command(name = "exif_camera", version, about = "Camera geometry from image EXIF/XMP metadata")]
struct Args {
    /// Images to inspect
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// JSON settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Ignore EXIF dimensions and read the image header instead
    #[arg(long)]
    no_exif_size: bool,

    /// Focal ratio used when nothing else resolves
    #[arg(long)]
    focal_prior: Option<f64>,

    /// Sensor width table replacing the bundled one
    #[arg(long)]
    sensors: Option<PathBuf>,

    /// Hard-coded calibration table replacing the bundled one
    #[arg(long)]
    calibrations: Option<PathBuf>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

#[derive(Serialize)]
struct ImageReport<'a> {
    file: String,
    metadata: &'a ExifMetadata,
    calibration: &'a Calibration,
    camera: Option<Camera>,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let custom_sensors = args
        .sensors
        .as_deref()
        .map(|path| {
            SensorDatabase::from_json_file(path)
                .with_context(|| format!("Failed to load sensor table {}", path.display()))
        })
        .transpose()?;
    let sensors = custom_sensors.as_ref().unwrap_or_else(|| sensor_data());

    let custom_calibrations = args
        .calibrations
        .as_deref()
        .map(|path| {
            CalibrationDatabase::from_json_file(path)
                .with_context(|| format!("Failed to load calibration table {}", path.display()))
        })
        .transpose()?;
    let calibrations = custom_calibrations.as_ref().unwrap_or_else(|| camera_calibration());

    info!("Inspecting {} images", args.files.len());

    let mut failures = 0usize;
    for (path, result) in extract_exif_batch_with(&args.files, &config, sensors) {
        let metadata = match result {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                failures += 1;
                continue;
            }
        };

        let calibration = calibration_from_metadata(&metadata, calibrations, &config);
        let camera = camera_from_calibration(&metadata, &calibration)
            .map_err(|e| warn!("No camera for {}: {}", path.display(), e))
            .ok();

        let report = ImageReport {
            file: path.to_string_lossy().to_string(),
            metadata: &metadata,
            calibration: &calibration,
            camera,
        };
        let line = if args.pretty {
            serde_json::to_string_pretty(&report)?
        } else {
            serde_json::to_string(&report)?
        };
        println!("{}", line);
    }

    if failures > 0 {
        anyhow::bail!("{} of {} images could not be read", failures, args.files.len());
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    if args.no_exif_size {
        config.use_exif_size = false;
    }
    if let Some(focal_prior) = args.focal_prior {
        config.default_focal_prior = focal_prior;
    }
    Ok(config)
}
