//! Image file adapters
//!
//! Reads images from disk and feeds their EXIF container and XMP packet into
//! the extractors. Decoding the pixel data is never needed: the `image` crate
//! only probes the header when the tags do not carry the image size.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::Result;
use crate::extract::ExifExtractor;
use crate::metadata::ExifMetadata;
use crate::reference::{sensor_data, SensorDatabase};
use crate::tags::TagSet;
use crate::xmp::XmpBlob;

/// Extract the metadata record of one image file
pub fn extract_exif_from_file(path: &Path, config: &Config) -> Result<ExifMetadata> {
    extract_exif_from_file_with(path, config, sensor_data())
}

/// Same as [`extract_exif_from_file`] with a caller-supplied sensor table
pub fn extract_exif_from_file_with(
    path: &Path,
    config: &Config,
    sensors: &SensorDatabase,
) -> Result<ExifMetadata> {
    let bytes = std::fs::read(path)?;
    let name = path.to_string_lossy();
    
    let tags = read_tags(&bytes, &name);
    let xmp = XmpBlob::from_image_bytes(&bytes);
    let loader = || match image::image_dimensions(path) {
        Ok(size) => Some(size),
        Err(e) => {
            debug!("Cannot read image header of \"{}\": {}", name, e);
            None
        }
    };
    
    let metadata = ExifExtractor::new(&tags, &xmp, &loader)
        .with_name(name.to_string())
        .use_exif_size(config.use_exif_size)
        .with_sensor_database(sensors)
        .extract_exif();
    Ok(metadata)
}

/// Extract metadata from many files in parallel
///
/// Results keep the input order; a failing file does not stop the others.
pub fn extract_exif_batch(
    paths: &[PathBuf],
    config: &Config,
) -> Vec<(PathBuf, Result<ExifMetadata>)> {
    extract_exif_batch_with(paths, config, sensor_data())
}

/// Same as [`extract_exif_batch`] with a caller-supplied sensor table
pub fn extract_exif_batch_with(
    paths: &[PathBuf],
    config: &Config,
    sensors: &SensorDatabase,
) -> Vec<(PathBuf, Result<ExifMetadata>)> {
    info!("Extracting EXIF from {} images", paths.len());
    paths
        .par_iter()
        .map(|path| (path.clone(), extract_exif_from_file_with(path, config, sensors)))
        .collect()
}

/// Typed tags of the EXIF container embedded in an image (JPEG, TIFF, PNG, ...)
pub fn read_exif_tags(bytes: &[u8]) -> Result<TagSet> {
    let exif_data = exif::Reader::new().read_from_container(&mut Cursor::new(bytes))?;
    Ok(TagSet::from_exif(&exif_data))
}

/// Same as [`read_exif_tags`], empty when the image has no EXIF container
fn read_tags(bytes: &[u8], name: &str) -> TagSet {
    match read_exif_tags(bytes) {
        Ok(tags) => tags,
        Err(e) => {
            debug!("No EXIF data in \"{}\": {}", name, e);
            TagSet::new()
        }
    }
}
