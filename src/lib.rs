//! exif_camera - camera geometry from image metadata
//!
//! Normalizes EXIF tags and XMP drone/panorama fields into one metadata record
//! per image, resolves an intrinsic calibration for it and builds the matching
//! camera model. Absolute orientation (omega/phi/kappa) and geolocation are
//! recovered when the image carries them.

pub mod calibration;
pub mod camera;
pub mod config;
pub mod error;
pub mod extract;
pub mod file;
pub mod geo;
pub mod metadata;
pub mod numeric;
pub mod opk;
pub mod reference;
pub mod tags;
pub mod xmp;

pub use calibration::{calibration_from_metadata, Calibration, CalibrationFamily};
pub use camera::{camera_from_calibration, camera_from_exif_metadata, Camera, Projection, ProjectionType};
pub use config::Config;
pub use error::{ExifError, Result};
pub use extract::ExifExtractor;
pub use file::{extract_exif_batch, extract_exif_from_file};
pub use metadata::{camera_id, camera_id_from_parts, ExifMetadata, GeoFix};
pub use numeric::Ratio;
pub use opk::Opk;
pub use reference::{camera_calibration, sensor_data, CalibrationDatabase, MakeCalibrations, SensorDatabase};
pub use tags::{Tag, TagSet, TagSource, TagValue};
pub use xmp::{XmpBlob, XmpKey};
