//! Normalized camera metadata
//!
//! Assembles the extractor outputs into one [`ExifMetadata`] record per image
//! and derives the camera identity used to group images that share a
//! physical camera and lens.
//!
//! ## Example
//!
//! ```rust
//! use exif_camera::{ExifExtractor, Tag, TagSet, XmpBlob};
//!
//! let tags = TagSet::new()
//!     .with(Tag::ImageMake, "DJI")
//!     .with(Tag::ImageModel, "FC6310")
//!     .with(Tag::FocalLengthIn35mmFilm, 24i64);
//! let xmp = XmpBlob::empty();
//! let loader = || Some((5472u32, 3648u32));
//!
//! let meta = ExifExtractor::new(&tags, &xmp, &loader).extract_exif();
//! assert_eq!(meta.camera, "v2 dji fc6310 5472 3648 perspective 0.6666");
//! ```

use serde::{Deserialize, Serialize};

use crate::extract::{strip_make, ExifExtractor};
use crate::numeric::repr_float_text;
use crate::opk::Opk;

/// Version prefix of camera identifiers
const CAMERA_ID_VERSION: &str = "v2";

/// Characters of the focal ratio kept in a camera identifier
const CAMERA_ID_FOCAL_CHARS: usize = 6;

// ============================================================================
// Core Metadata Types
// ============================================================================

/// Geolocation of an image
///
/// Latitude and longitude are either both set or both absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoFix {
    /// Decimal degrees, north positive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    
    /// Decimal degrees, east positive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    
    /// Meters, never above 1e4
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    
    /// Dilution of precision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dop: Option<f64>,
}

impl GeoFix {
    pub fn is_empty(&self) -> bool {
        *self == GeoFix::default()
    }
    
    /// `(latitude, longitude)` when both are known
    pub fn position(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}

/// Normalized per-image camera metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExifMetadata {
    pub make: String,
    pub model: String,
    pub width: u32,
    pub height: u32,
    pub projection_type: String,
    
    /// Focal length divided by sensor width
    pub focal_ratio: f64,
    
    /// EXIF orientation code (1-8)
    pub orientation: u32,
    
    /// Seconds since the Unix epoch (UTC), 0.0 when unknown
    pub capture_time: f64,
    
    pub gps: GeoFix,
    
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opk: Option<Opk>,
    
    /// Camera identity, see [`camera_id`]
    pub camera: String,
}

// ============================================================================
// Assembly
// ============================================================================

impl ExifExtractor<'_> {
    /// Run every extractor and assemble the metadata record
    pub fn extract_exif(&self) -> ExifMetadata {
        let (width, height) = self.extract_image_size();
        let projection_type = self.extract_projection_type();
        let (_, focal_ratio) = self.extract_focal();
        let make = self.extract_make();
        let model = self.extract_model();
        let orientation = self.extract_orientation();
        let gps = self.extract_geo();
        let capture_time = self.extract_capture_time();
        let opk = self.extract_opk(&gps);
        
        let mut metadata = ExifMetadata {
            make,
            model,
            width,
            height,
            projection_type,
            focal_ratio,
            orientation,
            capture_time,
            gps,
            opk,
            camera: String::new(),
        };
        metadata.camera = camera_id(&metadata);
        metadata
    }
}

/// Camera identity of a metadata record
pub fn camera_id(metadata: &ExifMetadata) -> String {
    camera_id_from_parts(
        &metadata.make,
        &metadata.model,
        metadata.width,
        metadata.height,
        &metadata.projection_type,
        metadata.focal_ratio,
    )
}

/// `"v2 {make} {model} {width} {height} {projection} {focal}"`, lowercase
///
/// The make is removed from the model and the focal ratio text is cut to six
/// characters, so images whose focal ratios only differ past that point
/// share one camera.
pub fn camera_id_from_parts(
    make: &str,
    model: &str,
    width: u32,
    height: u32,
    projection_type: &str,
    focal_ratio: f64,
) -> String {
    let model = strip_make(make, model);
    let focal: String = repr_float_text(focal_ratio)
        .chars()
        .take(CAMERA_ID_FOCAL_CHARS)
        .collect();
    [
        CAMERA_ID_VERSION,
        make.trim(),
        model.trim(),
        &width.to_string(),
        &height.to_string(),
        projection_type,
        &focal,
    ]
    .join(" ")
    .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::Ratio;
    use crate::tags::{Tag, TagSet};
    use crate::xmp::{XmpBlob, XmpKey};
    use std::collections::BTreeMap;
    
    #[test]
    fn test_camera_id_format() {
        assert_eq!(
            camera_id_from_parts("Canon", "Canon EOS 80D", 6000, 4000, "perspective", 0.7272727272727273),
            "v2 canon eos 80d 6000 4000 perspective 0.7272"
        );
        assert_eq!(
            camera_id_from_parts("unknown", "unknown", 640, 480, "perspective", 0.0),
            "v2 unknown unknown 640 480 perspective 0.0"
        );
        assert_eq!(
            camera_id_from_parts("GoPro", "HERO4 Black", 4000, 3000, "Fisheye", 1.0),
            "v2 gopro hero4 black 4000 3000 fisheye 1.0"
        );
    }
    
    #[test]
    fn test_camera_id_truncation_collides() {
        let a = camera_id_from_parts("A", "B", 10, 10, "perspective", 0.727201);
        let b = camera_id_from_parts("A", "B", 10, 10, "perspective", 0.727299);
        assert_eq!(a, b);
    }
    
    #[test]
    fn test_camera_id_changes_with_each_input() {
        let base = camera_id_from_parts("A", "B", 10, 20, "perspective", 0.5);
        assert_eq!(base, camera_id_from_parts("A", "B", 10, 20, "perspective", 0.5));
        assert_ne!(base, camera_id_from_parts("C", "B", 10, 20, "perspective", 0.5));
        assert_ne!(base, camera_id_from_parts("A", "D", 10, 20, "perspective", 0.5));
        assert_ne!(base, camera_id_from_parts("A", "B", 11, 20, "perspective", 0.5));
        assert_ne!(base, camera_id_from_parts("A", "B", 10, 21, "perspective", 0.5));
        assert_ne!(base, camera_id_from_parts("A", "B", 10, 20, "fisheye", 0.5));
        assert_ne!(base, camera_id_from_parts("A", "B", 10, 20, "perspective", 0.6));
    }
    
    #[test]
    fn test_geofix_position() {
        let fix = GeoFix {
            latitude: Some(46.5),
            longitude: Some(7.25),
            ..Default::default()
        };
        assert_eq!(fix.position(), Some((46.5, 7.25)));
        assert_eq!(GeoFix { longitude: None, ..fix }.position(), None);
        assert!(GeoFix::default().is_empty());
    }
    
    #[test]
    fn test_extract_exif_defaults() {
        let tags = TagSet::new();
        let xmp = XmpBlob::empty();
        let loader = || Some((100u32, 50u32));
        let meta = ExifExtractor::new(&tags, &xmp, &loader).extract_exif();
        assert_eq!(meta.make, "unknown");
        assert_eq!(meta.model, "unknown");
        assert_eq!((meta.width, meta.height), (100, 50));
        assert_eq!(meta.projection_type, "perspective");
        assert_eq!(meta.focal_ratio, 0.0);
        assert_eq!(meta.orientation, 1);
        assert_eq!(meta.capture_time, 0.0);
        assert!(meta.gps.is_empty());
        assert!(meta.opk.is_none());
        assert_eq!(meta.camera, "v2 unknown unknown 100 50 perspective 0.0");
    }
    
    #[test]
    fn test_extract_exif_drone_image() {
        let tags = TagSet::new()
            .with(Tag::ImageMake, "DJI")
            .with(Tag::ImageModel, "FC6310")
            .with(Tag::ExifImageWidth, 5472i64)
            .with(Tag::ExifImageLength, 3648i64)
            .with(Tag::FocalLength, Ratio::new(88, 10))
            .with(Tag::DateTimeOriginal, "2021:06:01 12:30:15");
        let fields: BTreeMap<String, String> = [
            (XmpKey::DjiLatitude, "+46.5"),
            (XmpKey::DjiLongitude, "+7.25"),
            (XmpKey::DjiAbsoluteAltitude, "+512.0"),
            (XmpKey::DjiGimbalYaw, "90"),
            (XmpKey::DjiGimbalPitch, "-90"),
            (XmpKey::DjiGimbalRoll, "0"),
        ]
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), v.to_string()))
        .collect();
        let xmp = XmpBlob::from_descriptions(vec![fields]);
        let loader = || -> Option<(u32, u32)> { None };
        
        let meta = ExifExtractor::new(&tags, &xmp, &loader).with_name("DJI_0001.JPG").extract_exif();
        // Sensor width comes from the bundled table (13.2 mm)
        assert!((meta.focal_ratio - 8.8 / 13.2).abs() < 1e-12);
        assert_eq!(meta.gps.latitude, Some(46.5));
        assert_eq!(meta.gps.altitude, Some(512.0));
        assert!(meta.opk.is_some());
        assert_eq!(meta.camera, "v2 dji fc6310 5472 3648 perspective 0.6666");
        assert_eq!(meta.capture_time, 1622550615.0);
    }
    
    #[test]
    fn test_serialized_field_names() {
        let tags = TagSet::new();
        let xmp = XmpBlob::empty();
        let loader = || Some((1u32, 1u32));
        let meta = ExifExtractor::new(&tags, &xmp, &loader).extract_exif();
        let json = serde_json::to_value(&meta).unwrap();
        for key in ["make", "model", "width", "height", "projection_type", "focal_ratio", "orientation", "capture_time", "gps", "camera"] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        assert!(json.get("opk").is_none());
        
        let back: ExifMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }
}
