//! Calibration resolution
//!
//! Picks the intrinsic parameters a camera starts from. Sources are tried in
//! order until one resolves:
//!
//! 1. a hard-coded calibration for the make (and model or focal length),
//! 2. a distortion-free default built from the image's own focal ratio,
//! 3. the configured focal prior, which always succeeds.
//!
//! Which default applies in step 2 depends on the projection family: the
//! symmetric models carry a single focal ratio, the asymmetric ones separate
//! focal lengths and a principal point.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::metadata::ExifMetadata;
use crate::reference::CalibrationDatabase;

/// Projection types whose calibration carries `focal_x`/`focal_y` and a
/// principal point
const ASYMMETRIC_PROJECTIONS: [&str; 6] = [
    "brown",
    "fisheye_opencv",
    "radial",
    "simple_radial",
    "fisheye62",
    "fisheye624",
];

/// Intrinsic calibration parameters
///
/// Symmetric projections read `focal`, asymmetric ones `focal_x`, `focal_y`
/// and the principal point. Distortion terms a model does not use stay zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection_type: Option<String>,
    
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focal: Option<f64>,
    
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focal_x: Option<f64>,
    
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focal_y: Option<f64>,
    
    #[serde(default)]
    pub c_x: f64,
    #[serde(default)]
    pub c_y: f64,
    
    #[serde(default)]
    pub k1: f64,
    #[serde(default)]
    pub k2: f64,
    #[serde(default)]
    pub k3: f64,
    #[serde(default)]
    pub k4: f64,
    #[serde(default)]
    pub k5: f64,
    #[serde(default)]
    pub k6: f64,
    #[serde(default)]
    pub p1: f64,
    #[serde(default)]
    pub p2: f64,
    #[serde(default)]
    pub s0: f64,
    #[serde(default)]
    pub s1: f64,
    #[serde(default)]
    pub s2: f64,
    #[serde(default)]
    pub s3: f64,
    
    /// Fisheye/perspective blend of the dual model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<f64>,
}

/// Parameter layout family of a projection type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationFamily {
    /// Single focal ratio (perspective, fisheye, dual, spherical)
    Symmetric,
    /// Separate focal lengths and principal point
    Asymmetric,
}

impl CalibrationFamily {
    pub fn of(projection_type: &str) -> Self {
        let projection_type = projection_type.to_lowercase();
        if ASYMMETRIC_PROJECTIONS.contains(&projection_type.as_str()) {
            CalibrationFamily::Asymmetric
        } else {
            CalibrationFamily::Symmetric
        }
    }
}

type Strategy = fn(&ExifMetadata, &CalibrationDatabase) -> Option<Calibration>;

/// Best available calibration for an image
pub fn calibration_from_metadata(
    metadata: &ExifMetadata,
    calibrations: &CalibrationDatabase,
    config: &Config,
) -> Calibration {
    let projection_type = metadata.projection_type.to_lowercase();
    let strategies: [Strategy; 2] = match CalibrationFamily::of(&projection_type) {
        CalibrationFamily::Asymmetric => [hard_coded_calibration, exif_focal_xy],
        CalibrationFamily::Symmetric => [hard_coded_calibration, exif_focal_ratio],
    };
    
    let mut calib = strategies
        .iter()
        .find_map(|strategy| strategy(metadata, calibrations))
        .unwrap_or_else(|| {
            debug!("No calibration source for camera \"{}\", using focal prior", metadata.camera);
            default_calibration(config)
        });
    if calib.projection_type.is_none() {
        calib.projection_type = Some(projection_type);
    }
    calib
}

/// Calibration listed for the camera's make in the reference table
pub fn hard_coded_calibration(
    metadata: &ExifMetadata,
    calibrations: &CalibrationDatabase,
) -> Option<Calibration> {
    let focal_35mm = (metadata.focal_ratio * 36.0).round_ties_even() as i64;
    let make = metadata.make.trim().to_lowercase();
    let model = metadata.model.trim().to_lowercase();
    let calib = calibrations.get(&make)?.lookup(&model, focal_35mm)?;
    debug!("Using hard-coded calibration for \"{} {}\"", make, model);
    Some(calib.clone())
}

/// Symmetric default: the image focal ratio, no distortion
pub fn focal_ratio_calibration(metadata: &ExifMetadata) -> Option<Calibration> {
    if metadata.focal_ratio == 0.0 {
        return None;
    }
    Some(Calibration {
        focal: Some(metadata.focal_ratio),
        ..Default::default()
    })
}

/// Asymmetric default: square pixels at the image focal ratio, centered
/// principal point, no distortion
pub fn focal_xy_calibration(metadata: &ExifMetadata) -> Option<Calibration> {
    if metadata.focal_ratio == 0.0 {
        return None;
    }
    Some(Calibration {
        focal_x: Some(metadata.focal_ratio),
        focal_y: Some(metadata.focal_ratio),
        ..Default::default()
    })
}

fn exif_focal_ratio(metadata: &ExifMetadata, _: &CalibrationDatabase) -> Option<Calibration> {
    focal_ratio_calibration(metadata)
}

fn exif_focal_xy(metadata: &ExifMetadata, _: &CalibrationDatabase) -> Option<Calibration> {
    focal_xy_calibration(metadata)
}

/// Last-resort calibration from the configured focal prior
pub fn default_calibration(config: &Config) -> Calibration {
    let focal = config.default_focal_prior;
    Calibration {
        focal: Some(focal),
        focal_x: Some(focal),
        focal_y: Some(focal),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::GeoFix;
    use crate::reference::MakeCalibrations;
    
    fn metadata(make: &str, model: &str, projection_type: &str, focal_ratio: f64) -> ExifMetadata {
        ExifMetadata {
            make: make.to_string(),
            model: model.to_string(),
            width: 4000,
            height: 3000,
            projection_type: projection_type.to_string(),
            focal_ratio,
            orientation: 1,
            capture_time: 0.0,
            gps: GeoFix::default(),
            opk: None,
            camera: "test".to_string(),
        }
    }
    
    fn database() -> CalibrationDatabase {
        CalibrationDatabase::from_json(
            r#"{
                "GoPro": {"MODEL": {"HERO4 Black": {"projection_type": "fisheye", "focal": 0.466, "k1": -0.195}}},
                "acme": {"FOCAL": {"24": {"focal": 0.61}}},
                "brownco": {"ALL": {"projection_type": "brown", "focal_x": 0.8, "focal_y": 0.82, "c_x": 0.01}}
            }"#,
        )
        .unwrap()
    }
    
    #[test]
    fn test_family_partition() {
        for pt in ["brown", "fisheye_opencv", "radial", "simple_radial", "fisheye62", "Fisheye624"] {
            assert_eq!(CalibrationFamily::of(pt), CalibrationFamily::Asymmetric);
        }
        for pt in ["perspective", "fisheye", "spherical", "equirectangular", "dual"] {
            assert_eq!(CalibrationFamily::of(pt), CalibrationFamily::Symmetric);
        }
    }
    
    #[test]
    fn test_hard_coded_model_rule() {
        let db = database();
        let calib = calibration_from_metadata(&metadata("GoPro ", "HERO4 Black", "perspective", 0.5), &db, &Config::default());
        assert_eq!(calib.projection_type.as_deref(), Some("fisheye"));
        assert_eq!(calib.focal, Some(0.466));
        assert_eq!(calib.k1, -0.195);
    }
    
    #[test]
    fn test_hard_coded_focal_rule() {
        let db = database();
        let hit = metadata("Acme", "whatever", "perspective", 24.2 / 36.0);
        assert_eq!(hard_coded_calibration(&hit, &db).and_then(|c| c.focal), Some(0.61));
        
        let miss = metadata("Acme", "whatever", "perspective", 35.0 / 36.0);
        assert!(hard_coded_calibration(&miss, &db).is_none());
        let calib = calibration_from_metadata(&miss, &db, &Config::default());
        assert_eq!(calib.focal, Some(35.0 / 36.0));
        assert_eq!(calib.projection_type.as_deref(), Some("perspective"));
    }
    
    #[test]
    fn test_asymmetric_default() {
        let db = CalibrationDatabase::default();
        let calib = calibration_from_metadata(&metadata("x", "y", "Brown", 0.9), &db, &Config::default());
        assert_eq!(calib.focal_x, Some(0.9));
        assert_eq!(calib.focal_y, Some(0.9));
        assert_eq!((calib.c_x, calib.c_y), (0.0, 0.0));
        assert_eq!(calib.focal, None);
        assert_eq!(calib.projection_type.as_deref(), Some("brown"));
    }
    
    #[test]
    fn test_falls_back_to_focal_prior() {
        let db = CalibrationDatabase::default();
        let config = Config {
            default_focal_prior: 1.1,
            ..Default::default()
        };
        for pt in ["perspective", "fisheye624"] {
            let calib = calibration_from_metadata(&metadata("x", "y", pt, 0.0), &db, &config);
            assert_eq!(calib.focal, Some(1.1));
            assert_eq!(calib.focal_x, Some(1.1));
            assert_eq!(calib.focal_y, Some(1.1));
            assert_eq!(calib.projection_type.as_deref(), Some(pt));
        }
    }
    
    #[test]
    fn test_all_rule_keeps_its_projection() {
        let mut db = database();
        db.insert("Other", MakeCalibrations::default());
        let calib = calibration_from_metadata(&metadata("BrownCo", "z", "perspective", 0.5), &db, &Config::default());
        assert_eq!(calib.projection_type.as_deref(), Some("brown"));
        assert_eq!(calib.focal_y, Some(0.82));
        
        // An empty rule set never matches
        let calib = calibration_from_metadata(&metadata("other", "z", "perspective", 0.5), &db, &Config::default());
        assert_eq!(calib.focal, Some(0.5));
    }
}
