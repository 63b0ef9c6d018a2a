//! Camera factory
//!
//! Turns a resolved [`Calibration`] into a typed [`Camera`]. Each projection
//! family carries its own parameter payload; projection math itself lives
//! downstream and is not modeled here.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calibration::{calibration_from_metadata, Calibration};
use crate::config::Config;
use crate::error::{ExifError, Result};
use crate::metadata::ExifMetadata;
use crate::numeric::DEFAULT_PROJECTION;
use crate::reference::CalibrationDatabase;

// ============================================================================
// Projection Types
// ============================================================================

/// Supported projection models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectionType {
    Perspective,
    Brown,
    Fisheye,
    FisheyeOpencv,
    Fisheye62,
    Fisheye624,
    Radial,
    SimpleRadial,
    Dual,
    /// Full panorama, spelled "spherical" or "equirectangular"
    Spherical,
}

impl ProjectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectionType::Perspective => "perspective",
            ProjectionType::Brown => "brown",
            ProjectionType::Fisheye => "fisheye",
            ProjectionType::FisheyeOpencv => "fisheye_opencv",
            ProjectionType::Fisheye62 => "fisheye62",
            ProjectionType::Fisheye624 => "fisheye624",
            ProjectionType::Radial => "radial",
            ProjectionType::SimpleRadial => "simple_radial",
            ProjectionType::Dual => "dual",
            ProjectionType::Spherical => "spherical",
        }
    }
    
    pub fn is_panorama(&self) -> bool {
        matches!(self, ProjectionType::Spherical)
    }
}

impl FromStr for ProjectionType {
    type Err = ExifError;
    
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "perspective" => Ok(ProjectionType::Perspective),
            "brown" => Ok(ProjectionType::Brown),
            "fisheye" => Ok(ProjectionType::Fisheye),
            "fisheye_opencv" => Ok(ProjectionType::FisheyeOpencv),
            "fisheye62" => Ok(ProjectionType::Fisheye62),
            "fisheye624" => Ok(ProjectionType::Fisheye624),
            "radial" => Ok(ProjectionType::Radial),
            "simple_radial" => Ok(ProjectionType::SimpleRadial),
            "dual" => Ok(ProjectionType::Dual),
            "spherical" | "equirectangular" => Ok(ProjectionType::Spherical),
            other => Err(ExifError::UnsupportedProjection(other.to_string())),
        }
    }
}

impl fmt::Display for ProjectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Camera
// ============================================================================

/// Projection model together with its parameters
///
/// Asymmetric models store `focal_x` as `focal` and `focal_y / focal_x` as
/// `aspect_ratio`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "projection_type", rename_all = "snake_case")]
pub enum Projection {
    Perspective {
        focal: f64,
        k1: f64,
        k2: f64,
    },
    /// Distortion `[k1, k2, k3, p1, p2]`
    Brown {
        focal: f64,
        aspect_ratio: f64,
        principal_point: [f64; 2],
        distortion: [f64; 5],
    },
    Fisheye {
        focal: f64,
        k1: f64,
        k2: f64,
    },
    /// Distortion `[k1, k2, k3, k4]`
    FisheyeOpencv {
        focal: f64,
        aspect_ratio: f64,
        principal_point: [f64; 2],
        distortion: [f64; 4],
    },
    /// Distortion `[k1..k6, p1, p2]`
    Fisheye62 {
        focal: f64,
        aspect_ratio: f64,
        principal_point: [f64; 2],
        distortion: [f64; 8],
    },
    /// Distortion `[k1..k6, p1, p2, s0..s3]`
    Fisheye624 {
        focal: f64,
        aspect_ratio: f64,
        principal_point: [f64; 2],
        distortion: [f64; 12],
    },
    /// Distortion `[k1, k2]`
    Radial {
        focal: f64,
        aspect_ratio: f64,
        principal_point: [f64; 2],
        distortion: [f64; 2],
    },
    SimpleRadial {
        focal: f64,
        aspect_ratio: f64,
        principal_point: [f64; 2],
        k1: f64,
    },
    Dual {
        transition: f64,
        focal: f64,
        k1: f64,
        k2: f64,
    },
    Spherical,
}

impl Projection {
    pub fn projection_type(&self) -> ProjectionType {
        match self {
            Projection::Perspective { .. } => ProjectionType::Perspective,
            Projection::Brown { .. } => ProjectionType::Brown,
            Projection::Fisheye { .. } => ProjectionType::Fisheye,
            Projection::FisheyeOpencv { .. } => ProjectionType::FisheyeOpencv,
            Projection::Fisheye62 { .. } => ProjectionType::Fisheye62,
            Projection::Fisheye624 { .. } => ProjectionType::Fisheye624,
            Projection::Radial { .. } => ProjectionType::Radial,
            Projection::SimpleRadial { .. } => ProjectionType::SimpleRadial,
            Projection::Dual { .. } => ProjectionType::Dual,
            Projection::Spherical => ProjectionType::Spherical,
        }
    }
}

/// A camera: identity, image size and projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub id: String,
    pub width: u32,
    pub height: u32,
    #[serde(flatten)]
    pub projection: Projection,
}

impl Camera {
    fn with_projection(projection: Projection) -> Self {
        Self {
            id: String::new(),
            width: 0,
            height: 0,
            projection,
        }
    }
    
    pub fn perspective(focal: f64, k1: f64, k2: f64) -> Self {
        Self::with_projection(Projection::Perspective { focal, k1, k2 })
    }
    
    pub fn brown(focal: f64, aspect_ratio: f64, principal_point: [f64; 2], distortion: [f64; 5]) -> Self {
        Self::with_projection(Projection::Brown {
            focal,
            aspect_ratio,
            principal_point,
            distortion,
        })
    }
    
    pub fn fisheye(focal: f64, k1: f64, k2: f64) -> Self {
        Self::with_projection(Projection::Fisheye { focal, k1, k2 })
    }
    
    pub fn fisheye_opencv(focal: f64, aspect_ratio: f64, principal_point: [f64; 2], distortion: [f64; 4]) -> Self {
        Self::with_projection(Projection::FisheyeOpencv {
            focal,
            aspect_ratio,
            principal_point,
            distortion,
        })
    }
    
    pub fn fisheye62(focal: f64, aspect_ratio: f64, principal_point: [f64; 2], distortion: [f64; 8]) -> Self {
        Self::with_projection(Projection::Fisheye62 {
            focal,
            aspect_ratio,
            principal_point,
            distortion,
        })
    }
    
    pub fn fisheye624(focal: f64, aspect_ratio: f64, principal_point: [f64; 2], distortion: [f64; 12]) -> Self {
        Self::with_projection(Projection::Fisheye624 {
            focal,
            aspect_ratio,
            principal_point,
            distortion,
        })
    }
    
    pub fn radial(focal: f64, aspect_ratio: f64, principal_point: [f64; 2], distortion: [f64; 2]) -> Self {
        Self::with_projection(Projection::Radial {
            focal,
            aspect_ratio,
            principal_point,
            distortion,
        })
    }
    
    pub fn simple_radial(focal: f64, aspect_ratio: f64, principal_point: [f64; 2], k1: f64) -> Self {
        Self::with_projection(Projection::SimpleRadial {
            focal,
            aspect_ratio,
            principal_point,
            k1,
        })
    }
    
    pub fn dual(transition: f64, focal: f64, k1: f64, k2: f64) -> Self {
        Self::with_projection(Projection::Dual {
            transition,
            focal,
            k1,
            k2,
        })
    }
    
    pub fn spherical() -> Self {
        Self::with_projection(Projection::Spherical)
    }
    
    pub fn projection_type(&self) -> ProjectionType {
        self.projection.projection_type()
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Resolve the calibration for an image and build its camera
pub fn camera_from_exif_metadata(
    metadata: &ExifMetadata,
    calibrations: &CalibrationDatabase,
    config: &Config,
) -> Result<Camera> {
    let calib = calibration_from_metadata(metadata, calibrations, config);
    camera_from_calibration(metadata, &calib)
}

/// Build the camera described by `calib`, taking identity and size from
/// `metadata`
pub fn camera_from_calibration(metadata: &ExifMetadata, calib: &Calibration) -> Result<Camera> {
    let projection_type: ProjectionType = calib
        .projection_type
        .as_deref()
        .unwrap_or(DEFAULT_PROJECTION)
        .parse()?;
    let required = |value: Option<f64>, parameter: &'static str| {
        value.ok_or_else(|| ExifError::IncompleteCalibration {
            projection: projection_type.to_string(),
            parameter,
        })
    };
    let focal = || required(calib.focal, "focal");
    let focal_xy = || -> Result<(f64, f64)> {
        let focal_x = required(calib.focal_x, "focal_x")?;
        let focal_y = required(calib.focal_y, "focal_y")?;
        Ok((focal_x, focal_y / focal_x))
    };
    let principal_point = [calib.c_x, calib.c_y];
    
    let mut camera = match projection_type {
        ProjectionType::Perspective => Camera::perspective(focal()?, calib.k1, calib.k2),
        ProjectionType::Brown => {
            let (f, aspect) = focal_xy()?;
            Camera::brown(
                f,
                aspect,
                principal_point,
                [calib.k1, calib.k2, calib.k3, calib.p1, calib.p2],
            )
        }
        ProjectionType::Fisheye => Camera::fisheye(focal()?, calib.k1, calib.k2),
        ProjectionType::FisheyeOpencv => {
            let (f, aspect) = focal_xy()?;
            Camera::fisheye_opencv(
                f,
                aspect,
                principal_point,
                [calib.k1, calib.k2, calib.k3, calib.k4],
            )
        }
        ProjectionType::Fisheye62 => {
            let (f, aspect) = focal_xy()?;
            Camera::fisheye62(
                f,
                aspect,
                principal_point,
                [calib.k1, calib.k2, calib.k3, calib.k4, calib.k5, calib.k6, calib.p1, calib.p2],
            )
        }
        ProjectionType::Fisheye624 => {
            let (f, aspect) = focal_xy()?;
            Camera::fisheye624(
                f,
                aspect,
                principal_point,
                [
                    calib.k1, calib.k2, calib.k3, calib.k4, calib.k5, calib.k6,
                    calib.p1, calib.p2, calib.s0, calib.s1, calib.s2, calib.s3,
                ],
            )
        }
        ProjectionType::Radial => {
            let (f, aspect) = focal_xy()?;
            Camera::radial(f, aspect, principal_point, [calib.k1, calib.k2])
        }
        ProjectionType::SimpleRadial => {
            let (f, aspect) = focal_xy()?;
            Camera::simple_radial(f, aspect, principal_point, calib.k1)
        }
        ProjectionType::Dual => {
            let transition = required(calib.transition, "transition")?;
            Camera::dual(transition, focal()?, calib.k1, calib.k2)
        }
        ProjectionType::Spherical => Camera::spherical(),
    };
    
    camera.id = metadata.camera.clone();
    camera.width = metadata.width;
    camera.height = metadata.height;
    debug!("Created {} camera \"{}\"", projection_type, camera.id);
    Ok(camera)
}
