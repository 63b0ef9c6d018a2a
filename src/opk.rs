//! Absolute camera orientation (omega / phi / kappa)
//!
//! Drone and survey cameras report the gimbal pose as yaw/pitch/roll in a
//! navigation frame. Photogrammetry wants omega/phi/kappa relative to a local
//! topocentric frame, so the pose is rotated through three bases:
//!
//! 1. body from navigation (the yaw-pitch-roll composition),
//! 2. image from body (image top points along the flight direction, camera
//!    looking down: swap X/Y, flip Z),
//! 3. navigation from a north-aligned frame built at the image position.
//!
//! Conventions assumed for a nadir camera: yaw 0 puts the top of the image
//! north, yaw 90 east; pitch 0 is nadir and pitch 90 looks forward; roll is 0
//! on a gimbal.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geo::ecef_from_lla;
use crate::metadata::GeoFix;
use crate::xmp::{XmpBlob, XmpKey};

/// Latitude step (degrees) used to find the local north direction
const NORTH_DELTA: f64 = 1e-7;

/// Orientation sources in priority order, with the pitch offset that brings
/// each onto the nadir-camera convention
const YPR_SOURCES: [([XmpKey; 3], f64); 2] = [
    ([XmpKey::CameraYaw, XmpKey::CameraPitch, XmpKey::CameraRoll], 0.0),
    ([XmpKey::DjiGimbalYaw, XmpKey::DjiGimbalPitch, XmpKey::DjiGimbalRoll], 90.0),
];

/// Omega/phi/kappa angles in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Opk {
    pub omega: f64,
    pub phi: f64,
    pub kappa: f64,
}

/// Derive OPK angles from the XMP yaw/pitch/roll fields
///
/// Requires an XMP packet and a geolocation with latitude and longitude.
/// Camera tags win over drone gimbal tags when both are present.
pub fn extract_opk(xmp: &XmpBlob, geo: &GeoFix, name: &str) -> Option<Opk> {
    if !xmp.has_xmp() {
        return None;
    }
    let (latitude, longitude) = geo.position()?;
    
    let (keys, pitch_offset) = YPR_SOURCES
        .iter()
        .find(|(keys, _)| keys.iter().all(|key| xmp.contains(*key)))?;
    
    let mut ypr = [0.0; 3];
    for (slot, key) in ypr.iter_mut().zip(keys) {
        match xmp.get(*key).and_then(|v| v.trim().parse::<f64>().ok()) {
            Some(value) => *slot = value,
            None => {
                debug!("Invalid yaw/pitch/roll tag in image file \"{}\"", name);
                return None;
            }
        }
    }
    let [yaw, pitch, roll] = ypr;
    
    opk_from_ypr(
        yaw,
        pitch + pitch_offset,
        roll,
        latitude,
        longitude,
        geo.altitude.unwrap_or(0.0),
    )
}

/// Convert yaw/pitch/roll (degrees) at a geodetic position into OPK
///
/// Returns `None` when the local north direction cannot be resolved.
pub fn opk_from_ypr(yaw: f64, pitch: f64, roll: f64, lat: f64, lon: f64, alt: f64) -> Option<Opk> {
    let cnb = body_from_navigation(yaw.to_radians(), pitch.to_radians(), roll.to_radians());
    
    // Swap X/Y, flip Z
    let cbb = Matrix3::new(
        0.0, 1.0, 0.0,
        1.0, 0.0, 0.0,
        0.0, 0.0, -1.0,
    );
    
    let north = ecef_from_lla(lat + NORTH_DELTA, lon, alt) - ecef_from_lla(lat - NORTH_DELTA, lon, alt);
    let norm = north.norm();
    if norm == 0.0 {
        debug!("Cannot compute OPK angles, divider = 0");
        return None;
    }
    let xnp = north / norm;
    let znp = Vector3::new(0.0, 0.0, -1.0);
    let ynp = znp.cross(&xnp);
    let cen = Matrix3::from_columns(&[xnp, ynp, znp]);
    
    let ceb = cen * cnb * cbb;
    
    Some(Opk {
        omega: (-ceb[(1, 2)]).atan2(ceb[(2, 2)]).to_degrees(),
        phi: ceb[(0, 2)].asin().to_degrees(),
        kappa: (-ceb[(0, 1)]).atan2(ceb[(0, 0)]).to_degrees(),
    })
}

/// Yaw-pitch-roll rotation (radians)
fn body_from_navigation(y: f64, p: f64, r: f64) -> Matrix3<f64> {
    let (sy, cy) = y.sin_cos();
    let (sp, cp) = p.sin_cos();
    let (sr, cr) = r.sin_cos();
    Matrix3::new(
        cy * cp, cy * sp * sr - sy * cr, cy * sp * cr + sy * sr,
        sy * cp, sy * sp * sr + cy * cr, sy * sp * cr - cy * sr,
        -sp, cp * sr, cp * cr,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::collections::BTreeMap;
    
    fn xmp(fields: &[(XmpKey, &str)]) -> XmpBlob {
        let map: BTreeMap<String, String> = fields
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.to_string()))
            .collect();
        XmpBlob::from_descriptions(vec![map])
    }
    
    fn geo(lat: f64, lon: f64) -> GeoFix {
        GeoFix {
            latitude: Some(lat),
            longitude: Some(lon),
            ..Default::default()
        }
    }
    
    #[test]
    fn test_ypr_rotation_is_orthonormal() {
        let r = body_from_navigation(0.3, -0.2, 1.1);
        let identity = r * r.transpose();
        assert_abs_diff_eq!(identity, Matrix3::identity(), epsilon = 1e-12);
        assert_abs_diff_eq!(r.determinant(), 1.0, epsilon = 1e-12);
    }
    
    #[test]
    fn test_nadir_gimbal_facing_north() {
        let blob = xmp(&[
            (XmpKey::DjiGimbalYaw, "0.0"),
            (XmpKey::DjiGimbalPitch, "-90.0"),
            (XmpKey::DjiGimbalRoll, "0.0"),
        ]);
        let opk = extract_opk(&blob, &geo(45.0, 7.0), "nadir.jpg").unwrap();
        // Pitch offset brings the gimbal back to nadir: a level image
        assert_abs_diff_eq!(opk.omega, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(opk.phi, 0.0, epsilon = 1e-6);
    }
    
    #[test]
    fn test_known_angles() {
        let opk = opk_from_ypr(135.0, -20.0, 3.0, -33.0, 151.0, 20.0).unwrap();
        assert_abs_diff_eq!(opk.omega, -1.9400687931677876, epsilon = 1e-6);
        assert_abs_diff_eq!(opk.phi, 10.758679209923669, epsilon = 1e-6);
        assert_abs_diff_eq!(opk.kappa, -74.0563600298216, epsilon = 1e-6);
        
        // Same pose read from the camera tags at an elevated position
        let blob = xmp(&[
            (XmpKey::CameraYaw, "30"),
            (XmpKey::CameraPitch, "10"),
            (XmpKey::CameraRoll, "5"),
        ]);
        let position = GeoFix {
            altitude: Some(512.0),
            ..geo(46.5, 7.25)
        };
        let opk = extract_opk(&blob, &position, "pose.jpg").unwrap();
        assert_abs_diff_eq!(opk.omega, -0.66063, epsilon = 1e-5);
        assert_abs_diff_eq!(opk.phi, 8.05748, epsilon = 1e-5);
        assert_abs_diff_eq!(opk.kappa, 67.76450, epsilon = 1e-5);
    }
    
    #[test]
    fn test_camera_tags_win_over_gimbal() {
        let both = xmp(&[
            (XmpKey::CameraYaw, "30"),
            (XmpKey::CameraPitch, "0"),
            (XmpKey::CameraRoll, "0"),
            (XmpKey::DjiGimbalYaw, "120"),
            (XmpKey::DjiGimbalPitch, "-90"),
            (XmpKey::DjiGimbalRoll, "0"),
        ]);
        let camera_only = xmp(&[
            (XmpKey::CameraYaw, "30"),
            (XmpKey::CameraPitch, "0"),
            (XmpKey::CameraRoll, "0"),
        ]);
        let g = geo(10.0, 20.0);
        assert_eq!(extract_opk(&both, &g, "a"), extract_opk(&camera_only, &g, "b"));
    }
    
    #[test]
    fn test_gimbal_pitch_offset() {
        let gimbal = xmp(&[
            (XmpKey::DjiGimbalYaw, "15"),
            (XmpKey::DjiGimbalPitch, "-90"),
            (XmpKey::DjiGimbalRoll, "2"),
        ]);
        let g = geo(-33.0, 151.0);
        let from_gimbal = extract_opk(&gimbal, &g, "g").unwrap();
        let direct = opk_from_ypr(15.0, 0.0, 2.0, -33.0, 151.0, 0.0).unwrap();
        assert_abs_diff_eq!(from_gimbal.omega, direct.omega, epsilon = 1e-9);
        assert_abs_diff_eq!(from_gimbal.phi, direct.phi, epsilon = 1e-9);
        assert_abs_diff_eq!(from_gimbal.kappa, direct.kappa, epsilon = 1e-9);
    }
    
    #[test]
    fn test_invalid_value_aborts() {
        let blob = xmp(&[
            (XmpKey::CameraYaw, "north-ish"),
            (XmpKey::CameraPitch, "0"),
            (XmpKey::CameraRoll, "0"),
            (XmpKey::DjiGimbalYaw, "0"),
            (XmpKey::DjiGimbalPitch, "-90"),
            (XmpKey::DjiGimbalRoll, "0"),
        ]);
        assert_eq!(extract_opk(&blob, &geo(1.0, 2.0), "bad.jpg"), None);
    }
    
    #[test]
    fn test_requires_position_and_xmp() {
        let blob = xmp(&[
            (XmpKey::CameraYaw, "0"),
            (XmpKey::CameraPitch, "0"),
            (XmpKey::CameraRoll, "0"),
        ]);
        assert_eq!(extract_opk(&blob, &GeoFix::default(), "x"), None);
        let latitude_only = GeoFix {
            latitude: Some(1.0),
            ..Default::default()
        };
        assert_eq!(extract_opk(&blob, &latitude_only, "x"), None);
        assert_eq!(extract_opk(&XmpBlob::empty(), &geo(1.0, 2.0), "x"), None);
        assert_eq!(extract_opk(&xmp(&[]), &geo(1.0, 2.0), "x"), None);
    }
}
