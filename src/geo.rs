//! WGS84 geodesy

use nalgebra::Vector3;

/// WGS84 semi-major axis (meters)
pub const WGS84_A: f64 = 6378137.0;

/// WGS84 semi-minor axis (meters)
pub const WGS84_B: f64 = 6356752.314245;

/// Earth-centered, earth-fixed coordinates of a geodetic position
///
/// Latitude and longitude in degrees, altitude in meters above the ellipsoid.
pub fn ecef_from_lla(lat: f64, lon: f64, alt: f64) -> Vector3<f64> {
    let a2 = WGS84_A * WGS84_A;
    let b2 = WGS84_B * WGS84_B;
    let lat = lat.to_radians();
    let lon = lon.to_radians();
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();
    let l = 1.0 / (a2 * cos_lat * cos_lat + b2 * sin_lat * sin_lat).sqrt();
    Vector3::new(
        (a2 * l + alt) * cos_lat * cos_lon,
        (a2 * l + alt) * cos_lat * sin_lon,
        (b2 * l + alt) * sin_lat,
    )
}
