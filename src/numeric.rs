//! Numeric primitives shared by the field extractors
//!
//! Rational evaluation, degree/minute/second conversion and the focal-plane
//! resolution unit table. None of these functions fail loudly: an unusable
//! input yields `None` and the caller moves on to its next source.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Millimeters in one inch
pub const INCH_IN_MM: f64 = 25.4;

/// Millimeters in one centimeter
pub const CM_IN_MM: f64 = 10.0;

/// Millimeters in one micrometer
pub const UM_IN_MM: f64 = 0.001;

/// Highest altitude (meters) ever reported in a geolocation
pub const MAXIMUM_ALTITUDE: f64 = 1e4;

/// Projection type assumed when the image does not declare one
pub const DEFAULT_PROJECTION: &str = "perspective";

/// EXIF rational value (numerator / denominator)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ratio {
    pub num: i64,
    pub den: i64,
}

impl Ratio {
    pub fn new(num: i64, den: i64) -> Self {
        Self { num, den }
    }
}

impl std::fmt::Display for Ratio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Evaluate a rational, `None` on a zero denominator
pub fn eval_frac(value: Ratio) -> Option<f64> {
    if value.den == 0 {
        return None;
    }
    Some(value.num as f64 / value.den as f64)
}

/// Convert `[degrees, minutes, seconds]` to signed decimal degrees
///
/// Southern latitudes and western longitudes (`"S"` / `"W"`) are negative,
/// every other reference is treated as positive.
pub fn gps_to_decimal(values: &[Ratio], reference: &str) -> Option<f64> {
    let [degrees, minutes, seconds] = match values {
        [d, m, s, ..] => [*d, *m, *s],
        _ => return None,
    };
    let degrees = eval_frac(degrees)?;
    let minutes = eval_frac(minutes)?;
    let seconds = eval_frac(seconds)?;
    
    let sign = match reference.trim() {
        "S" | "W" => -1.0,
        _ => 1.0,
    };
    Some(sign * (degrees + minutes / 60.0 + seconds / 3600.0))
}

/// Length of an EXIF focal-plane resolution unit in millimeters
///
/// Unit codes follow the EXIF FocalPlaneResolutionUnit table:
/// 2 = inch, 3 = centimeter, 4 = millimeter, 5 = micrometer.
pub fn mm_per_unit(resolution_unit: i64) -> Option<f64> {
    match resolution_unit {
        2 => Some(INCH_IN_MM),
        3 => Some(CM_IN_MM),
        4 => Some(1.0),
        5 => Some(UM_IN_MM),
        other => {
            warn!("Unknown EXIF resolution unit value: {}", other);
            None
        }
    }
}

/// Shortest round-trip text of a float in `repr` spelling
///
/// Camera identifiers embed this text, so `1.0` must stay `"1.0"` and
/// `1e-5` must read `"1e-05"` for ids to match existing reconstructions.
pub fn repr_float_text(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    let text = format!("{:?}", value);
    match text.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => text,
    }
}
