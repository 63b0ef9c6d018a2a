//! Field extractors
//!
//! Each extractor pulls one semantic value out of the raw tags and the XMP
//! packet. Sources are tried in a fixed priority order and the first one that
//! resolves wins; a field nobody can resolve falls back to its default and the
//! reason is logged, never raised.

use std::cell::OnceCell;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use tracing::{debug, info, warn};

use crate::metadata::GeoFix;
use crate::numeric::{eval_frac, gps_to_decimal, mm_per_unit, DEFAULT_PROJECTION, MAXIMUM_ALTITUDE};
use crate::opk::{self, Opk};
use crate::reference::{sensor_data, SensorDatabase};
use crate::tags::{Tag, TagSource, TagValue};
use crate::xmp::{XmpBlob, XmpKey};

/// Date/time sources tried after the GPS clock: (date time, sub-second, UTC offset)
const TIME_SOURCES: [(Tag, Tag, Tag); 3] = [
    (Tag::DateTimeOriginal, Tag::SubSecTimeOriginal, Tag::OffsetTimeOriginal),
    (Tag::DateTimeDigitized, Tag::SubSecTimeDigitized, Tag::OffsetTimeDigitized),
    (Tag::DateTime, Tag::SubSecTime, Tag::OffsetTime),
];

const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";
const EXIF_DATE_FORMAT: &str = "%Y:%m:%d";

// ============================================================================
// Extractor
// ============================================================================

/// Extractor over the tags and XMP packet of one image
pub struct ExifExtractor<'a> {
    tags: &'a dyn TagSource,
    xmp: &'a XmpBlob,
    image_size_loader: &'a dyn Fn() -> Option<(u32, u32)>,
    use_exif_size: bool,
    name: String,
    sensors: &'a SensorDatabase,
    image_size: OnceCell<(u32, u32)>,
}

impl<'a> ExifExtractor<'a> {
    /// `image_size_loader` returns `(width, height)` and only runs when the
    /// tags cannot provide the image size.
    pub fn new(
        tags: &'a dyn TagSource,
        xmp: &'a XmpBlob,
        image_size_loader: &'a dyn Fn() -> Option<(u32, u32)>,
    ) -> Self {
        Self {
            tags,
            xmp,
            image_size_loader,
            use_exif_size: true,
            name: "<image>".to_string(),
            sensors: sensor_data(),
            image_size: OnceCell::new(),
        }
    }
    
    /// Name used to identify the image in log lines
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
    
    pub fn use_exif_size(mut self, use_exif_size: bool) -> Self {
        self.use_exif_size = use_exif_size;
        self
    }
    
    pub fn with_sensor_database(mut self, sensors: &'a SensorDatabase) -> Self {
        self.sensors = sensors;
        self
    }
    
    pub fn name(&self) -> &str {
        &self.name
    }
    
    // ------------------------------------------------------------------------
    // Camera
    // ------------------------------------------------------------------------
    
    /// Image `(width, height)` in pixels
    pub fn extract_image_size(&self) -> (u32, u32) {
        *self.image_size.get_or_init(|| {
            self.tag_size(Tag::ExifImageWidth, Tag::ExifImageLength)
                .or_else(|| self.tag_size(Tag::ImageWidth, Tag::ImageLength))
                .or_else(|| (self.image_size_loader)())
                .unwrap_or_else(|| {
                    warn!("Cannot determine the size of image \"{}\"", self.name);
                    (0, 0)
                })
        })
    }
    
    fn tag_size(&self, width_tag: Tag, height_tag: Tag) -> Option<(u32, u32)> {
        if !self.use_exif_size {
            return None;
        }
        let width = self.tags.lookup(width_tag)?.as_int(0)?;
        let height = self.tags.lookup(height_tag)?.as_int(0)?;
        Some((u32::try_from(width).ok()?, u32::try_from(height).ok()?))
    }
    
    pub fn extract_make(&self) -> String {
        let value = self
            .tags
            .lookup(Tag::LensMake)
            .or_else(|| self.tags.lookup(Tag::ImageMake));
        decode_make_model(value)
    }
    
    pub fn extract_model(&self) -> String {
        let value = self
            .tags
            .lookup(Tag::LensModel)
            .or_else(|| self.tags.lookup(Tag::ImageModel));
        decode_make_model(value)
    }
    
    pub fn extract_projection_type(&self) -> String {
        self.xmp
            .projection_type()
            .unwrap_or(DEFAULT_PROJECTION)
            .to_string()
    }
    
    /// `(focal_35mm, focal_ratio)`
    pub fn extract_focal(&self) -> (f64, f64) {
        let make = self.extract_make();
        let model = self.extract_model();
        compute_focal(
            self.tags.float(Tag::FocalLengthIn35mmFilm, 0),
            self.tags.float(Tag::FocalLength, 0),
            self.extract_sensor_width(),
            &sensor_string(&make, &model),
            self.sensors,
        )
    }
    
    /// Sensor width in millimeters from the focal-plane resolution tags
    pub fn extract_sensor_width(&self) -> Option<f64> {
        if !self.tags.contains(Tag::FocalPlaneResolutionUnit) || !self.tags.contains(Tag::FocalPlaneXResolution) {
            return None;
        }
        let unit = self.tags.lookup(Tag::FocalPlaneResolutionUnit)?.as_int(0)?;
        let mm_per_unit = mm_per_unit(unit)?;
        
        let pixels_per_unit = self.tags.float(Tag::FocalPlaneXResolution, 0)?;
        let pixels_per_unit = if pixels_per_unit > 0.0 {
            pixels_per_unit
        } else {
            self.tags
                .float(Tag::FocalPlaneYResolution, 0)
                .filter(|v| *v > 0.0)?
        };
        
        let (width_in_pixels, _) = self.extract_image_size();
        Some(width_in_pixels as f64 / pixels_per_unit * mm_per_unit)
    }
    
    /// EXIF orientation code, 1 when absent
    pub fn extract_orientation(&self) -> u32 {
        match self.tags.lookup(Tag::Orientation) {
            Some(TagValue::Integers(v)) => v
                .first()
                .and_then(|o| u32::try_from(*o).ok())
                .filter(|o| *o != 0)
                .unwrap_or(1),
            _ => 1,
        }
    }
    
    // ------------------------------------------------------------------------
    // Geolocation
    // ------------------------------------------------------------------------
    
    /// `(longitude_ref, latitude_ref)`, defaulting to `("E", "N")`
    pub fn extract_ref_lon_lat(&self) -> (String, String) {
        let reflon = self.tags.text(Tag::GpsLongitudeRef).unwrap_or("E");
        let reflat = self.tags.text(Tag::GpsLatitudeRef).unwrap_or("N");
        (reflon.to_string(), reflat.to_string())
    }
    
    /// `(latitude, longitude)` from the DJI XMP fields
    pub fn extract_dji_lat_lon(&self) -> Option<(f64, f64)> {
        let lat = self.xmp.get(XmpKey::DjiLatitude)?;
        let lon = self.xmp.get(XmpKey::DjiLongitude)?;
        match (parse_signed_degrees(lat), parse_signed_degrees(lon)) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => {
                debug!("Invalid DJI latitude/longitude in image file \"{}\"", self.name);
                None
            }
        }
    }
    
    pub fn extract_dji_altitude(&self) -> Option<f64> {
        let altitude = self.xmp.get(XmpKey::DjiAbsoluteAltitude)?;
        altitude
            .trim()
            .parse()
            .map_err(|_| debug!("Invalid DJI altitude \"{}\" in image file \"{}\"", altitude, self.name))
            .ok()
    }
    
    /// `(latitude, longitude)` from the GPS tags
    pub fn extract_gps_lat_lon(&self) -> Option<(f64, f64)> {
        let latitude = self.tags.lookup(Tag::GpsLatitude)?.as_ratios()?;
        let longitude = self.tags.lookup(Tag::GpsLongitude)?.as_ratios()?;
        let (reflon, reflat) = self.extract_ref_lon_lat();
        Some((
            gps_to_decimal(latitude, &reflat)?,
            gps_to_decimal(longitude, &reflon)?,
        ))
    }
    
    /// `(latitude, longitude)`, DJI fields first
    pub fn extract_lat_lon(&self) -> Option<(f64, f64)> {
        self.extract_dji_lat_lon()
            .or_else(|| self.extract_gps_lat_lon())
    }
    
    /// GPS altitude tag, negated below sea level
    pub fn extract_gps_altitude(&self) -> Option<f64> {
        let altitude = match self.tags.lookup(Tag::GpsAltitude)? {
            TagValue::Rationals(v) => v.first().copied().and_then(eval_frac),
            TagValue::Integers(v) => v.first().map(|a| *a as f64),
            _ => None,
        }?;
        let below_sea_level = self
            .tags
            .lookup(Tag::GpsAltitudeRef)
            .and_then(|r| r.as_int(0))
            == Some(1);
        Some(if below_sea_level { -altitude } else { altitude })
    }
    
    /// Altitude in meters, DJI field first
    pub fn extract_altitude(&self) -> Option<f64> {
        self.extract_dji_altitude()
            .or_else(|| self.extract_gps_altitude())
    }
    
    pub fn extract_dop(&self) -> Option<f64> {
        let dop = self.tags.lookup(Tag::GpsDop)?.as_ratios()?.first()?;
        eval_frac(*dop)
    }
    
    pub fn extract_geo(&self) -> GeoFix {
        let (latitude, longitude) = match self.extract_lat_lon() {
            Some((lat, lon)) => (Some(lat), Some(lon)),
            None => (None, None),
        };
        GeoFix {
            latitude,
            longitude,
            altitude: self.extract_altitude().map(|a| a.min(MAXIMUM_ALTITUDE)),
            dop: self.extract_dop(),
        }
    }
    
    // ------------------------------------------------------------------------
    // Capture Time
    // ------------------------------------------------------------------------
    
    /// Capture time in seconds since the Unix epoch (UTC), 0.0 when unknown
    pub fn extract_capture_time(&self) -> f64 {
        if self.tags.contains(Tag::GpsDate) && self.tags.contains(Tag::GpsTimeStamp) {
            match self.gps_capture_time() {
                Some(time) => return epoch_seconds(time),
                None => info!(
                    "The GPS time stamp in image file \"{}\" is invalid. Falling back to DateTime*",
                    self.name
                ),
            }
        }
        
        for (datetime_tag, subsec_tag, offset_tag) in TIME_SOURCES {
            let Some(date_time) = self.tags.text(datetime_tag) else {
                continue;
            };
            let subsec = self.tags.text(subsec_tag).unwrap_or("0");
            let Some(local) = parse_exif_datetime(date_time, subsec) else {
                debug!(
                    "The \"{}\" time stamp or \"{}\" tag is invalid in image file \"{}\"",
                    datetime_tag, subsec_tag, self.name
                );
                continue;
            };
            
            let utc = match self.tags.text(offset_tag) {
                Some(offset) => match parse_utc_offset(offset).and_then(|o| local.checked_sub_signed(o)) {
                    Some(utc) => utc,
                    None => {
                        debug!(
                            "The \"{}\" time zone offset in image file \"{}\" is invalid",
                            offset_tag, self.name
                        );
                        debug!("Naively assuming UTC on \"{}\" in image file \"{}\"", datetime_tag, self.name);
                        local
                    }
                },
                None => {
                    debug!("No GPS time stamp and no time zone offset in image file \"{}\"", self.name);
                    debug!("Naively assuming UTC on \"{}\" in image file \"{}\"", datetime_tag, self.name);
                    local
                }
            };
            return epoch_seconds(utc);
        }
        
        info!("Image file \"{}\" has no valid time stamp", self.name);
        0.0
    }
    
    fn gps_capture_time(&self) -> Option<NaiveDateTime> {
        let hours = u32::try_from(self.tags.float(Tag::GpsTimeStamp, 0)? as i64).ok()?;
        let minutes = u32::try_from(self.tags.float(Tag::GpsTimeStamp, 1)? as i64).ok()?;
        let seconds = self.tags.float(Tag::GpsTimeStamp, 2)?;
        if !(0.0..60.0).contains(&seconds) {
            return None;
        }
        let micros = (seconds * 1e6).round() as u32;
        let date = NaiveDate::parse_from_str(self.tags.text(Tag::GpsDate)?.trim(), EXIF_DATE_FORMAT).ok()?;
        date.and_hms_micro_opt(hours, minutes, micros / 1_000_000, micros % 1_000_000)
    }
    
    // ------------------------------------------------------------------------
    // Orientation
    // ------------------------------------------------------------------------
    
    pub fn extract_opk(&self, geo: &GeoFix) -> Option<Opk> {
        opk::extract_opk(self.xmp, geo, &self.name)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Make/model text; undecodable bytes read as `"unknown"`
fn decode_make_model(value: Option<&TagValue>) -> String {
    match value {
        Some(TagValue::Ascii(s)) => s.clone(),
        Some(TagValue::Bytes(b)) => String::from_utf8(b.clone()).unwrap_or_else(|_| "unknown".to_string()),
        _ => "unknown".to_string(),
    }
}

/// Resolve `(focal_35mm, focal_ratio)`
///
/// A positive 35mm-equivalent focal length wins (a 35mm frame is 36mm
/// wide). Otherwise the raw focal length is divided by the sensor width,
/// taken from the tags or looked up by `sensor_string`. When neither works
/// both values are zero.
pub fn compute_focal(
    focal_35: Option<f64>,
    focal: Option<f64>,
    sensor_width: Option<f64>,
    sensor_string: &str,
    sensors: &SensorDatabase,
) -> (f64, f64) {
    if let Some(focal_35) = focal_35.filter(|f| *f > 0.0) {
        return (focal_35, focal_35 / 36.0);
    }
    let sensor_width = sensor_width
        .filter(|w| *w != 0.0)
        .or_else(|| (!sensor_string.is_empty()).then(|| sensors.get(sensor_string)).flatten());
    match (sensor_width, focal) {
        (Some(width), Some(focal)) if width != 0.0 && focal != 0.0 => {
            let focal_ratio = focal / width;
            (36.0 * focal_ratio, focal_ratio)
        }
        _ => (0.0, 0.0),
    }
}

/// Drop the make from the model unless the make is unknown
pub(crate) fn strip_make(make: &str, model: &str) -> String {
    if make != "unknown" {
        model.replace(make, "")
    } else {
        model.to_string()
    }
}

/// Sensor database key for a make/model pair
pub fn sensor_string(make: &str, model: &str) -> String {
    let model = strip_make(make, model);
    format!("{} {}", make.trim(), model.trim()).trim().to_lowercase()
}

/// Decimal degrees from a DJI `+DD.DDDD` / `-DD.DDDD` string
fn parse_signed_degrees(value: &str) -> Option<f64> {
    let value = value.trim();
    match value.strip_prefix('-') {
        Some(magnitude) => magnitude.parse::<f64>().ok().map(|v| -v),
        None => value.strip_prefix('+').unwrap_or(value).parse().ok(),
    }
}

/// `"YYYY:MM:DD HH:MM:SS"` plus a sub-second field of 1 to 6 digits
fn parse_exif_datetime(date_time: &str, subsec: &str) -> Option<NaiveDateTime> {
    let base = NaiveDateTime::parse_from_str(date_time.trim(), EXIF_DATETIME_FORMAT).ok()?;
    let digits = subsec.trim();
    if digits.is_empty() || digits.len() > 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let micros: i64 = format!("{:0<6}", digits).parse().ok()?;
    base.checked_add_signed(TimeDelta::microseconds(micros))
}

/// `"±HH:MM"` as the offset subtracted from local time to get UTC
///
/// Only the hours carry the sign; the minutes always count back toward UTC,
/// so `+05:30` yields 4h30 and `-03:30` yields -3h30.
fn parse_utc_offset(offset: &str) -> Option<TimeDelta> {
    let hours: i64 = offset.get(0..3)?.trim().parse().ok()?;
    let minutes: i64 = offset.get(4..6)?.parse().ok()?;
    TimeDelta::try_minutes(hours * 60 - minutes)
}

fn epoch_seconds(time: NaiveDateTime) -> f64 {
    time.and_utc().timestamp_micros() as f64 / 1e6
}
