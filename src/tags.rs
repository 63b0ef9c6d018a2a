//! Typed access to raw EXIF tags
//!
//! Tag readers hand over a loosely typed mapping from namespaced tag names
//! (`"GPS GPSLatitude"`, `"EXIF FocalLength"`, ...) to values. Inside the crate
//! every lookup goes through the [`Tag`] enumeration so a misspelled tag is a
//! compile error instead of a silently missing field.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::numeric::{eval_frac, Ratio};

// ============================================================================
// Tag Names
// ============================================================================

/// Every tag the extractors know how to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    LensMake,
    ImageMake,
    LensModel,
    ImageModel,
    ExifImageWidth,
    ExifImageLength,
    ImageWidth,
    ImageLength,
    FocalPlaneResolutionUnit,
    FocalPlaneXResolution,
    FocalPlaneYResolution,
    FocalLengthIn35mmFilm,
    FocalLength,
    Orientation,
    GpsLatitudeRef,
    GpsLatitude,
    GpsLongitudeRef,
    GpsLongitude,
    GpsAltitude,
    GpsAltitudeRef,
    GpsDop,
    GpsDate,
    GpsTimeStamp,
    DateTimeOriginal,
    SubSecTimeOriginal,
    OffsetTimeOriginal,
    DateTimeDigitized,
    SubSecTimeDigitized,
    OffsetTimeDigitized,
    DateTime,
    SubSecTime,
    OffsetTime,
}

impl Tag {
    pub const ALL: [Tag; 32] = [
        Tag::LensMake,
        Tag::ImageMake,
        Tag::LensModel,
        Tag::ImageModel,
        Tag::ExifImageWidth,
        Tag::ExifImageLength,
        Tag::ImageWidth,
        Tag::ImageLength,
        Tag::FocalPlaneResolutionUnit,
        Tag::FocalPlaneXResolution,
        Tag::FocalPlaneYResolution,
        Tag::FocalLengthIn35mmFilm,
        Tag::FocalLength,
        Tag::Orientation,
        Tag::GpsLatitudeRef,
        Tag::GpsLatitude,
        Tag::GpsLongitudeRef,
        Tag::GpsLongitude,
        Tag::GpsAltitude,
        Tag::GpsAltitudeRef,
        Tag::GpsDop,
        Tag::GpsDate,
        Tag::GpsTimeStamp,
        Tag::DateTimeOriginal,
        Tag::SubSecTimeOriginal,
        Tag::OffsetTimeOriginal,
        Tag::DateTimeDigitized,
        Tag::SubSecTimeDigitized,
        Tag::OffsetTimeDigitized,
        Tag::DateTime,
        Tag::SubSecTime,
        Tag::OffsetTime,
    ];
    
    /// Namespaced tag name as emitted by tag-dictionary readers
    pub fn name(&self) -> &'static str {
        match self {
            Tag::LensMake => "EXIF LensMake",
            Tag::ImageMake => "Image Make",
            Tag::LensModel => "EXIF LensModel",
            Tag::ImageModel => "Image Model",
            Tag::ExifImageWidth => "EXIF ExifImageWidth",
            Tag::ExifImageLength => "EXIF ExifImageLength",
            Tag::ImageWidth => "Image ImageWidth",
            Tag::ImageLength => "Image ImageLength",
            Tag::FocalPlaneResolutionUnit => "EXIF FocalPlaneResolutionUnit",
            Tag::FocalPlaneXResolution => "EXIF FocalPlaneXResolution",
            Tag::FocalPlaneYResolution => "EXIF FocalPlaneYResolution",
            Tag::FocalLengthIn35mmFilm => "EXIF FocalLengthIn35mmFilm",
            Tag::FocalLength => "EXIF FocalLength",
            Tag::Orientation => "Image Orientation",
            Tag::GpsLatitudeRef => "GPS GPSLatitudeRef",
            Tag::GpsLatitude => "GPS GPSLatitude",
            Tag::GpsLongitudeRef => "GPS GPSLongitudeRef",
            Tag::GpsLongitude => "GPS GPSLongitude",
            Tag::GpsAltitude => "GPS GPSAltitude",
            Tag::GpsAltitudeRef => "GPS GPSAltitudeRef",
            Tag::GpsDop => "GPS GPSDOP",
            Tag::GpsDate => "GPS GPSDate",
            Tag::GpsTimeStamp => "GPS GPSTimeStamp",
            Tag::DateTimeOriginal => "EXIF DateTimeOriginal",
            Tag::SubSecTimeOriginal => "EXIF SubSecTimeOriginal",
            Tag::OffsetTimeOriginal => "EXIF Tag 0x9011",
            Tag::DateTimeDigitized => "EXIF DateTimeDigitized",
            Tag::SubSecTimeDigitized => "EXIF SubSecTimeDigitized",
            Tag::OffsetTimeDigitized => "EXIF Tag 0x9012",
            Tag::DateTime => "Image DateTime",
            Tag::SubSecTime => "Image SubSecTime",
            Tag::OffsetTime => "Image Tag 0x9010",
        }
    }
    
    /// Matching kamadak-exif tag
    fn exif_tag(&self) -> exif::Tag {
        match self {
            Tag::LensMake => exif::Tag::LensMake,
            Tag::ImageMake => exif::Tag::Make,
            Tag::LensModel => exif::Tag::LensModel,
            Tag::ImageModel => exif::Tag::Model,
            Tag::ExifImageWidth => exif::Tag::PixelXDimension,
            Tag::ExifImageLength => exif::Tag::PixelYDimension,
            Tag::ImageWidth => exif::Tag::ImageWidth,
            Tag::ImageLength => exif::Tag::ImageLength,
            Tag::FocalPlaneResolutionUnit => exif::Tag::FocalPlaneResolutionUnit,
            Tag::FocalPlaneXResolution => exif::Tag::FocalPlaneXResolution,
            Tag::FocalPlaneYResolution => exif::Tag::FocalPlaneYResolution,
            Tag::FocalLengthIn35mmFilm => exif::Tag::FocalLengthIn35mmFilm,
            Tag::FocalLength => exif::Tag::FocalLength,
            Tag::Orientation => exif::Tag::Orientation,
            Tag::GpsLatitudeRef => exif::Tag::GPSLatitudeRef,
            Tag::GpsLatitude => exif::Tag::GPSLatitude,
            Tag::GpsLongitudeRef => exif::Tag::GPSLongitudeRef,
            Tag::GpsLongitude => exif::Tag::GPSLongitude,
            Tag::GpsAltitude => exif::Tag::GPSAltitude,
            Tag::GpsAltitudeRef => exif::Tag::GPSAltitudeRef,
            Tag::GpsDop => exif::Tag::GPSDOP,
            Tag::GpsDate => exif::Tag::GPSDateStamp,
            Tag::GpsTimeStamp => exif::Tag::GPSTimeStamp,
            Tag::DateTimeOriginal => exif::Tag::DateTimeOriginal,
            Tag::SubSecTimeOriginal => exif::Tag::SubSecTimeOriginal,
            Tag::OffsetTimeOriginal => exif::Tag::OffsetTimeOriginal,
            Tag::DateTimeDigitized => exif::Tag::DateTimeDigitized,
            Tag::SubSecTimeDigitized => exif::Tag::SubSecTimeDigitized,
            Tag::OffsetTimeDigitized => exif::Tag::OffsetTimeDigitized,
            Tag::DateTime => exif::Tag::DateTime,
            Tag::SubSecTime => exif::Tag::SubSecTime,
            Tag::OffsetTime => exif::Tag::OffsetTime,
        }
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Tag {
    type Err = String;
    
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tag::ALL
            .iter()
            .find(|tag| tag.name() == s)
            .copied()
            .ok_or_else(|| format!("Unrecognized tag name: {}", s))
    }
}

// ============================================================================
// Tag Values
// ============================================================================

/// Value of a single tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TagValue {
    /// Decoded text
    Ascii(String),
    /// Raw bytes that are not valid UTF-8 text
    Bytes(Vec<u8>),
    Integers(Vec<i64>),
    Rationals(Vec<Ratio>),
    Floats(Vec<f64>),
}

impl TagValue {
    /// Text content, `None` for non-text values
    pub fn as_text(&self) -> Option<&str> {
        match self {
            TagValue::Ascii(s) => Some(s),
            _ => None,
        }
    }
    
    /// Rational components, `None` for non-rational values
    pub fn as_ratios(&self) -> Option<&[Ratio]> {
        match self {
            TagValue::Rationals(v) => Some(v),
            _ => None,
        }
    }
    
    /// Integer at `index`; rationals and floats are truncated toward zero
    pub fn as_int(&self, index: usize) -> Option<i64> {
        match self {
            TagValue::Integers(v) => v.get(index).copied(),
            TagValue::Rationals(v) => v.get(index).copied().and_then(eval_frac).map(|f| f as i64),
            TagValue::Floats(v) => v.get(index).map(|f| *f as i64),
            TagValue::Ascii(s) if index == 0 => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<&str> for TagValue {
    fn from(s: &str) -> Self {
        TagValue::Ascii(s.to_string())
    }
}

impl From<Ratio> for TagValue {
    fn from(r: Ratio) -> Self {
        TagValue::Rationals(vec![r])
    }
}

impl From<i64> for TagValue {
    fn from(v: i64) -> Self {
        TagValue::Integers(vec![v])
    }
}

// ============================================================================
// Tag Sources
// ============================================================================

/// Read-only tag lookup supplied by a tag-dictionary reader
pub trait TagSource {
    fn lookup(&self, tag: Tag) -> Option<&TagValue>;
    
    fn contains(&self, tag: Tag) -> bool {
        self.lookup(tag).is_some()
    }
    
    /// Numeric value at `index`, logging rationals with a zero denominator
    fn float(&self, tag: Tag, index: usize) -> Option<f64> {
        match self.lookup(tag)? {
            TagValue::Rationals(v) => {
                let ratio = *v.get(index)?;
                let value = eval_frac(ratio);
                if value.is_none() {
                    error!(
                        "The rational \"{}\" of tag \"{}\" at index {} caused a division by zero error",
                        ratio, tag, index
                    );
                }
                value
            }
            TagValue::Integers(v) => v.get(index).map(|i| *i as f64),
            TagValue::Floats(v) => v.get(index).copied(),
            TagValue::Ascii(s) if index == 0 => s.trim().parse().ok(),
            _ => None,
        }
    }
    
    /// Text value of the tag, `None` if absent or not text
    fn text(&self, tag: Tag) -> Option<&str> {
        self.lookup(tag)?.as_text()
    }
}

/// In-memory tag mapping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagSet {
    tags: HashMap<Tag, TagValue>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }
    
    pub fn insert(&mut self, tag: Tag, value: impl Into<TagValue>) -> &mut Self {
        self.tags.insert(tag, value.into());
        self
    }
    
    pub fn with(mut self, tag: Tag, value: impl Into<TagValue>) -> Self {
        self.insert(tag, value);
        self
    }
    
    pub fn len(&self) -> usize {
        self.tags.len()
    }
    
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
    
    /// Build from reader output keyed by tag name, skipping unknown names
    pub fn from_named<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, TagValue)>,
        K: AsRef<str>,
    {
        let mut set = TagSet::new();
        for (name, value) in entries {
            match name.as_ref().parse::<Tag>() {
                Ok(tag) => {
                    set.tags.insert(tag, value);
                }
                Err(_) => debug!("Ignoring unrecognized tag \"{}\"", name.as_ref()),
            }
        }
        set
    }
    
    /// Collect the recognized tags of a kamadak-exif container (primary image)
    pub fn from_exif(exif_data: &exif::Exif) -> Self {
        let mut set = TagSet::new();
        for tag in Tag::ALL {
            let Some(field) = exif_data.get_field(tag.exif_tag(), exif::In::PRIMARY) else {
                continue;
            };
            match convert_exif_value(&field.value) {
                Some(value) => {
                    set.tags.insert(tag, value);
                }
                None => debug!("Tag \"{}\" has an unsupported value type", tag),
            }
        }
        set
    }
}

impl TagSource for TagSet {
    fn lookup(&self, tag: Tag) -> Option<&TagValue> {
        self.tags.get(&tag)
    }
}

impl FromIterator<(Tag, TagValue)> for TagSet {
    fn from_iter<T: IntoIterator<Item = (Tag, TagValue)>>(iter: T) -> Self {
        Self { tags: iter.into_iter().collect() }
    }
}

/// Convert a kamadak-exif value into a tag value
fn convert_exif_value(value: &exif::Value) -> Option<TagValue> {
    let converted = match value {
        exif::Value::Ascii(parts) => {
            let bytes = parts.first().map(|b| b.as_slice()).unwrap_or_default();
            let bytes = trim_nul(bytes);
            match std::str::from_utf8(bytes) {
                Ok(s) => TagValue::Ascii(s.to_string()),
                Err(_) => TagValue::Bytes(bytes.to_vec()),
            }
        }
        exif::Value::Byte(v) => TagValue::Integers(v.iter().map(|x| *x as i64).collect()),
        exif::Value::Short(v) => TagValue::Integers(v.iter().map(|x| *x as i64).collect()),
        exif::Value::Long(v) => TagValue::Integers(v.iter().map(|x| *x as i64).collect()),
        exif::Value::SByte(v) => TagValue::Integers(v.iter().map(|x| *x as i64).collect()),
        exif::Value::SShort(v) => TagValue::Integers(v.iter().map(|x| *x as i64).collect()),
        exif::Value::SLong(v) => TagValue::Integers(v.iter().map(|x| *x as i64).collect()),
        exif::Value::Rational(v) => TagValue::Rationals(
            v.iter().map(|r| Ratio::new(r.num as i64, r.denom as i64)).collect(),
        ),
        exif::Value::SRational(v) => TagValue::Rationals(
            v.iter().map(|r| Ratio::new(r.num as i64, r.denom as i64)).collect(),
        ),
        exif::Value::Float(v) => TagValue::Floats(v.iter().map(|x| *x as f64).collect()),
        exif::Value::Double(v) => TagValue::Floats(v.clone()),
        exif::Value::Undefined(bytes, _) => TagValue::Bytes(bytes.clone()),
        _ => return None,
    };
    Some(converted)
}

fn trim_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    &bytes[..end]
}
