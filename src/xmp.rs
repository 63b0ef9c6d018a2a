//! XMP packet extraction
//!
//! Drone and panorama cameras store their pose and projection in an XMP
//! packet next to the EXIF block. Only the `rdf:Description` entries matter
//! here; each becomes a flat string map where attributes are keyed
//! `@prefix:Name` and simple child elements are keyed `prefix:Name`.

use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ExifError, Result};

const XMP_OPEN: &[u8] = b"<x:xmpmeta";
const XMP_CLOSE: &[u8] = b"</x:xmpmeta";
const DESCRIPTION: &str = "rdf:Description";

/// XMP fields the extractors read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XmpKey {
    DjiLatitude,
    DjiLongitude,
    DjiAbsoluteAltitude,
    DjiGimbalYaw,
    DjiGimbalPitch,
    DjiGimbalRoll,
    CameraYaw,
    CameraPitch,
    CameraRoll,
    GPanoProjectionType,
}

impl XmpKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            XmpKey::DjiLatitude => "@drone-dji:Latitude",
            XmpKey::DjiLongitude => "@drone-dji:Longitude",
            XmpKey::DjiAbsoluteAltitude => "@drone-dji:AbsoluteAltitude",
            XmpKey::DjiGimbalYaw => "@drone-dji:GimbalYawDegree",
            XmpKey::DjiGimbalPitch => "@drone-dji:GimbalPitchDegree",
            XmpKey::DjiGimbalRoll => "@drone-dji:GimbalRollDegree",
            XmpKey::CameraYaw => "@Camera:Yaw",
            XmpKey::CameraPitch => "@Camera:Pitch",
            XmpKey::CameraRoll => "@Camera:Roll",
            XmpKey::GPanoProjectionType => "GPano:ProjectionType",
        }
    }
}

/// Parsed `rdf:Description` entries of one XMP packet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct XmpBlob {
    pub descriptions: Vec<BTreeMap<String, String>>,
}

impl XmpBlob {
    /// Blob with no descriptions (no packet, or unparsable packet)
    pub fn empty() -> Self {
        Self::default()
    }
    
    pub fn from_descriptions(descriptions: Vec<BTreeMap<String, String>>) -> Self {
        Self { descriptions }
    }
    
    /// Parse packet text, `None` when neither the raw nor the unescaped text
    /// is well-formed
    pub fn parse(xmp: &str) -> Option<Self> {
        parse_xmp_string(xmp)
    }
    
    /// Locate and parse the XMP packet embedded in raw image bytes
    pub fn from_image_bytes(bytes: &[u8]) -> Self {
        let (Some(start), Some(end)) = (find(bytes, XMP_OPEN), find(bytes, XMP_CLOSE)) else {
            return Self::empty();
        };
        if start >= end {
            return Self::empty();
        }
        let stop = (end + XMP_CLOSE.len() + 1).min(bytes.len());
        let packet = String::from_utf8_lossy(&bytes[start..stop]);
        Self::parse(&packet).unwrap_or_else(|| {
            debug!("Discarding unparsable XMP packet");
            Self::empty()
        })
    }
    
    pub fn has_xmp(&self) -> bool {
        !self.descriptions.is_empty()
    }
    
    /// Field of the first description
    pub fn get(&self, key: XmpKey) -> Option<&str> {
        self.descriptions.first()?.get(key.as_str()).map(String::as_str)
    }
    
    pub fn contains(&self, key: XmpKey) -> bool {
        self.get(key).is_some()
    }
    
    /// The first description carrying any GPano field
    pub fn gpano(&self) -> Option<&BTreeMap<String, String>> {
        self.descriptions
            .iter()
            .find(|d| d.keys().any(|k| k.contains("GPano")))
    }
    
    /// Declared GPano projection type, element or attribute form
    pub fn projection_type(&self) -> Option<&str> {
        let gpano = self.gpano()?;
        let key = XmpKey::GPanoProjectionType.as_str();
        gpano
            .get(key)
            .or_else(|| gpano.get(&format!("@{}", key)))
            .map(String::as_str)
    }
}

/// Parse an XMP packet, retrying once after undoing backslash escapes
pub fn parse_xmp_string(xmp: &str) -> Option<XmpBlob> {
    match parse_xmp_document(xmp) {
        Ok(blob) => Some(blob),
        Err(first) => {
            debug!("XMP parse failed ({}), retrying unescaped", first);
            parse_xmp_document(&unescape_string(xmp))
                .map_err(|e| debug!("XMP parse failed after unescaping: {}", e))
                .ok()
        }
    }
}

/// Parse one XMP document into its `rdf:Description` entries
pub fn parse_xmp_document(xmp: &str) -> Result<XmpBlob> {
    let mut reader = Reader::from_str(xmp);
    reader.config_mut().trim_text(true);
    
    let mut descriptions = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    // Open description and the depth of its element
    let mut current: Option<(usize, BTreeMap<String, String>)> = None;
    let mut child: Option<String> = None;
    
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = element_name(e);
                if name == DESCRIPTION && current.is_none() {
                    current = Some((stack.len(), attributes(e)?));
                    child = None;
                } else if let Some((depth, _)) = &current {
                    child = (stack.len() == depth + 1).then(|| name.clone());
                }
                stack.push(name);
            }
            Ok(Event::Empty(ref e)) => {
                let name = element_name(e);
                if name == DESCRIPTION && current.is_none() {
                    descriptions.push(attributes(e)?);
                }
            }
            Ok(Event::Text(ref t)) => {
                if let (Some(key), Some((_, fields))) = (&child, current.as_mut()) {
                    let text = t.unescape().map_err(|e| ExifError::Xmp(e.to_string()))?;
                    if !text.is_empty() {
                        fields.insert(key.clone(), text.into_owned());
                    }
                }
            }
            Ok(Event::End(_)) => {
                stack.pop();
                child = None;
                if matches!(&current, Some((depth, _)) if *depth == stack.len()) {
                    if let Some((_, fields)) = current.take() {
                        descriptions.push(fields);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExifError::Xmp(e.to_string())),
            _ => {}
        }
    }
    
    if let Some(open) = stack.last() {
        return Err(ExifError::Xmp(format!("unclosed element <{}>", open)));
    }
    Ok(XmpBlob { descriptions })
}

fn element_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn attributes(e: &BytesStart) -> Result<BTreeMap<String, String>> {
    let mut fields = BTreeMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| ExifError::Xmp(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| ExifError::Xmp(err.to_string()))?;
        fields.insert(format!("@{}", key), value.into_owned());
    }
    Ok(fields)
}

/// Undo backslash escapes (`\n`, `\xNN`, `\uNNNN`, ...) left in a packet
/// that was captured from an escaped byte dump
pub fn unescape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(&next) = chars.peek() else {
            out.push('\\');
            break;
        };
        let simple = match next {
            'n' => Some('\n'),
            't' => Some('\t'),
            'r' => Some('\r'),
            '\\' => Some('\\'),
            '\'' => Some('\''),
            '"' => Some('"'),
            _ => None,
        };
        if let Some(escaped) = simple {
            chars.next();
            out.push(escaped);
            continue;
        }
        let width = match next {
            'x' => 2,
            'u' => 4,
            'U' => 8,
            _ => 0,
        };
        if width > 0 {
            let digits: String = chars.clone().skip(1).take(width).collect();
            let decoded = (digits.len() == width)
                .then(|| u32::from_str_radix(&digits, 16).ok())
                .flatten()
                .and_then(char::from_u32);
            if let Some(decoded) = decoded {
                chars.nth(width);
                out.push(decoded);
                continue;
            }
        }
        out.push('\\');
    }
    out
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
