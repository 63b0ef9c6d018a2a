//! Reference databases
//!
//! Two read-only lookup tables back the extractors:
//!
//! - **Sensor widths**: `"make model"` (lowercase) → sensor width in mm, used
//!   when an image carries a raw focal length but no 35mm equivalent.
//! - **Hard-coded calibrations**: lowercase make → `ALL` | `MODEL` | `FOCAL`
//!   entries with empirically verified parameters.
//!
//! The bundled tables are parsed on first use and never mutated afterwards,
//! so worker threads can share them without locking. Callers with their own
//! tables load them with `from_json` / `from_json_file` and pass them in.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::calibration::Calibration;
use crate::error::Result;

const BUNDLED_SENSOR_DATA: &str = include_str!("../data/sensor_data.json");
const BUNDLED_CALIBRATIONS: &str = include_str!("../data/camera_calibration.json");

static SENSOR_DATA: OnceLock<SensorDatabase> = OnceLock::new();
static CAMERA_CALIBRATION: OnceLock<CalibrationDatabase> = OnceLock::new();

// ============================================================================
// Sensor Widths
// ============================================================================

/// Sensor width (mm) by lowercase `"make model"`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorDatabase {
    widths: HashMap<String, f64>,
}

impl SensorDatabase {
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: HashMap<String, f64> = serde_json::from_str(json)?;
        Ok(raw.into_iter().collect())
    }
    
    pub fn from_json_file(path: &Path) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
    
    pub fn get(&self, sensor_string: &str) -> Option<f64> {
        self.widths.get(&sensor_string.to_lowercase()).copied()
    }
    
    pub fn len(&self) -> usize {
        self.widths.len()
    }
    
    pub fn is_empty(&self) -> bool {
        self.widths.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for SensorDatabase {
    fn from_iter<T: IntoIterator<Item = (K, f64)>>(iter: T) -> Self {
        Self {
            widths: iter
                .into_iter()
                .map(|(k, v)| (k.into().to_lowercase(), v))
                .collect(),
        }
    }
}

/// Bundled sensor-width table
pub fn sensor_data() -> &'static SensorDatabase {
    SENSOR_DATA.get_or_init(|| {
        SensorDatabase::from_json(BUNDLED_SENSOR_DATA).unwrap_or_else(|e| {
            error!("Bundled sensor data is invalid: {}", e);
            SensorDatabase::default()
        })
    })
}

// ============================================================================
// Hard-coded Calibrations
// ============================================================================

/// Calibration rules for one camera make
///
/// Rules are consulted in the order `ALL`, `MODEL`, `FOCAL`; the first rule
/// present decides, even when it has no entry for the image at hand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MakeCalibrations {
    #[serde(rename = "ALL", default, skip_serializing_if = "Option::is_none")]
    pub all: Option<Calibration>,
    
    #[serde(rename = "MODEL", default, skip_serializing_if = "Option::is_none")]
    pub model: Option<HashMap<String, Calibration>>,
    
    /// Keyed by the rounded 35mm-equivalent focal length
    #[serde(rename = "FOCAL", default, skip_serializing_if = "Option::is_none")]
    pub focal: Option<HashMap<i64, Calibration>>,
}

impl MakeCalibrations {
    pub fn lookup(&self, model: &str, focal_35mm: i64) -> Option<&Calibration> {
        if let Some(all) = &self.all {
            return Some(all);
        }
        if let Some(models) = &self.model {
            return models.get(model);
        }
        if let Some(focals) = &self.focal {
            return focals.get(&focal_35mm);
        }
        None
    }
}

/// Hard-coded calibrations by lowercase make
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibrationDatabase {
    makes: HashMap<String, MakeCalibrations>,
}

impl CalibrationDatabase {
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: HashMap<String, MakeCalibrations> = serde_json::from_str(json)?;
        let makes = raw
            .into_iter()
            .map(|(make, mut rules)| {
                if let Some(models) = rules.model.take() {
                    rules.model = Some(models.into_iter().map(|(m, c)| (m.to_lowercase(), c)).collect());
                }
                (make.to_lowercase(), rules)
            })
            .collect();
        Ok(Self { makes })
    }
    
    pub fn from_json_file(path: &Path) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
    
    pub fn insert(&mut self, make: &str, rules: MakeCalibrations) {
        self.makes.insert(make.to_lowercase(), rules);
    }
    
    pub fn get(&self, make: &str) -> Option<&MakeCalibrations> {
        self.makes.get(make)
    }
    
    pub fn is_empty(&self) -> bool {
        self.makes.is_empty()
    }
}

/// Bundled hard-coded calibration table
pub fn camera_calibration() -> &'static CalibrationDatabase {
    CAMERA_CALIBRATION.get_or_init(|| {
        CalibrationDatabase::from_json(BUNDLED_CALIBRATIONS).unwrap_or_else(|e| {
            error!("Bundled calibration data is invalid: {}", e);
            CalibrationDatabase::default()
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_bundled_tables_load() {
        assert!(!sensor_data().is_empty());
        assert!(!camera_calibration().is_empty());
        assert_eq!(sensor_data().get("dji fc6310"), Some(13.2));
        assert_eq!(sensor_data().get("DJI FC6310"), Some(13.2));
    }
    
    #[test]
    fn test_rule_order() {
        let db = CalibrationDatabase::from_json(
            r#"{
                "Acme": {
                    "MODEL": {"Cam One": {"focal": 0.5}},
                    "FOCAL": {"24": {"focal": 0.9}}
                },
                "zeta": {"FOCAL": {"24": {"focal": 0.7}}}
            }"#,
        )
        .unwrap();
        let acme = db.get("acme").unwrap();
        assert_eq!(acme.lookup("cam one", 24).and_then(|c| c.focal), Some(0.5));
        // MODEL present but unmatched: FOCAL is not consulted
        assert!(acme.lookup("cam two", 24).is_none());
        
        let zeta = db.get("zeta").unwrap();
        assert_eq!(zeta.lookup("anything", 24).and_then(|c| c.focal), Some(0.7));
        assert!(zeta.lookup("anything", 35).is_none());
    }
    
    #[test]
    fn test_invalid_json() {
        assert!(SensorDatabase::from_json("{\"a\": \"wide\"}").is_err());
    }
}
