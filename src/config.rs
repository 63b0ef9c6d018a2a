//! Extraction settings

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Settings shared by every image of a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Trust EXIF-reported dimensions instead of decoding the image header
    pub use_exif_size: bool,
    
    /// Focal ratio used when no calibration source resolves
    pub default_focal_prior: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            use_exif_size: true,
            default_focal_prior: 0.85,
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
    
    pub fn from_json_file(path: &Path) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = Config::from_json(r#"{"default_focal_prior": 1.2}"#).unwrap();
        assert_eq!(config.default_focal_prior, 1.2);
        assert!(config.use_exif_size);
    }
    
    #[test]
    fn test_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"use_exif_size": false}"#).unwrap();
        let config = Config::from_json_file(&path).unwrap();
        assert!(!config.use_exif_size);
        assert_eq!(config.default_focal_prior, 0.85);
        
        assert!(Config::from_json_file(&dir.path().join("missing.json")).is_err());
    }
}
